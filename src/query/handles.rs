//! Session-scoped handle table.
//!
//! Evaluators never see `&Node` directly: they address nodes through small
//! non-zero integers minted here. A table borrows the tree for `'t`, so no
//! handle can be decoded after the tree (or the session) is gone.

use std::num::NonZeroU32;

use crate::types::Node;

/// Opaque reference to a node within one [`HandleTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonZeroU32);

impl Handle {
    /// Reconstruct a handle from its raw value; zero means "no node".
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    fn from_index(index: usize) -> Self {
        Self(NonZeroU32::MIN.saturating_add(index as u32))
    }

    fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Entry<'t> {
    node: &'t Node,
    parent: Option<Handle>,
    /// Minted on first request.
    children: Option<Vec<Handle>>,
    /// Property keys, sorted, computed on first request.
    property_keys: Option<Vec<&'t str>>,
}

impl<'t> Entry<'t> {
    fn new(node: &'t Node, parent: Option<Handle>) -> Self {
        Self {
            node,
            parent,
            children: None,
            property_keys: None,
        }
    }
}

/// Arena mapping handles to node references for one session.
#[derive(Default)]
pub struct HandleTable<'t> {
    entries: Vec<Entry<'t>>,
}

impl<'t> HandleTable<'t> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tree root. Its handle has no parent.
    pub fn insert(&mut self, node: &'t Node) -> Handle {
        self.entries.push(Entry::new(node, None));
        Handle::from_index(self.entries.len() - 1)
    }

    pub fn node(&self, handle: Handle) -> Option<&'t Node> {
        self.entries.get(handle.index()).map(|e| e.node)
    }

    pub fn parent(&self, handle: Handle) -> Option<Handle> {
        self.entries.get(handle.index()).and_then(|e| e.parent)
    }

    /// Handles of `handle`'s children in order, minting them on first use.
    pub fn children(&mut self, handle: Handle) -> &[Handle] {
        let idx = handle.index();
        let Some(entry) = self.entries.get(idx) else {
            return &[];
        };
        if entry.children.is_none() {
            let node = entry.node;
            let start = self.entries.len();
            self.entries
                .extend(node.children.iter().map(|child| Entry::new(child, Some(handle))));
            let minted = (start..self.entries.len()).map(Handle::from_index).collect();
            self.entries[idx].children = Some(minted);
        }
        self.entries[idx].children.as_deref().unwrap_or(&[])
    }

    /// Property keys of `handle`'s node in ascending order, cached per node.
    pub fn property_keys(&mut self, handle: Handle) -> &[&'t str] {
        let Some(entry) = self.entries.get_mut(handle.index()) else {
            return &[];
        };
        let node = entry.node;
        entry.property_keys.get_or_insert_with(|| {
            let mut keys: Vec<&'t str> = node.properties.keys().map(String::as_str).collect();
            keys.sort_unstable();
            keys
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invalidate every handle minted so far.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for HandleTable<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleTable")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq as pa_eq;

    fn tree() -> Node {
        Node::new("root")
            .with_child(Node::new("a").with_property("z", "1").with_property("b", "2"))
            .with_child(Node::new("c").with_child(Node::new("d")))
    }

    #[test]
    fn handles_are_non_zero_and_sequential() {
        let tree = tree();
        let mut table = HandleTable::new();
        let root = table.insert(&tree);
        pa_eq!(root.get(), 1);
        let kids = table.children(root).to_vec();
        pa_eq!(kids.iter().map(|h| h.get()).collect::<Vec<_>>(), vec![2, 3]);
        pa_eq!(table.node(kids[1]).unwrap().internal_type, "c");
        pa_eq!(table.parent(kids[1]), Some(root));
        pa_eq!(table.parent(root), None);
        assert!(Handle::from_raw(0).is_none());
    }

    #[test]
    fn children_are_minted_once() {
        let tree = tree();
        let mut table = HandleTable::new();
        let root = table.insert(&tree);
        let first = table.children(root).to_vec();
        let second = table.children(root).to_vec();
        pa_eq!(first, second);
        pa_eq!(table.len(), 3);
    }

    #[test]
    fn property_keys_are_sorted() {
        let tree = tree();
        let mut table = HandleTable::new();
        let root = table.insert(&tree);
        let a = table.children(root)[0];
        pa_eq!(table.property_keys(a), &["b", "z"]);
        assert!(table.property_keys(root).is_empty());
    }

    #[test]
    fn clear_invalidates_handles() {
        let tree = tree();
        let mut table = HandleTable::new();
        let root = table.insert(&tree);
        table.children(root);
        table.clear();
        assert!(table.is_empty());
        pa_eq!(table.node(root), None);
        assert!(table.children(root).is_empty());
    }
}
