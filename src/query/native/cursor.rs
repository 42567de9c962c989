//! Traversal cursors for the four tree orders.

use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::query::evaluator::{Cursor, TreeOrder};
use crate::query::handles::{Handle, HandleTable};
use crate::types::Node;

pub fn new_cursor(table: &mut HandleTable<'_>, root: Handle, order: TreeOrder) -> Box<dyn Cursor> {
    match order {
        TreeOrder::PreOrder => Box::new(PreOrder { stack: vec![root] }),
        TreeOrder::PostOrder => Box::new(PostOrder {
            stack: vec![(root, false)],
        }),
        TreeOrder::LevelOrder => Box::new(LevelOrder {
            queue: VecDeque::from([root]),
        }),
        TreeOrder::PositionOrder => Box::new(Sorted {
            pending: by_position(table, root),
        }),
    }
}

struct PreOrder {
    stack: Vec<Handle>,
}

impl Cursor for PreOrder {
    fn next(&mut self, table: &mut HandleTable<'_>) -> Option<Handle> {
        let h = self.stack.pop()?;
        self.stack.extend(table.children(h).iter().rev().copied());
        Some(h)
    }
}

struct PostOrder {
    /// `(handle, children already pushed)`
    stack: Vec<(Handle, bool)>,
}

impl Cursor for PostOrder {
    fn next(&mut self, table: &mut HandleTable<'_>) -> Option<Handle> {
        loop {
            let (h, expanded) = self.stack.pop()?;
            if expanded {
                return Some(h);
            }
            self.stack.push((h, true));
            self.stack
                .extend(table.children(h).iter().rev().map(|c| (*c, false)));
        }
    }
}

struct LevelOrder {
    queue: VecDeque<Handle>,
}

impl Cursor for LevelOrder {
    fn next(&mut self, table: &mut HandleTable<'_>) -> Option<Handle> {
        let h = self.queue.pop_front()?;
        self.queue.extend(table.children(h).iter().copied());
        Some(h)
    }
}

/// Precomputed sequence.
struct Sorted {
    pending: VecDeque<Handle>,
}

impl Cursor for Sorted {
    fn next(&mut self, _table: &mut HandleTable<'_>) -> Option<Handle> {
        self.pending.pop_front()
    }
}

/// Pre-order, stably sorted by start position.
fn by_position(table: &mut HandleTable<'_>, root: Handle) -> VecDeque<Handle> {
    let mut preorder = PreOrder { stack: vec![root] };
    let mut nodes: Vec<(Handle, &Node)> = Vec::new();
    while let Some(h) = preorder.next(table) {
        if let Some(node) = table.node(h) {
            nodes.push((h, node));
        }
    }
    nodes.sort_by(|(_, a), (_, b)| position_cmp(a, b));
    nodes.into_iter().map(|(h, _)| h).collect()
}

/// Nodes without a start position first, then by offset, line and column.
pub fn position_cmp(a: &Node, b: &Node) -> Ordering {
    position_key(a).cmp(&position_key(b))
}

fn position_key(node: &Node) -> Option<(u32, u32, u32)> {
    node.start_position.map(|p| (p.offset, p.line, p.col))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;
    use pretty_assertions::assert_eq as pa_eq;

    fn at(offset: u32, line: u32, col: u32) -> Node {
        Node::new(format!("n{offset}")).with_span(Position::new(offset, line, col), Position::new(offset, line, col))
    }

    #[test]
    fn offsets_win_when_both_present() {
        pa_eq!(position_cmp(&at(1, 9, 9), &at(2, 1, 1)), Ordering::Less);
    }

    #[test]
    fn missing_position_sorts_first() {
        pa_eq!(position_cmp(&Node::new("x"), &at(5, 1, 1)), Ordering::Less);
        pa_eq!(position_cmp(&Node::new("x"), &Node::new("y")), Ordering::Equal);
    }

    #[test]
    fn offset_ties_fall_back_to_line_and_column() {
        pa_eq!(position_cmp(&at(0, 2, 1), &at(0, 1, 7)), Ordering::Greater);
        pa_eq!(position_cmp(&at(0, 1, 7), &at(0, 1, 7)), Ordering::Equal);
    }

    #[test]
    fn mixed_positions_sort_consistently() {
        // Offsets disagree with line/column on purpose; missing spans mixed in.
        let mut children = Vec::new();
        for i in 0..200u32 {
            children.push(match i % 3 {
                0 => Node::new("none"),
                1 => at(0, 200 - i, i % 7),
                _ => at(1000 - i, i % 5, 1),
            });
        }
        let tree = Node::new("root").with_children(children);
        let mut table = HandleTable::new();
        let root = table.insert(&tree);
        let mut cursor = new_cursor(&mut table, root, TreeOrder::PositionOrder);
        let mut seen = Vec::new();
        while let Some(h) = cursor.next(&mut table) {
            seen.push(table.node(h).unwrap());
        }
        pa_eq!(seen.len(), 201);
        for pair in seen.windows(2) {
            assert_ne!(position_cmp(pair[0], pair[1]), Ordering::Greater);
        }
    }

    #[test]
    fn position_order_is_stable_for_ties() {
        let tree = Node::new("root")
            .with_child(at(10, 2, 1))
            .with_child(Node::new("a").with_child(at(3, 1, 4)))
            .with_child(Node::new("b"));
        let mut table = HandleTable::new();
        let root = table.insert(&tree);
        let mut cursor = new_cursor(&mut table, root, TreeOrder::PositionOrder);
        let mut names = Vec::new();
        while let Some(h) = cursor.next(&mut table) {
            names.push(table.node(h).unwrap().internal_type.clone());
        }
        pa_eq!(names, vec!["root", "a", "b", "n3", "n10"]);
    }
}
