//! Stateful tree traversal with an explicit lifecycle.
//!
//! ```text
//! Active --next() = None--> Finished
//!   |                          |
//!   +------- dispose() --------+--> Disposed
//! ```
//!
//! `next` on a finished or disposed iterator is an error; `dispose` is
//! idempotent and also runs on drop.

use crate::error::{Result, UastError};
use crate::query::engine::{classify, QueryEngine};
use crate::query::evaluator::{Cursor, TreeOrder};
use crate::query::handles::HandleTable;
use crate::types::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    Active,
    Finished,
    Disposed,
}

pub struct TreeIterator<'a> {
    engine: &'a QueryEngine,
    table: HandleTable<'a>,
    cursor: Option<Box<dyn Cursor>>,
    order: TreeOrder,
    state: IterState,
}

impl<'a> TreeIterator<'a> {
    pub fn new(engine: &'a QueryEngine, root: &'a Node, order: TreeOrder) -> Result<Self> {
        let mut table = HandleTable::new();
        let handle = table.insert(root);
        let cursor = engine
            .lock()
            .new_cursor(&mut table, handle, order)
            .map_err(|e| classify("iterator_new", e))?;
        tracing::trace!(%order, "tree iterator created");
        Ok(Self {
            engine,
            table,
            cursor: Some(cursor),
            order,
            state: IterState::Active,
        })
    }

    pub fn order(&self) -> TreeOrder {
        self.order
    }

    pub fn state(&self) -> IterState {
        self.state
    }

    /// Next node, or `Ok(None)` exactly once at the end of the sequence.
    pub fn next(&mut self) -> Result<Option<&'a Node>> {
        match self.state {
            IterState::Active => {}
            IterState::Finished => {
                return Err(UastError::IteratorMisuse("next() called after end of sequence"))
            }
            IterState::Disposed => {
                return Err(UastError::IteratorMisuse("next() called on a disposed iterator"))
            }
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return Err(UastError::IteratorMisuse("iterator has no cursor"));
        };
        let next = {
            let _evaluator = self.engine.lock();
            cursor.next(&mut self.table)
        };
        match next {
            None => {
                self.state = IterState::Finished;
                Ok(None)
            }
            Some(h) => self
                .table
                .node(h)
                .map(Some)
                .ok_or_else(|| UastError::Evaluator {
                    operation: "iterator_next",
                    message: format!("cursor returned unknown handle {h}"),
                }),
        }
    }

    /// Pull the remaining nodes as a standard iterator.
    ///
    /// Stops at the end of the sequence or at the first error, and yields
    /// nothing once the iterator is finished or disposed.
    pub fn nodes(&mut self) -> Nodes<'_, 'a> {
        Nodes {
            iter: self,
            done: false,
        }
    }

    /// Release the cursor. Safe to call any number of times.
    pub fn dispose(&mut self) {
        if self.state == IterState::Disposed {
            return;
        }
        if let Some(cursor) = self.cursor.take() {
            self.engine.lock().free_cursor(cursor);
        }
        self.table.clear();
        self.state = IterState::Disposed;
        tracing::trace!(order = %self.order, "tree iterator disposed");
    }
}

impl Drop for TreeIterator<'_> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for TreeIterator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeIterator")
            .field("order", &self.order)
            .field("state", &self.state)
            .finish()
    }
}

pub struct Nodes<'i, 'a> {
    iter: &'i mut TreeIterator<'a>,
    done: bool,
}

impl<'a> Iterator for Nodes<'_, 'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        if self.done || self.iter.state != IterState::Active {
            return None;
        }
        match self.iter.next() {
            Ok(Some(node)) => Some(node),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "tree traversal stopped");
                self.done = true;
                None
            }
        }
    }
}
