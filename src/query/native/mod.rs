//! Built-in evaluator: an XPath 1.0 subset over UAST nodes.
//!
//! Supported: absolute and relative location paths, `//`, `.` and `..`, the
//! child, descendant(-or-self), self, parent, ancestor(-or-self),
//! following-sibling, preceding-sibling and attribute axes, name, `*`,
//! `node()` and `text()` tests, predicates, unions, boolean, comparison and
//! arithmetic operators, and the core function library.

mod cursor;
mod eval;
mod lexer;
mod parser;

use std::collections::HashMap;
use std::sync::Arc;

use crate::query::evaluator::{Cursor, EvalError, Evaluator, ResultKind, TreeOrder, Value};
use crate::query::handles::{Handle, HandleTable};

pub use cursor::position_cmp;
use eval::{Item, Session, XValue};
use parser::Expr;

/// Compiled expressions kept per evaluator.
const EXPRESSION_CACHE_LIMIT: usize = 256;

#[derive(Default)]
pub struct NativeEvaluator {
    compiled: HashMap<String, Arc<Expr>>,
    open_cursors: usize,
}

impl NativeEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursors created and not yet freed.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors
    }

    fn compile(&mut self, query: &str) -> Result<Arc<Expr>, EvalError> {
        if let Some(expr) = self.compiled.get(query) {
            return Ok(Arc::clone(expr));
        }
        let expr = Arc::new(parser::parse(query)?);
        if self.compiled.len() >= EXPRESSION_CACHE_LIMIT {
            self.compiled.clear();
        }
        self.compiled.insert(query.to_string(), Arc::clone(&expr));
        Ok(expr)
    }
}

impl std::fmt::Debug for NativeEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEvaluator")
            .field("compiled", &self.compiled.len())
            .field("open_cursors", &self.open_cursors)
            .finish()
    }
}

impl Evaluator for NativeEvaluator {
    fn evaluate(
        &mut self,
        table: &mut HandleTable<'_>,
        root: Handle,
        query: &str,
        kind: ResultKind,
    ) -> Result<Value, EvalError> {
        let expr = self.compile(query)?;
        let value = Session::new(table, root).evaluate(&expr)?;
        if value.kind() != kind {
            return Err(EvalError::kind_mismatch(kind, value.kind()));
        }
        Ok(match value {
            // Only element matches map back to nodes.
            XValue::Nodes(items) => Value::Nodes(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Item::Node(h) => Some(h),
                        Item::Root | Item::Attr(..) => None,
                    })
                    .collect(),
            ),
            XValue::Bool(b) => Value::Boolean(b),
            XValue::Num(n) => Value::Number(n),
            XValue::Str(s) => Value::String(s),
        })
    }

    fn new_cursor(
        &mut self,
        table: &mut HandleTable<'_>,
        root: Handle,
        order: TreeOrder,
    ) -> Result<Box<dyn Cursor>, EvalError> {
        if table.node(root).is_none() {
            return Err(EvalError::new(format!("unknown root handle {root}")));
        }
        self.open_cursors += 1;
        Ok(cursor::new_cursor(table, root, order))
    }

    fn free_cursor(&mut self, cursor: Box<dyn Cursor>) {
        self.open_cursors = self.open_cursors.saturating_sub(1);
        drop(cursor);
    }
}
