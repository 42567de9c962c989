//! Contract between the query engine and a tree-query evaluator.
//!
//! An evaluator works exclusively on [`Handle`]s from the session's
//! [`HandleTable`]. It is not assumed to be reentrant: the engine serializes
//! every call behind one lock.

use crate::query::handles::{Handle, HandleTable};

/// Result shape a query is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    NodeSet,
    Boolean,
    Number,
    String,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeSet => "node-set",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
        }
    }
}

impl std::fmt::Display for ResultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded evaluator result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Matches in evaluator order; duplicates are allowed.
    Nodes(Vec<Handle>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Value {
    pub fn kind(&self) -> ResultKind {
        match self {
            Self::Nodes(_) => ResultKind::NodeSet,
            Self::Boolean(_) => ResultKind::Boolean,
            Self::Number(_) => ResultKind::Number,
            Self::String(_) => ResultKind::String,
        }
    }
}

/// Error reported by an evaluator.
///
/// Messages starting with [`EvalError::INVALID_EXPRESSION`] blame the query
/// text; anything else is an evaluator failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    message: String,
}

impl EvalError {
    pub const INVALID_EXPRESSION: &'static str = "Invalid expression";

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error blaming the expression itself.
    pub fn invalid(detail: impl std::fmt::Display) -> Self {
        Self::new(format!("{}: {detail}", Self::INVALID_EXPRESSION))
    }

    /// The query evaluated to a different shape than requested.
    pub fn kind_mismatch(expected: ResultKind, actual: ResultKind) -> Self {
        Self::new(format!(
            "Result of expression is not {expected} (is: {actual})"
        ))
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_invalid_expression(&self) -> bool {
        self.message.starts_with(Self::INVALID_EXPRESSION)
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for EvalError {}

/// Total visiting order over a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TreeOrder {
    #[default]
    PreOrder,
    PostOrder,
    LevelOrder,
    /// Pre-order, then stably sorted by start position.
    PositionOrder,
}

impl TreeOrder {
    pub const ALL: [TreeOrder; 4] = [
        Self::PreOrder,
        Self::PostOrder,
        Self::LevelOrder,
        Self::PositionOrder,
    ];

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['_', '-'], "").as_str() {
            "pre" | "preorder" => Some(Self::PreOrder),
            "post" | "postorder" => Some(Self::PostOrder),
            "level" | "levelorder" | "bfs" => Some(Self::LevelOrder),
            "position" | "positionorder" | "pos" => Some(Self::PositionOrder),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreOrder => "pre-order",
            Self::PostOrder => "post-order",
            Self::LevelOrder => "level-order",
            Self::PositionOrder => "position-order",
        }
    }
}

impl std::fmt::Display for TreeOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateful traversal owned by the evaluator that created it.
pub trait Cursor: Send {
    /// Next node in traversal order, `None` once exhausted.
    fn next(&mut self, table: &mut HandleTable<'_>) -> Option<Handle>;
}

/// A structural query evaluator.
pub trait Evaluator: Send {
    /// Evaluate `query` with `root` as the context tree.
    fn evaluate(
        &mut self,
        table: &mut HandleTable<'_>,
        root: Handle,
        query: &str,
        kind: ResultKind,
    ) -> Result<Value, EvalError>;

    /// Start a traversal of the tree under `root`.
    fn new_cursor(
        &mut self,
        table: &mut HandleTable<'_>,
        root: Handle,
        order: TreeOrder,
    ) -> Result<Box<dyn Cursor>, EvalError>;

    /// Release a cursor created by [`Evaluator::new_cursor`].
    fn free_cursor(&mut self, cursor: Box<dyn Cursor>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq as pa_eq;
    use test_case::test_case;

    #[test]
    fn invalid_expression_prefix_is_detected() {
        assert!(EvalError::invalid("unexpected token ']'").is_invalid_expression());
        assert!(!EvalError::kind_mismatch(ResultKind::Boolean, ResultKind::NodeSet)
            .is_invalid_expression());
    }

    #[test]
    fn kind_mismatch_message() {
        pa_eq!(
            EvalError::kind_mismatch(ResultKind::Number, ResultKind::String).message(),
            "Result of expression is not number (is: string)"
        );
    }

    #[test_case("pre", TreeOrder::PreOrder ; "pre")]
    #[test_case("post-order", TreeOrder::PostOrder ; "post order")]
    #[test_case("LEVEL_ORDER", TreeOrder::LevelOrder ; "level upper")]
    #[test_case("position", TreeOrder::PositionOrder ; "position")]
    fn order_parses_loosely(input: &str, expected: TreeOrder) {
        pa_eq!(TreeOrder::from_str_loose(input), Some(expected));
    }

    #[test]
    fn unknown_order_is_rejected() {
        pa_eq!(TreeOrder::from_str_loose("sideways"), None);
    }
}
