//! Structural queries and traversals over UAST trees.

pub mod engine;
pub mod evaluator;
pub mod handles;
pub mod iter;
pub mod native;

pub use engine::QueryEngine;
pub use evaluator::{Cursor, EvalError, Evaluator, ResultKind, TreeOrder, Value};
pub use handles::{Handle, HandleTable};
pub use iter::{IterState, TreeIterator};
pub use native::NativeEvaluator;
