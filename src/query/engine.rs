//! Query engine: runs structural queries against a tree through an
//! [`Evaluator`], one serialized session per call.

use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, UastError};
use crate::query::evaluator::{EvalError, Evaluator, ResultKind, TreeOrder, Value};
use crate::query::handles::HandleTable;
use crate::query::iter::TreeIterator;
use crate::query::native::NativeEvaluator;
use crate::types::{Node, ParseResponse};

/// Thread-safe front end to a non-reentrant evaluator.
///
/// Every call takes the evaluator lock, builds a fresh handle table for the
/// tree, evaluates, decodes the result and drops both table and lock before
/// returning, on success and on failure alike.
pub struct QueryEngine {
    evaluator: Mutex<Box<dyn Evaluator>>,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryEngine {
    /// Engine backed by the built-in XPath evaluator.
    pub fn new() -> Self {
        Self::with_evaluator(Box::new(NativeEvaluator::new()))
    }

    pub fn with_evaluator(evaluator: Box<dyn Evaluator>) -> Self {
        Self {
            evaluator: Mutex::new(evaluator),
        }
    }

    /// Nodes matching `query`, in evaluator order. Duplicates are kept.
    pub fn filter<'t>(&self, root: Option<&'t Node>, query: &str) -> Result<Vec<&'t Node>> {
        let Some(root) = root.filter(|_| !query.is_empty()) else {
            return Ok(Vec::new());
        };
        self.session("filter", root, query, ResultKind::NodeSet, |value, table| match value {
            Value::Nodes(handles) => handles
                .into_iter()
                .map(|h| {
                    table.node(h).ok_or_else(|| UastError::Evaluator {
                        operation: "filter",
                        message: format!("evaluator returned unknown handle {h}"),
                    })
                })
                .collect(),
            other => Err(unexpected("filter", ResultKind::NodeSet, &other)),
        })
    }

    pub fn filter_bool(&self, root: Option<&Node>, query: &str) -> Result<bool> {
        let Some(root) = root.filter(|_| !query.is_empty()) else {
            return Ok(false);
        };
        self.session("filter_bool", root, query, ResultKind::Boolean, |value, _| match value {
            Value::Boolean(b) => Ok(b),
            other => Err(unexpected("filter_bool", ResultKind::Boolean, &other)),
        })
    }

    pub fn filter_number(&self, root: Option<&Node>, query: &str) -> Result<f64> {
        let Some(root) = root.filter(|_| !query.is_empty()) else {
            return Ok(0.0);
        };
        self.session("filter_number", root, query, ResultKind::Number, |value, _| match value {
            Value::Number(n) => Ok(n),
            other => Err(unexpected("filter_number", ResultKind::Number, &other)),
        })
    }

    pub fn filter_string(&self, root: Option<&Node>, query: &str) -> Result<String> {
        let Some(root) = root.filter(|_| !query.is_empty()) else {
            return Ok(String::new());
        };
        self.session("filter_string", root, query, ResultKind::String, |value, _| match value {
            Value::String(s) => Ok(s),
            other => Err(unexpected("filter_string", ResultKind::String, &other)),
        })
    }

    /// Start a traversal of `root` in `order`.
    pub fn iter<'a>(&'a self, root: &'a Node, order: TreeOrder) -> Result<TreeIterator<'a>> {
        TreeIterator::new(self, root, order)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn Evaluator>> {
        self.evaluator.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn session<'t, T>(
        &self,
        operation: &'static str,
        root: &'t Node,
        query: &str,
        kind: ResultKind,
        decode: impl FnOnce(Value, &HandleTable<'t>) -> Result<T>,
    ) -> Result<T> {
        let mut evaluator = self.lock();
        let mut table = HandleTable::new();
        let handle = table.insert(root);
        tracing::trace!(operation, query, "query session");
        let value = evaluator
            .evaluate(&mut table, handle, query, kind)
            .map_err(|e| classify(operation, e))?;
        decode(value, &table)
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine").finish_non_exhaustive()
    }
}

/// Map an evaluator error to the caller-facing taxonomy.
pub(crate) fn classify(operation: &'static str, err: EvalError) -> UastError {
    if err.is_invalid_expression() {
        UastError::InvalidQuery(err.message().to_string())
    } else {
        UastError::Evaluator {
            operation,
            message: err.message().to_string(),
        }
    }
}

fn unexpected(operation: &'static str, expected: ResultKind, got: &Value) -> UastError {
    UastError::Evaluator {
        operation,
        message: EvalError::kind_mismatch(expected, got.kind()).to_string(),
    }
}

impl ParseResponse {
    /// Run a node-set query against this response's tree.
    pub fn filter<'a>(&'a self, engine: &QueryEngine, query: &str) -> Result<Vec<&'a Node>> {
        engine.filter(self.uast.as_ref(), query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::evaluator::Cursor;
    use crate::query::handles::Handle;
    use crate::types::Status;
    use pretty_assertions::assert_eq as pa_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Evaluator that must never be reached.
    struct Unreachable(Arc<AtomicUsize>);

    impl Evaluator for Unreachable {
        fn evaluate(
            &mut self,
            _: &mut HandleTable<'_>,
            _: Handle,
            _: &str,
            _: ResultKind,
        ) -> std::result::Result<Value, EvalError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(EvalError::new("unreachable"))
        }

        fn new_cursor(
            &mut self,
            _: &mut HandleTable<'_>,
            _: Handle,
            _: TreeOrder,
        ) -> std::result::Result<Box<dyn Cursor>, EvalError> {
            Err(EvalError::new("unreachable"))
        }

        fn free_cursor(&mut self, _: Box<dyn Cursor>) {}
    }

    #[test]
    fn single_node_round_trip() {
        let engine = QueryEngine::new();
        let tree = Node::new("a");
        pa_eq!(engine.filter(Some(&tree), "//a").unwrap().len(), 1);
        assert!(engine.filter(Some(&tree), "//b").unwrap().is_empty());
    }

    #[test]
    fn empty_query_or_missing_tree_skips_the_evaluator() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = QueryEngine::with_evaluator(Box::new(Unreachable(Arc::clone(&calls))));
        let tree = Node::new("a");
        assert!(engine.filter(Some(&tree), "").unwrap().is_empty());
        assert!(engine.filter(None, "//a").unwrap().is_empty());
        assert!(!engine.filter_bool(None, "true()").unwrap());
        pa_eq!(engine.filter_number(Some(&tree), "").unwrap(), 0.0);
        pa_eq!(engine.filter_string(None, "name()").unwrap(), "");
        pa_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn errors_are_classified() {
        let engine = QueryEngine::new();
        let tree = Node::new("a");
        assert!(matches!(
            engine.filter(Some(&tree), "//a[").unwrap_err(),
            UastError::InvalidQuery(_)
        ));
        let err = engine.filter_bool(Some(&tree), "//a").unwrap_err();
        assert!(matches!(err, UastError::Evaluator { operation: "filter_bool", .. }));
        pa_eq!(
            err.to_string(),
            "filter_bool() failed: Result of expression is not boolean (is: node-set)"
        );
    }

    #[test]
    fn deeply_nested_query_is_invalid_not_fatal() {
        let engine = QueryEngine::new();
        let tree = Node::new("a");
        let query = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || engine.filter_number(Some(&tree), &query).unwrap_err())
            .unwrap()
            .join()
            .unwrap();
        assert!(matches!(err, UastError::InvalidQuery(ref m) if m.contains("nested too deeply")), "{err}");
    }

    #[test]
    fn failed_session_releases_the_lock() {
        let engine = QueryEngine::new();
        let tree = Node::new("a");
        assert!(engine.filter(Some(&tree), "((").is_err());
        pa_eq!(engine.filter_number(Some(&tree), "count(//a)").unwrap(), 1.0);
    }

    #[test]
    fn typed_results() {
        let engine = QueryEngine::new();
        let tree = Node::new("a").with_token("t").with_child(Node::new("b"));
        assert!(engine.filter_bool(Some(&tree), "boolean(//b)").unwrap());
        pa_eq!(engine.filter_number(Some(&tree), "count(//*)").unwrap(), 2.0);
        pa_eq!(engine.filter_string(Some(&tree), "string(/a/@token)").unwrap(), "t");
    }

    #[test]
    fn response_filter_uses_its_tree() {
        let engine = QueryEngine::new();
        let resp = ParseResponse {
            uast: Some(Node::new("File").with_child(Node::new("a"))),
            errors: vec![],
            status: Status::Ok,
            language: "python".into(),
            filename: "x.py".into(),
        };
        pa_eq!(resp.filter(&engine, "//a").unwrap().len(), 1);
    }

    #[test]
    fn engine_is_shareable_across_threads() {
        let engine = Arc::new(QueryEngine::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    let tree = Node::new("a").with_children((0..i).map(|_| Node::new("b")));
                    engine.filter(Some(&tree), "//b").unwrap().len()
                })
            })
            .collect();
        let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        pa_eq!(counts, vec![0, 1, 2, 3]);
    }
}
