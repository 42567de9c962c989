//! Query and traversal behavior through the public API.

use pretty_assertions::assert_eq as pa_eq;
use test_case::test_case;
use uast_client::query::IterState;
use uast_client::types::{Node, Position, Role};
use uast_client::{QueryEngine, TreeOrder, UastError};

/// `import os` / `def f(a, b): return a` as a small annotated tree.
fn module() -> Node {
    let at = |offset, line, col| Position::new(offset, line, col);
    Node::new("Module")
        .with_role(Role::File)
        .with_child(
            Node::new("Import")
                .with_role(Role::Import)
                .with_span(at(0, 1, 1), at(9, 1, 10))
                .with_child(
                    Node::new("alias")
                        .with_token("os")
                        .with_role(Role::Identifier)
                        .with_span(at(7, 1, 8), at(9, 1, 10)),
                ),
        )
        .with_child(
            Node::new("FunctionDef")
                .with_token("f")
                .with_role(Role::Function)
                .with_role(Role::Declaration)
                .with_property("decorators", "0")
                .with_span(at(10, 2, 1), at(33, 2, 24))
                .with_child(
                    Node::new("arg")
                        .with_token("a")
                        .with_role(Role::Argument)
                        .with_span(at(16, 2, 7), at(17, 2, 8)),
                )
                .with_child(
                    Node::new("arg")
                        .with_token("b")
                        .with_role(Role::Argument)
                        .with_span(at(19, 2, 10), at(20, 2, 11)),
                )
                .with_child(
                    Node::new("Return")
                        .with_role(Role::Return)
                        .with_span(at(23, 2, 14), at(31, 2, 22))
                        .with_child(
                            Node::new("Name")
                                .with_token("a")
                                .with_role(Role::Identifier)
                                .with_span(at(30, 2, 21), at(31, 2, 22)),
                        ),
                ),
        )
}

fn tokens(nodes: &[&Node]) -> Vec<String> {
    nodes
        .iter()
        .map(|n| n.token.clone().unwrap_or_else(|| n.internal_type.clone()))
        .collect()
}

#[test_case("//arg", &["a", "b"] ; "by type")]
#[test_case("//*[@roleArgument]", &["a", "b"] ; "by role")]
#[test_case("//*[@token='a']", &["a", "a"] ; "duplicates by token are distinct nodes")]
#[test_case("//FunctionDef[@decorators='0']/arg[last()]", &["b"] ; "property and last")]
#[test_case("//*[@startLine=1 and @roleIdentifier]", &["os"] ; "position attribute")]
#[test_case("//Name/ancestor::FunctionDef", &["f"] ; "ancestor axis")]
#[test_case("//Return/preceding-sibling::arg", &["a", "b"] ; "preceding siblings in document order")]
#[test_case("/Module/*[1]", &["Import"] ; "first child")]
fn node_queries(query: &str, expected: &[&str]) {
    let engine = QueryEngine::new();
    let tree = module();
    pa_eq!(tokens(&engine.filter(Some(&tree), query).unwrap()), expected);
}

#[test]
fn scalar_queries() {
    let engine = QueryEngine::new();
    let tree = module();
    let root = Some(&tree);
    pa_eq!(engine.filter_number(root, "count(//*[@roleIdentifier])").unwrap(), 2.0);
    pa_eq!(engine.filter_number(root, "sum(//arg/@startCol)").unwrap(), 17.0);
    pa_eq!(
        engine
            .filter_string(root, "concat(//FunctionDef/@token, '(', //arg[1]/@token, ')')")
            .unwrap(),
        "f(a)"
    );
    assert!(engine.filter_bool(root, "//Import and not(//Class)").unwrap());
    pa_eq!(engine.filter_string(root, "name(/*)").unwrap(), "Module");
}

#[test]
fn invalid_and_mistyped_queries() {
    let engine = QueryEngine::new();
    let tree = module();
    let err = engine.filter(Some(&tree), "//arg[").unwrap_err();
    assert!(matches!(err, UastError::InvalidQuery(_)), "{err}");

    let err = engine.filter_number(Some(&tree), "//arg").unwrap_err();
    pa_eq!(
        err.to_string(),
        "filter_number() failed: Result of expression is not number (is: node-set)"
    );
    // The engine keeps working after errors.
    pa_eq!(engine.filter(Some(&tree), "//Return").unwrap().len(), 1);
}

#[test]
fn matches_borrow_from_the_tree() {
    let engine = QueryEngine::new();
    let tree = module();
    let args = engine.filter(Some(&tree), "//arg").unwrap();
    assert!(std::ptr::eq(args[0], &tree.children[1].children[0]));
}

#[test_case(TreeOrder::PreOrder, &["Module", "Import", "os", "f", "a", "b", "Return", "a"] ; "pre order")]
#[test_case(TreeOrder::PostOrder, &["os", "Import", "a", "b", "a", "Return", "f", "Module"] ; "post order")]
#[test_case(TreeOrder::LevelOrder, &["Module", "Import", "f", "os", "a", "b", "Return", "a"] ; "level order")]
#[test_case(TreeOrder::PositionOrder, &["Module", "Import", "os", "f", "a", "b", "Return", "a"] ; "position order")]
fn traversal_orders(order: TreeOrder, expected: &[&str]) {
    let engine = QueryEngine::new();
    let tree = module();
    let mut iter = engine.iter(&tree, order).unwrap();
    let visited: Vec<&Node> = iter.nodes().collect();
    pa_eq!(tokens(&visited), expected);
    pa_eq!(iter.state(), IterState::Finished);
}

#[test]
fn position_order_follows_offsets_not_structure() {
    let engine = QueryEngine::new();
    // Children listed out of source order.
    let tree = Node::new("Block")
        .with_span(Position::new(0, 1, 1), Position::new(30, 3, 1))
        .with_child(Node::new("second").with_span(Position::new(20, 2, 1), Position::new(25, 2, 6)))
        .with_child(Node::new("first").with_span(Position::new(5, 1, 6), Position::new(10, 1, 11)));
    let mut iter = engine.iter(&tree, TreeOrder::PositionOrder).unwrap();
    let visited: Vec<&Node> = iter.nodes().collect();
    pa_eq!(tokens(&visited), vec!["Block", "first", "second"]);
}

#[test]
fn iterator_lifecycle() {
    let engine = QueryEngine::new();
    let tree = module();
    let mut iter = engine.iter(&tree, TreeOrder::PreOrder).unwrap();
    pa_eq!(iter.order(), TreeOrder::PreOrder);
    pa_eq!(iter.next().unwrap().unwrap().internal_type, "Module");
    iter.dispose();
    iter.dispose();
    assert!(matches!(iter.next(), Err(UastError::IteratorMisuse(_))));
}

#[test]
fn orders_parse_loosely() {
    pa_eq!(TreeOrder::from_str_loose("post"), Some(TreeOrder::PostOrder));
    pa_eq!(TreeOrder::from_str_loose("LEVEL_ORDER"), Some(TreeOrder::LevelOrder));
    pa_eq!(TreeOrder::from_str_loose("sideways"), None);
}
