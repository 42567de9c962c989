//! Expression evaluation over the node → XML mapping.
//!
//! Each node is an element named after its internal type. Its attributes are,
//! in order: `token`, one empty `role<Name>` per role, the properties sorted
//! by key, then `startOffset startLine startCol endOffset endLine endCol`.
//! The tree root hangs under a document item; absolute paths start there.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use crate::query::evaluator::{EvalError, ResultKind};
use crate::query::handles::{Handle, HandleTable};
use crate::query::native::parser::{ArithOp, Axis, CmpOp, Expr, Function, NodeTest, PathStart, Step};

/// A node-set member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Item {
    /// The document holding the tree root.
    Root,
    Node(Handle),
    /// The `n`th attribute of a node.
    Attr(Handle, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum XValue {
    Nodes(Vec<Item>),
    Bool(bool),
    Num(f64),
    Str(String),
}

impl XValue {
    pub fn kind(&self) -> ResultKind {
        match self {
            Self::Nodes(_) => ResultKind::NodeSet,
            Self::Bool(_) => ResultKind::Boolean,
            Self::Num(_) => ResultKind::Number,
            Self::Str(_) => ResultKind::String,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Ctx {
    item: Item,
    position: usize,
    size: usize,
}

type Attrs = Rc<Vec<(String, String)>>;

/// One evaluation over one tree.
pub struct Session<'s, 't> {
    table: &'s mut HandleTable<'t>,
    root: Handle,
    /// Pre-order rank of every node, i.e. document order.
    ranks: HashMap<Handle, usize>,
    attrs: HashMap<Handle, Attrs>,
}

impl<'s, 't> Session<'s, 't> {
    pub fn new(table: &'s mut HandleTable<'t>, root: Handle) -> Self {
        let mut ranks = HashMap::new();
        let mut stack = vec![root];
        while let Some(h) = stack.pop() {
            ranks.insert(h, ranks.len());
            stack.extend(table.children(h).iter().rev().copied());
        }
        Self {
            table,
            root,
            ranks,
            attrs: HashMap::new(),
        }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<XValue, EvalError> {
        let ctx = Ctx {
            item: Item::Root,
            position: 1,
            size: 1,
        };
        self.eval(expr, ctx)
    }

    fn eval(&mut self, expr: &Expr, ctx: Ctx) -> Result<XValue, EvalError> {
        Ok(match expr {
            Expr::Or(l, r) => {
                let l = self.eval(l, ctx)?;
                XValue::Bool(self.boolean(&l) || {
                    let r = self.eval(r, ctx)?;
                    self.boolean(&r)
                })
            }
            Expr::And(l, r) => {
                let l = self.eval(l, ctx)?;
                XValue::Bool(self.boolean(&l) && {
                    let r = self.eval(r, ctx)?;
                    self.boolean(&r)
                })
            }
            Expr::Compare(op, l, r) => {
                let l = self.eval(l, ctx)?;
                let r = self.eval(r, ctx)?;
                XValue::Bool(self.compare(*op, &l, &r))
            }
            Expr::Arith(op, l, r) => {
                let l = self.eval(l, ctx)?;
                let r = self.eval(r, ctx)?;
                let (l, r) = (self.number(&l), self.number(&r));
                XValue::Num(match op {
                    ArithOp::Add => l + r,
                    ArithOp::Sub => l - r,
                    ArithOp::Mul => l * r,
                    ArithOp::Div => l / r,
                    ArithOp::Mod => l % r,
                })
            }
            Expr::Neg(inner) => {
                let v = self.eval(inner, ctx)?;
                XValue::Num(-self.number(&v))
            }
            Expr::Union(l, r) => {
                let mut items = self.node_set(l, ctx)?;
                items.extend(self.node_set(r, ctx)?);
                self.sort_unique(&mut items);
                XValue::Nodes(items)
            }
            Expr::Literal(s) => XValue::Str(s.clone()),
            Expr::Number(n) => XValue::Num(*n),
            Expr::Call(function, args) => self.call(*function, args, ctx)?,
            Expr::Path(start, steps) => XValue::Nodes(self.path(start, steps, ctx)?),
        })
    }

    fn node_set(&mut self, expr: &Expr, ctx: Ctx) -> Result<Vec<Item>, EvalError> {
        match self.eval(expr, ctx)? {
            XValue::Nodes(items) => Ok(items),
            other => Err(EvalError::new(format!(
                "XPath error: Invalid type, expected node-set (is: {})",
                other.kind()
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Location paths
    // -----------------------------------------------------------------------

    fn path(&mut self, start: &PathStart, steps: &[Step], ctx: Ctx) -> Result<Vec<Item>, EvalError> {
        let mut current = match start {
            PathStart::Root => vec![Item::Root],
            PathStart::Context => vec![ctx.item],
            PathStart::Filter(primary, predicates) => {
                let mut items = self.node_set(primary, ctx)?;
                self.sort_unique(&mut items);
                self.filter(items, predicates)?
            }
        };
        for step in steps {
            let mut next = Vec::new();
            for item in current {
                let candidates: Vec<Item> = self
                    .axis(item, step.axis)
                    .into_iter()
                    .filter(|c| self.matches(*c, step.axis, &step.test))
                    .collect();
                next.extend(self.filter(candidates, &step.predicates)?);
            }
            self.sort_unique(&mut next);
            current = next;
        }
        Ok(current)
    }

    /// Apply predicates; positions follow the order of `items`.
    fn filter(&mut self, mut items: Vec<Item>, predicates: &[Expr]) -> Result<Vec<Item>, EvalError> {
        for predicate in predicates {
            let size = items.len();
            let mut kept = Vec::with_capacity(size);
            for (i, item) in items.into_iter().enumerate() {
                let ctx = Ctx {
                    item,
                    position: i + 1,
                    size,
                };
                let keep = match self.eval(predicate, ctx)? {
                    XValue::Num(n) => n == (i + 1) as f64,
                    other => self.boolean(&other),
                };
                if keep {
                    kept.push(item);
                }
            }
            items = kept;
        }
        Ok(items)
    }

    /// Items on `axis` from `item`, nearest first for reverse axes.
    fn axis(&mut self, item: Item, axis: Axis) -> Vec<Item> {
        match (axis, item) {
            (Axis::SelfAxis, _) => vec![item],
            (Axis::Child, Item::Root) => vec![Item::Node(self.root)],
            (Axis::Child, Item::Node(h)) => self.children(h),
            (Axis::Descendant, Item::Root) => {
                let mut out = vec![Item::Node(self.root)];
                out.extend(self.descendants(self.root));
                out
            }
            (Axis::Descendant, Item::Node(h)) => self.descendants(h),
            (Axis::DescendantOrSelf, _) => {
                let mut out = vec![item];
                out.extend(self.axis(item, Axis::Descendant));
                out
            }
            (Axis::Parent, Item::Node(h)) => vec![self.parent(h)],
            (Axis::Parent, Item::Attr(h, _)) => vec![Item::Node(h)],
            (Axis::Ancestor, Item::Node(_) | Item::Attr(..)) => {
                let mut out = Vec::new();
                let mut cur = item;
                while let Some(up) = self.axis(cur, Axis::Parent).pop() {
                    out.push(up);
                    cur = up;
                }
                out
            }
            (Axis::AncestorOrSelf, _) => {
                let mut out = vec![item];
                out.extend(self.axis(item, Axis::Ancestor));
                out
            }
            (Axis::FollowingSibling, Item::Node(h)) => {
                let siblings = self.siblings(h);
                let at = siblings.iter().position(|s| *s == h).map_or(siblings.len(), |i| i + 1);
                siblings[at..].iter().map(|s| Item::Node(*s)).collect()
            }
            (Axis::PrecedingSibling, Item::Node(h)) => {
                let siblings = self.siblings(h);
                let at = siblings.iter().position(|s| *s == h).unwrap_or(0);
                siblings[..at].iter().rev().map(|s| Item::Node(*s)).collect()
            }
            (Axis::Attribute, Item::Node(h)) => {
                let count = self.attributes(h).len();
                (0..count).map(|i| Item::Attr(h, i)).collect()
            }
            _ => Vec::new(),
        }
    }

    fn children(&mut self, h: Handle) -> Vec<Item> {
        self.table.children(h).iter().map(|c| Item::Node(*c)).collect()
    }

    fn descendants(&mut self, h: Handle) -> Vec<Item> {
        let mut out = Vec::new();
        let mut stack: Vec<Handle> = self.table.children(h).iter().rev().copied().collect();
        while let Some(cur) = stack.pop() {
            out.push(Item::Node(cur));
            stack.extend(self.table.children(cur).iter().rev().copied());
        }
        out
    }

    fn parent(&self, h: Handle) -> Item {
        self.table.parent(h).map_or(Item::Root, Item::Node)
    }

    /// Children of `h`'s parent; the tree root has no siblings.
    fn siblings(&mut self, h: Handle) -> Vec<Handle> {
        match self.table.parent(h) {
            Some(p) => self.table.children(p).to_vec(),
            None => Vec::new(),
        }
    }

    fn matches(&mut self, item: Item, axis: Axis, test: &NodeTest) -> bool {
        let principal_attr = axis == Axis::Attribute;
        match (test, item) {
            (NodeTest::AnyNode, _) => true,
            (NodeTest::Text, _) => false,
            (NodeTest::Wildcard, Item::Attr(..)) => principal_attr,
            (NodeTest::Wildcard, Item::Node(_)) => !principal_attr,
            (NodeTest::Name(name), Item::Attr(..)) => principal_attr && self.name(item) == *name,
            (NodeTest::Name(name), Item::Node(_)) => !principal_attr && self.name(item) == *name,
            (_, Item::Root) => false,
        }
    }

    fn sort_unique(&self, items: &mut Vec<Item>) {
        items.sort_by_key(|item| self.doc_key(*item));
        items.dedup();
    }

    fn doc_key(&self, item: Item) -> (usize, usize) {
        match item {
            Item::Root => (0, 0),
            Item::Node(h) => (self.rank(h), 0),
            Item::Attr(h, i) => (self.rank(h), i + 1),
        }
    }

    fn rank(&self, h: Handle) -> usize {
        self.ranks.get(&h).map_or(usize::MAX, |r| r + 1)
    }

    // -----------------------------------------------------------------------
    // Node → XML mapping
    // -----------------------------------------------------------------------

    fn attributes(&mut self, h: Handle) -> Attrs {
        if let Some(attrs) = self.attrs.get(&h) {
            return Rc::clone(attrs);
        }
        let mut out = Vec::new();
        if let Some(node) = self.table.node(h) {
            if let Some(token) = &node.token {
                out.push(("token".to_string(), token.clone()));
            }
            for role in &node.roles {
                out.push((format!("role{}", role.name()), String::new()));
            }
            for key in self.table.property_keys(h) {
                let value = node.properties.get(*key).cloned().unwrap_or_default();
                out.push((key.to_string(), value));
            }
            let positions = [("start", node.start_position), ("end", node.end_position)];
            for (prefix, pos) in positions {
                if let Some(pos) = pos {
                    out.push((format!("{prefix}Offset"), pos.offset.to_string()));
                    out.push((format!("{prefix}Line"), pos.line.to_string()));
                    out.push((format!("{prefix}Col"), pos.col.to_string()));
                }
            }
        }
        let attrs = Rc::new(out);
        self.attrs.insert(h, Rc::clone(&attrs));
        attrs
    }

    fn name(&mut self, item: Item) -> String {
        match item {
            Item::Root => String::new(),
            Item::Node(h) => self
                .table
                .node(h)
                .map(|n| n.internal_type.clone())
                .unwrap_or_default(),
            Item::Attr(h, i) => self
                .attributes(h)
                .get(i)
                .map(|(name, _)| name.clone())
                .unwrap_or_default(),
        }
    }

    /// Elements carry no text content, so only attributes have a
    /// non-empty string value.
    fn string_value(&mut self, item: Item) -> String {
        match item {
            Item::Attr(h, i) => self
                .attributes(h)
                .get(i)
                .map(|(_, value)| value.clone())
                .unwrap_or_default(),
            Item::Root | Item::Node(_) => String::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Conversions
    // -----------------------------------------------------------------------

    fn boolean(&self, value: &XValue) -> bool {
        match value {
            XValue::Nodes(items) => !items.is_empty(),
            XValue::Bool(b) => *b,
            XValue::Num(n) => *n != 0.0 && !n.is_nan(),
            XValue::Str(s) => !s.is_empty(),
        }
    }

    fn number(&mut self, value: &XValue) -> f64 {
        match value {
            XValue::Num(n) => *n,
            XValue::Bool(b) => f64::from(u8::from(*b)),
            XValue::Str(s) => parse_number(s),
            XValue::Nodes(_) => parse_number(&self.string(value)),
        }
    }

    fn string(&mut self, value: &XValue) -> String {
        match value {
            XValue::Str(s) => s.clone(),
            XValue::Bool(b) => b.to_string(),
            XValue::Num(n) => format_number(*n),
            XValue::Nodes(items) => match items.first() {
                Some(first) => self.string_value(*first),
                None => String::new(),
            },
        }
    }

    fn compare(&mut self, op: CmpOp, l: &XValue, r: &XValue) -> bool {
        match (l, r) {
            (XValue::Nodes(a), XValue::Nodes(b)) => {
                let left: Vec<String> = a.iter().map(|i| self.string_value(*i)).collect();
                let right: Vec<String> = b.iter().map(|i| self.string_value(*i)).collect();
                left.iter().any(|x| {
                    right
                        .iter()
                        .any(|y| compare_atoms(op, &XValue::Str(x.clone()), &XValue::Str(y.clone())))
                })
            }
            (XValue::Nodes(a), XValue::Bool(_)) => {
                compare_atoms(op, &XValue::Bool(!a.is_empty()), r)
            }
            (XValue::Bool(_), XValue::Nodes(b)) => {
                compare_atoms(op, l, &XValue::Bool(!b.is_empty()))
            }
            (XValue::Nodes(a), _) => a.clone().into_iter().any(|i| {
                let s = XValue::Str(self.string_value(i));
                compare_atoms(op, &s, r)
            }),
            (_, XValue::Nodes(b)) => b.clone().into_iter().any(|i| {
                let s = XValue::Str(self.string_value(i));
                compare_atoms(op, l, &s)
            }),
            _ => compare_atoms(op, l, r),
        }
    }

    // -----------------------------------------------------------------------
    // Functions
    // -----------------------------------------------------------------------

    fn call(&mut self, function: Function, args: &[Expr], ctx: Ctx) -> Result<XValue, EvalError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, ctx)?);
        }
        // Zero-argument forms default to the context item.
        let first = match values.first() {
            Some(v) => v.clone(),
            None => XValue::Nodes(vec![ctx.item]),
        };

        Ok(match function {
            Function::Count => match &first {
                XValue::Nodes(items) => XValue::Num(items.len() as f64),
                other => return Err(type_error("count", other)),
            },
            Function::Position => XValue::Num(ctx.position as f64),
            Function::Last => XValue::Num(ctx.size as f64),
            Function::Name | Function::LocalName => match &first {
                XValue::Nodes(items) => {
                    XValue::Str(items.first().map(|i| self.name(*i)).unwrap_or_default())
                }
                other => return Err(type_error("name", other)),
            },
            Function::String => XValue::Str(self.string(&first)),
            Function::Concat => {
                let mut out = String::new();
                for v in &values {
                    out.push_str(&self.string(v));
                }
                XValue::Str(out)
            }
            Function::Contains => {
                let (a, b) = self.two_strings(&values);
                XValue::Bool(a.contains(&b))
            }
            Function::StartsWith => {
                let (a, b) = self.two_strings(&values);
                XValue::Bool(a.starts_with(&b))
            }
            Function::SubstringBefore => {
                let (a, b) = self.two_strings(&values);
                XValue::Str(a.find(&b).map(|i| a[..i].to_string()).unwrap_or_default())
            }
            Function::SubstringAfter => {
                let (a, b) = self.two_strings(&values);
                XValue::Str(a.find(&b).map(|i| a[i + b.len()..].to_string()).unwrap_or_default())
            }
            Function::StringLength => XValue::Num(self.string(&first).chars().count() as f64),
            Function::NormalizeSpace => XValue::Str(
                self.string(&first)
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Function::Boolean => XValue::Bool(self.boolean(&first)),
            Function::Not => XValue::Bool(!self.boolean(&first)),
            Function::True => XValue::Bool(true),
            Function::False => XValue::Bool(false),
            Function::Number => XValue::Num(self.number(&first)),
            Function::Sum => match &first {
                XValue::Nodes(items) => {
                    let mut total = 0.0;
                    for item in items {
                        total += parse_number(&self.string_value(*item));
                    }
                    XValue::Num(total)
                }
                other => return Err(type_error("sum", other)),
            },
            Function::Floor => XValue::Num(self.number(&first).floor()),
            Function::Ceiling => XValue::Num(self.number(&first).ceil()),
            Function::Round => {
                let n = self.number(&first);
                XValue::Num(if n.is_finite() { (n + 0.5).floor() } else { n })
            }
        })
    }

    fn two_strings(&mut self, values: &[XValue]) -> (String, String) {
        let a = values.first().map(|v| self.string(v)).unwrap_or_default();
        let b = values.get(1).map(|v| self.string(v)).unwrap_or_default();
        (a, b)
    }
}

fn type_error(function: &str, value: &XValue) -> EvalError {
    EvalError::new(format!(
        "XPath error: Invalid type in {function}(), expected node-set (is: {})",
        value.kind()
    ))
}

fn compare_atoms(op: CmpOp, l: &XValue, r: &XValue) -> bool {
    let as_bool = |v: &XValue| match v {
        XValue::Bool(b) => *b,
        XValue::Num(n) => *n != 0.0 && !n.is_nan(),
        XValue::Str(s) => !s.is_empty(),
        XValue::Nodes(items) => !items.is_empty(),
    };
    let as_num = |v: &XValue| match v {
        XValue::Num(n) => *n,
        XValue::Bool(b) => f64::from(u8::from(*b)),
        XValue::Str(s) => parse_number(s),
        XValue::Nodes(_) => f64::NAN,
    };
    let as_str = |v: &XValue| match v {
        XValue::Str(s) => s.clone(),
        XValue::Num(n) => format_number(*n),
        XValue::Bool(b) => b.to_string(),
        XValue::Nodes(_) => String::new(),
    };

    match op {
        CmpOp::Eq | CmpOp::Neq => {
            let equal = if matches!(l, XValue::Bool(_)) || matches!(r, XValue::Bool(_)) {
                as_bool(l) == as_bool(r)
            } else if matches!(l, XValue::Num(_)) || matches!(r, XValue::Num(_)) {
                as_num(l) == as_num(r)
            } else {
                as_str(l) == as_str(r)
            };
            equal == (op == CmpOp::Eq)
        }
        _ => {
            let ord = as_num(l).partial_cmp(&as_num(r));
            match op {
                CmpOp::Lt => ord == Some(Ordering::Less),
                CmpOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                CmpOp::Gt => ord == Some(Ordering::Greater),
                _ => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
            }
        }
    }
}

/// XPath `number()` on a string: optional minus, digits, optional fraction.
pub fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    let digits = t.strip_prefix('-').unwrap_or(t);
    let valid = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|&c| c == '.').count() <= 1
        && digits != ".";
    if valid {
        t.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// XPath `string()` on a number.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}
