//! Recursive-descent parser for the XPath subset.

use crate::query::evaluator::EvalError;
use crate::query::native::lexer::{tokenize, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Self::Child,
            "descendant" => Self::Descendant,
            "descendant-or-self" => Self::DescendantOrSelf,
            "self" => Self::SelfAxis,
            "parent" => Self::Parent,
            "ancestor" => Self::Ancestor,
            "ancestor-or-self" => Self::AncestorOrSelf,
            "following-sibling" => Self::FollowingSibling,
            "preceding-sibling" => Self::PrecedingSibling,
            "attribute" => Self::Attribute,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// `*`: any node of the axis' principal type.
    Wildcard,
    Name(String),
    /// `node()`
    AnyNode,
    /// `text()`; trees carry no text nodes.
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathStart {
    /// Absolute path, starting at the document.
    Root,
    /// Relative path, starting at the context item.
    Context,
    /// Filter expression: a primary with its own predicates.
    Filter(Box<Expr>, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Literal(String),
    Number(f64),
    Call(Function, Vec<Expr>),
    Path(PathStart, Vec<Step>),
}

macro_rules! functions {
    ($($variant:ident = $name:literal, $min:literal..=$max:expr;)*) => {
        /// Core function library.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Function {
            $($variant,)*
        }

        impl Function {
            fn lookup(name: &str) -> Option<(Self, usize, usize)> {
                match name {
                    $($name => Some((Self::$variant, $min, $max)),)*
                    _ => None,
                }
            }
        }
    };
}

functions! {
    Count = "count", 1..=1;
    Position = "position", 0..=0;
    Last = "last", 0..=0;
    Name = "name", 0..=1;
    LocalName = "local-name", 0..=1;
    String = "string", 0..=1;
    Concat = "concat", 2..=usize::MAX;
    Contains = "contains", 2..=2;
    StartsWith = "starts-with", 2..=2;
    SubstringBefore = "substring-before", 2..=2;
    SubstringAfter = "substring-after", 2..=2;
    StringLength = "string-length", 0..=1;
    NormalizeSpace = "normalize-space", 0..=1;
    Boolean = "boolean", 1..=1;
    Not = "not", 1..=1;
    True = "true", 0..=0;
    False = "false", 0..=0;
    Number = "number", 0..=1;
    Sum = "sum", 1..=1;
    Floor = "floor", 1..=1;
    Ceiling = "ceiling", 1..=1;
    Round = "round", 1..=1;
}

/// Deepest allowed nesting of sub-expressions and operator chains.
pub const MAX_DEPTH: usize = 256;

/// Parse a query expression.
pub fn parse(input: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(EvalError::invalid("empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or_expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(EvalError::invalid(format!("unexpected token {tok}"))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open sub-expressions plus binary operators on the current chain.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(n)) if n == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), EvalError> {
        if self.eat(expected) {
            return Ok(());
        }
        Err(match self.peek() {
            Some(tok) => EvalError::invalid(format!("expected {expected}, found {tok}")),
            None => EvalError::invalid(format!("expected {expected} at end of expression")),
        })
    }

    fn enter(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::invalid("expression nested too deeply"));
        }
        Ok(())
    }

    fn or_expr(&mut self) -> Result<Expr, EvalError> {
        let outer = self.depth;
        self.enter()?;
        let mut lhs = self.and_expr()?;
        while self.eat_keyword("or") {
            self.enter()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and_expr()?));
        }
        self.depth = outer;
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, EvalError> {
        let outer = self.depth;
        let mut lhs = self.equality_expr()?;
        while self.eat_keyword("and") {
            self.enter()?;
            lhs = Expr::And(Box::new(lhs), Box::new(self.equality_expr()?));
        }
        self.depth = outer;
        Ok(lhs)
    }

    fn equality_expr(&mut self) -> Result<Expr, EvalError> {
        let outer = self.depth;
        let mut lhs = self.relational_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CmpOp::Eq,
                Some(Token::Neq) => CmpOp::Neq,
                _ => {
                    self.depth = outer;
                    return Ok(lhs);
                }
            };
            self.pos += 1;
            self.enter()?;
            lhs = Expr::Compare(op, Box::new(lhs), Box::new(self.relational_expr()?));
        }
    }

    fn relational_expr(&mut self) -> Result<Expr, EvalError> {
        let outer = self.depth;
        let mut lhs = self.additive_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::Le) => CmpOp::Le,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::Ge) => CmpOp::Ge,
                _ => {
                    self.depth = outer;
                    return Ok(lhs);
                }
            };
            self.pos += 1;
            self.enter()?;
            lhs = Expr::Compare(op, Box::new(lhs), Box::new(self.additive_expr()?));
        }
    }

    fn additive_expr(&mut self) -> Result<Expr, EvalError> {
        let outer = self.depth;
        let mut lhs = self.multiplicative_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => {
                    self.depth = outer;
                    return Ok(lhs);
                }
            };
            self.pos += 1;
            self.enter()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(self.multiplicative_expr()?));
        }
    }

    fn multiplicative_expr(&mut self) -> Result<Expr, EvalError> {
        let outer = self.depth;
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Name(n)) if n == "div" => ArithOp::Div,
                Some(Token::Name(n)) if n == "mod" => ArithOp::Mod,
                _ => {
                    self.depth = outer;
                    return Ok(lhs);
                }
            };
            self.pos += 1;
            self.enter()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(self.unary_expr()?));
        }
    }

    fn unary_expr(&mut self) -> Result<Expr, EvalError> {
        let outer = self.depth;
        while self.eat(&Token::Minus) {
            self.enter()?;
        }
        let mut expr = self.union_expr()?;
        for _ in outer..self.depth {
            expr = Expr::Neg(Box::new(expr));
        }
        self.depth = outer;
        Ok(expr)
    }

    fn union_expr(&mut self) -> Result<Expr, EvalError> {
        let outer = self.depth;
        let mut lhs = self.path_expr()?;
        while self.eat(&Token::Pipe) {
            self.enter()?;
            lhs = Expr::Union(Box::new(lhs), Box::new(self.path_expr()?));
        }
        self.depth = outer;
        Ok(lhs)
    }

    fn path_expr(&mut self) -> Result<Expr, EvalError> {
        if self.starts_primary() {
            let primary = self.primary_expr()?;
            let predicates = self.predicates()?;
            let mut steps = Vec::new();
            if matches!(self.peek(), Some(Token::Slash | Token::DoubleSlash)) {
                self.relative_steps(&mut steps)?;
            }
            if predicates.is_empty() && steps.is_empty() {
                return Ok(primary);
            }
            return Ok(Expr::Path(PathStart::Filter(Box::new(primary), predicates), steps));
        }

        let mut steps = Vec::new();
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if self.starts_step() {
                    self.location_steps(&mut steps)?;
                }
                Ok(Expr::Path(PathStart::Root, steps))
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                steps.push(descendant_or_self());
                self.location_steps(&mut steps)?;
                Ok(Expr::Path(PathStart::Root, steps))
            }
            _ => {
                self.location_steps(&mut steps)?;
                Ok(Expr::Path(PathStart::Context, steps))
            }
        }
    }

    /// Steps following a filter expression: `/step...` or `//step...`.
    fn relative_steps(&mut self, steps: &mut Vec<Step>) -> Result<(), EvalError> {
        match self.advance() {
            Some(Token::Slash) => {}
            Some(Token::DoubleSlash) => steps.push(descendant_or_self()),
            _ => return Err(EvalError::invalid("expected '/' or '//'")),
        }
        self.location_steps(steps)
    }

    /// `step (('/' | '//') step)*`
    fn location_steps(&mut self, steps: &mut Vec<Step>) -> Result<(), EvalError> {
        steps.push(self.step()?);
        loop {
            match self.peek() {
                Some(Token::Slash) => self.pos += 1,
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(descendant_or_self());
                }
                _ => return Ok(()),
            }
            steps.push(self.step()?);
        }
    }

    fn step(&mut self) -> Result<Step, EvalError> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::ColonColon)) =
            (self.peek(), self.peek_at(1))
        {
            let axis = Axis::from_name(name)
                .ok_or_else(|| EvalError::invalid(format!("unknown axis {name}")))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = match self.advance() {
            Some(Token::Star) => NodeTest::Wildcard,
            Some(Token::Name(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    let test = match name.as_str() {
                        "node" => NodeTest::AnyNode,
                        "text" => NodeTest::Text,
                        other => {
                            return Err(EvalError::invalid(format!(
                                "unsupported node test {other}()"
                            )))
                        }
                    };
                    self.pos += 1;
                    self.expect(&Token::RParen)?;
                    test
                } else {
                    NodeTest::Name(name)
                }
            }
            Some(tok) => return Err(EvalError::invalid(format!("unexpected token {tok}"))),
            None => return Err(EvalError::invalid("unexpected end of expression")),
        };

        Ok(Step {
            axis,
            test,
            predicates: self.predicates()?,
        })
    }

    fn predicates(&mut self) -> Result<Vec<Expr>, EvalError> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.or_expr()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(predicates)
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Name(_) | Token::Star | Token::At | Token::Dot | Token::DotDot)
        )
    }

    fn starts_primary(&self) -> bool {
        match self.peek() {
            Some(Token::Literal(_) | Token::Number(_) | Token::LParen) => true,
            Some(Token::Name(name)) => {
                self.peek_at(1) == Some(&Token::LParen) && !matches!(name.as_str(), "node" | "text")
            }
            _ => false,
        }
    }

    fn primary_expr(&mut self) -> Result<Expr, EvalError> {
        match self.advance() {
            Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name(name)) => {
                let (function, min, max) = Function::lookup(&name)
                    .ok_or_else(|| EvalError::invalid(format!("unknown function {name}()")))?;
                self.expect(&Token::LParen)?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.or_expr()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                if args.len() < min || args.len() > max {
                    return Err(EvalError::invalid(format!(
                        "wrong number of arguments to {name}(): {}",
                        args.len()
                    )));
                }
                Ok(Expr::Call(function, args))
            }
            _ => Err(EvalError::invalid("expected a primary expression")),
        }
    }
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::AnyNode,
        predicates: Vec::new(),
    }
}
