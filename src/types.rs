//! Core domain types: the UAST node model and the parse/metadata responses
//! returned by backends.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A location in the parsed source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Absolute byte offset, 0-based.
    pub offset: u32,
    /// Line number, 1-based.
    pub line: u32,
    /// Column number, 1-based.
    pub col: u32,
}

impl Position {
    pub fn new(offset: u32, line: u32, col: u32) -> Self {
        Self { offset, line, col }
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

macro_rules! roles {
    ($($name:ident = $code:literal,)*) => {
        /// Language-agnostic semantic role of a node.
        ///
        /// Serialized by name; [`Role::code`] gives the numeric code and
        /// [`Role::name`] the name used for `role<Name>` query attributes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u16)]
        pub enum Role {
            $($name = $code,)*
            /// A role name this client does not recognize.
            #[serde(other)]
            Unknown = u16::MAX,
        }

        impl Role {
            /// All known roles in code order.
            pub const ALL: &'static [Role] = &[$(Role::$name,)*];

            /// Canonical role name.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Role::$name => stringify!($name),)*
                    Role::Unknown => "Unknown",
                }
            }

            /// Look a role up by its numeric code.
            pub fn from_code(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(Role::$name),)*
                    _ => None,
                }
            }
        }
    };
}

roles! {
    Invalid = 0,
    Identifier = 1,
    Qualified = 2,
    Operator = 3,
    Binary = 4,
    Unary = 5,
    Left = 6,
    Right = 7,
    Infix = 8,
    Postfix = 9,
    Bitwise = 10,
    Boolean = 11,
    Unsigned = 12,
    LeftShift = 13,
    RightShift = 14,
    Or = 15,
    Xor = 16,
    And = 17,
    Expression = 18,
    Statement = 19,
    Equal = 20,
    Not = 21,
    LessThan = 22,
    LessThanOrEqual = 23,
    GreaterThan = 24,
    GreaterThanOrEqual = 25,
    Identical = 26,
    Contains = 27,
    Increment = 28,
    Decrement = 29,
    Negative = 30,
    Positive = 31,
    Dereference = 32,
    TakeAddress = 33,
    File = 34,
    Add = 35,
    Substract = 36,
    Multiply = 37,
    Divide = 38,
    Modulo = 39,
    Package = 40,
    Declaration = 41,
    Import = 42,
    Pathname = 43,
    Alias = 44,
    Function = 45,
    Body = 46,
    Name = 47,
    Receiver = 48,
    Argument = 49,
    Value = 50,
    ArgsList = 51,
    Base = 52,
    Implements = 53,
    Instance = 54,
    Subtype = 55,
    Subpackage = 56,
    Module = 57,
    Friend = 58,
    World = 59,
    If = 60,
    Condition = 61,
    Then = 62,
    Else = 63,
    Switch = 64,
    Case = 65,
    Default = 66,
    For = 67,
    Initialization = 68,
    Update = 69,
    Iterator = 70,
    While = 71,
    DoWhile = 72,
    Break = 73,
    Continue = 74,
    Goto = 75,
    Block = 76,
    Scope = 77,
    Return = 78,
    Try = 79,
    Catch = 80,
    Finally = 81,
    Throw = 82,
    Assert = 83,
    Call = 84,
    Callee = 85,
    Positional = 86,
    Noop = 87,
    Literal = 88,
    Byte = 89,
    ByteString = 90,
    Character = 91,
    List = 92,
    Map = 93,
    Null = 94,
    Number = 95,
    Regexp = 96,
    Set = 97,
    String = 98,
    Tuple = 99,
    Type = 100,
    Entry = 101,
    Key = 102,
    Primitive = 103,
    Assignment = 104,
    This = 105,
    Comment = 106,
    Documentation = 107,
    Whitespace = 108,
    Incomplete = 109,
    Unannotated = 110,
    Visibility = 111,
    Annotation = 112,
    Anonymous = 113,
    Enumeration = 114,
    Arithmetic = 115,
    Relational = 116,
    Variable = 117,
}

impl Role {
    /// Numeric role code.
    pub fn code(&self) -> u16 {
        *self as u16
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One node of a UAST.
///
/// A tree exclusively owns its nodes through `children`; there are no parent
/// links and no sharing between trees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Native type of the node in the language's own AST.
    pub internal_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,
    /// Unordered; sort keys for deterministic iteration (see
    /// [`Node::sorted_properties`]).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_position: Option<Position>,
}

impl Node {
    pub fn new(internal_type: impl Into<String>) -> Self {
        Self {
            internal_type: internal_type.into(),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_span(mut self, start: Position, end: Position) -> Self {
        self.start_position = Some(start);
        self.end_position = Some(end);
        self
    }

    /// Whether the node carries the given role.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Properties sorted by key.
    pub fn sorted_properties(&self) -> Vec<(&str, &str)> {
        let mut props: Vec<(&str, &str)> = self
            .properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        props.sort_unstable_by(|a, b| a.0.cmp(b.0));
        props
    }

    /// Number of nodes in the subtree rooted here, including `self`.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Node::size).sum::<usize>()
    }
}

// ---------------------------------------------------------------------------
// Request enums
// ---------------------------------------------------------------------------

/// Text encoding of the content sent to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Utf8,
    Base64,
}

/// Transformation level requested from a v2 backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Let the backend pick (semantic for bblfshd-style servers).
    #[default]
    Default,
    /// Native AST, no annotations.
    Native,
    /// Native AST annotated with roles.
    Annotated,
    /// Normalized, language-agnostic tree.
    Semantic,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Outcome status of a backend call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Ok,
    /// The call produced errors but a (possibly partial) result.
    Error,
    /// The call produced no usable result.
    Fatal,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    /// Derive a status for responses that do not carry one explicitly.
    pub fn from_parts(has_tree: bool, error_count: usize) -> Self {
        match (has_tree, error_count) {
            (_, 0) => Self::Ok,
            (true, _) => Self::Error,
            (false, _) => Self::Fatal,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured error reported by the backend for one parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            Some(kind) => write!(f, "{kind}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Result of a parse call.
///
/// A backend failure is data, not an `Err`: check [`ParseResponse::uast`]
/// independently of the call's own result. Errors together with a tree
/// describe a partial parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uast: Option<Node>,
    #[serde(default)]
    pub errors: Vec<ParseError>,
    pub status: Status,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub filename: String,
}

impl ParseResponse {
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// Backend server version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub version: String,
    #[serde(default)]
    pub build: String,
}

/// Maturity of a language driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DevelopmentStatus {
    Planning,
    PreAlpha,
    Alpha,
    Beta,
    Stable,
    Mature,
    Inactive,
    #[default]
    #[serde(other)]
    Unknown,
}

impl DevelopmentStatus {
    /// Parse the loose spellings used by legacy backends.
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "planning" => Self::Planning,
            "pre-alpha" | "prealpha" => Self::PreAlpha,
            "alpha" => Self::Alpha,
            "beta" => Self::Beta,
            "stable" => Self::Stable,
            "mature" => Self::Mature,
            "inactive" => Self::Inactive,
            _ => Self::Unknown,
        }
    }
}

/// Capability advertised by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Ast,
    Uast,
    Roles,
    #[serde(other)]
    Other,
}

impl Feature {
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "ast" => Self::Ast,
            "uast" => Self::Uast,
            "roles" => Self::Roles,
            _ => Self::Other,
        }
    }
}

/// Description of one supported language driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub status: DevelopmentStatus,
    #[serde(default)]
    pub features: Vec<Feature>,
}
