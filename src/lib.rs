//! uast-client: a client for language-parsing backends that turn source
//! files into Universal Abstract Syntax Trees.
//!
//! Routes parse requests to per-language backends over newline-delimited
//! JSON-RPC, negotiates the protocol generation each backend speaks, and
//! runs XPath queries and ordered traversals over the returned trees.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod observability;
pub mod query;
pub mod types;

pub use client::{Client, Router};
pub use error::{Result, UastError};
pub use query::{QueryEngine, TreeIterator, TreeOrder};
pub use types::{Node, ParseResponse, Position, Role};
