//! Wire format: newline-delimited JSON-RPC 2.0 envelopes and the payloads of
//! both protocol generations.
//!
//! A method the backend does not know is answered with the standard
//! "method not found" error code, which the client reads as "unimplemented".

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Encoding, Manifest, Mode, Node, ParseError, Status, Version};

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC "method not found": the backend does not implement the call.
pub const METHOD_NOT_FOUND: i64 = -32601;

pub mod method {
    pub const V2_PARSE: &str = "protocol.v2.Driver/Parse";
    pub const V2_SERVER_VERSION: &str = "protocol.v2.DriverHost/ServerVersion";
    pub const V2_SUPPORTED_LANGUAGES: &str = "protocol.v2.DriverHost/SupportedLanguages";
    pub const V1_PARSE: &str = "protocol.v1.ProtocolService/Parse";
    pub const V1_VERSION: &str = "protocol.v1.ProtocolService/Version";
    pub const V1_SUPPORTED_LANGUAGES: &str = "protocol.v1.ProtocolService/SupportedLanguages";
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
            }),
        }
    }
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

// ---------------------------------------------------------------------------
// v2 payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseRequestV2 {
    pub content: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default)]
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResponseV2 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uast: Option<Node>,
    #[serde(default)]
    pub errors: Vec<ParseError>,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedLanguagesV2 {
    #[serde(default)]
    pub languages: Vec<Manifest>,
}

pub type VersionV2 = Version;

// ---------------------------------------------------------------------------
// v1 payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseRequestV1 {
    pub filename: String,
    pub language: String,
    pub content: String,
    #[serde(default)]
    pub encoding: Encoding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResponseV1 {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uast: Option<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionResponseV1 {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub build: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverManifestV1 {
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedLanguagesResponseV1 {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub languages: Vec<DriverManifestV1>,
}
