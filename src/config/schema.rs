//! Configuration data structures for the client.
//!
//! Defines the YAML config format: endpoint specification, connection
//! tuning, protocol preference and the static per-language backend map used
//! by the multi-backend router.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for a client or router.
///
/// Loaded from YAML files and environment variables, see
/// [`crate::config::loader::load_config`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Endpoint specification: `ADDRESS`, `lang=addr,lang=addr` or a
    /// template containing `%s`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Upper bound for establishing one backend connection.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Default deadline for a single backend call; unbounded when absent.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,

    /// Enable TCP keep-alive probing on backend connections.
    #[serde(default = "default_keepalive")]
    pub keepalive: bool,

    /// Which protocol generation to speak.
    #[serde(default)]
    pub protocol: ProtocolPreference,

    /// Static language → address map for the multi-backend router.
    #[serde(default)]
    pub backends: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: None,
            keepalive: default_keepalive(),
            protocol: ProtocolPreference::Auto,
            backends: HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// Runtime connection options derived from this config.
    pub fn options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
            keepalive: self.keepalive,
            protocol: self.protocol,
        }
    }
}

// ---------------------------------------------------------------------------
// ProtocolPreference
// ---------------------------------------------------------------------------

/// Protocol generation selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolPreference {
    /// Probe the backend and fall back to legacy metadata calls.
    #[default]
    Auto,
    /// Assume a native v2 backend, skip the probe.
    V2,
    /// Speak only the legacy v1 protocol.
    V1,
}

impl ProtocolPreference {
    /// Parse from a loose string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Some(Self::Auto),
            "v2" | "2" => Some(Self::V2),
            "v1" | "1" | "legacy" => Some(Self::V1),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::V2 => "v2",
            Self::V1 => "v1",
        }
    }
}

impl std::fmt::Display for ProtocolPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ClientOptions
// ---------------------------------------------------------------------------

/// Connection knobs shared by every connection a client opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Option<Duration>,
    pub keepalive: bool,
    pub protocol: ProtocolPreference,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientConfig::default().options()
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default backend address.
pub const DEFAULT_ENDPOINT: &str = "localhost:9432";

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_keepalive() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
