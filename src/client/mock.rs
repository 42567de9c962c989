//! In-process fake backend for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::transport::{Channel, Dialer};
use crate::client::wire::method;
use crate::config::ClientOptions;
use crate::error::{Result, UastError};
use crate::types::{Node, Position, Role};

#[derive(Default)]
struct MockState {
    without_v2_host: bool,
    transport_error: AtomicBool,
    calls: Mutex<Vec<String>>,
}

/// Scripted backend. Every channel it hands out shares one call log.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<MockState>,
}

impl MockBackend {
    /// Backend implementing the full v2 protocol plus v1.
    pub fn v2() -> Self {
        Self::default()
    }

    /// Backend that answers v2 Parse but not the v2 host service.
    pub fn without_v2_host() -> Self {
        Self {
            state: Arc::new(MockState {
                without_v2_host: true,
                ..Default::default()
            }),
        }
    }

    /// Every subsequent call fails with a connection error.
    pub fn fail_with_transport_error(&self) {
        self.state.transport_error.store(true, Ordering::SeqCst);
    }

    pub fn channel(&self, address: &str) -> Arc<dyn Channel> {
        Arc::new(MockChannel {
            address: address.to_string(),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.state
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

struct MockChannel {
    address: String,
    state: Arc<MockState>,
    closed: AtomicBool,
}

#[async_trait]
impl Channel for MockChannel {
    fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(UastError::Closed {
                address: self.address.clone(),
            });
        }
        if self.state.transport_error.load(Ordering::SeqCst) {
            return Err(UastError::connection(&self.address, "connection reset"));
        }
        self.state
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(method.to_string());
        respond(self.state.without_v2_host, method, &params)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Turn `content` into a `File` node with one `Word` child per
/// whitespace-separated token. Content containing `!!` fails to parse;
/// content containing `??` parses with an error attached.
pub fn fake_tree(content: &str) -> Option<Node> {
    if content.contains("!!") {
        return None;
    }
    let mut offset = 0u32;
    let mut words = Vec::new();
    for word in content.split(' ') {
        let start = offset;
        offset += word.len() as u32 + 1;
        if word.is_empty() {
            continue;
        }
        let end = start + word.len() as u32;
        words.push(
            Node::new("Word")
                .with_token(word)
                .with_role(Role::Identifier)
                .with_span(Position::new(start, 1, start + 1), Position::new(end, 1, end + 1)),
        );
    }
    Some(Node::new("File").with_role(Role::File).with_children(words))
}

fn respond(without_v2_host: bool, name: &str, params: &Value) -> Result<Value> {
    let content = params["content"].as_str().unwrap_or_default();
    match name {
        method::V2_PARSE => Ok(match fake_tree(content) {
            Some(tree) if content.contains("??") => json!({
                "uast": tree,
                "errors": [{ "message": "unexpected token '??'" }]
            }),
            Some(tree) => json!({ "uast": tree, "errors": [] }),
            None => json!({ "errors": [{ "message": "syntax error" }] }),
        }),
        method::V2_SERVER_VERSION | method::V2_SUPPORTED_LANGUAGES if without_v2_host => {
            Err(UastError::Unimplemented {
                method: name.to_string(),
            })
        }
        method::V2_SERVER_VERSION => Ok(json!({ "version": "v2.16.1", "build": "2024-01-01" })),
        method::V2_SUPPORTED_LANGUAGES => Ok(json!({
            "languages": [
                { "name": "Python", "language": "python", "version": "v2.9.0",
                  "status": "beta", "features": ["ast", "uast", "roles"] }
            ]
        })),
        method::V1_PARSE => Ok(match fake_tree(content) {
            Some(tree) if content.contains("??") => json!({
                "status": "error",
                "errors": ["unexpected token '??'"],
                "uast": tree
            }),
            Some(tree) => json!({ "status": "ok", "errors": [], "uast": tree }),
            None => json!({ "status": "fatal", "errors": ["syntax error"] }),
        }),
        method::V1_VERSION => Ok(json!({ "status": "ok", "version": "v1.0.0-legacy", "build": "" })),
        method::V1_SUPPORTED_LANGUAGES => Ok(json!({
            "status": "ok",
            "languages": [
                { "name": "Python", "language": "python", "version": "v1.2.0",
                  "status": "Beta", "features": ["AST", "UAST"] }
            ]
        })),
        other => Err(UastError::Unimplemented {
            method: other.to_string(),
        }),
    }
}

/// Dialer over a [`MockBackend`] that counts dials.
#[derive(Clone)]
pub struct MockDialer {
    backend: MockBackend,
    dials: Arc<AtomicUsize>,
    delay: Duration,
    refuse: Arc<AtomicBool>,
}

impl MockDialer {
    pub fn new(backend: MockBackend) -> Self {
        Self {
            backend,
            dials: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            refuse: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Hold every dial open for `delay` so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(&self, address: &str, _options: &ClientOptions) -> Result<Arc<dyn Channel>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(UastError::connection(address, "connection refused"));
        }
        Ok(self.backend.channel(address))
    }
}
