//! In-process JSON-RPC backend for integration tests.
//!
//! Speaks newline-delimited JSON-RPC over TCP on 127.0.0.1. Parsing splits
//! the content on spaces into `Word` children of a `File` root; content
//! containing `!!` fails, content containing `??` parses with an error
//! and content starting with `slow` answers after [`SLOW_DELAY`].

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use uast_client::client::wire::{method, RpcRequest, RpcResponse, METHOD_NOT_FOUND};
use uast_client::types::{Node, Position, Role};

pub const SLOW_DELAY: Duration = Duration::from_millis(400);

pub struct FakeBackend {
    pub address: String,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeBackend {
    /// Backend hosting both protocol generations.
    pub async fn start() -> Self {
        Self::spawn(false).await
    }

    /// Backend that only answers the v2 parse method and the v1 service.
    pub async fn start_without_v2_host() -> Self {
        Self::spawn(true).await
    }

    async fn spawn(without_v2_host: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, without_v2_host));
            }
        });
        Self {
            address,
            connections,
            task,
        }
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn port(&self) -> u16 {
        self.address
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap()
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(stream: TcpStream, without_v2_host: bool) {
    let (read_half, write_half) = stream.into_split();
    let write_half = Arc::new(tokio::sync::Mutex::new(write_half));
    let mut lines = BufReader::new(read_half).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(request) = serde_json::from_str::<RpcRequest>(&line) else {
            continue;
        };
        let writer = Arc::clone(&write_half);
        tokio::spawn(async move {
            let content = request.params["content"].as_str().unwrap_or_default();
            if content.starts_with("slow") {
                tokio::time::sleep(SLOW_DELAY).await;
            }
            let response = match respond(without_v2_host, &request.method, &request.params) {
                Some(result) => RpcResponse::ok(request.id, result),
                None => RpcResponse::err(
                    request.id,
                    METHOD_NOT_FOUND,
                    format!("unknown method {}", request.method),
                ),
            };
            let mut out = serde_json::to_string(&response).unwrap();
            out.push('\n');
            let _ = writer.lock().await.write_all(out.as_bytes()).await;
        });
    }
}

pub fn words(content: &str) -> Option<Node> {
    if content.contains("!!") {
        return None;
    }
    let mut offset = 0u32;
    let mut children = Vec::new();
    for word in content.split(' ') {
        let start = offset;
        offset += word.len() as u32 + 1;
        if word.is_empty() {
            continue;
        }
        let end = start + word.len() as u32;
        children.push(
            Node::new("Word")
                .with_token(word)
                .with_role(Role::Identifier)
                .with_span(Position::new(start, 1, start + 1), Position::new(end, 1, end + 1)),
        );
    }
    Some(Node::new("File").with_role(Role::File).with_children(children))
}

fn respond(without_v2_host: bool, name: &str, params: &Value) -> Option<Value> {
    let content = params["content"].as_str().unwrap_or_default();
    match name {
        method::V2_PARSE => Some(match words(content) {
            Some(tree) if content.contains("??") => json!({
                "uast": tree,
                "errors": [{ "message": "unexpected token '??'" }]
            }),
            Some(tree) => json!({ "uast": tree, "errors": [] }),
            None => json!({ "errors": [{ "message": "syntax error" }] }),
        }),
        method::V2_SERVER_VERSION | method::V2_SUPPORTED_LANGUAGES if without_v2_host => None,
        method::V2_SERVER_VERSION => Some(json!({ "version": "v2.16.1", "build": "2024-01-01" })),
        method::V2_SUPPORTED_LANGUAGES => Some(json!({
            "languages": [
                { "name": "Python", "language": "python", "version": "v2.9.0",
                  "status": "beta", "features": ["ast", "uast", "roles"] },
                { "name": "Go", "language": "go", "version": "v2.7.0",
                  "status": "stable", "features": ["ast", "uast"] }
            ]
        })),
        method::V1_PARSE => Some(match words(content) {
            Some(tree) if content.contains("??") => json!({
                "status": "error",
                "errors": ["unexpected token '??'"],
                "uast": tree
            }),
            Some(tree) => json!({ "status": "ok", "errors": [], "uast": tree }),
            None => json!({ "status": "fatal", "errors": ["syntax error"] }),
        }),
        method::V1_VERSION => Some(json!({ "status": "ok", "version": "v1.0.0-legacy", "build": "" })),
        method::V1_SUPPORTED_LANGUAGES => Some(json!({
            "status": "ok",
            "languages": [
                { "name": "Python", "language": "python", "version": "v1.2.0",
                  "status": "Beta", "features": ["AST", "UAST"] }
            ]
        })),
        _ => None,
    }
}
