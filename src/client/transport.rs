//! Backend transport: a multiplexed JSON-RPC channel and the dialer that
//! opens it.
//!
//! One [`RpcChannel`] serves any number of concurrent callers. A writer task
//! drains an outgoing queue onto the socket and a reader task routes each
//! response line to the caller waiting on its request id. A caller that gives
//! up (its future is dropped) removes its own pending slot; the channel stays
//! usable for everybody else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::client::wire::{RpcRequest, RpcResponse, METHOD_NOT_FOUND};
use crate::config::ClientOptions;
use crate::error::{Result, UastError};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An established connection to one backend address.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Address this channel was dialed for.
    fn address(&self) -> &str;

    /// Issue one RPC and wait for its result.
    ///
    /// A method the backend does not implement fails with
    /// [`UastError::Unimplemented`].
    async fn call(&self, method: &str, params: Value) -> Result<Value>;

    /// Whether the channel can no longer carry calls.
    fn is_closed(&self) -> bool;

    /// Terminate the channel. Pending calls fail with [`UastError::Closed`].
    async fn close(&self) -> Result<()>;
}

/// Opens channels to backend addresses.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, address: &str, options: &ClientOptions) -> Result<Arc<dyn Channel>>;
}

// ---------------------------------------------------------------------------
// TcpDialer
// ---------------------------------------------------------------------------

/// Dials backends over TCP with a bounded connect timeout and keep-alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, address: &str, options: &ClientOptions) -> Result<Arc<dyn Channel>> {
        let timeout = options.connect_timeout;
        let stream = tokio::time::timeout(timeout, connect_tcp(address, options.keepalive))
            .await
            .map_err(|_| UastError::Timeout {
                operation: format!("dial {address}"),
                millis: timeout.as_millis() as u64,
            })??;
        stream
            .set_nodelay(true)
            .map_err(|e| UastError::connection(address, e))?;
        tracing::debug!(%address, keepalive = options.keepalive, "backend connection established");
        Ok(RpcChannel::spawn(stream, address))
    }
}

async fn connect_tcp(address: &str, keepalive: bool) -> Result<TcpStream> {
    let addrs = tokio::net::lookup_host(address)
        .await
        .map_err(|e| UastError::connection(address, e))?;

    let mut last_error: Option<std::io::Error> = None;
    for addr in addrs {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|e| UastError::connection(address, e))?;
        socket
            .set_keepalive(keepalive)
            .map_err(|e| UastError::connection(address, e))?;
        match socket.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(match last_error {
        Some(e) => UastError::connection(address, e),
        None => UastError::connection(address, "address resolved to nothing"),
    })
}

// ---------------------------------------------------------------------------
// RpcChannel
// ---------------------------------------------------------------------------

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>;

#[derive(Default)]
struct Shared {
    pending: PendingMap,
    closed: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl Shared {
    /// Mark the channel dead and fail every waiting caller.
    fn shut(&self, failure: Option<String>) {
        if let Some(msg) = failure {
            lock(&self.failure).get_or_insert(msg);
        }
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the senders wakes the receivers with an error.
        lock(&self.pending).clear();
    }

    fn failure(&self) -> Option<String> {
        lock(&self.failure).clone()
    }
}

/// JSON-RPC channel over any byte stream.
pub struct RpcChannel {
    address: String,
    next_id: AtomicU64,
    outgoing: mpsc::UnboundedSender<String>,
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RpcChannel {
    /// Start the reader and writer tasks over `stream`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S>(stream: S, address: impl Into<String>) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let address = address.into();
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let writer = tokio::spawn(write_loop(write_half, rx, shared.clone(), address.clone()));
        let reader = tokio::spawn(read_loop(
            BufReader::new(read_half),
            shared.clone(),
            address.clone(),
        ));

        Arc::new(Self {
            address,
            next_id: AtomicU64::new(1),
            outgoing: tx,
            shared,
            tasks: Mutex::new(vec![writer, reader]),
        })
    }

    fn closed_error(&self) -> UastError {
        match self.shared.failure() {
            Some(message) => UastError::Connection {
                address: self.address.clone(),
                message,
            },
            None => UastError::Closed {
                address: self.address.clone(),
            },
        }
    }

    /// Number of calls currently waiting for a response.
    pub fn in_flight(&self) -> usize {
        lock(&self.shared.pending).len()
    }
}

#[async_trait]
impl Channel for RpcChannel {
    fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&RpcRequest::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        lock(&self.shared.pending).insert(id, tx);
        let _slot = PendingSlot {
            pending: &self.shared.pending,
            id,
        };
        // Re-check after registering: a reader that died in between has
        // already cleared the map and would never answer this id.
        if self.is_closed() || self.outgoing.send(line).is_err() {
            return Err(self.closed_error());
        }
        tracing::trace!(address = %self.address, id, method, "rpc sent");

        let response = rx.await.map_err(|_| self.closed_error())?;
        decode_response(method, response)
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.shared.shut(None);
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        match self.shared.failure() {
            Some(message) => Err(UastError::Connection {
                address: self.address.clone(),
                message,
            }),
            None => Ok(()),
        }
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }
}

/// Removes a pending entry when its caller goes away.
struct PendingSlot<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

fn decode_response(method: &str, response: RpcResponse) -> Result<Value> {
    match response.error {
        Some(err) if err.code == METHOD_NOT_FOUND => Err(UastError::Unimplemented {
            method: method.to_string(),
        }),
        Some(err) => Err(UastError::Rpc {
            code: err.code,
            message: err.message,
        }),
        None => Ok(response.result.unwrap_or(Value::Null)),
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<String>,
    shared: Arc<Shared>,
    address: String,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(%address, error = %e, "backend write failed");
            shared.shut(Some(e.to_string()));
            return;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop<R>(mut reader: BufReader<R>, shared: Arc<Shared>, address: String)
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                tracing::debug!(%address, "backend closed the connection");
                shared.shut(None);
                return;
            }
            Ok(_) => {
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                match serde_json::from_str::<RpcResponse>(text) {
                    Ok(response) => route(&shared, &address, response),
                    Err(e) => tracing::warn!(%address, error = %e, "malformed response line"),
                }
            }
            Err(e) => {
                tracing::warn!(%address, error = %e, "backend read failed");
                shared.shut(Some(e.to_string()));
                return;
            }
        }
    }
}

fn route(shared: &Shared, address: &str, response: RpcResponse) {
    let Some(id) = response.id else {
        tracing::warn!(%address, "response without id dropped");
        return;
    };
    match lock(&shared.pending).remove(&id) {
        Some(tx) => {
            let _ = tx.send(response);
        }
        None => tracing::debug!(%address, id, "response for abandoned call dropped"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
