//! Backend client: endpoint resolution, connection caching, protocol
//! negotiation and the request builders.

pub mod endpoint;
#[cfg(test)]
pub(crate) mod mock;
pub mod pool;
pub mod protocol;
pub mod request;
pub mod router;
pub mod transport;
pub mod wire;

use std::sync::Arc;

pub use endpoint::EndpointSpec;
pub use pool::ConnectionPool;
pub use protocol::{Backend, ProtocolAdapter};
pub use request::{ParseRequest, SupportedLanguagesRequest, VersionRequest};
pub use router::Router;
pub use transport::{Channel, Dialer, RpcChannel, TcpDialer};

use crate::config::ClientOptions;
use crate::error::{Result, UastError};

/// Handle to one or more parsing backends.
///
/// Cheap to clone; clones share the connection cache. Connections are opened
/// lazily on first use and reused by every later request for the same
/// address.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ConnectionPool>,
}

impl Client {
    /// Build a client without contacting any backend.
    pub fn new(endpoint: &str, options: ClientOptions) -> Result<Self> {
        let spec = EndpointSpec::parse(endpoint)?;
        Ok(Self::with_dialer(spec, options, Arc::new(TcpDialer)))
    }

    /// Build a client for a single endpoint and establish its connection
    /// right away, so an unreachable backend fails here instead of on the
    /// first request.
    pub async fn connect(endpoint: &str, options: ClientOptions) -> Result<Self> {
        let client = Self::new(endpoint, options)?;
        let Some(address) = client.inner.spec().single_address() else {
            return Err(UastError::Config(format!(
                "eager connect needs a single endpoint, got {endpoint:?}"
            )));
        };
        client.inner.get_address(address).await?;
        Ok(client)
    }

    /// Build a client over a custom transport.
    pub fn with_dialer(spec: EndpointSpec, options: ClientOptions, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            inner: Arc::new(ConnectionPool::new(spec, options, dialer)),
        }
    }

    pub fn endpoint(&self) -> &EndpointSpec {
        self.inner.spec()
    }

    pub fn options(&self) -> &ClientOptions {
        self.inner.options()
    }

    pub fn parse_request(&self) -> ParseRequest {
        ParseRequest::new(self.clone())
    }

    pub fn version_request(&self) -> VersionRequest {
        VersionRequest::new(self.clone())
    }

    pub fn supported_languages_request(&self) -> SupportedLanguagesRequest {
        SupportedLanguagesRequest::new(self.clone())
    }

    /// Negotiated backend for `language`, dialing if needed.
    pub async fn backend(&self, language: &str) -> Result<Arc<Backend>> {
        self.inner.get(language).await
    }

    /// Close every connection. The client stays usable and redials lazily.
    pub async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    pub(crate) fn pool(&self) -> &ConnectionPool {
        &self.inner
    }
}
