//! Request builders: drafts that collect their parameters and are sent
//! through a [`Client`].

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::client::protocol::{Backend, ParseCall};
use crate::client::Client;
use crate::error::{Result, UastError};
use crate::types::{Encoding, Manifest, Mode, ParseResponse, Version};

// ---------------------------------------------------------------------------
// ParseRequest
// ---------------------------------------------------------------------------

/// A parse request under construction.
///
/// Builder methods consume and return the draft. A failure while building
/// (see [`ParseRequest::read_file`]) is remembered and returned by `send`
/// without contacting any backend.
#[must_use = "a parse request does nothing until it is sent"]
#[derive(Debug)]
pub struct ParseRequest {
    client: Client,
    call: ParseCall,
    deferred: Option<UastError>,
}

impl ParseRequest {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            call: ParseCall {
                language: String::new(),
                content: String::new(),
                filename: String::new(),
                encoding: Encoding::default(),
                mode: Mode::default(),
            },
            deferred: None,
        }
    }

    /// Language of the content; also selects the backend.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.call.language = language.into();
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.call.content = content.into();
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.call.filename = filename.into();
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.call.encoding = encoding;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.call.mode = mode;
        self
    }

    /// Raw source bytes. Valid UTF-8 is sent as text; anything else is sent
    /// base64-encoded with [`Encoding::Base64`].
    pub fn bytes(mut self, data: impl Into<Vec<u8>>) -> Self {
        match String::from_utf8(data.into()) {
            Ok(text) => {
                self.call.content = text;
                self.call.encoding = Encoding::Utf8;
            }
            Err(e) => {
                self.call.content = BASE64.encode(e.as_bytes());
                self.call.encoding = Encoding::Base64;
            }
        }
        self
    }

    /// Load content from `path` now, as with [`ParseRequest::bytes`].
    ///
    /// The filename becomes the path's base name unless one was already set.
    /// A read failure is stored and surfaces from `send`.
    pub fn read_file(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read(path) {
            Ok(data) => {
                let mut req = self.bytes(data);
                if req.call.filename.is_empty() {
                    if let Some(name) = path.file_name() {
                        req.call.filename = name.to_string_lossy().into_owned();
                    }
                }
                req
            }
            Err(source) => Self {
                deferred: Some(UastError::ReadFile {
                    path: path.to_path_buf(),
                    source,
                }),
                ..self
            },
        }
    }

    pub fn get_encoding(&self) -> Encoding {
        self.call.encoding
    }

    pub fn get_language(&self) -> &str {
        &self.call.language
    }

    pub fn get_filename(&self) -> &str {
        &self.call.filename
    }

    pub fn get_content(&self) -> &str {
        &self.call.content
    }

    /// Send with the client's default request timeout, if any.
    pub async fn send(self) -> Result<ParseResponse> {
        let timeout = self.client.options().request_timeout;
        self.dispatch(timeout).await
    }

    /// Send with an explicit deadline covering connection setup and the call.
    pub async fn send_timeout(self, timeout: Duration) -> Result<ParseResponse> {
        self.dispatch(Some(timeout)).await
    }

    async fn dispatch(self, timeout: Option<Duration>) -> Result<ParseResponse> {
        if let Some(err) = self.deferred {
            return Err(err);
        }
        let Self { client, call, .. } = self;
        tracing::debug!(
            language = %call.language,
            filename = %call.filename,
            bytes = call.content.len(),
            "sending parse request"
        );
        with_deadline("parse", timeout, async {
            let backend = client.pool().get(&call.language).await?;
            backend.parse(&call).await
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Metadata requests
// ---------------------------------------------------------------------------

/// Server version request.
///
/// A client with more than one endpoint has no single host; such clients
/// must name the language whose backend should answer.
#[must_use = "a version request does nothing until it is sent"]
#[derive(Debug)]
pub struct VersionRequest {
    client: Client,
    language: Option<String>,
}

impl VersionRequest {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            language: None,
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub async fn send(self) -> Result<Version> {
        let timeout = self.client.options().request_timeout;
        with_deadline("version", timeout, async {
            let backend = meta_backend(&self.client, self.language.as_deref()).await?;
            backend.server_version().await
        })
        .await
    }
}

/// Supported languages request. Same routing rules as [`VersionRequest`].
#[must_use = "a supported languages request does nothing until it is sent"]
#[derive(Debug)]
pub struct SupportedLanguagesRequest {
    client: Client,
    language: Option<String>,
}

impl SupportedLanguagesRequest {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            language: None,
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub async fn send(self) -> Result<Vec<Manifest>> {
        let timeout = self.client.options().request_timeout;
        with_deadline("supported_languages", timeout, async {
            let backend = meta_backend(&self.client, self.language.as_deref()).await?;
            backend.supported_languages().await
        })
        .await
    }
}

async fn meta_backend(client: &Client, language: Option<&str>) -> Result<std::sync::Arc<Backend>> {
    match (language, client.pool().spec().single_address()) {
        (Some(language), _) => client.pool().get(language).await,
        (None, Some(address)) => client.pool().get_address(address).await,
        (None, None) => Err(UastError::NotImplemented(
            "metadata calls on a multi-endpoint client need a language",
        )),
    }
}

async fn with_deadline<T>(
    operation: &str,
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| UastError::Timeout {
                operation: operation.to_string(),
                millis: limit.as_millis() as u64,
            })?,
    }
}
