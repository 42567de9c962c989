//! Protocol negotiation: decide once per connection which protocol generation
//! the backend speaks and expose one uniform driver interface over it.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::transport::Channel;
use crate::client::wire::{self, method};
use crate::config::ProtocolPreference;
use crate::error::{Result, UastError};
use crate::types::{
    DevelopmentStatus, Feature, Manifest, ParseError, ParseResponse, Status, Version,
};

/// Which protocol generation a connection is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolAdapter {
    /// Parse and metadata calls all use the v2 protocol.
    NativeV2,
    /// Everything goes through the legacy v1 service.
    LegacyV1,
    /// v2 Parse, v1 ServerVersion / SupportedLanguages on the same connection.
    HybridV2ParseV1Meta,
}

impl ProtocolAdapter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NativeV2 => "v2",
            Self::LegacyV1 => "v1",
            Self::HybridV2ParseV1Meta => "v2-parse/v1-meta",
        }
    }

    fn parses_with_v2(&self) -> bool {
        !matches!(self, Self::LegacyV1)
    }

    fn meta_with_v2(&self) -> bool {
        matches!(self, Self::NativeV2)
    }
}

impl std::fmt::Display for ProtocolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe `channel` and pick its adapter.
///
/// Only an "unimplemented" answer to the v2 probe degrades to the hybrid
/// adapter; any other failure is returned to the caller.
pub async fn negotiate(
    channel: &dyn Channel,
    preference: ProtocolPreference,
) -> Result<ProtocolAdapter> {
    let adapter = match preference {
        ProtocolPreference::V1 => ProtocolAdapter::LegacyV1,
        ProtocolPreference::V2 => ProtocolAdapter::NativeV2,
        ProtocolPreference::Auto => {
            match channel
                .call(method::V2_SERVER_VERSION, serde_json::json!({}))
                .await
            {
                Ok(_) => ProtocolAdapter::NativeV2,
                Err(e) if e.is_unimplemented() => {
                    tracing::info!(
                        address = channel.address(),
                        "backend lacks the v2 host service, using v1 for metadata"
                    );
                    ProtocolAdapter::HybridV2ParseV1Meta
                }
                Err(e) => return Err(e),
            }
        }
    };
    tracing::debug!(address = channel.address(), protocol = %adapter, "protocol negotiated");
    Ok(adapter)
}

/// A negotiated backend connection: the channel plus its fixed adapter.
pub struct Backend {
    channel: Arc<dyn Channel>,
    adapter: ProtocolAdapter,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("address", &self.channel.address())
            .field("adapter", &self.adapter)
            .finish()
    }
}

/// Parse parameters independent of the protocol generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseCall {
    pub language: String,
    pub content: String,
    pub filename: String,
    pub encoding: crate::types::Encoding,
    pub mode: crate::types::Mode,
}

impl Backend {
    pub fn new(channel: Arc<dyn Channel>, adapter: ProtocolAdapter) -> Self {
        Self { channel, adapter }
    }

    /// Negotiate over a freshly dialed channel.
    pub async fn establish(
        channel: Arc<dyn Channel>,
        preference: ProtocolPreference,
    ) -> Result<Self> {
        let adapter = negotiate(channel.as_ref(), preference).await?;
        Ok(Self::new(channel, adapter))
    }

    pub fn adapter(&self) -> ProtocolAdapter {
        self.adapter
    }

    pub fn address(&self) -> &str {
        self.channel.address()
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    pub async fn close(&self) -> Result<()> {
        self.channel.close().await
    }

    /// Parse one file. Backend-reported failures land in the response.
    pub async fn parse(&self, call: &ParseCall) -> Result<ParseResponse> {
        if self.adapter.parses_with_v2() {
            let req = wire::ParseRequestV2 {
                content: call.content.clone(),
                language: call.language.clone(),
                filename: call.filename.clone(),
                encoding: call.encoding,
                mode: call.mode,
            };
            let resp: wire::ParseResponseV2 = self.invoke(method::V2_PARSE, &req).await?;
            let status = Status::from_parts(resp.uast.is_some(), resp.errors.len());
            // A failed parse never carries a tree.
            let uast = if status == Status::Fatal { None } else { resp.uast };
            let language = if resp.language.is_empty() {
                call.language.clone()
            } else {
                resp.language
            };
            Ok(ParseResponse {
                uast,
                errors: resp.errors,
                status,
                language,
                filename: call.filename.clone(),
            })
        } else {
            let req = wire::ParseRequestV1 {
                filename: call.filename.clone(),
                language: call.language.clone(),
                content: call.content.clone(),
                encoding: call.encoding,
            };
            let resp: wire::ParseResponseV1 = self.invoke(method::V1_PARSE, &req).await?;
            let uast = if resp.status == Status::Fatal {
                None
            } else {
                resp.uast
            };
            Ok(ParseResponse {
                uast,
                errors: resp.errors.into_iter().map(ParseError::new).collect(),
                status: resp.status,
                language: call.language.clone(),
                filename: call.filename.clone(),
            })
        }
    }

    /// Version of the server behind this connection.
    pub async fn server_version(&self) -> Result<Version> {
        if self.adapter.meta_with_v2() {
            return self
                .invoke(method::V2_SERVER_VERSION, &serde_json::json!({}))
                .await;
        }
        let resp: wire::VersionResponseV1 = self
            .invoke(method::V1_VERSION, &serde_json::json!({}))
            .await?;
        check_status(resp.status, resp.errors)?;
        Ok(Version {
            version: resp.version,
            build: resp.build,
        })
    }

    /// Language drivers available behind this connection.
    pub async fn supported_languages(&self) -> Result<Vec<Manifest>> {
        if self.adapter.meta_with_v2() {
            let resp: wire::SupportedLanguagesV2 = self
                .invoke(method::V2_SUPPORTED_LANGUAGES, &serde_json::json!({}))
                .await?;
            return Ok(resp.languages);
        }
        let resp: wire::SupportedLanguagesResponseV1 = self
            .invoke(method::V1_SUPPORTED_LANGUAGES, &serde_json::json!({}))
            .await?;
        check_status(resp.status, resp.errors)?;
        Ok(resp
            .languages
            .into_iter()
            .map(|m| Manifest {
                name: m.name,
                language: m.language,
                version: m.version,
                status: DevelopmentStatus::from_str_loose(&m.status),
                features: m.features.iter().map(|f| Feature::from_str_loose(f)).collect(),
            })
            .collect())
    }

    async fn invoke<Req, Resp>(&self, method: &str, req: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let params = serde_json::to_value(req)?;
        let value = self.channel.call(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }
}

fn check_status(status: Status, errors: Vec<String>) -> Result<()> {
    if status == Status::Ok {
        Ok(())
    } else {
        Err(UastError::Status { status, errors })
    }
}
