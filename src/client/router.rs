//! Multi-backend router: one [`Client`] per language from a static
//! language → endpoint map, created on first use.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use crate::client::transport::{Dialer, TcpDialer};
use crate::client::{Client, EndpointSpec};
use crate::config::{ClientConfig, ClientOptions};
use crate::error::{Result, UastError};

pub struct Router {
    backends: HashMap<String, String>,
    options: ClientOptions,
    dialer: Arc<dyn Dialer>,
    clients: Mutex<HashMap<String, Arc<OnceCell<Client>>>>,
}

impl Router {
    pub fn new(backends: HashMap<String, String>, options: ClientOptions) -> Self {
        Self::with_dialer(backends, options, Arc::new(TcpDialer))
    }

    pub fn with_dialer(
        backends: HashMap<String, String>,
        options: ClientOptions,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        Self {
            backends,
            options,
            dialer,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.backends.clone(), config.options())
    }

    /// Load the backend map from a YAML file.
    ///
    /// Accepts either a full client config with a `backends` section or a
    /// bare `language: endpoint` mapping. A file using any client config key
    /// is read as a full config and must list its backends.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| UastError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let value: serde_yaml::Value = serde_yaml::from_str(&raw)?;
        let no_backends = || UastError::Config(format!("{}: no backends configured", path.display()));

        if is_client_config(&value) {
            let config: ClientConfig = serde_yaml::from_value(value)?;
            if config.backends.is_empty() {
                return Err(no_backends());
            }
            return Ok(Self::from_config(&config));
        }
        let backends: HashMap<String, String> = match value {
            serde_yaml::Value::Null => HashMap::new(),
            other => serde_yaml::from_value(other).map_err(|e| {
                UastError::Config(format!("{}: invalid backend map ({e})", path.display()))
            })?,
        };
        if backends.is_empty() {
            return Err(no_backends());
        }
        Ok(Self::new(backends, ClientConfig::default().options()))
    }

    /// Languages this router can serve, sorted.
    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        langs.sort_unstable();
        langs
    }

    /// Client for `language`, created and cached on first use.
    pub async fn client(&self, language: &str) -> Result<Client> {
        let Some(endpoint) = self.backends.get(language) else {
            return Err(UastError::MissingBackend {
                language: language.to_string(),
            });
        };
        let cell = {
            let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(clients.entry(language.to_string()).or_default())
        };
        let client = cell
            .get_or_try_init(|| async {
                tracing::debug!(%language, %endpoint, "creating client for language");
                let spec = EndpointSpec::parse(endpoint)?;
                Ok::<_, UastError>(Client::with_dialer(
                    spec,
                    self.options,
                    Arc::clone(&self.dialer),
                ))
            })
            .await?;
        Ok(client.clone())
    }

    /// Close every client created so far. Returns the last failure.
    pub async fn close(&self) -> Result<()> {
        let cells: Vec<_> = {
            let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
            clients.drain().map(|(_, cell)| cell).collect()
        };
        let mut last_error = None;
        for cell in cells {
            if let Some(client) = cell.get() {
                if let Err(e) = client.close().await {
                    last_error = Some(e);
                }
            }
        }
        last_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("backends", &self.backends)
            .field("options", &self.options)
            .finish()
    }
}

const CONFIG_KEYS: &[&str] = &[
    "endpoint",
    "connect_timeout_ms",
    "request_timeout_ms",
    "keepalive",
    "protocol",
    "backends",
];

fn is_client_config(value: &serde_yaml::Value) -> bool {
    value.as_mapping().is_some_and(|map| {
        map.keys()
            .filter_map(serde_yaml::Value::as_str)
            .any(|key| CONFIG_KEYS.contains(&key))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockBackend, MockDialer};
    use pretty_assertions::assert_eq as pa_eq;

    fn router(dialer: &MockDialer) -> Router {
        let backends = HashMap::from([
            ("python".to_string(), "py-driver:9432".to_string()),
            ("go".to_string(), "go-driver:9432".to_string()),
        ]);
        Router::with_dialer(backends, ClientOptions::default(), Arc::new(dialer.clone()))
    }

    #[tokio::test]
    async fn unknown_language_is_unsupported() {
        let dialer = MockDialer::new(MockBackend::v2());
        let err = router(&dialer).client("rust").await.unwrap_err();
        pa_eq!(
            err.to_string(),
            "language \"rust\" is not supported in current configuration"
        );
    }

    #[tokio::test]
    async fn clients_are_cached_per_language() {
        let dialer = MockDialer::new(MockBackend::v2());
        let router = router(&dialer);
        let a = router.client("python").await.unwrap();
        let b = router.client("python").await.unwrap();
        a.backend("python").await.unwrap();
        b.backend("python").await.unwrap();
        pa_eq!(dialer.dials(), 1);

        let resp = router
            .client("go")
            .await
            .unwrap()
            .parse_request()
            .language("go")
            .content("package main")
            .send()
            .await
            .unwrap();
        assert!(resp.is_ok());
        pa_eq!(dialer.dials(), 2);
        router.close().await.unwrap();
    }

    #[test]
    fn from_file_reads_both_layouts() {
        let dir = tempfile::tempdir().unwrap();

        let full = dir.path().join("full.yml");
        std::fs::write(&full, "backends:\n  python: a:1\n  go: b:2\n").unwrap();
        pa_eq!(Router::from_file(&full).unwrap().languages(), vec!["go", "python"]);

        let bare = dir.path().join("bare.yml");
        std::fs::write(&bare, "python: a:1\njava: c:3\n").unwrap();
        pa_eq!(Router::from_file(&bare).unwrap().languages(), vec!["java", "python"]);
    }

    #[test]
    fn full_config_without_backends_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.yml");
        std::fs::write(&path, "endpoint: localhost:9432\nprotocol: v1\n").unwrap();

        match Router::from_file(&path) {
            Err(UastError::Config(msg)) => assert!(msg.contains("no backends configured"), "{msg}"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(router) => panic!("router built with {:?}", router.languages()),
        }
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.yml");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(Router::from_file(&path), Err(UastError::Config(_))));
    }
}
