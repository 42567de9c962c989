//! Multi-source config loading.
//!
//! Priority, highest first: `UAST_ENDPOINT` (endpoint only), the explicit
//! path, `$UAST_CONFIG`, the platform config directory, built-in defaults.

use std::path::{Path, PathBuf};

use crate::config::schema::ClientConfig;
use crate::error::{Result, UastError};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "UAST_CONFIG";
/// Environment variable overriding the endpoint specification.
pub const ENDPOINT_ENV: &str = "UAST_ENDPOINT";

const CONFIG_FILE_NAME: &str = "config.yml";

/// Read and parse one YAML config file.
pub fn read_config_file(path: &Path) -> Result<ClientConfig> {
    let data = std::fs::read_to_string(path).map_err(|source| UastError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ClientConfig = serde_yaml::from_str(&data)?;
    Ok(config)
}

/// Platform default config file location (e.g. `~/.config/uast-client/config.yml`).
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "uast-client")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Load the effective configuration.
///
/// An explicit `path` must exist; the env and platform locations are only
/// used when present.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let mut config = match path {
        Some(p) => read_config_file(p)?,
        None => match env_path.or_else(default_config_path) {
            Some(p) if p.is_file() => read_config_file(&p)?,
            _ => ClientConfig::default(),
        },
    };

    if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
        if !endpoint.trim().is_empty() {
            tracing::debug!(%endpoint, "endpoint overridden from environment");
            config.endpoint = endpoint;
        }
    }
    Ok(config)
}
