//! Loading client settings from a TOML file.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use wirefetch_core::{ClientConfig, RequestOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration")]
    Invalid(#[source] wirefetch_core::Error),
}

/// Read and parse a config file. Unknown keys are rejected.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Validate the settings, with `--timeout-ms` taking precedence over the file.
pub fn resolve_options(
    mut config: ClientConfig,
    timeout_ms: Option<u64>,
) -> Result<RequestOptions, ConfigError> {
    if timeout_ms.is_some() {
        config.timeout_ms = timeout_ms;
    }
    config.into_options().map_err(ConfigError::Invalid)
}
