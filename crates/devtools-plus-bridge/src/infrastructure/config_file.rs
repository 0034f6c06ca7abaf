//! Optional TOML configuration file.
//!
//! ```toml
//! [bridge]
//! port = 8229
//! bind = "127.0.0.1"
//! backend = "http://127.0.0.1:9229"
//! favicon = "/usr/share/devtools-plus/icon.png"
//! max_tracked_requests = 1000
//! log_level = "info"
//! ```
//!
//! Every key is optional.  Values given on the command line or through
//! `DEVTOOLS_PLUS_*` variables win over the file; the file wins over the
//! built-in defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub bridge: FileSection,
}

/// The `[bridge]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSection {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub backend: Option<String>,
    pub favicon: Option<PathBuf>,
    pub max_tracked_requests: Option<usize>,
    pub log_level: Option<String>,
}

/// Parses TOML text.
pub fn parse_config(text: &str) -> Result<ConfigFile, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Reads and parses the file at `path`.
pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}
