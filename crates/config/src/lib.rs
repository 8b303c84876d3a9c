//! Relay configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! The only required setting is the downstream endpoint URL - everything
//! else has a default matching GELF conventions.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use relay_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str(
//!     "[forward]\nendpoint_url = \"https://logs.example.com/ingest\""
//! ).unwrap();
//! config.validate().unwrap();
//! ```
//!
//! # Example Minimal Config
//!
//! ```toml
//! [forward]
//! endpoint_url = "https://logs.example.com/ingest"
//! ```
//!
//! See `configs/example.toml` for all available options.

mod error;
mod forward;
mod metrics;
mod server;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use error::{ConfigError, Result};
pub use forward::ForwardConfig;
pub use metrics::MetricsConfig;
pub use server::ServerConfig;

/// Top-level relay configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TCP listener settings
    pub server: ServerConfig,

    /// Downstream HTTP forwarding settings
    pub forward: ForwardConfig,

    /// Metrics reporting settings
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        contents.parse()
    }

    /// Validate the configuration as a whole
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.forward.validate()?;
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}
