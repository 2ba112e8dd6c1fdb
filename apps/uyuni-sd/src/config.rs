//! Daemon configuration.
//!
//! Stored as TOML:
//!
//! ```toml
//! [uyuni]
//! host = "suma.example.com"
//! username = "admin"
//! password = "secret"
//! refresh_interval = "1m"
//!
//! [output]
//! path = "/var/lib/prometheus/uyuni_sd.json"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use uyuni_sd_discovery::SdConfig;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/uyuni-sd/config.toml";

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub uyuni: SdConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Where discovered targets are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("uyuni_sd.json")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
        }
    }
}

impl Config {
    /// Loads and validates configuration from `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration read");
        Ok(config)
    }

    fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.uyuni.validate()?;
        Ok(config)
    }
}
