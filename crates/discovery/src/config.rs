//! Uyuni service discovery configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DiscoveryError;

/// Path of the XML-RPC endpoint on an Uyuni server.
pub const API_PATH: &str = "/rpc/api";

/// Connection and polling settings for one Uyuni server.
#[derive(Clone, Serialize, Deserialize)]
pub struct SdConfig {
    /// Server host name, optionally with an `http://` or `https://` scheme.
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Time between refresh cycles.
    #[serde(default = "default_refresh_interval", with = "humantime_serde")]
    pub refresh_interval: Duration,

    /// Timeout for every individual API call.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Maximum number of systems resolved concurrently.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_concurrency() -> usize {
    8
}

impl Default for SdConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            refresh_interval: default_refresh_interval(),
            request_timeout: default_request_timeout(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl fmt::Debug for SdConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("refresh_interval", &self.refresh_interval)
            .field("request_timeout", &self.request_timeout)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl SdConfig {
    /// Checks that all required fields are set and all limits are usable.
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.host.trim().is_empty() {
            return Err(DiscoveryError::Config(
                "Uyuni configuration requires a host".into(),
            ));
        }
        if self.username.is_empty() {
            return Err(DiscoveryError::Config(
                "Uyuni configuration requires a username".into(),
            ));
        }
        if self.password.is_empty() {
            return Err(DiscoveryError::Config(
                "Uyuni configuration requires a password".into(),
            ));
        }
        if self.refresh_interval.is_zero() {
            return Err(DiscoveryError::Config(
                "refresh_interval must be greater than zero".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(DiscoveryError::Config(
                "request_timeout must be greater than zero".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(DiscoveryError::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Returns the XML-RPC endpoint URL for the configured host.
    pub fn api_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}{API_PATH}")
        } else {
            format!("http://{host}{API_PATH}")
        }
    }
}
