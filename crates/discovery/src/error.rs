//! Discovery error types.

use uyuni_sd_xmlrpc::XmlRpcError;

/// Errors produced by the discovery cycle.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("remote call {method} failed: {source}")]
    RemoteCall {
        method: &'static str,
        #[source]
        source: XmlRpcError,
    },

    #[error("system {system_id} skipped: {reason}")]
    PartialData { system_id: i64, reason: String },

    #[error("cancelled")]
    Cancelled,
}

impl DiscoveryError {
    /// Wraps a transport error raised by `method`.
    pub(crate) fn remote(method: &'static str) -> impl FnOnce(XmlRpcError) -> Self {
        move |source| DiscoveryError::RemoteCall { method, source }
    }
}
