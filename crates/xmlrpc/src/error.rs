//! XML-RPC error types.

/// Errors produced by XML-RPC encoding, decoding and transport.
#[derive(Debug, thiserror::Error)]
pub enum XmlRpcError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("fault {code}: {message}")]
    Fault { code: i64, message: String },

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("unexpected value: {0}")]
    Type(String),

    #[error("call timed out")]
    Timeout,
}

impl XmlRpcError {
    /// Returns true if the server answered with an XML-RPC fault.
    pub fn is_fault(&self) -> bool {
        matches!(self, XmlRpcError::Fault { .. })
    }
}
