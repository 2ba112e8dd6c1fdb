//! Authentication session lifecycle.
//!
//! The Uyuni API is session based: `auth.login` returns a token that must be
//! passed as the first parameter of every later call. A [`Session`] lives for
//! exactly one refresh cycle and is consumed by [`release`].

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};
use uyuni_sd_xmlrpc::{FromValue, Transport, Value};

use crate::DiscoveryError;

/// An authenticated API session.
pub struct Session {
    token: String,
    host: String,
}

impl Session {
    /// Returns the session token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the API endpoint the session belongs to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the token as the leading parameter of an API call.
    pub(crate) fn token_param(&self) -> Value {
        Value::String(self.token.clone())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("host", &self.host)
            .finish()
    }
}

/// Logs in and returns a new session.
///
/// Fails with [`DiscoveryError::Auth`] when the credentials are rejected, the
/// server is unreachable, or no answer arrives within `timeout`.
pub async fn acquire(
    rpc: &dyn Transport,
    username: &str,
    password: &str,
    timeout: Duration,
) -> Result<Session, DiscoveryError> {
    let host = rpc.endpoint().to_string();
    let call = rpc.call("auth.login", vec![username.into(), password.into()]);

    let value = match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            return Err(DiscoveryError::Auth(format!("login to {host} failed: {e}")));
        }
        Err(_) => {
            return Err(DiscoveryError::Auth(format!(
                "login to {host} timed out after {timeout:?}"
            )));
        }
    };

    let token = String::from_value(value)
        .map_err(|e| DiscoveryError::Auth(format!("unexpected login response: {e}")))?;
    if token.is_empty() {
        return Err(DiscoveryError::Auth(format!("{host} returned an empty session token")));
    }

    debug!(host = %host, "session acquired");
    Ok(Session { token, host })
}

/// Logs out. Best-effort: failures are logged and never returned.
pub async fn release(rpc: &dyn Transport, session: Session, timeout: Duration) {
    let call = rpc.call("auth.logout", vec![session.token_param()]);

    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(_)) => debug!(host = %session.host, "session released"),
        Ok(Err(e)) => warn!(host = %session.host, error = %e, "logout failed"),
        Err(_) => warn!(host = %session.host, ?timeout, "logout timed out"),
    }
}
