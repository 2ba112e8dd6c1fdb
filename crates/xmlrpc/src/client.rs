//! XML-RPC client over HTTP.
//!
//! Async POST client using `reqwest`. Each call is a single
//! request/response exchange bounded by the client's timeout.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use tracing::trace;

use crate::codec::{decode_response, encode_call};
use crate::error::XmlRpcError;
use crate::value::Value;

/// Future returned by [`Transport::call`].
pub type CallFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, XmlRpcError>> + Send + 'a>>;

/// Abstract XML-RPC endpoint.
///
/// [`Client`] implements this over HTTP. Callers depend on the trait so the
/// discovery logic can run against an in-memory server in tests.
pub trait Transport: Send + Sync {
    /// Invokes a remote method and returns its decoded result.
    fn call<'a>(&'a self, method: &'a str, params: Vec<Value>) -> CallFuture<'a>;

    /// Returns the endpoint URL, for diagnostics.
    fn endpoint(&self) -> &str;
}

/// XML-RPC client bound to one endpoint URL.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    url: String,
}

impl Client {
    /// Creates a client for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, XmlRpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }

    /// Performs one XML-RPC call.
    pub async fn call_method(&self, method: &str, params: Vec<Value>) -> Result<Value, XmlRpcError> {
        let body = encode_call(method, &params);
        trace!(method, url = %self.url, "xml-rpc call");

        let resp = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, HeaderValue::from_static("text/xml"))
            .body(body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(map_send_error)?;

        if !status.is_success() {
            return Err(XmlRpcError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        decode_response(&text)
    }
}

fn map_send_error(e: reqwest::Error) -> XmlRpcError {
    if e.is_timeout() {
        XmlRpcError::Timeout
    } else {
        XmlRpcError::Http(e)
    }
}

impl Transport for Client {
    fn call<'a>(&'a self, method: &'a str, params: Vec<Value>) -> CallFuture<'a> {
        Box::pin(self.call_method(method, params))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}
