//! Minimal async XML-RPC client.
//!
//! Covers the subset of XML-RPC spoken by the Uyuni / SUSE Manager API:
//! scalar, struct and array values, faults, and POST-over-HTTP transport.
//!
//! # Layout
//!
//! - [`value`]: the [`Value`] model and [`FromValue`] conversions
//! - [`codec`]: `methodCall` encoding and `methodResponse` decoding
//! - [`client`]: the [`Transport`] seam and its reqwest-backed [`Client`]

pub mod client;
pub mod codec;
pub mod error;
pub mod value;

pub use client::{CallFuture, Client, Transport};
pub use codec::{decode_response, encode_call};
pub use error::XmlRpcError;
pub use value::{FromValue, Value};
