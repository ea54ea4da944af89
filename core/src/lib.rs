//! HTTP/1.1 client core: URI parsing, message model and a one-shot exchange
//! engine.
//!
//! # Overview
//! A [`Request`] is sent to one endpoint over one connection and the full
//! [`Response`] is read back. Any status code is a successful exchange;
//! resolution, connection, protocol, cancellation and timeout failures are
//! typed [`Error`]s.
//!
//! # Design
//! - The wire format lives in [`wire`], a codec that never touches I/O.
//!   The blocking engine ([`exchange`]) and the tokio engine
//!   ([`async_exchange`], feature `tokio`) both drive it.
//! - Networking sits behind the [`transport`] traits, so tests run against
//!   in-memory peers and callers can plug in TLS.
//! - Constant tables (reason phrases, method, header and MIME names) are
//!   compiled in and shared read-only.
//! - Bodies are move-once: extracting a body twice is an error.

pub mod body;
pub mod cancel;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod exchange;
pub mod headers;
pub mod message;
pub mod method;
pub mod request;
pub mod response;
pub mod status;
pub mod transport;
pub mod uri;
pub mod wire;

#[cfg(feature = "tokio")]
pub mod async_exchange;

pub use body::Body;
pub use cancel::CancelToken;
pub use client::{fetch, Client};
pub use config::{ClientConfig, RequestOptions};
pub use error::{Error, ProtocolError, UriError};
pub use exchange::{exchange, exchange_with, Exchange, Phase};
pub use headers::Headers;
pub use message::{HttpMessage, Version};
pub use method::Method;
pub use request::Request;
pub use response::Response;
pub use transport::{Connect, Connection, Resolve, SystemResolver, TcpConnector};
pub use uri::Uri;
