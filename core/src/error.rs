//! Error types for URI parsing, message construction and the exchange engine.
//!
//! # Design
//! Every way an exchange can fail is a distinct variant of [`Error`], so a
//! caller can tell "the peer answered 500" (a successful exchange) apart from
//! "the exchange could not be completed" (an `Err`). Parse failures carry
//! their own enums, [`UriError`] and [`ProtocolError`], because callers
//! frequently want to match on the exact grammar violation.

use std::io;

use thiserror::Error;

/// Failure to parse an encoded URI. The position is a byte offset into the
/// input and `found` is the offending character, when there is one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("invalid scheme at byte {position}{}", describe(.found))]
    InvalidScheme { position: usize, found: Option<char> },

    #[error("invalid authority at byte {position}{}", describe(.found))]
    InvalidAuthority { position: usize, found: Option<char> },

    #[error("invalid path at byte {position}{}", describe(.found))]
    InvalidPath { position: usize, found: Option<char> },

    #[error("invalid query at byte {position}{}", describe(.found))]
    InvalidQuery { position: usize, found: Option<char> },

    #[error("invalid fragment at byte {position}{}", describe(.found))]
    InvalidFragment { position: usize, found: Option<char> },
}

fn describe(found: &Option<char>) -> String {
    match found {
        Some(c) => format!(": unexpected {c:?}"),
        None => String::new(),
    }
}

/// The peer sent bytes that do not form a valid HTTP/1.1 response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The first line is not `HTTP/<major>.<minor> <3-digit code> [reason]`.
    #[error("malformed status line: {0:?}")]
    MalformedStatusLine(String),

    /// A header line has no colon, an invalid name, or an illegal value.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// The peer closed the connection before the response was complete.
    #[error("connection closed before the response was complete")]
    UnexpectedEof,

    /// `Content-Length` is not a number, or repeated with different values.
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// A chunk-size line in a chunked body could not be parsed.
    #[error("invalid chunk in chunked body: {0:?}")]
    InvalidChunk(String),

    #[error("response header section exceeds {limit} bytes")]
    HeadersTooLarge { limit: usize },

    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

/// Errors returned by message construction and by the exchange engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Uri(#[from] UriError),

    /// The host name could not be resolved to any endpoint.
    #[error("failed to resolve {host}:{port}")]
    Resolution {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// No endpoint could be connected to, or the connection failed while
    /// sending the request or reading the response.
    #[error("connection error")]
    Connection(#[source] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The message body was already extracted.
    #[error("message body already consumed")]
    AlreadyConsumed,

    /// The exchange's cancellation token fired.
    #[error("exchange cancelled")]
    Cancelled,

    /// The exchange's deadline passed.
    #[error("exchange timed out")]
    Timeout,

    /// The method is not a valid HTTP token.
    #[error("invalid method token: {0:?}")]
    InvalidMethod(String),

    /// A status code outside 100..=599.
    #[error("invalid status code: {0}")]
    InvalidStatus(u16),

    /// A header name is not a token, or a name/value holds control characters.
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: &'static str },

    /// Reading a local body stream failed.
    #[error("failed to read message body")]
    Body(#[source] io::Error),

    /// A JSON body could not be encoded or decoded.
    #[error("invalid json body")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for [`Error::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    /// True for [`Error::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// True when the peer violated the HTTP/1.1 response grammar.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// The protocol error, if this is one.
    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        match self {
            Error::Protocol(e) => Some(e),
            _ => None,
        }
    }
}
