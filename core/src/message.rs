//! State shared by requests and responses.
//!
//! # Design
//! [`Message`] holds the protocol version, the headers and a move-once
//! body slot. [`HttpMessage`] is implemented by `Request` and `Response` so
//! code that only cares about headers and bodies can treat both alike.
//!
//! Framing headers derived by `set_body` are remembered, so replacing the
//! body drops the stale ones without ever touching headers the caller set
//! explicitly.

use std::fmt;
use std::io::Read;

use bytes::Bytes;
use serde::Serialize;

use crate::body::Body;
use crate::constants::{header, mime};
use crate::error::Error;
use crate::headers::Headers;

/// HTTP protocol version, `HTTP/<major>.<minor>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const HTTP_1_0: Version = Version { major: 1, minor: 0 };
    pub const HTTP_1_1: Version = Version { major: 1, minor: 1 };

    /// Parse `HTTP/<digit>.<digit>`.
    pub fn parse(s: &str) -> Option<Version> {
        let rest = s.strip_prefix("HTTP/")?;
        let (major, minor) = rest.split_once('.')?;
        let digit = |part: &str| match part.as_bytes() {
            [d] if d.is_ascii_digit() => Some(d - b'0'),
            _ => None,
        };
        Some(Version {
            major: digit(major)?,
            minor: digit(minor)?,
        })
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::HTTP_1_1
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Default)]
struct Derived {
    content_type: bool,
    content_length: bool,
    chunked: bool,
}

/// Version, headers and body of a request or response.
#[derive(Debug)]
pub struct Message {
    version: Version,
    headers: Headers,
    body: Option<Body>,
    derived: Derived,
}

impl Default for Message {
    fn default() -> Self {
        Message::new(Version::HTTP_1_1, Headers::new(), Body::empty())
    }
}

impl Message {
    pub(crate) fn new(version: Version, headers: Headers, body: Body) -> Self {
        Message {
            version,
            headers,
            body: Some(body),
            derived: Derived::default(),
        }
    }

    fn clear_derived(&mut self) {
        if self.derived.content_type {
            self.headers.remove(header::CONTENT_TYPE);
        }
        if self.derived.content_length {
            self.headers.remove(header::CONTENT_LENGTH);
        }
        if self.derived.chunked {
            self.headers.remove(header::TRANSFER_ENCODING);
        }
        self.derived = Derived::default();
    }

    /// Install `body` and derive `Content-Type` plus either `Content-Length`
    /// or `Transfer-Encoding: chunked`, unless the caller already set them.
    fn install_body(&mut self, body: Body, content_type: &str) -> Result<(), Error> {
        self.clear_derived();

        if !content_type.is_empty() && !self.headers.contains(header::CONTENT_TYPE) {
            self.headers.add(header::CONTENT_TYPE, content_type)?;
            self.derived.content_type = true;
        }

        let framed = self.headers.contains(header::CONTENT_LENGTH)
            || self.headers.contains(header::TRANSFER_ENCODING);
        if !framed {
            match body.len() {
                Some(n) => {
                    self.headers.add(header::CONTENT_LENGTH, &n.to_string())?;
                    self.derived.content_length = true;
                }
                None => {
                    self.headers.add(header::TRANSFER_ENCODING, "chunked")?;
                    self.derived.chunked = true;
                }
            }
        }

        self.body = Some(body);
        Ok(())
    }
}

/// Behaviour shared by [`crate::Request`] and [`crate::Response`].
pub trait HttpMessage {
    fn message(&self) -> &Message;

    fn message_mut(&mut self) -> &mut Message;

    fn version(&self) -> Version {
        self.message().version
    }

    fn set_version(&mut self, version: Version) {
        self.message_mut().version = version;
    }

    fn headers(&self) -> &Headers {
        &self.message().headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.message_mut().headers
    }

    /// Stream the body from `stream`. With `length: None` the body is sent
    /// with chunked framing.
    fn set_body<R>(&mut self, stream: R, length: Option<u64>, content_type: &str) -> Result<(), Error>
    where
        R: Read + Send + 'static,
        Self: Sized,
    {
        self.message_mut()
            .install_body(Body::from_reader(stream, length), content_type)
    }

    fn set_body_bytes(&mut self, bytes: impl Into<Bytes>, content_type: &str) -> Result<(), Error>
    where
        Self: Sized,
    {
        self.message_mut()
            .install_body(Body::from(bytes.into()), content_type)
    }

    fn set_body_text(&mut self, text: impl Into<String>) -> Result<(), Error>
    where
        Self: Sized,
    {
        self.set_body_bytes(Bytes::from(text.into()), mime::TEXT_PLAIN_UTF8)
    }

    fn set_body_json<T: Serialize>(&mut self, value: &T) -> Result<(), Error>
    where
        Self: Sized,
    {
        let encoded = serde_json::to_vec(value)?;
        self.set_body_bytes(encoded, mime::APPLICATION_JSON)
    }

    /// Take the body. Only the first call succeeds.
    fn extract_body(&mut self) -> Result<Body, Error> {
        self.message_mut().body.take().ok_or(Error::AlreadyConsumed)
    }

    /// True once the body has been extracted.
    fn body_consumed(&self) -> bool {
        self.message().body.is_none()
    }
}
