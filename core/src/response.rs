//! Responses, both received from a peer and built locally.

use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::body::Body;
use crate::error::Error;
use crate::headers::Headers;
use crate::message::{HttpMessage, Message, Version};
use crate::status;
use crate::wire;

/// An HTTP response: status code, optional reason phrase, headers and body.
///
/// A non-2xx status is still a successful exchange; inspect
/// [`Response::status`] or [`Response::is_success`] to tell them apart.
#[derive(Debug)]
pub struct Response {
    status: u16,
    reason: Option<String>,
    message: Message,
}

impl Response {
    /// A response with status `status` and no reason phrase. The code must
    /// lie in 100..=599.
    pub fn new(status: u16) -> Result<Self, Error> {
        if !status::is_valid_status(status) {
            return Err(Error::InvalidStatus(status));
        }
        Ok(Response {
            status,
            reason: None,
            message: Message::default(),
        })
    }

    /// Assemble a response decoded off the wire.
    pub(crate) fn from_parts(
        version: Version,
        status: u16,
        reason: Option<String>,
        headers: Headers,
        body: Body,
    ) -> Self {
        Response {
            status,
            reason,
            message: Message::new(version, headers, body),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The reason phrase sent by the peer, else the standard phrase for the
    /// status code, else the empty string.
    pub fn reason_phrase(&self) -> &str {
        match &self.reason {
            Some(reason) => reason,
            None => status::reason_phrase(self.status).unwrap_or(""),
        }
    }

    pub fn set_reason_phrase(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
    }

    /// Take the body and read it into memory.
    pub fn bytes(&mut self) -> Result<Bytes, Error> {
        self.extract_body()?.bytes()
    }

    /// Take the body and read it as UTF-8 text.
    pub fn text(&mut self) -> Result<String, Error> {
        self.extract_body()?.text()
    }

    /// Take the body and decode it as JSON.
    pub fn json<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        self.extract_body()?.json()
    }

    /// Serialize the whole response, body included, in HTTP/1.1 wire format.
    pub fn to_bytes(mut self) -> Result<Vec<u8>, Error> {
        let body = self.extract_body()?;
        let framing = wire::ensure_framing(self.headers_mut(), &body)?;
        let mut out = wire::encode_response_head(&self);
        wire::encode_body(body, framing, &mut out)?;
        Ok(out)
    }
}

impl HttpMessage for Response {
    fn message(&self) -> &Message {
        &self.message
    }

    fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }
}

/// The response head: status line, headers and the terminating blank line.
impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = wire::encode_response_head(self);
        f.write_str(&String::from_utf8_lossy(&head))
    }
}
