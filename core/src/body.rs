//! Message bodies.
//!
//! A [`Body`] is either empty, a buffer of bytes, or a reader that produces
//! the bytes on demand. It is not `Clone`: whoever holds it is the only one
//! who can read it.

use std::fmt;
use std::io::{self, Read};

use bytes::{Buf, Bytes};
use serde::de::DeserializeOwned;

use crate::error::Error;

pub struct Body {
    kind: Kind,
}

enum Kind {
    Empty,
    Bytes(Bytes),
    Stream {
        reader: Box<dyn Read + Send>,
        length: Option<u64>,
    },
}

impl Body {
    pub fn empty() -> Self {
        Body { kind: Kind::Empty }
    }

    /// A body streamed from `reader`. `length` is the exact number of bytes
    /// it will yield, or `None` when unknown (sent chunked).
    pub fn from_reader<R>(reader: R, length: Option<u64>) -> Self
    where
        R: Read + Send + 'static,
    {
        Body {
            kind: Kind::Stream {
                reader: Box::new(reader),
                length,
            },
        }
    }

    /// Length in bytes, if known up front.
    pub fn len(&self) -> Option<u64> {
        match &self.kind {
            Kind::Empty => Some(0),
            Kind::Bytes(b) => Some(b.len() as u64),
            Kind::Stream { length, .. } => *length,
        }
    }

    /// True when the body is known to hold no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// The buffered bytes when the body is held in memory.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.kind {
            Kind::Empty => Some(&[]),
            Kind::Bytes(b) => Some(b),
            Kind::Stream { .. } => None,
        }
    }

    /// Read the whole body into memory.
    pub fn bytes(self) -> Result<Bytes, Error> {
        match self.kind {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Bytes(b) => Ok(b),
            Kind::Stream { mut reader, length } => {
                let capacity = length.map_or(0, |n| n.min(1 << 20) as usize);
                let mut buf = Vec::with_capacity(capacity);
                reader.read_to_end(&mut buf).map_err(Error::Body)?;
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Read the whole body as UTF-8 text.
    pub fn text(self) -> Result<String, Error> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Body(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Read the whole body and decode it as JSON.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, Error> {
        let bytes = self.bytes()?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.kind {
            Kind::Empty => Ok(0),
            Kind::Bytes(b) => {
                let n = buf.len().min(b.len());
                buf[..n].copy_from_slice(&b[..n]);
                b.advance(n);
                Ok(n)
            }
            Kind::Stream { reader, .. } => reader.read(buf),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("Body::Empty"),
            Kind::Bytes(b) => f.debug_tuple("Body::Bytes").field(&b.len()).finish(),
            Kind::Stream { length, .. } => {
                f.debug_struct("Body::Stream").field("length", length).finish()
            }
        }
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        if b.is_empty() {
            Body::empty()
        } else {
            Body { kind: Kind::Bytes(b) }
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::from(Bytes::from(v))
    }
}

impl From<&[u8]> for Body {
    fn from(s: &[u8]) -> Self {
        Body::from(Bytes::copy_from_slice(s))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::from(Bytes::from(s))
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::from(s.as_bytes())
    }
}
