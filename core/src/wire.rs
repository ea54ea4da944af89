//! HTTP/1.1 wire codec, free of any I/O.
//!
//! # Design
//! The host does all reading and writing. Encoding produces byte buffers;
//! [`ResponseDecoder`] is fed whatever bytes have arrived and reports when
//! the response is complete. The blocking and async exchange drivers share
//! this module, so both speak exactly the same protocol.

use std::borrow::Cow;
use std::io::{self, Read};

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::body::Body;
use crate::constants::{default_port, header};
use crate::error::{Error, ProtocolError};
use crate::headers::Headers;
use crate::message::{HttpMessage, Version};
use crate::method::is_token;
use crate::request::Request;
use crate::response::Response;
use crate::status;
use crate::uri::Uri;

/// Upper bound for a response head (status line plus headers), and for a
/// trailer section.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Longest accepted chunk-size line, extensions included.
const MAX_CHUNK_LINE: usize = 4096;

/// Size of the frames produced by [`BodyEncoder`].
const FRAME_SIZE: usize = 8 * 1024;

/// The `Host` header value for `uri`: the host, plus `:port` when the port
/// is explicit and differs from the scheme default.
pub fn host_header(uri: &Uri) -> String {
    match uri.port() {
        Some(port) if default_port(uri.scheme()) != Some(port) => {
            format!("{}:{}", uri.host(), port)
        }
        _ => uri.host().to_string(),
    }
}

/// Request line, `Host` (when given and not already set), headers and the
/// blank line.
pub fn encode_request_head(request: &Request, host: Option<&str>) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    let line = format!(
        "{} {} {}\r\n",
        request.method(),
        request.uri().request_target(),
        request.version()
    );
    out.extend_from_slice(line.as_bytes());
    if let Some(host) = host {
        if !host.is_empty() && !request.headers().contains(header::HOST) {
            out.extend_from_slice(b"Host: ");
            out.extend_from_slice(host.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }
    request.headers().write_to(&mut out);
    out.extend_from_slice(b"\r\n");
    out
}

/// Status line, headers and the blank line.
pub fn encode_response_head(response: &Response) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    let line = format!(
        "{} {} {}\r\n",
        response.version(),
        response.status(),
        response.reason_phrase()
    );
    out.extend_from_slice(line.as_bytes());
    response.headers().write_to(&mut out);
    out.extend_from_slice(b"\r\n");
    out
}

/// How a message body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No body and no framing headers.
    Absent,
    /// Exactly this many bytes follow the head.
    Length(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
}

/// Work out the framing for sending `body` with `headers`, adding
/// `Content-Length` or `Transfer-Encoding: chunked` when neither is set
/// and the body is not empty.
pub fn ensure_framing(headers: &mut Headers, body: &Body) -> Result<Framing, Error> {
    if headers.is_chunked() {
        return Ok(Framing::Chunked);
    }
    if let Some(n) = headers.content_length()? {
        return Ok(Framing::Length(n));
    }
    match body.len() {
        Some(0) => Ok(Framing::Absent),
        Some(n) => {
            headers.add(header::CONTENT_LENGTH, &n.to_string())?;
            Ok(Framing::Length(n))
        }
        None => {
            headers.add(header::TRANSFER_ENCODING, "chunked")?;
            Ok(Framing::Chunked)
        }
    }
}

/// Turns a [`Body`] into wire frames: raw slices for length-delimited
/// bodies, size-prefixed chunks ending with the zero chunk otherwise.
#[derive(Debug)]
pub struct BodyEncoder {
    body: Body,
    framing: Framing,
    remaining: u64,
    done: bool,
}

impl BodyEncoder {
    pub fn new(body: Body, framing: Framing) -> Self {
        let remaining = match framing {
            Framing::Length(n) => n,
            _ => 0,
        };
        BodyEncoder {
            body,
            framing,
            remaining,
            done: false,
        }
    }

    /// The next frame to write, or `None` once the body is fully encoded.
    ///
    /// A length-delimited body that ends before its declared length fails
    /// with [`Error::Body`].
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, Error> {
        if self.done {
            return Ok(None);
        }
        let mut buf = vec![0u8; FRAME_SIZE];
        match self.framing {
            Framing::Absent => {
                self.done = true;
                Ok(None)
            }
            Framing::Length(declared) => {
                if self.remaining == 0 {
                    self.done = true;
                    return Ok(None);
                }
                let want = self.remaining.min(FRAME_SIZE as u64) as usize;
                let n = read_some(&mut self.body, &mut buf[..want])?;
                if n == 0 {
                    return Err(Error::Body(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "body ended {} bytes short of its declared length {declared}",
                            self.remaining
                        ),
                    )));
                }
                self.remaining -= n as u64;
                buf.truncate(n);
                Ok(Some(buf))
            }
            Framing::Chunked => {
                let n = read_some(&mut self.body, &mut buf)?;
                if n == 0 {
                    self.done = true;
                    return Ok(Some(b"0\r\n\r\n".to_vec()));
                }
                let mut frame = Vec::with_capacity(n + 12);
                frame.extend_from_slice(format!("{n:x}\r\n").as_bytes());
                frame.extend_from_slice(&buf[..n]);
                frame.extend_from_slice(b"\r\n");
                Ok(Some(frame))
            }
        }
    }
}

fn read_some(body: &mut Body, buf: &mut [u8]) -> Result<usize, Error> {
    loop {
        match body.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Body(e)),
        }
    }
}

/// Append the encoded body to `out`.
pub fn encode_body(body: Body, framing: Framing, out: &mut Vec<u8>) -> Result<(), Error> {
    let mut encoder = BodyEncoder::new(body, framing);
    while let Some(frame) = encoder.next_frame()? {
        out.extend_from_slice(&frame);
    }
    Ok(())
}

/// Where a [`ResponseDecoder`] is in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePhase {
    StatusLine,
    Headers,
    Body,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StatusLine,
    Headers,
    Length(u64),
    ChunkSize,
    ChunkData(u64),
    ChunkEnd,
    Trailers,
    UntilEof,
    Done,
}

/// Incremental HTTP/1.1 response parser.
///
/// Call [`decode`](Self::decode) each time bytes arrive; it consumes what
/// it can from the buffer and returns `true` once the response is
/// complete. When the peer closes the connection call
/// [`finish_eof`](Self::finish_eof), which completes close-delimited
/// bodies and reports truncation for everything else.
#[derive(Debug)]
pub struct ResponseDecoder {
    state: State,
    head_request: bool,
    max_body: Option<usize>,
    head_bytes: usize,
    version: Version,
    status: u16,
    reason: Option<String>,
    headers: Headers,
    body: BytesMut,
}

impl ResponseDecoder {
    /// `head_request` marks a response to `HEAD`, which never has a body.
    pub fn new(head_request: bool) -> Self {
        ResponseDecoder {
            state: State::StatusLine,
            head_request,
            max_body: None,
            head_bytes: 0,
            version: Version::HTTP_1_1,
            status: 0,
            reason: None,
            headers: Headers::new(),
            body: BytesMut::new(),
        }
    }

    /// Fail with [`ProtocolError::BodyTooLarge`] past `limit` body bytes.
    pub fn with_max_body(mut self, limit: Option<usize>) -> Self {
        self.max_body = limit;
        self
    }

    pub fn phase(&self) -> DecodePhase {
        match self.state {
            State::StatusLine => DecodePhase::StatusLine,
            State::Headers => DecodePhase::Headers,
            State::Done => DecodePhase::Complete,
            _ => DecodePhase::Body,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Done
    }

    /// Consume bytes from `buf`. Returns `true` once the response is
    /// complete; bytes after the end of the response are left in `buf`.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<bool, ProtocolError> {
        loop {
            match self.state {
                State::StatusLine => {
                    let Some(line) = self.head_line(buf)? else {
                        check_status_prefix(buf)?;
                        return Ok(false);
                    };
                    self.parse_status_line(&line)?;
                    self.state = State::Headers;
                }
                State::Headers => {
                    let Some(line) = self.head_line(buf)? else {
                        return Ok(false);
                    };
                    if line.is_empty() {
                        self.end_of_head()?;
                    } else {
                        let (name, value) = parse_header_line(&line)?;
                        self.headers
                            .add(name, &value)
                            .map_err(|_| ProtocolError::MalformedHeader(lossy(&line)))?;
                    }
                }
                State::Length(remaining) => {
                    if buf.is_empty() {
                        return Ok(false);
                    }
                    let left = self.take_body(buf, remaining)?;
                    self.state = if left == 0 { State::Done } else { State::Length(left) };
                }
                State::ChunkSize => {
                    let Some(line) = take_line(buf) else {
                        if buf.len() > MAX_CHUNK_LINE {
                            return Err(ProtocolError::InvalidChunk(
                                "chunk-size line too long".to_string(),
                            ));
                        }
                        return Ok(false);
                    };
                    let size = parse_chunk_size(&line)?;
                    trace!(size, "chunk");
                    if size == 0 {
                        self.head_bytes = 0;
                        self.state = State::Trailers;
                    } else {
                        self.state = State::ChunkData(size);
                    }
                }
                State::ChunkData(remaining) => {
                    if buf.is_empty() {
                        return Ok(false);
                    }
                    let left = self.take_body(buf, remaining)?;
                    self.state = if left == 0 { State::ChunkEnd } else { State::ChunkData(left) };
                }
                State::ChunkEnd => {
                    if buf.starts_with(b"\r\n") {
                        buf.advance(2);
                    } else if buf.starts_with(b"\n") {
                        buf.advance(1);
                    } else if buf.is_empty() || &buf[..] == b"\r" {
                        return Ok(false);
                    } else {
                        return Err(ProtocolError::InvalidChunk(
                            "missing line break after chunk data".to_string(),
                        ));
                    }
                    self.state = State::ChunkSize;
                }
                State::Trailers => {
                    let Some(line) = self.head_line(buf)? else {
                        return Ok(false);
                    };
                    if line.is_empty() {
                        self.state = State::Done;
                    } else {
                        // Trailer fields are validated, then dropped.
                        parse_header_line(&line)?;
                    }
                }
                State::UntilEof => {
                    if !buf.is_empty() {
                        let chunk = buf.split();
                        self.push_body(&chunk)?;
                    }
                    return Ok(false);
                }
                State::Done => return Ok(true),
            }
        }
    }

    /// The peer closed the connection.
    pub fn finish_eof(&mut self) -> Result<(), ProtocolError> {
        match self.state {
            State::UntilEof => {
                self.state = State::Done;
                Ok(())
            }
            State::Done => Ok(()),
            _ => Err(ProtocolError::UnexpectedEof),
        }
    }

    /// The decoded response. Fails with [`ProtocolError::UnexpectedEof`]
    /// if decoding has not completed.
    pub fn into_response(self) -> Result<Response, ProtocolError> {
        if self.state != State::Done {
            return Err(ProtocolError::UnexpectedEof);
        }
        Ok(Response::from_parts(
            self.version,
            self.status,
            self.reason,
            self.headers,
            Body::from(self.body.freeze()),
        ))
    }

    fn head_line(&mut self, buf: &mut BytesMut) -> Result<Option<BytesMut>, ProtocolError> {
        match take_line(buf) {
            Some(line) => {
                // Counted as if CRLF-terminated.
                self.head_bytes += line.len() + 2;
                if self.head_bytes > MAX_HEAD_BYTES {
                    return Err(ProtocolError::HeadersTooLarge {
                        limit: MAX_HEAD_BYTES,
                    });
                }
                Ok(Some(line))
            }
            None if self.head_bytes + buf.len() > MAX_HEAD_BYTES => {
                Err(ProtocolError::HeadersTooLarge {
                    limit: MAX_HEAD_BYTES,
                })
            }
            None => Ok(None),
        }
    }

    fn parse_status_line(&mut self, line: &[u8]) -> Result<(), ProtocolError> {
        let malformed = || ProtocolError::MalformedStatusLine(lossy(line));
        let text = std::str::from_utf8(line).map_err(|_| malformed())?;
        let (version, rest) = text.split_once(' ').ok_or_else(malformed)?;
        let version = Version::parse(version).ok_or_else(malformed)?;

        let (code, reason) = match rest.split_once(' ') {
            Some((code, reason)) => (code, reason),
            None => (rest, ""),
        };
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let code: u16 = code.parse().map_err(|_| malformed())?;
        if !status::is_valid_status(code) {
            return Err(malformed());
        }

        trace!(%version, code, "status line");
        self.version = version;
        self.status = code;
        self.reason = if reason.is_empty() {
            None
        } else {
            Some(reason.to_string())
        };
        Ok(())
    }

    fn end_of_head(&mut self) -> Result<(), ProtocolError> {
        if (100..200).contains(&self.status) && self.status != 101 {
            trace!(status = self.status, "skipping interim response");
            self.headers = Headers::new();
            self.reason = None;
            self.head_bytes = 0;
            self.state = State::StatusLine;
            return Ok(());
        }

        let no_body = self.head_request
            || self.status == 204
            || self.status == 304
            || (100..200).contains(&self.status);
        self.state = if no_body {
            State::Done
        } else if let Some(n) = self.headers.content_length()? {
            if let Some(limit) = self.max_body {
                if n > limit as u64 {
                    return Err(ProtocolError::BodyTooLarge { limit });
                }
            }
            if n == 0 {
                State::Done
            } else {
                State::Length(n)
            }
        } else if self.headers.is_chunked() {
            State::ChunkSize
        } else {
            State::UntilEof
        };
        Ok(())
    }

    /// Move up to `remaining` bytes into the body, returning what is left.
    fn take_body(&mut self, buf: &mut BytesMut, remaining: u64) -> Result<u64, ProtocolError> {
        let n = remaining.min(buf.len() as u64) as usize;
        let chunk = buf.split_to(n);
        self.push_body(&chunk)?;
        Ok(remaining - n as u64)
    }

    fn push_body(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        if let Some(limit) = self.max_body {
            if self.body.len() + bytes.len() > limit {
                return Err(ProtocolError::BodyTooLarge { limit });
            }
        }
        self.body.extend_from_slice(bytes);
        Ok(())
    }
}

/// Split off one line, without its LF or CRLF terminator.
fn take_line(buf: &mut BytesMut) -> Option<BytesMut> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let mut line = buf.split_to(pos + 1);
    line.truncate(pos);
    if line.last() == Some(&b'\r') {
        line.truncate(pos - 1);
    }
    Some(line)
}

/// Reject early when the first bytes cannot start a status line, so a peer
/// that never sends a line break does not keep the exchange waiting.
fn check_status_prefix(buf: &[u8]) -> Result<(), ProtocolError> {
    const PREFIX: &[u8] = b"HTTP/";
    let n = buf.len().min(PREFIX.len());
    if buf[..n] != PREFIX[..n] {
        return Err(ProtocolError::MalformedStatusLine(lossy(buf)));
    }
    Ok(())
}

/// Split a field line into name and value. Names must be tokens. Values
/// that are not UTF-8 are read as Latin-1 so obs-text survives intact.
fn parse_header_line(line: &[u8]) -> Result<(&str, Cow<'_, str>), ProtocolError> {
    let malformed = || ProtocolError::MalformedHeader(lossy(line));
    if line.starts_with(b" ") || line.starts_with(b"\t") {
        return Err(malformed());
    }
    let colon = line.iter().position(|&b| b == b':').ok_or_else(malformed)?;
    let name = std::str::from_utf8(&line[..colon]).map_err(|_| malformed())?;
    if !is_token(name) {
        return Err(malformed());
    }
    let value = line[colon + 1..].trim_ascii();
    let value = match std::str::from_utf8(value) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(value.iter().map(|&b| char::from(b)).collect()),
    };
    Ok((name, value))
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, ProtocolError> {
    let invalid = || ProtocolError::InvalidChunk(lossy(line));
    let size = match line.iter().position(|&b| b == b';') {
        Some(pos) => &line[..pos],
        None => line,
    };
    let size = std::str::from_utf8(size).map_err(|_| invalid())?.trim();
    if size.is_empty() || !size.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    u64::from_str_radix(size, 16).map_err(|_| invalid())
}

fn lossy(bytes: &[u8]) -> String {
    const SHOWN: usize = 128;
    String::from_utf8_lossy(&bytes[..bytes.len().min(SHOWN)]).into_owned()
}
