//! The blocking exchange engine.
//!
//! # Design
//! One exchange is a linear walk through [`Phase`]s: resolve, connect,
//! send, then read the status line, headers and body through the shared
//! [`wire`] codec. Each exchange owns its connection and closes it on every
//! path out, success or failure. There are no retries.
//!
//! Cancellation and the deadline are checked at the start of every step.
//! The remaining time is also handed to the connector as a handshake bound
//! and to the connection as an I/O timeout, so a stalled peer cannot hold a
//! thread past the deadline.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::{debug, info_span, trace, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::config::RequestOptions;
use crate::constants::header;
use crate::error::Error;
use crate::message::HttpMessage;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::transport::{Connect, Connection, Resolve, SystemResolver, TcpConnector};
use crate::uri::Uri;
use crate::wire::{self, BodyEncoder, DecodePhase, ResponseDecoder};

pub(crate) const READ_SIZE: usize = 8 * 1024;

/// Where an exchange is. `Failed` can follow any phase after `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Resolving,
    Connecting,
    Sending,
    AwaitingStatusLine,
    ReadingHeaders,
    ReadingBody,
    Complete,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<DecodePhase> for Phase {
    fn from(phase: DecodePhase) -> Self {
        match phase {
            DecodePhase::StatusLine => Phase::AwaitingStatusLine,
            DecodePhase::Headers => Phase::ReadingHeaders,
            DecodePhase::Body => Phase::ReadingBody,
            DecodePhase::Complete => Phase::Complete,
        }
    }
}

pub(crate) fn transition(current: &mut Phase, next: Phase) {
    if *current != next {
        debug!(from = %current, to = %next, "phase");
        *current = next;
    }
}

/// Cancellation and deadline checks shared by both drivers.
#[derive(Debug)]
pub(crate) struct Guard {
    cancel: Option<CancelToken>,
    deadline: Option<Instant>,
}

impl Guard {
    pub(crate) fn new(cancel: Option<CancelToken>, timeout: Option<Duration>) -> Self {
        Guard {
            cancel,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn check(&self) -> Result<(), Error> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Timeout);
        }
        Ok(())
    }

    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Classify a transport failure. Cancellation and an expired deadline
    /// take precedence over whatever the transport reported.
    pub(crate) fn io_error(&self, err: io::Error) -> Error {
        if let Err(e) = self.check() {
            return e;
        }
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock if self.deadline.is_some() => {
                Error::Timeout
            }
            _ => Error::Connection(err),
        }
    }
}

/// Host and port of the endpoint named by `uri`.
pub(crate) fn endpoint(uri: &Uri) -> Result<(&str, u16), Error> {
    let host = uri.host();
    if host.is_empty() {
        return Err(Error::Resolution {
            host: String::new(),
            port: uri.port().unwrap_or(0),
            source: io::Error::new(io::ErrorKind::InvalidInput, "uri has no host"),
        });
    }
    let port = uri.port_or_default().ok_or_else(|| Error::Resolution {
        host: host.to_string(),
        port: 0,
        source: io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no default port for scheme {:?}", uri.scheme()),
        ),
    })?;
    Ok((host, port))
}

pub(crate) fn no_endpoints(host: &str, port: u16) -> Error {
    Error::Resolution {
        host: host.to_string(),
        port,
        source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
    }
}

/// Merge option headers and `Connection: close` into `request`, settle the
/// body framing and encode the head.
pub(crate) fn prepare(
    request: &mut Request,
    uri: &Uri,
    options: &RequestOptions,
) -> Result<(Vec<u8>, BodyEncoder), Error> {
    let defaults: Vec<(&str, &str)> = options
        .headers
        .iter()
        .filter(|(name, _)| !request.headers().contains(name))
        .collect();
    for (name, value) in defaults {
        request.headers_mut().add(name, value)?;
    }
    if !request.headers().contains(header::CONNECTION) {
        request.headers_mut().add(header::CONNECTION, "close")?;
    }

    let body = request.extract_body()?;
    let framing = wire::ensure_framing(request.headers_mut(), &body)?;
    let head = wire::encode_request_head(request, Some(&wire::host_header(uri)));
    Ok((head, BodyEncoder::new(body, framing)))
}

/// Drives one request/response exchange over the blocking transport seams.
///
/// An `Exchange` can be run more than once; every run is independent and
/// gets a fresh id.
pub struct Exchange<'a, R, C> {
    resolver: &'a R,
    connector: &'a C,
    id: Uuid,
    phase: Phase,
}

impl<'a, R: Resolve, C: Connect> Exchange<'a, R, C> {
    pub fn new(resolver: &'a R, connector: &'a C) -> Self {
        Exchange {
            resolver,
            connector,
            id: Uuid::new_v4(),
            phase: Phase::Idle,
        }
    }

    /// Id of the most recent run, as recorded in its tracing span.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Send `request` to the endpoint named by `uri` and read the response.
    ///
    /// `uri` picks the endpoint and the `Host` header; the request line
    /// uses `request.uri()`. Any status code is a successful exchange.
    pub fn run(
        &mut self,
        uri: &Uri,
        request: Request,
        options: &RequestOptions,
    ) -> Result<Response, Error> {
        self.id = Uuid::new_v4();
        self.phase = Phase::Idle;
        let span = info_span!("exchange", id = %self.id, method = %request.method(), uri = %uri);
        let _enter = span.enter();

        match self.drive(uri, request, options) {
            Ok(response) => {
                self.enter(Phase::Complete);
                debug!(status = response.status(), "exchange complete");
                Ok(response)
            }
            Err(err) => {
                debug!(phase = %self.phase, error = %err, "exchange failed");
                self.phase = Phase::Failed;
                Err(err)
            }
        }
    }

    fn enter(&mut self, phase: Phase) {
        transition(&mut self.phase, phase);
    }

    fn drive(
        &mut self,
        uri: &Uri,
        mut request: Request,
        options: &RequestOptions,
    ) -> Result<Response, Error> {
        let guard = Guard::new(request.cancel_token().cloned(), options.timeout);
        let (host, port) = endpoint(uri)?;

        self.enter(Phase::Resolving);
        guard.check()?;
        let endpoints = self
            .resolver
            .resolve(host, port)
            .map_err(|source| Error::Resolution {
                host: host.to_string(),
                port,
                source,
            })?;
        if endpoints.is_empty() {
            return Err(no_endpoints(host, port));
        }

        self.enter(Phase::Connecting);
        let mut conn = self.connect_any(&guard, &endpoints, host, uri.scheme())?;

        let result = self.converse(&guard, &mut conn, uri, &mut request, options);
        if let Err(e) = conn.close() {
            warn!(error = %e, "failed to close connection");
        }
        result
    }

    fn connect_any(
        &self,
        guard: &Guard,
        endpoints: &[SocketAddr],
        host: &str,
        scheme: &str,
    ) -> Result<C::Conn, Error> {
        let mut last = None;
        for &addr in endpoints {
            guard.check()?;
            match self
                .connector
                .connect_within(addr, host, scheme, guard.remaining())
            {
                Ok(conn) => {
                    debug!(%addr, "connected");
                    return Ok(conn);
                }
                Err(e) => {
                    debug!(%addr, error = %e, "connect failed");
                    last = Some(e);
                }
            }
        }
        let err = last.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no endpoints"));
        Err(guard.io_error(err))
    }

    fn converse(
        &mut self,
        guard: &Guard,
        conn: &mut C::Conn,
        uri: &Uri,
        request: &mut Request,
        options: &RequestOptions,
    ) -> Result<Response, Error> {
        self.enter(Phase::Sending);
        guard.check()?;
        let (head, mut encoder) = prepare(request, uri, options)?;
        send(guard, conn, &head)?;
        while let Some(frame) = encoder.next_frame()? {
            guard.check()?;
            send(guard, conn, &frame)?;
        }
        conn.flush().map_err(|e| guard.io_error(e))?;

        self.enter(Phase::AwaitingStatusLine);
        let mut decoder = ResponseDecoder::new(request.method() == &Method::HEAD)
            .with_max_body(options.max_body_bytes);
        let mut buf = BytesMut::with_capacity(READ_SIZE);
        let mut chunk = vec![0u8; READ_SIZE];
        loop {
            if decoder.decode(&mut buf)? {
                break;
            }
            self.enter(decoder.phase().into());
            guard.check()?;
            conn.set_timeout(guard.remaining())
                .map_err(|e| guard.io_error(e))?;
            let n = match conn.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(guard.io_error(e)),
            };
            trace!(bytes = n, "read");
            if n == 0 {
                decoder.finish_eof()?;
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        if !buf.is_empty() {
            trace!(bytes = buf.len(), "discarding bytes after the response");
        }
        Ok(decoder.into_response()?)
    }
}

fn send<T: Connection>(guard: &Guard, conn: &mut T, bytes: &[u8]) -> Result<(), Error> {
    conn.set_timeout(guard.remaining())
        .map_err(|e| guard.io_error(e))?;
    conn.write_all(bytes).map_err(|e| guard.io_error(e))?;
    trace!(bytes = bytes.len(), "wrote");
    Ok(())
}

/// Run one exchange over the system resolver and plain TCP.
pub fn exchange(uri: &Uri, request: Request, options: &RequestOptions) -> Result<Response, Error> {
    exchange_with(&SystemResolver, &TcpConnector::new(), uri, request, options)
}

/// Run one exchange over caller-supplied transport seams.
pub fn exchange_with<R: Resolve, C: Connect>(
    resolver: &R,
    connector: &C,
    uri: &Uri,
    request: Request,
    options: &RequestOptions,
) -> Result<Response, Error> {
    Exchange::new(resolver, connector).run(uri, request, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// In-memory peer: serves a canned reply and records what it received.
    struct Scripted {
        reply: io::Cursor<Vec<u8>>,
        sent: Rc<RefCell<Vec<u8>>>,
        closed: Rc<RefCell<u32>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reply.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.sent.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connection for Scripted {
        fn close(&mut self) -> io::Result<()> {
            *self.closed.borrow_mut() += 1;
            Ok(())
        }
    }

    struct ScriptedConnector {
        reply: Vec<u8>,
        sent: Rc<RefCell<Vec<u8>>>,
        closed: Rc<RefCell<u32>>,
    }

    impl ScriptedConnector {
        fn new(reply: &[u8]) -> Self {
            ScriptedConnector {
                reply: reply.to_vec(),
                sent: Rc::default(),
                closed: Rc::default(),
            }
        }

        fn sent(&self) -> String {
            String::from_utf8(self.sent.borrow().clone()).unwrap()
        }
    }

    impl Connect for ScriptedConnector {
        type Conn = Scripted;

        fn connect(&self, _: SocketAddr, _: &str, _: &str) -> io::Result<Scripted> {
            Ok(Scripted {
                reply: io::Cursor::new(self.reply.clone()),
                sent: self.sent.clone(),
                closed: self.closed.clone(),
            })
        }
    }

    fn loopback(_: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok(vec![SocketAddr::from(([127, 0, 0, 1], port))])
    }

    #[test]
    fn request_bytes_on_the_wire() {
        let connector = ScriptedConnector::new(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
        let uri = Uri::parse("http://example.com:8080/a?b=1").unwrap();
        let mut request = Request::get("http://example.com:8080/a?b=1").unwrap();
        request.set_body_text("hi").unwrap();
        let options = RequestOptions::new().with_header("User-Agent", "test/1").unwrap();

        let mut exchange = Exchange::new(&loopback, &connector);
        let mut response = exchange.run(&uri, request, &options).unwrap();

        assert_eq!(exchange.phase(), Phase::Complete);
        assert_eq!(response.text().unwrap(), "ok");
        assert_eq!(
            connector.sent(),
            "GET /a?b=1 HTTP/1.1\r\nHost: example.com:8080\r\n\
             Content-Type: text/plain; charset=utf-8\r\nContent-Length: 2\r\n\
             User-Agent: test/1\r\nConnection: close\r\n\r\nhi"
        );
        assert_eq!(*connector.closed.borrow(), 1);
    }

    #[test]
    fn request_headers_beat_option_headers() {
        let connector = ScriptedConnector::new(b"HTTP/1.1 204 No Content\r\n\r\n");
        let uri = Uri::parse("http://h/").unwrap();
        let request = Request::get("http://h/")
            .unwrap()
            .with_header("user-agent", "mine")
            .unwrap()
            .with_header("Connection", "keep-alive")
            .unwrap();
        exchange_with(&loopback, &connector, &uri, request, &RequestOptions::default()).unwrap();
        let sent = connector.sent();
        assert!(sent.contains("user-agent: mine\r\n"));
        assert!(!sent.contains("User-Agent"));
        assert!(!sent.contains("close"));
    }

    #[test]
    fn protocol_failure_closes_the_connection() {
        let connector = ScriptedConnector::new(b"GARBAGE\r\n\r\n");
        let uri = Uri::parse("http://h/").unwrap();
        let mut exchange = Exchange::new(&loopback, &connector);
        let err = exchange
            .run(&uri, Request::get("http://h/").unwrap(), &RequestOptions::default())
            .unwrap_err();
        assert!(err.is_protocol());
        assert_eq!(exchange.phase(), Phase::Failed);
        assert_eq!(*connector.closed.borrow(), 1);
    }

    #[test]
    fn head_response_has_no_body() {
        let connector = ScriptedConnector::new(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n");
        let uri = Uri::parse("http://h/").unwrap();
        let request = Request::new(Method::HEAD, uri.clone());
        let mut response =
            exchange_with(&loopback, &connector, &uri, request, &RequestOptions::default()).unwrap();
        assert_eq!(response.headers().get("content-length"), Some("100"));
        assert!(response.bytes().unwrap().is_empty());
    }

    #[test]
    fn empty_resolution_is_a_resolution_error() {
        let nothing = |_: &str, _: u16| -> io::Result<Vec<SocketAddr>> { Ok(Vec::new()) };
        let connector = ScriptedConnector::new(b"");
        let uri = Uri::parse("http://h/").unwrap();
        let err = exchange_with(&nothing, &connector, &uri, Request::get("http://h/").unwrap(), &RequestOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[test]
    fn unknown_scheme_without_port_cannot_be_resolved() {
        let connector = ScriptedConnector::new(b"");
        let uri = Uri::parse("gopher://h/").unwrap();
        let err = exchange_with(&loopback, &connector, &uri, Request::get("gopher://h/").unwrap(), &RequestOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Resolution { port: 0, .. }));
    }

    #[test]
    fn precancelled_request_never_resolves() {
        let token = CancelToken::new();
        token.cancel();
        let resolved = RefCell::new(0);
        let counting = |_: &str, port: u16| -> io::Result<Vec<SocketAddr>> {
            *resolved.borrow_mut() += 1;
            loopback("", port)
        };
        let connector = ScriptedConnector::new(b"");
        let uri = Uri::parse("http://h/").unwrap();
        let request = Request::get("http://h/").unwrap().with_cancel_token(token);
        let err = exchange_with(&counting, &connector, &uri, request, &RequestOptions::default())
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(*resolved.borrow(), 0);
    }

    #[test]
    fn guard_prefers_cancellation_over_io_errors() {
        let token = CancelToken::new();
        let guard = Guard::new(Some(token.clone()), None);
        assert!(matches!(
            guard.io_error(io::Error::from(io::ErrorKind::ConnectionReset)),
            Error::Connection(_)
        ));
        token.cancel();
        assert!(guard.io_error(io::Error::from(io::ErrorKind::ConnectionReset)).is_cancelled());
    }

    #[test]
    fn guard_maps_io_timeouts() {
        let guard = Guard::new(None, Some(Duration::from_secs(60)));
        assert!(guard.io_error(io::Error::from(io::ErrorKind::WouldBlock)).is_timeout());
        assert!(guard.remaining().unwrap() <= Duration::from_secs(60));

        let expired = Guard::new(None, Some(Duration::ZERO));
        assert!(expired.check().unwrap_err().is_timeout());
    }
}
