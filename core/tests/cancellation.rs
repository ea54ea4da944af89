//! Cancellation and connection lifecycle, over an in-memory transport that
//! counts how many connections were opened and closed.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wirefetch_core::{
    exchange_with, CancelToken, Connect, Connection, Error, Exchange, Phase, Request,
    RequestOptions, Uri,
};

#[derive(Default)]
struct Counts {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl Counts {
    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// What the fake peer does once connected.
#[derive(Clone)]
enum Script {
    Reply(&'static [u8]),
    /// Reply with the bytes, cancelling the token once they are consumed.
    CancelAfter(&'static [u8], CancelToken),
    /// Every read times out.
    Stall,
}

struct MockConn {
    script: Script,
    reply: io::Cursor<&'static [u8]>,
    counts: Arc<Counts>,
    timeout: Option<Duration>,
}

impl Read for MockConn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &self.script {
            Script::Stall => {
                // Mimics a socket read timeout firing.
                std::thread::sleep(self.timeout.unwrap_or(Duration::from_millis(10)));
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
            Script::CancelAfter(_, token) => {
                let n = self.reply.read(buf)?;
                if n == 0 {
                    token.cancel();
                    Err(io::Error::from(io::ErrorKind::WouldBlock))
                } else {
                    Ok(n)
                }
            }
            Script::Reply(_) => self.reply.read(buf),
        }
    }
}

impl Write for MockConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for MockConn {
    fn close(&mut self) -> io::Result<()> {
        self.counts.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}

struct MockConnector {
    script: Script,
    counts: Arc<Counts>,
    /// Cancelled while the connection is being established.
    cancel_on_connect: Option<CancelToken>,
    refuse: bool,
}

impl MockConnector {
    fn new(script: Script) -> Self {
        MockConnector {
            script,
            counts: Arc::default(),
            cancel_on_connect: None,
            refuse: false,
        }
    }
}

impl Connect for MockConnector {
    type Conn = MockConn;

    fn connect(&self, _: SocketAddr, _: &str, _: &str) -> io::Result<MockConn> {
        if self.refuse {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }
        if let Some(token) = &self.cancel_on_connect {
            token.cancel();
        }
        self.counts.opened.fetch_add(1, Ordering::SeqCst);
        let bytes = match &self.script {
            Script::Reply(b) | Script::CancelAfter(b, _) => *b,
            Script::Stall => &b""[..],
        };
        Ok(MockConn {
            script: self.script.clone(),
            reply: io::Cursor::new(bytes),
            counts: self.counts.clone(),
            timeout: None,
        })
    }
}

fn two_endpoints(_: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    Ok(vec![
        SocketAddr::from(([127, 0, 0, 1], port)),
        SocketAddr::from(([127, 0, 0, 2], port)),
    ])
}

fn target() -> Uri {
    Uri::parse("http://mock.test/resource").unwrap()
}

const OK: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";

// ---------------------------------------------------------------------------

#[test]
fn successful_exchange_closes_its_connection() {
    let connector = MockConnector::new(Script::Reply(OK));
    let resp = exchange_with(
        &two_endpoints,
        &connector,
        &target(),
        Request::get("http://mock.test/resource").unwrap(),
        &RequestOptions::default(),
    )
    .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(connector.counts.opened(), 1);
    assert_eq!(connector.counts.closed(), 1);
}

#[test]
fn cancelled_while_connecting() {
    let token = CancelToken::new();
    let mut connector = MockConnector::new(Script::Reply(OK));
    connector.cancel_on_connect = Some(token.clone());

    let request = Request::get("http://mock.test/resource")
        .unwrap()
        .with_cancel_token(token);
    let mut exchange = Exchange::new(&two_endpoints, &connector);
    let err = exchange
        .run(&target(), request, &RequestOptions::default())
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(exchange.phase(), Phase::Failed);
    assert_eq!(connector.counts.opened(), 1);
    assert_eq!(connector.counts.opened(), connector.counts.closed());
}

#[test]
fn cancelled_while_reading_drops_the_partial_response() {
    let token = CancelToken::new();
    let connector = MockConnector::new(Script::CancelAfter(
        b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial",
        token.clone(),
    ));
    let request = Request::get("http://mock.test/resource")
        .unwrap()
        .with_cancel_token(token);

    let err = exchange_with(&two_endpoints, &connector, &target(), request, &RequestOptions::default())
        .unwrap_err();

    assert!(err.is_cancelled(), "{err:?}");
    assert_eq!(connector.counts.opened(), 1);
    assert_eq!(connector.counts.closed(), 1);
}

#[test]
fn cancelled_before_start_opens_nothing() {
    let token = CancelToken::new();
    token.cancel();
    let connector = MockConnector::new(Script::Reply(OK));
    let request = Request::get("http://mock.test/resource")
        .unwrap()
        .with_cancel_token(token);

    let err = exchange_with(&two_endpoints, &connector, &target(), request, &RequestOptions::default())
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(connector.counts.opened(), 0);
    assert_eq!(connector.counts.closed(), 0);
}

#[test]
fn stalled_peer_times_out_and_is_closed() {
    let connector = MockConnector::new(Script::Stall);
    let options = RequestOptions::new().with_timeout(Duration::from_millis(50));

    let err = exchange_with(
        &two_endpoints,
        &connector,
        &target(),
        Request::get("http://mock.test/resource").unwrap(),
        &options,
    )
    .unwrap_err();

    assert!(err.is_timeout(), "{err:?}");
    assert_eq!(connector.counts.opened(), 1);
    assert_eq!(connector.counts.closed(), 1);
}

#[test]
fn refused_everywhere_is_a_connection_error() {
    let mut connector = MockConnector::new(Script::Reply(OK));
    connector.refuse = true;

    let err = exchange_with(
        &two_endpoints,
        &connector,
        &target(),
        Request::get("http://mock.test/resource").unwrap(),
        &RequestOptions::default(),
    )
    .unwrap_err();

    match err {
        Error::Connection(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionRefused),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(connector.counts.opened(), 0);
}

#[test]
fn resolver_failure_is_a_resolution_error() {
    let failing = |host: &str, _: u16| -> io::Result<Vec<SocketAddr>> {
        Err(io::Error::new(io::ErrorKind::NotFound, format!("unknown host {host}")))
    };
    let connector = MockConnector::new(Script::Reply(OK));

    let err = exchange_with(
        &failing,
        &connector,
        &target(),
        Request::get("http://mock.test/resource").unwrap(),
        &RequestOptions::default(),
    )
    .unwrap_err();

    match err {
        Error::Resolution { host, port, .. } => {
            assert_eq!(host, "mock.test");
            assert_eq!(port, 80);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(connector.counts.opened(), 0);
}
