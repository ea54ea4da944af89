//! Seams between the exchange engine and the network.
//!
//! # Design
//! The engine never opens sockets itself. It asks a [`Resolve`] for
//! candidate endpoints and a [`Connect`] for a [`Connection`] to one of
//! them, so tests can substitute in-memory peers and callers can bring
//! their own TLS. [`SystemResolver`] and [`TcpConnector`] are the std
//! defaults; they speak plain TCP only.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Maps a host name and port to candidate socket addresses.
pub trait Resolve {
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

impl<F> Resolve for F
where
    F: Fn(&str, u16) -> io::Result<Vec<SocketAddr>>,
{
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        self(host, port)
    }
}

/// A byte stream carrying exactly one exchange.
pub trait Connection: Read + Write {
    /// Close the connection. Called exactly once, on success and on failure.
    fn close(&mut self) -> io::Result<()>;

    /// Bound the next read or write. `None` clears the bound.
    fn set_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }
}

/// Opens connections to resolved endpoints.
pub trait Connect {
    type Conn: Connection;

    /// Connect to `endpoint`. `host` and `scheme` come from the request URI
    /// and let a secure transport pick SNI and decide whether to use TLS.
    fn connect(&self, endpoint: SocketAddr, host: &str, scheme: &str) -> io::Result<Self::Conn>;

    /// Like [`connect`](Connect::connect), but gives up once `timeout`
    /// elapses. The engine calls this with what is left of the exchange
    /// deadline; connectors that cannot bound the handshake ignore it.
    fn connect_within(
        &self,
        endpoint: SocketAddr,
        host: &str,
        scheme: &str,
        _timeout: Option<Duration>,
    ) -> io::Result<Self::Conn> {
        self.connect(endpoint, host, scheme)
    }
}

/// Resolves names with the operating system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        // IPv6 literals arrive bracketed from the URI authority.
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        Ok((host, port).to_socket_addrs()?.collect())
    }
}

/// Plain TCP connections. `https` URIs are refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on an endpoint that has not accepted within `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

impl Connect for TcpConnector {
    type Conn = TcpStream;

    fn connect(&self, endpoint: SocketAddr, host: &str, scheme: &str) -> io::Result<TcpStream> {
        self.connect_within(endpoint, host, scheme, None)
    }

    fn connect_within(
        &self,
        endpoint: SocketAddr,
        _host: &str,
        scheme: &str,
        timeout: Option<Duration>,
    ) -> io::Result<TcpStream> {
        if scheme.eq_ignore_ascii_case("https") || scheme.eq_ignore_ascii_case("wss") {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{scheme} needs a TLS-capable connector"),
            ));
        }
        let bound = match (self.connect_timeout, timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let stream = match bound {
            // A zero duration is rejected by the socket API.
            Some(t) => TcpStream::connect_timeout(&endpoint, t.max(Duration::from_millis(1)))?,
            None => TcpStream::connect(endpoint)?,
        };
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl Connection for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        // A zero duration is rejected by the socket API.
        let timeout = timeout.map(|t| t.max(Duration::from_millis(1)));
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_resolver_handles_literals() {
        let addrs = SystemResolver.resolve("127.0.0.1", 8080).unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:8080".parse().unwrap()]);

        let addrs = SystemResolver.resolve("[::1]", 80).unwrap();
        assert_eq!(addrs, vec!["[::1]:80".parse().unwrap()]);
    }

    #[test]
    fn closures_resolve() {
        let fixed = |_: &str, port: u16| -> io::Result<Vec<SocketAddr>> {
            Ok(vec![SocketAddr::from(([10, 0, 0, 1], port))])
        };
        assert_eq!(fixed.resolve("any", 81).unwrap()[0].port(), 81);
    }

    #[test]
    fn tcp_connector_refuses_tls_schemes() {
        let err = TcpConnector::new()
            .connect("127.0.0.1:1".parse().unwrap(), "h", "https")
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn connect_gives_up_at_the_deadline() {
        // A listener that never accepts stops completing handshakes once its
        // backlog is full.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut held = Vec::new();
        let bound = Duration::from_millis(200);
        let started = std::time::Instant::now();
        let err = loop {
            match TcpConnector::new().connect_within(addr, "127.0.0.1", "http", Some(bound)) {
                Ok(conn) => held.push(conn),
                Err(e) => break e,
            }
            assert!(held.len() < 4096, "backlog never filled");
        };
        assert_eq!(err.kind(), io::ErrorKind::TimedOut, "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
        drop(listener);
    }

    #[test]
    fn tcp_round_trip() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let mut conn = TcpConnector::new()
            .with_connect_timeout(Duration::from_secs(5))
            .connect(addr, "127.0.0.1", "http")
            .unwrap();
        conn.set_timeout(Some(Duration::from_secs(5))).unwrap();
        conn.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        conn.close().unwrap();
        server.join().unwrap();
    }
}
