//! The tokio exchange engine.
//!
//! # Design
//! Same phases and wire codec as [`crate::exchange`], but every boundary is
//! an `.await`, so one runtime can multiplex many exchanges. Each await is
//! bounded by the exchange deadline with `tokio::time::timeout_at`, and
//! cancellation is checked before each one.
//!
//! Streamed request bodies are still read through `std::io::Read`; keep
//! them in memory when the reader could block.
#![allow(async_fn_in_trait)]

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info_span, trace, warn, Instrument};
use uuid::Uuid;

use crate::config::RequestOptions;
use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::uri::Uri;
use crate::wire::ResponseDecoder;
use crate::exchange::{endpoint, no_endpoints, prepare, transition, Guard, Phase, READ_SIZE};

/// Async counterpart of [`crate::transport::Resolve`].
pub trait AsyncResolve {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// Async counterpart of [`crate::transport::Connect`]. Connections are
/// closed with `AsyncWriteExt::shutdown` and then dropped.
pub trait AsyncConnect {
    type Conn: AsyncRead + AsyncWrite + Unpin;

    async fn connect(&self, endpoint: SocketAddr, host: &str, scheme: &str) -> io::Result<Self::Conn>;
}

/// Resolves names with `tokio::net::lookup_host`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioResolver;

impl AsyncResolve for TokioResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        Ok(tokio::net::lookup_host((host, port)).await?.collect())
    }
}

/// Plain TCP over tokio. `https` URIs are refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioConnector;

impl AsyncConnect for TokioConnector {
    type Conn = TcpStream;

    async fn connect(&self, endpoint: SocketAddr, _host: &str, scheme: &str) -> io::Result<TcpStream> {
        if scheme.eq_ignore_ascii_case("https") || scheme.eq_ignore_ascii_case("wss") {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{scheme} needs a TLS-capable connector"),
            ));
        }
        let stream = TcpStream::connect(endpoint).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Await `fut` unless the exchange is cancelled or past its deadline.
async fn bounded<F: Future>(guard: &Guard, fut: F) -> Result<F::Output, Error> {
    guard.check()?;
    match guard.deadline() {
        Some(deadline) => tokio::time::timeout_at(deadline.into(), fut)
            .await
            .map_err(|_| Error::Timeout),
        None => Ok(fut.await),
    }
}

/// Run one exchange over tokio's resolver and TCP.
pub async fn exchange(uri: &Uri, request: Request, options: &RequestOptions) -> Result<Response, Error> {
    exchange_with(&TokioResolver, &TokioConnector, uri, request, options).await
}

/// Run one exchange over caller-supplied async transport seams.
///
/// `uri` picks the endpoint and the `Host` header; the request line uses
/// `request.uri()`.
pub async fn exchange_with<R: AsyncResolve, C: AsyncConnect>(
    resolver: &R,
    connector: &C,
    uri: &Uri,
    request: Request,
    options: &RequestOptions,
) -> Result<Response, Error> {
    let id = Uuid::new_v4();
    let span = info_span!("exchange", %id, method = %request.method(), uri = %uri);
    async move {
        let mut phase = Phase::Idle;
        match drive(&mut phase, resolver, connector, uri, request, options).await {
            Ok(response) => {
                transition(&mut phase, Phase::Complete);
                debug!(status = response.status(), "exchange complete");
                Ok(response)
            }
            Err(err) => {
                debug!(%phase, error = %err, "exchange failed");
                Err(err)
            }
        }
    }
    .instrument(span)
    .await
}

async fn drive<R: AsyncResolve, C: AsyncConnect>(
    phase: &mut Phase,
    resolver: &R,
    connector: &C,
    uri: &Uri,
    mut request: Request,
    options: &RequestOptions,
) -> Result<Response, Error> {
    let guard = Guard::new(request.cancel_token().cloned(), options.timeout);
    let (host, port) = endpoint(uri)?;

    transition(phase, Phase::Resolving);
    let endpoints = bounded(&guard, resolver.resolve(host, port))
        .await?
        .map_err(|source| Error::Resolution {
            host: host.to_string(),
            port,
            source,
        })?;
    if endpoints.is_empty() {
        return Err(no_endpoints(host, port));
    }

    transition(phase, Phase::Connecting);
    let mut last = None;
    let mut opened = None;
    for &addr in &endpoints {
        match bounded(&guard, connector.connect(addr, host, uri.scheme())).await? {
            Ok(conn) => {
                debug!(%addr, "connected");
                opened = Some(conn);
                break;
            }
            Err(e) => {
                debug!(%addr, error = %e, "connect failed");
                last = Some(e);
            }
        }
    }
    let Some(mut conn) = opened else {
        let err = last.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no endpoints"));
        return Err(guard.io_error(err));
    };

    let result = converse(phase, &guard, &mut conn, uri, &mut request, options).await;
    match conn.shutdown().await {
        Err(e) if e.kind() != io::ErrorKind::NotConnected => {
            warn!(error = %e, "failed to close connection");
        }
        _ => {}
    }
    result
}

async fn converse<T: AsyncRead + AsyncWrite + Unpin>(
    phase: &mut Phase,
    guard: &Guard,
    conn: &mut T,
    uri: &Uri,
    request: &mut Request,
    options: &RequestOptions,
) -> Result<Response, Error> {
    transition(phase, Phase::Sending);
    guard.check()?;
    let (head, mut encoder) = prepare(request, uri, options)?;
    bounded(guard, conn.write_all(&head))
        .await?
        .map_err(|e| guard.io_error(e))?;
    while let Some(frame) = encoder.next_frame()? {
        bounded(guard, conn.write_all(&frame))
            .await?
            .map_err(|e| guard.io_error(e))?;
    }
    bounded(guard, conn.flush())
        .await?
        .map_err(|e| guard.io_error(e))?;

    transition(phase, Phase::AwaitingStatusLine);
    let mut decoder = ResponseDecoder::new(request.method() == &Method::HEAD)
        .with_max_body(options.max_body_bytes);
    let mut buf = BytesMut::with_capacity(READ_SIZE);
    loop {
        if decoder.decode(&mut buf)? {
            break;
        }
        transition(phase, decoder.phase().into());
        buf.reserve(READ_SIZE);
        let n = bounded(guard, conn.read_buf(&mut buf))
            .await?
            .map_err(|e| guard.io_error(e))?;
        trace!(bytes = n, "read");
        if n == 0 {
            decoder.finish_eof()?;
            break;
        }
    }
    if !buf.is_empty() {
        trace!(bytes = buf.len(), "discarding bytes after the response");
    }
    Ok(decoder.into_response()?)
}
