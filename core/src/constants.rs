//! Well-known header names, MIME types and scheme ports.
//!
//! All tables are compiled into the binary, so they are shared read-only
//! by every exchange without any initialization step.

/// Well-known port for `scheme`, if it has one.
pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        _ => None,
    }
}

/// Header names from RFC 7230/7231 that the engine reads or writes.
pub mod header {
    pub const CONNECTION: &str = "Connection";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const HOST: &str = "Host";
    pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
    pub const USER_AGENT: &str = "User-Agent";
}

/// MIME types used by the body setters.
pub mod mime {
    pub const APPLICATION_JSON: &str = "application/json";
    pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
    pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
}

/// `User-Agent` sent when neither the request nor the options set one.
pub const DEFAULT_USER_AGENT: &str = concat!("wirefetch/", env!("CARGO_PKG_VERSION"));
