//! RFC 3986 URI parsing.
//!
//! # Design
//! `Uri::parse` walks the encoded string once, validating each component
//! against its own character class and recording its boundaries. Nothing is
//! percent-decoded: escapes are checked for well-formedness and kept as-is,
//! so `Display` reproduces an equivalent string and re-parsing it yields the
//! same components. Only the scheme and host are case-folded.
//!
//! A `Uri` is immutable. Changing the target of a request means parsing a
//! new one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::default_port;
use crate::error::UriError;

/// A parsed, validated URI or relative reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uri {
    scheme: String,
    user_info: String,
    host: String,
    port: Option<u16>,
    path: String,
    query: String,
    fragment: String,
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

fn is_sub_delim(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'='
    )
}

fn is_scheme_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')
}

fn is_user_info_char(b: u8) -> bool {
    is_unreserved(b) || is_sub_delim(b) || matches!(b, b'%' | b':')
}

fn is_authority_char(b: u8) -> bool {
    is_unreserved(b) || is_sub_delim(b) || matches!(b, b'%' | b':' | b'@' | b'[' | b']')
}

fn is_path_char(b: u8) -> bool {
    is_unreserved(b) || is_sub_delim(b) || matches!(b, b'%' | b'/' | b':' | b'@')
}

fn is_query_char(b: u8) -> bool {
    is_path_char(b) || b == b'?'
}

#[derive(Clone, Copy)]
enum Segment {
    Authority,
    Path,
    Query,
    Fragment,
}

impl Segment {
    fn allows(self, b: u8) -> bool {
        match self {
            Segment::Authority => is_authority_char(b),
            Segment::Path => is_path_char(b),
            Segment::Query | Segment::Fragment => is_query_char(b),
        }
    }

    fn error(self, input: &str, position: usize) -> UriError {
        let found = input.get(position..).and_then(|s| s.chars().next());
        match self {
            Segment::Authority => UriError::InvalidAuthority { position, found },
            Segment::Path => UriError::InvalidPath { position, found },
            Segment::Query => UriError::InvalidQuery { position, found },
            Segment::Fragment => UriError::InvalidFragment { position, found },
        }
    }
}

/// Validate `input[start..end]` against `segment`'s character class,
/// including the shape of every percent escape.
fn validate(input: &str, start: usize, end: usize, segment: Segment) -> Result<(), UriError> {
    let bytes = input.as_bytes();
    let mut i = start;
    while i < end {
        let b = bytes[i];
        if !segment.allows(b) {
            return Err(segment.error(input, i));
        }
        if b == b'%' {
            let well_formed = i + 2 < end
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !well_formed {
                return Err(segment.error(input, i));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

/// Index of the first byte at or after `from` that is one of `stops`, or
/// the end of the input.
fn find_any(bytes: &[u8], from: usize, stops: &[u8]) -> usize {
    bytes[from..]
        .iter()
        .position(|b| stops.contains(b))
        .map_or(bytes.len(), |p| from + p)
}

impl Uri {
    /// Parse an encoded URI or relative reference.
    pub fn parse(encoded: &str) -> Result<Uri, UriError> {
        let bytes = encoded.as_bytes();
        if bytes.is_empty() {
            return Err(UriError::InvalidPath {
                position: 0,
                found: None,
            });
        }

        let mut uri = Uri {
            scheme: String::new(),
            user_info: String::new(),
            host: String::new(),
            port: None,
            path: String::from("/"),
            query: String::new(),
            fragment: String::new(),
        };
        let mut p = 0;

        // A ':' before the first '/' means the leading run is a scheme.
        let first_slash = find_any(bytes, 0, b"/");
        if let Some(colon) = bytes[..first_slash].iter().position(|&b| b == b':') {
            if !bytes[0].is_ascii_alphabetic() {
                return Err(UriError::InvalidScheme {
                    position: 0,
                    found: encoded.chars().next(),
                });
            }
            if let Some(bad) = (1..colon).find(|&i| !is_scheme_char(bytes[i])) {
                return Err(UriError::InvalidScheme {
                    position: bad,
                    found: encoded[bad..].chars().next(),
                });
            }
            uri.scheme = encoded[..colon].to_ascii_lowercase();
            p = colon + 1;
        }

        if bytes[p..].starts_with(b"//") {
            let start = p + 2;
            let end = find_any(bytes, start, b"/?#");
            validate(encoded, start, end, Segment::Authority)?;
            uri.parse_authority(encoded, start, end)?;
            p = end;
        }

        let path_end = find_any(bytes, p, b"?#");
        if path_end > p {
            validate(encoded, p, path_end, Segment::Path)?;
            uri.path = encoded[p..path_end].to_string();
        }
        p = path_end;

        if bytes.get(p) == Some(&b'?') {
            let start = p + 1;
            let end = find_any(bytes, start, b"#");
            validate(encoded, start, end, Segment::Query)?;
            uri.query = encoded[start..end].to_string();
            p = end;
        }

        if bytes.get(p) == Some(&b'#') {
            let start = p + 1;
            validate(encoded, start, bytes.len(), Segment::Fragment)?;
            uri.fragment = encoded[start..].to_string();
        }

        Ok(uri)
    }

    /// Split `input[start..end]` into user-info, host and port. The port is
    /// the trailing digit run after the last ':'; user-info is everything
    /// before an '@' made only of user-info characters.
    fn parse_authority(&mut self, input: &str, start: usize, end: usize) -> Result<(), UriError> {
        let bytes = input.as_bytes();
        let mut host_start = start;
        let mut host_end = end;

        let mut digits = end;
        while digits > start && bytes[digits - 1].is_ascii_digit() {
            digits -= 1;
        }
        if digits > start && bytes[digits - 1] == b':' {
            host_end = digits - 1;
            if digits < end {
                let port = input[digits..end]
                    .parse::<u16>()
                    .map_err(|_| UriError::InvalidAuthority {
                        position: digits,
                        found: None,
                    })?;
                self.port = Some(port);
            }
        }

        let mut u = host_start;
        while u < host_end && is_user_info_char(bytes[u]) {
            u += 1;
        }
        if u < host_end && bytes[u] == b'@' {
            self.user_info = input[host_start..u].to_string();
            host_start = u + 1;
        }

        let host = &input[host_start..host_end];
        if let Some(at) = host.find('@') {
            return Err(UriError::InvalidAuthority {
                position: host_start + at,
                found: Some('@'),
            });
        }
        self.host = host.to_ascii_lowercase();
        Ok(())
    }

    /// Lowercased scheme, empty for a relative reference.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn user_info(&self) -> &str {
        &self.user_info
    }

    /// Lowercased host, empty when the URI has no authority.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The explicit port, if one was written.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The explicit port, or the well-known port for the scheme.
    pub fn port_or_default(&self) -> Option<u16> {
        self.port.or_else(|| default_port(&self.scheme))
    }

    /// Encoded path; never empty.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Encoded query without the leading '?'.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Encoded fragment without the leading '#'.
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// True when the URI has a scheme.
    pub fn is_absolute(&self) -> bool {
        !self.scheme.is_empty()
    }

    fn has_authority(&self) -> bool {
        !self.host.is_empty() || !self.user_info.is_empty() || self.port.is_some()
    }

    /// `[user-info@]host[:port]`.
    pub fn authority(&self) -> String {
        let mut out = String::new();
        if !self.user_info.is_empty() {
            out.push_str(&self.user_info);
            out.push('@');
        }
        out.push_str(&self.host);
        if let Some(port) = self.port {
            out.push(':');
            out.push_str(&port.to_string());
        }
        out
    }

    /// The origin-form request target: path plus `?query` when present.
    pub fn request_target(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.scheme.is_empty() {
            write!(f, "{}:", self.scheme)?;
        }
        // A path starting with "//" needs an (empty) authority in front of it
        // or it would be read back as one.
        if self.has_authority() || self.path.starts_with("//") {
            write!(f, "//{}", self.authority())?;
        }
        f.write_str(&self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uri::parse(s)
    }
}

impl TryFrom<&str> for Uri {
    type Error = UriError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Uri::parse(s)
    }
}

impl TryFrom<String> for Uri {
    type Error = UriError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Uri::parse(&s)
    }
}

impl From<Uri> for String {
    fn from(uri: Uri) -> Self {
        uri.to_string()
    }
}
