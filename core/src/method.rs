//! Request method tokens.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An HTTP request method. Any valid token is accepted; the standard
/// methods are available as constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Method(MethodRepr);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MethodRepr {
    Standard(&'static str),
    Extension(String),
}

impl Method {
    pub const GET: Method = Method(MethodRepr::Standard("GET"));
    pub const HEAD: Method = Method(MethodRepr::Standard("HEAD"));
    pub const POST: Method = Method(MethodRepr::Standard("POST"));
    pub const PUT: Method = Method(MethodRepr::Standard("PUT"));
    pub const DELETE: Method = Method(MethodRepr::Standard("DELETE"));
    pub const CONNECT: Method = Method(MethodRepr::Standard("CONNECT"));
    pub const OPTIONS: Method = Method(MethodRepr::Standard("OPTIONS"));
    pub const TRACE: Method = Method(MethodRepr::Standard("TRACE"));
    pub const PATCH: Method = Method(MethodRepr::Standard("PATCH"));

    const STANDARD: [Method; 9] = [
        Method::GET,
        Method::HEAD,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::CONNECT,
        Method::OPTIONS,
        Method::TRACE,
        Method::PATCH,
    ];

    /// Validate `token` against the RFC 7230 `token` grammar. Methods are
    /// case-sensitive, so `get` is an extension method, not `GET`.
    pub fn from_token(token: &str) -> Result<Method, Error> {
        if !is_token(token) {
            return Err(Error::InvalidMethod(token.to_string()));
        }
        Ok(Method::STANDARD
            .into_iter()
            .find(|m| m.as_str() == token)
            .unwrap_or_else(|| Method(MethodRepr::Extension(token.to_string()))))
    }

    pub fn as_str(&self) -> &str {
        match &self.0 {
            MethodRepr::Standard(s) => s,
            MethodRepr::Extension(s) => s,
        }
    }
}

/// `tchar` from RFC 7230 section 3.2.6.
pub(crate) fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
        )
}

/// A non-empty run of `tchar`.
pub(crate) fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_tchar)
}

impl Default for Method {
    fn default() -> Self {
        Method::GET
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::from_token(s)
    }
}

impl TryFrom<String> for Method {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Method::from_token(&s)
    }
}

impl From<Method> for String {
    fn from(m: Method) -> Self {
        m.as_str().to_string()
    }
}
