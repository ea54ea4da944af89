//! Outgoing requests.

use std::fmt;

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::message::{HttpMessage, Message};
use crate::method::Method;
use crate::uri::Uri;
use crate::wire;

/// An HTTP request: method, target URI, headers, an optional body and an
/// optional cancellation handle.
///
/// Headers and body can be changed freely until the request is handed to
/// the exchange engine, which takes it by value.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    message: Message,
    cancel: Option<CancelToken>,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Request {
            method,
            uri,
            message: Message::default(),
            cancel: None,
        }
    }

    /// Parse `method` and `uri` and build a request from them.
    pub fn parse(method: &str, uri: &str) -> Result<Self, Error> {
        Ok(Request::new(Method::from_token(method)?, Uri::parse(uri)?))
    }

    pub fn get(uri: &str) -> Result<Self, Error> {
        Ok(Request::new(Method::GET, Uri::parse(uri)?))
    }

    pub fn post(uri: &str) -> Result<Self, Error> {
        Ok(Request::new(Method::POST, Uri::parse(uri)?))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn set_uri(&mut self, uri: Uri) {
        self.uri = uri;
    }

    /// Replace the target with a freshly parsed URI. On error the current
    /// target is left untouched.
    pub fn set_uri_str(&mut self, uri: &str) -> Result<(), Error> {
        self.uri = Uri::parse(uri)?;
        Ok(())
    }

    pub fn cancel_token(&self) -> Option<&CancelToken> {
        self.cancel.as_ref()
    }

    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    /// Builder form of [`Request::set_cancel_token`].
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Builder form of `headers_mut().add(..)`.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        self.headers_mut().add(name, value)?;
        Ok(self)
    }

    /// Serialize the whole request, body included, in HTTP/1.1 wire format.
    /// A body with chunked framing is chunk-encoded.
    pub fn to_bytes(mut self) -> Result<Vec<u8>, Error> {
        let body = self.extract_body()?;
        let framing = wire::ensure_framing(self.headers_mut(), &body)?;
        let host = wire::host_header(&self.uri);
        let mut out = wire::encode_request_head(&self, Some(&host));
        wire::encode_body(body, framing, &mut out)?;
        Ok(out)
    }
}

impl HttpMessage for Request {
    fn message(&self) -> &Message {
        &self.message
    }

    fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }
}

/// The request head: request line, `Host` (unless set explicitly), headers
/// and the terminating blank line.
impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = wire::host_header(&self.uri);
        let head = wire::encode_request_head(self, Some(&host));
        f.write_str(&String::from_utf8_lossy(&head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_serialization() {
        let req = Request::get("http://Example.com:8080/a?b=1")
            .unwrap()
            .with_header("Accept", "*/*")
            .unwrap();
        assert_eq!(
            req.to_string(),
            "GET /a?b=1 HTTP/1.1\r\nHost: example.com:8080\r\nAccept: */*\r\n\r\n"
        );
    }

    #[test]
    fn explicit_host_is_not_duplicated() {
        let req = Request::get("http://example.com/")
            .unwrap()
            .with_header("Host", "other.test")
            .unwrap();
        assert_eq!(req.to_string(), "GET / HTTP/1.1\r\nHost: other.test\r\n\r\n");
    }

    #[test]
    fn to_bytes_includes_body() {
        let mut req = Request::post("http://h/submit").unwrap();
        req.set_body_text("hi").unwrap();
        let bytes = req.to_bytes().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "POST /submit HTTP/1.1\r\nHost: h\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: 2\r\n\r\nhi"
        );
    }

    #[test]
    fn to_bytes_chunk_encodes_unknown_length() {
        let mut req = Request::post("http://h/").unwrap();
        req.set_body(std::io::Cursor::new(b"abc".to_vec()), None, "")
            .unwrap();
        let bytes = req.to_bytes().unwrap();
        assert!(bytes.ends_with(b"Transfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n"));
    }

    #[test]
    fn set_uri_str_reparses() {
        let mut req = Request::get("http://a/").unwrap();
        req.set_uri_str("https://B/x").unwrap();
        assert_eq!(req.uri().host(), "b");
        assert!(req.set_uri_str("1bad://x").is_err());
        assert_eq!(req.uri().host(), "b");
    }

    #[test]
    fn invalid_method_is_rejected() {
        assert!(matches!(
            Request::parse("BAD METHOD", "http://h/"),
            Err(Error::InvalidMethod(_))
        ));
    }
}
