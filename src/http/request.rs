//! HTTP/1.1 request head parsing using the [`httparse`] crate, plus a small
//! builder for constructing requests in-process.

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method, header};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// An HTTP request as seen by the router.
///
/// Only the method and the negotiated headers drive routing; path, query and
/// body are carried through to handlers untouched.
///
/// # Examples
///
/// ```
/// use conneg::http::{Method, Request};
///
/// let raw = b"GET /books HTTP/1.1\r\nHost: localhost\r\nAccept: application/json\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
/// assert_eq!(request.method(), &Method::Get);
/// assert_eq!(request.accept(), "application/json");
/// assert_eq!(request.content_type(), "");
///
/// let built = Request::new(Method::Post, "/books")
///     .with_header("Content-Type", "application/vnd.acme.book+json; v=2");
/// assert_eq!(built.content_type(), "application/vnd.acme.book+json; v=2");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method,
            path,
            query,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body begins
    /// in `buf` (i.e. immediately after the `\r\n\r\n` header terminator).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`]: more data is needed to complete the request headers.
    /// - [`RequestError::Parse`]: the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`]: the method or path is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?;
        let method = match method.parse::<Method>() {
            Ok(method) => method,
            Err(never) => match never {},
        };

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;
        let (path, query) = split_target(target);

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for h in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(h.value) {
                header_map.insert(h.name, value);
            }
        }

        let request = Self {
            method,
            path,
            query,
            headers: header_map,
            body: Bytes::copy_from_slice(&buf[body_offset..]),
        };
        Ok((request, body_offset))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The combined `Accept` header value, empty when absent.
    pub fn accept(&self) -> String {
        self.headers.get_joined(header::ACCEPT).unwrap_or_default()
    }

    /// The `Content-Type` header value, empty when absent.
    pub fn content_type(&self) -> &str {
        self.headers.get(header::CONTENT_TYPE).unwrap_or("")
    }

    /// The combined `Accept-Encoding` header value, empty when absent.
    pub fn accept_encoding(&self) -> String {
        self.headers
            .get_joined(header::ACCEPT_ENCODING)
            .unwrap_or_default()
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
        None => (target.to_owned(), None),
    }
}
