//! HTTP/1.1 request descriptors.
//!
//! The same [`Request`] type is built by clients (absolute target URL, sent
//! by a transport) and parsed by the server (origin-form target) using the
//! [`httparse`] crate.

use std::net::SocketAddr;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::url::UrlError;
use super::{Headers, Method, Url};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid request target: {0}")]
    Target(#[from] UrlError),
}

/// An HTTP/1.1 request: method, target URL, headers, and body.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::{Method, Request};
///
/// let request = Request::get("http://localhost:8080/hello?name=world")
///     .unwrap()
///     .header("Accept", "text/plain");
///
/// assert_eq!(request.method(), &Method::Get);
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_string(), Some("name=world"));
/// assert_eq!(request.url().to_string(), "http://localhost:8080/hello?name=world");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Request {
    method: Method,
    url: Url,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Creates an HTTP/1.1 request with no headers and an empty body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            version: 1,
            ..Self::default()
        }
    }

    /// Creates a `GET` request for the given URL string.
    pub fn get(url: &str) -> Result<Self, RequestError> {
        Ok(Self::new(Method::Get, url.parse()?))
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
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
    /// - [`RequestError::Incomplete`] — more data is needed to complete the request headers.
    /// - [`RequestError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`] — a required field (method, path, version) is absent.
    /// - [`RequestError::Target`] — the request target is not a usable URL.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let Ok(method) = raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse::<Method>();

        let url = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?
            .parse()?;

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            header_map.insert_raw(header.name, header.value);
        }

        let body_end = header_map
            .content_length()
            .map_or(buf.len(), |len| (body_offset + len).min(buf.len()));
        let body = Bytes::copy_from_slice(&buf[body_offset..body_end]);

        Ok((
            Self {
                method,
                url,
                version,
                headers: header_map,
                body,
                remote_addr: None,
            },
            body_offset,
        ))
    }

    /// Records the peer address the request arrived from.
    pub fn set_remote_addr(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.url.query()
    }

    /// Returns the request body bytes.
    pub fn payload(&self) -> &Bytes {
        &self.body
    }

    /// Returns the peer address for server-side requests.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.content_length()
    }

    /// Serializes the request for sending on a fresh connection.
    ///
    /// Writes an origin-form request line, a `Host` header derived from the
    /// URL unless one was set, the caller's headers, `Connection: close`
    /// unless a `Connection` header was set, and `Content-Length` when the
    /// body is non-empty.
    pub fn to_wire(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64 + self.body.len());

        buf.put(
            format!(
                "{} {} HTTP/1.{}\r\n",
                self.method,
                self.url.request_target(),
                self.version
            )
            .as_bytes(),
        );

        if !self.headers.contains("host") {
            if let Some(authority) = self.url.authority() {
                buf.put(format!("Host: {authority}\r\n").as_bytes());
            }
        }
        self.headers.write_to(&mut buf);
        if !self.headers.contains("connection") {
            buf.put(&b"Connection: close\r\n"[..]);
        }
        if !self.body.is_empty() && !self.headers.contains("content-length") {
            buf.put(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        buf.put(&b"\r\n"[..]);
        buf.put_slice(&self.body);
        buf
    }
}
