//! HTTP/1.1 responses: a fluent builder, wire serialization, and parsing.
//!
//! Two serializations exist. [`Response::into_bytes`] is what the server
//! writes: it fills in `Content-Type`, `Connection`, and `Content-Length`.
//! [`Response::to_wire`] is a faithful dump of the response as it stands,
//! which [`Response::parse_for`] reads back into an equal response. The
//! cache stores the latter.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{Headers, Method, StatusCode};

/// Errors produced while parsing a response from its wire form.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("status code {0} is not three digits")]
    InvalidStatus(u16),

    #[error("invalid chunk size line in chunked body")]
    InvalidChunk,
}

/// Errors produced while dumping a response to its wire form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    #[error("invalid value for header {0:?}")]
    InvalidHeaderValue(String),

    #[error("invalid reason phrase {0:?}")]
    InvalidReason(String),

    #[error("Content-Length is {declared} but the body has {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },
}

/// An HTTP/1.1 response.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    /// Reason phrase as received; `None` means the canonical one.
    reason: Option<String>,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
    keep_alive: bool,
}

impl Response {
    /// Maximum number of headers accepted when parsing.
    const MAX_HEADERS: usize = 64;

    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            version: 1,
            headers: Headers::new(),
            body: Bytes::new(),
            keep_alive: true,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// Controls whether [`into_bytes`](Self::into_bytes) writes
    /// `Connection: keep-alive` or `Connection: close`.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the reason phrase, falling back to the canonical one.
    pub fn reason(&self) -> &str {
        self.reason
            .as_deref()
            .unwrap_or_else(|| self.status.canonical_reason())
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body. Cloning the returned [`Bytes`] is cheap, so the
    /// body can be read any number of times.
    pub fn payload(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as UTF-8 text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Serializes the response for the server to write, in HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body is non-empty and no
    ///   `Content-Type` header was set.
    /// - `Connection: keep-alive` or `Connection: close`.
    /// - `Content-Length: <n>`, replacing any length the handler set.
    pub fn into_bytes(mut self) -> BytesMut {
        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.set("Connection", connection);
        self.headers.remove("transfer-encoding");
        self.headers
            .set("Content-Length", self.body.len().to_string());

        let mut buf = BytesMut::with_capacity(self.estimated_size());
        self.write_wire(&mut buf);
        buf
    }

    /// Dumps the complete response (status line, headers, blank line and
    /// body) exactly as it would appear on the wire.
    ///
    /// Headers are written in order and unchanged. `Content-Length` is
    /// appended only when neither it nor `Transfer-Encoding` is present; a
    /// chunked response has its body written as a single chunk.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if a header name, header value, or reason
    /// phrase cannot be represented on the wire, or if a declared
    /// `Content-Length` disagrees with the body. Such a dump would not parse
    /// back into this response.
    pub fn to_wire(&self) -> Result<Bytes, WireError> {
        self.validate()?;
        let mut buf = BytesMut::with_capacity(self.estimated_size());
        self.write_wire(&mut buf);
        Ok(buf.freeze())
    }

    /// Parses a response from its wire form, assuming it answers a `GET`.
    ///
    /// See [`parse_for`](Self::parse_for).
    pub fn parse(buf: &[u8]) -> Result<Self, ResponseError> {
        Self::parse_for(buf, &Method::Get)
    }

    /// Parses a response from its wire form, in the context of the request
    /// method that produced it.
    ///
    /// A response to `HEAD`, and any 1xx, 204, or 304 response, has no body
    /// regardless of its framing headers. Otherwise the body is delimited by
    /// the chunked transfer coding, by `Content-Length`, or by the end of
    /// `buf`, in that order of precedence.
    ///
    /// # Errors
    ///
    /// - [`ResponseError::Incomplete`] — the head or a delimited body is truncated.
    /// - [`ResponseError::Parse`] — the status line or headers are malformed.
    /// - [`ResponseError::InvalidStatus`] — the status code is below 100.
    /// - [`ResponseError::InvalidChunk`] — a chunk-size line is malformed.
    pub fn parse_for(buf: &[u8], method: &Method) -> Result<Self, ResponseError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Response::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(ResponseError::Incomplete),
        };

        // httparse only reports Complete once the status line is present.
        let code = raw.code.ok_or(ResponseError::Incomplete)?;
        let status = StatusCode::from_u16(code).ok_or(ResponseError::InvalidStatus(code))?;
        let reason = raw
            .reason
            .filter(|r| *r != status.canonical_reason())
            .map(str::to_owned);

        let mut header_map = Headers::with_capacity(raw.headers.len());
        for header in raw.headers.iter() {
            header_map.insert_raw(header.name, header.value);
        }

        let rest = &buf[body_offset..];
        let body = if *method == Method::Head || status.forbids_body() {
            Bytes::new()
        } else if header_map.is_chunked() {
            decode_chunked(rest)?
        } else if let Some(len) = header_map.content_length() {
            let bytes = rest.get(..len).ok_or(ResponseError::Incomplete)?;
            Bytes::copy_from_slice(bytes)
        } else {
            Bytes::copy_from_slice(rest)
        };

        Ok(Self {
            status,
            reason,
            version: raw.version.unwrap_or(1),
            headers: header_map,
            body,
            keep_alive: true,
        })
    }

    fn estimated_size(&self) -> usize {
        128 + self.headers.len() * 64 + self.body.len()
    }

    fn validate(&self) -> Result<(), WireError> {
        if let Some(reason) = &self.reason {
            if reason.bytes().any(|b| matches!(b, b'\r' | b'\n')) {
                return Err(WireError::InvalidReason(reason.clone()));
            }
        }
        for (name, value) in self.headers.iter() {
            if name.is_empty() || !name.bytes().all(is_token_byte) {
                return Err(WireError::InvalidHeaderName(name.to_owned()));
            }
            if value.iter().any(|b| matches!(b, b'\r' | b'\n' | b'\0')) {
                return Err(WireError::InvalidHeaderValue(name.to_owned()));
            }
        }
        if !self.status.forbids_body() && !self.headers.is_chunked() {
            if let Some(declared) = self.headers.content_length() {
                if declared != self.body.len() {
                    return Err(WireError::LengthMismatch {
                        declared,
                        actual: self.body.len(),
                    });
                }
            }
        }
        Ok(())
    }

    fn write_wire(&self, buf: &mut BytesMut) {
        // Status line
        buf.put(
            format!(
                "HTTP/1.{} {} {}\r\n",
                self.version,
                self.status.as_u16(),
                self.reason()
            )
            .as_bytes(),
        );

        // Headers
        self.headers.write_to(buf);

        let chunked = self.headers.is_chunked();
        if !chunked && !self.headers.contains("content-length") && !self.status.forbids_body() {
            buf.put(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }

        // Header/body separator
        buf.put(&b"\r\n"[..]);

        if chunked {
            if !self.body.is_empty() {
                buf.put(format!("{:x}\r\n", self.body.len()).as_bytes());
                buf.put_slice(&self.body);
                buf.put(&b"\r\n"[..]);
            }
            buf.put(&b"0\r\n\r\n"[..]);
        } else {
            buf.put_slice(&self.body);
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

/// RFC 9110 `tchar`.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Decodes a chunked body, ignoring chunk extensions and trailers.
fn decode_chunked(mut data: &[u8]) -> Result<Bytes, ResponseError> {
    let mut body = BytesMut::new();
    loop {
        let (consumed, size) = match httparse::parse_chunk_size(data) {
            Ok(httparse::Status::Complete(pair)) => pair,
            Ok(httparse::Status::Partial) => return Err(ResponseError::Incomplete),
            Err(_) => return Err(ResponseError::InvalidChunk),
        };
        data = &data[consumed..];
        if size == 0 {
            return Ok(body.freeze());
        }

        let size = usize::try_from(size).map_err(|_| ResponseError::Incomplete)?;
        let chunk = data.get(..size).ok_or(ResponseError::Incomplete)?;
        body.put_slice(chunk);
        data = data
            .get(size..)
            .and_then(|rest| rest.strip_prefix(b"\r\n"))
            .ok_or(ResponseError::Incomplete)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: impl AsRef<[u8]>) -> String {
        String::from_utf8(bytes.as_ref().to_vec()).unwrap()
    }

    #[test]
    fn simple_ok_response() {
        let r = Response::new(StatusCode::Ok).body("Hello");
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn no_body_no_content_type() {
        let r = Response::new(StatusCode::NoContent);
        let s = to_string(r.into_bytes());
        assert!(!s.contains("Content-Type"));
        assert!(s.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn connection_close() {
        let r = Response::new(StatusCode::Ok).keep_alive(false);
        let s = to_string(r.into_bytes());
        assert!(s.contains("Connection: close\r\n"));
    }

    #[test]
    fn dump_keeps_headers_verbatim() {
        let r = Response::new(StatusCode::NotFound)
            .header("X-Request-Id", "abc-123")
            .body("gone");
        let s = to_string(r.to_wire().unwrap());
        assert_eq!(
            s,
            "HTTP/1.1 404 Not Found\r\nX-Request-Id: abc-123\r\nContent-Length: 4\r\n\r\ngone"
        );
    }

    #[test]
    fn wire_round_trip_is_byte_identical() {
        let original = Response::new(StatusCode::Ok)
            .header("Content-Type", "text/plain")
            .header("Set-Cookie", "a=1")
            .header("Set-Cookie", "b=2")
            .body("ok");
        let wire = original.to_wire().unwrap();

        let parsed = Response::parse(&wire).unwrap();
        assert_eq!(parsed.status(), StatusCode::Ok);
        assert_eq!(parsed.payload().as_ref(), b"ok");
        assert_eq!(parsed.headers().get("content-length"), Some("2"));
        let cookies: Vec<_> = parsed.headers().get_all("set-cookie").collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);

        assert_eq!(parsed.to_wire().unwrap(), wire);
    }

    #[test]
    fn custom_reason_survives_round_trip() {
        let wire = b"HTTP/1.0 200 Fine\r\nContent-Length: 0\r\n\r\n";
        let parsed = Response::parse(wire).unwrap();
        assert_eq!(parsed.reason(), "Fine");
        assert_eq!(parsed.version(), 0);
        assert_eq!(parsed.to_wire().unwrap().as_ref(), wire);
    }

    #[test]
    fn head_response_has_no_body() {
        let wire = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n";
        assert!(matches!(Response::parse(wire), Err(ResponseError::Incomplete)));
        let parsed = Response::parse_for(wire, &Method::Head).unwrap();
        assert!(parsed.payload().is_empty());
        assert_eq!(parsed.headers().content_length(), Some(5));
    }

    #[test]
    fn body_until_end_without_length() {
        let parsed = Response::parse(b"HTTP/1.1 200 OK\r\nServer: x\r\n\r\nstream").unwrap();
        assert_eq!(parsed.text(), Some("stream"));
    }

    #[test]
    fn chunked_body_is_decoded_and_rechunked() {
        let wire = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                     3\r\nabc\r\n4;ext=1\r\ndefg\r\n0\r\nTrailer: x\r\n\r\n";
        let parsed = Response::parse(wire).unwrap();
        assert_eq!(parsed.text(), Some("abcdefg"));

        let dumped = to_string(parsed.to_wire().unwrap());
        assert_eq!(
            dumped,
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n7\r\nabcdefg\r\n0\r\n\r\n"
        );
    }

    #[test]
    fn truncated_chunk_is_incomplete() {
        let wire = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\na\r\nabc";
        assert!(matches!(Response::parse(wire), Err(ResponseError::Incomplete)));
    }

    #[test]
    fn unregistered_status_round_trips() {
        let wire = b"HTTP/1.1 299 Custom\r\nContent-Length: 2\r\n\r\nok";
        let parsed = Response::parse(wire).unwrap();
        assert_eq!(parsed.status().as_u16(), 299);
        assert_eq!(parsed.reason(), "Custom");
        assert_eq!(parsed.to_wire().unwrap().as_ref(), wire);

        let bare = Response::new(StatusCode::Other(599)).body("x");
        let wire = bare.to_wire().unwrap();
        assert_eq!(to_string(&wire), "HTTP/1.1 599 \r\nContent-Length: 1\r\n\r\nx");
        let reparsed = Response::parse(&wire).unwrap();
        assert_eq!(reparsed.status(), StatusCode::Other(599));
        assert_eq!(reparsed.to_wire().unwrap(), wire);
    }

    #[test]
    fn status_below_100_is_rejected() {
        let wire = b"HTTP/1.1 099 Odd\r\n\r\n";
        assert!(matches!(
            Response::parse(wire),
            Err(ResponseError::InvalidStatus(99))
        ));
    }

    #[test]
    fn non_utf8_header_survives_round_trip() {
        let wire = b"HTTP/1.1 200 OK\r\nX-Name: caf\xe9\r\nContent-Length: 2\r\n\r\nok";
        let parsed = Response::parse(wire).unwrap();
        assert_eq!(parsed.headers().get_raw("x-name"), Some(&b"caf\xe9"[..]));
        assert_eq!(parsed.to_wire().unwrap().as_ref(), wire);
    }

    #[test]
    fn length_mismatch_cannot_be_dumped() {
        let r = Response::new(StatusCode::Ok)
            .header("Content-Length", "10")
            .body("ok");
        assert_eq!(
            r.to_wire(),
            Err(WireError::LengthMismatch {
                declared: 10,
                actual: 2
            })
        );

        // No body is expected for these, whatever the header says.
        let r = Response::new(StatusCode::NotModified).header("Content-Length", "10");
        assert!(r.to_wire().is_ok());
        let r = Response::new(StatusCode::Ok)
            .header("Transfer-Encoding", "chunked")
            .header("Content-Length", "10")
            .body("ok");
        assert!(r.to_wire().is_ok());
    }

    #[test]
    fn invalid_header_value_cannot_be_dumped() {
        let r = Response::new(StatusCode::Ok).header("X-Bad", "a\r\nInjected: yes");
        assert_eq!(
            r.to_wire(),
            Err(WireError::InvalidHeaderValue("X-Bad".into()))
        );

        let r = Response::new(StatusCode::Ok).header("Bad Name", "v");
        assert!(matches!(r.to_wire(), Err(WireError::InvalidHeaderName(_))));
    }
}
