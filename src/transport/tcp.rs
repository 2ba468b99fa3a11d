//! Plain-TCP HTTP/1.1 client transport.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::{Transport, TransportError};
use crate::http::{Method, Request, Response, ResponseError};

/// Maximum size of a response we will buffer (8 MiB).
const MAX_RESPONSE_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per exchange.
const INITIAL_BUF_SIZE: usize = 4096;

/// Sends each request over a fresh TCP connection and reads one response.
///
/// Requests go out with `Connection: close`. The response is complete once
/// its `Content-Length` or chunked body has arrived, or when the server
/// closes the connection. Only the `http` scheme is supported.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    timeout: Option<Duration>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds each exchange, from connect to last byte, by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let url = request.url();
        match url.scheme() {
            Some(scheme) if scheme.eq_ignore_ascii_case("http") => {}
            other => {
                return Err(TransportError::UnsupportedScheme(
                    other.unwrap_or_default().to_owned(),
                ));
            }
        }
        let host = url
            .host()
            .ok_or_else(|| TransportError::MissingHost(url.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = url.port_or_known_default().unwrap_or(80);

        let mut stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| TransportError::Connect {
                addr: format!("{host}:{port}"),
                source: e,
            })?;
        debug!(%host, port, method = %request.method(), "connected");

        stream.write_all(&request.to_wire()).await?;
        stream.flush().await?;

        let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
        loop {
            let bytes_read = stream.read_buf(&mut buf).await?;
            if bytes_read == 0 {
                break;
            }
            if buf.len() > MAX_RESPONSE_SIZE {
                return Err(TransportError::ResponseTooLarge {
                    max_bytes: MAX_RESPONSE_SIZE,
                });
            }
            // Stop early when the framing says the body is complete, so a
            // server that ignores `Connection: close` cannot stall us.
            match Response::parse_for(&buf, request.method()) {
                Ok(response) if is_delimited(&response, request.method()) => {
                    return Ok(response);
                }
                Ok(_) | Err(ResponseError::Incomplete) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        debug!(bytes = buf.len(), "connection closed by peer");
        Ok(Response::parse_for(&buf, request.method())?)
    }
}

/// Returns `true` if the response's length is known without reading to EOF.
fn is_delimited(response: &Response, method: &Method) -> bool {
    *method == Method::Head
        || response.status().forbids_body()
        || response.headers().is_chunked()
        || response.headers().content_length().is_some()
}

impl Transport for TcpTransport {
    async fn round_trip(&self, request: &Request) -> Result<Response, TransportError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.send(request))
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => self.send(request).await,
        }
    }
}
