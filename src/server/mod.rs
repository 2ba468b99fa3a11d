//! Minimal async HTTP/1.1 server.
//!
//! Serves as the far end of the client: it accepts TCP connections and
//! dispatches each request to a handler function, honoring keep-alive, until
//! its shutdown token is cancelled. [`hello`] is the handler the
//! `rttp-cache-hello` binary runs.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Greets the caller by peer address.
///
/// The body is `Server says: Hello, "<peer>"!`.
pub async fn hello(request: Request) -> Response {
    let peer = request
        .remote_addr()
        .map_or_else(|| "unknown".to_owned(), |addr| addr.to_string());
    info!(%peer, path = %request.path(), "served");
    Response::new(StatusCode::Ok).body(format!("Server says: Hello, {peer:?}!"))
}

/// A bound HTTP/1.1 server.
///
/// # Examples
///
/// ```rust,no_run
/// use rttp_cache::server::{Server, hello};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(hello, CancellationToken::new()).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections and dispatches requests to `handler` until
    /// `shutdown` is cancelled.
    ///
    /// Each connection runs on its own task. Cancelling `shutdown` stops
    /// accepting; open connections end after the request they are serving.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H, shutdown: CancellationToken) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "listening");

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(address = %self.local_addr, "shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);
            let shutdown = shutdown.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler, shutdown).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// Loops reading one request per iteration until the peer closes the
/// connection, signals `Connection: close`, or the server shuts down.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = tokio::select! {
            _ = shutdown.cancelled(), if buf.is_empty() => break,
            read = stream.read_buf(&mut buf) => read?,
        };

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large — sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            break;
        }

        let (mut request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => continue,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set.
        let total_needed = body_offset + request.content_length().unwrap_or(0);
        if buf.len() < total_needed {
            continue;
        }

        request.set_remote_addr(peer_addr);
        let keep_alive = request.is_keep_alive() && !shutdown.is_cancelled();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = handler(request).await.keep_alive(keep_alive);
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "closing connection");
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    async fn spawn_hello() -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<()>) {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        let token = CancellationToken::new();
        let shutdown = token.clone();
        let handle = tokio::spawn(async move {
            server.run(hello, shutdown).await.unwrap();
        });
        (addr, token, handle)
    }

    #[tokio::test]
    async fn greets_the_peer_and_closes_on_request() {
        let (addr, token, handle) = spawn_hello().await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let local = stream.local_addr().unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();

        let response = Response::parse(&raw).unwrap();
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(
            response.text().unwrap(),
            format!("Server says: Hello, \"{local}\"!")
        );
        assert_eq!(response.headers().get("connection"), Some("close"));

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let (addr, token, handle) = spawn_hello().await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET nowhere HTTP/1.1\r\n\r\n").await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();

        let response = Response::parse(&raw).unwrap();
        assert_eq!(response.status(), StatusCode::BadRequest);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn bind_failure_names_the_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let err = Server::bind(&addr).await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { addr: ref a, .. } if *a == addr));
    }
}
