//! Request transports.
//!
//! A [`Transport`] takes a [`Request`] and produces a [`Response`] or an
//! error. It never retries. Two implementations live here:
//!
//! - [`TcpTransport`] — a plain HTTP/1.1 client, one connection per request.
//! - [`CachingTransport`] — wraps any transport and answers repeated
//!   requests from a [`CacheStore`](crate::cache::CacheStore).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::cache::CacheError;
use crate::http::{Request, Response, ResponseError, WireError};

pub mod caching;
pub mod tcp;

pub use caching::{CacheStats, CachingTransport, Exchange, Source};
pub use tcp::TcpTransport;

/// A single request/response exchange.
///
/// Implementations must be shareable across tasks; the returned future must
/// be `Send` so callers can spawn it on a multi-threaded runtime.
pub trait Transport: Send + Sync {
    /// Executes `request` once and returns the response.
    fn round_trip(
        &self,
        request: &Request,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn round_trip(
        &self,
        request: &Request,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send {
        (**self).round_trip(request)
    }
}

/// Errors that end a single exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("request target {0:?} has no host")]
    MissingHost(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("response exceeds maximum allowed size of {max_bytes} bytes")]
    ResponseTooLarge { max_bytes: usize },

    #[error("malformed response: {0}")]
    MalformedResponse(#[from] ResponseError),
}

/// Errors that prevented a successfully fetched response from being cached.
///
/// These never replace the response; they are reported next to it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheWriteError {
    #[error("failed to serialize response: {0}")]
    Serialization(#[from] WireError),

    #[error("failed to store response: {0}")]
    StoreWrite(#[from] CacheError),
}
