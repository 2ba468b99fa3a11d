//! # rttp-cache
//!
//! An in-memory caching layer for HTTP/1.1 request/response exchanges, and a
//! driver that exercises it on a fixed cadence.
//!
//! - [`cache::CacheStore`] — a reader/writer-locked map from request target
//!   to the wire bytes of a response. Flushed only as a whole.
//! - [`transport::CachingTransport`] — wraps any [`transport::Transport`];
//!   serves hits from the store and caches misses, best-effort.
//! - [`driver::Driver`] — one control loop that sends a request on one
//!   interval, flushes the cache on another, and stops on a signal.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rttp_cache::driver::{Driver, DriverConfig, cancel_on_signal};
//! use rttp_cache::http::Request;
//! use rttp_cache::transport::{CachingTransport, TcpTransport};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = CachingTransport::new(TcpTransport::new());
//!     let request = Request::get("http://127.0.0.1:8080")?;
//!     let driver = Driver::new(transport, request, DriverConfig::default());
//!
//!     let shutdown = CancellationToken::new();
//!     cancel_on_signal(shutdown.clone());
//!     let report = driver.run(shutdown).await;
//!     println!("{report:?}");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod driver;
pub mod http;
pub mod server;
pub mod transport;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheError, CacheKey, CacheStore};
pub use driver::{Driver, DriverConfig, DriverReport};
pub use http::{Headers, Method, Request, Response, StatusCode, Url};
pub use server::{Server, ServerError};
pub use transport::{CacheWriteError, CachingTransport, TcpTransport, Transport, TransportError};
