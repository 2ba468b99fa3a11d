//! A transport that answers repeated requests from memory.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use super::{CacheWriteError, Transport, TransportError};
use crate::cache::{CacheKey, CacheStore, DEFAULT_CAPACITY};
use crate::http::{Request, Response};

/// Where the response of an [`Exchange`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Rebuilt from a stored entry; the inner transport was not used.
    Cache,
    /// Fetched through the inner transport.
    Network,
}

/// The full outcome of one call to [`CachingTransport::exchange`].
#[derive(Debug)]
pub struct Exchange {
    pub response: Response,
    pub source: Source,
    /// Set when a fetched response could not be cached. The response is
    /// still valid.
    pub cache_error: Option<CacheWriteError>,
}

impl Exchange {
    pub fn is_hit(&self) -> bool {
        self.source == Source::Cache
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}

/// A point-in-time copy of a [`CachingTransport`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stored: u64,
    pub cache_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stored: AtomicU64,
    cache_errors: AtomicU64,
}

/// Wraps a [`Transport`] with an in-memory response cache.
///
/// Each request is keyed by its target URL. A hit is rebuilt from the stored
/// wire bytes without touching the inner transport. A miss is delegated
/// unchanged; the response is then dumped to wire form and stored, and the
/// original response is handed back.
///
/// Caching is best-effort: if the response cannot be serialized or stored,
/// the caller still gets it, with the failure attached (see
/// [`exchange`](Self::exchange)). Through the [`Transport`] impl such
/// failures are only logged.
///
/// Concurrent misses for one key are not coalesced. Each goes to the inner
/// transport and the last one to finish owns the entry, even if it was the
/// first to be sent.
///
/// # Examples
///
/// ```rust,no_run
/// use rttp_cache::http::Request;
/// use rttp_cache::transport::{CachingTransport, TcpTransport, Transport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = CachingTransport::new(TcpTransport::new());
/// let request = Request::get("http://127.0.0.1:8080/")?;
///
/// let first = transport.exchange(&request).await?;
/// let second = transport.exchange(&request).await?;
/// assert!(!first.is_hit());
/// assert!(second.is_hit());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CachingTransport<T> {
    inner: T,
    store: Arc<CacheStore>,
    counters: Counters,
}

impl<T: Transport> CachingTransport<T> {
    /// Wraps `inner` with a fresh store sized for [`DEFAULT_CAPACITY`] entries.
    pub fn new(inner: T) -> Self {
        Self::with_capacity(inner, DEFAULT_CAPACITY)
    }

    /// Wraps `inner` with a fresh store sized for `capacity` entries.
    pub fn with_capacity(inner: T, capacity: usize) -> Self {
        Self::with_store(inner, Arc::new(CacheStore::with_capacity(capacity)))
    }

    /// Wraps `inner` around an existing store.
    pub fn with_store(inner: T, store: Arc<CacheStore>) -> Self {
        Self {
            inner,
            store,
            counters: Counters::default(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Flushes every cached response.
    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stored: self.counters.stored.load(Ordering::Relaxed),
            cache_errors: self.counters.cache_errors.load(Ordering::Relaxed),
        }
    }

    /// Answers `request` from the cache, or fetches and caches it.
    ///
    /// A stored entry that no longer parses is treated as a miss; the
    /// fetched response replaces it.
    ///
    /// # Errors
    ///
    /// Any error from the inner transport, unchanged. Nothing is cached.
    ///
    /// Failures to serialize or store a fetched response are not errors;
    /// they are reported in [`Exchange::cache_error`].
    pub async fn exchange(&self, request: &Request) -> Result<Exchange, TransportError> {
        let key = CacheKey::from(request);

        if let Ok(entry) = self.store.get(key.as_str()) {
            match Response::parse_for(&entry, request.method()) {
                Ok(response) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "cache hit");
                    return Ok(Exchange {
                        response,
                        source: Source::Cache,
                        cache_error: None,
                    });
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "unreadable cache entry, refetching");
                }
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "cache miss");
        let response = self.inner.round_trip(request).await?;

        let cache_error = match response.to_wire() {
            Ok(wire) => self
                .store
                .set(key.clone(), wire)
                .err()
                .map(CacheWriteError::from),
            Err(e) => Some(CacheWriteError::from(e)),
        };

        match &cache_error {
            None => {
                self.counters.stored.fetch_add(1, Ordering::Relaxed);
            }
            Some(_) => {
                self.counters.cache_errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(Exchange {
            response,
            source: Source::Network,
            cache_error,
        })
    }
}

impl<T: Transport> Transport for CachingTransport<T> {
    async fn round_trip(&self, request: &Request) -> Result<Response, TransportError> {
        let exchange = self.exchange(request).await?;
        if let Some(e) = &exchange.cache_error {
            warn!(target_url = %request.url(), error = %e, "response returned uncached");
        }
        Ok(exchange.into_response())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::cache::CacheError;
    use crate::http::{Method, StatusCode, WireError};

    type Reply = Box<dyn Fn(&Request) -> Result<Response, TransportError> + Send + Sync>;

    struct Stub {
        calls: AtomicUsize,
        reply: Reply,
    }

    impl Stub {
        fn new(reply: impl Fn(&Request) -> Result<Response, TransportError> + Send + Sync + 'static) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reply: Box::new(reply),
            }
        }

        fn ok() -> Self {
            Self::new(|_| Ok(Response::new(StatusCode::Ok).body("ok")))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for Stub {
        async fn round_trip(&self, request: &Request) -> Result<Response, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            (self.reply)(request)
        }
    }

    fn get(url: &str) -> Request {
        Request::get(url).unwrap()
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let transport = CachingTransport::new(Stub::ok());
        let request = get("http://h/x");

        let first = transport.exchange(&request).await.unwrap();
        assert_eq!(first.source, Source::Network);
        assert_eq!(first.response.status(), StatusCode::Ok);
        assert_eq!(first.response.text(), Some("ok"));
        assert!(first.cache_error.is_none());
        assert_eq!(transport.store().len(), 1);
        assert!(transport.store().get("http://h/x").is_ok());

        let second = transport.exchange(&request).await.unwrap();
        assert!(second.is_hit());
        assert_eq!(second.response.status(), StatusCode::Ok);
        assert_eq!(second.response.text(), Some("ok"));
        assert_eq!(transport.inner().calls(), 1);

        assert_eq!(
            transport.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                stored: 1,
                cache_errors: 0
            }
        );
    }

    #[tokio::test]
    async fn miss_returns_original_response() {
        let transport = CachingTransport::new(Stub::ok());
        let request = get("http://h/x");

        let fetched = transport.exchange(&request).await.unwrap().into_response();
        assert_eq!(fetched, Response::new(StatusCode::Ok).body("ok"));
        assert!(!fetched.headers().contains("content-length"));

        let cached = transport.exchange(&request).await.unwrap().into_response();
        assert_eq!(cached.headers().get("content-length"), Some("2"));
    }

    #[tokio::test]
    async fn distinct_targets_are_cached_separately() {
        let transport = CachingTransport::new(Stub::new(|req| {
            Ok(Response::new(StatusCode::Ok).body(req.url().to_string()))
        }));

        for url in ["http://h/x", "http://h/x/", "http://h/x?b=2&a=1", "http://h/x?a=1&b=2"] {
            let response = transport.exchange(&get(url)).await.unwrap().response;
            assert_eq!(response.text(), Some(url));
        }
        assert_eq!(transport.inner().calls(), 4);
        assert_eq!(transport.store().len(), 4);
    }

    #[tokio::test]
    async fn transport_errors_propagate_and_cache_nothing() {
        let transport = CachingTransport::new(Stub::new(|_| {
            Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "refused",
            )))
        }));
        let request = get("http://h/x");

        let err = transport.exchange(&request).await.unwrap_err();
        match err {
            TransportError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionRefused),
            other => panic!("unexpected error: {other}"),
        }
        assert!(transport.store().is_empty());

        assert!(transport.round_trip(&request).await.is_err());
        assert_eq!(transport.inner().calls(), 2);
    }

    #[tokio::test]
    async fn serialization_failure_still_returns_response() {
        let transport = CachingTransport::new(Stub::new(|_| {
            Ok(Response::new(StatusCode::Ok)
                .header("X-Bad", "line\r\nbreak")
                .body("ok"))
        }));
        let request = get("http://h/x");

        let exchange = transport.exchange(&request).await.unwrap();
        assert_eq!(exchange.response.text(), Some("ok"));
        assert_eq!(
            exchange.cache_error,
            Some(CacheWriteError::Serialization(WireError::InvalidHeaderValue(
                "X-Bad".into()
            )))
        );
        assert!(transport.store().is_empty());

        let response = transport.round_trip(&request).await.unwrap();
        assert_eq!(response.text(), Some("ok"));
        assert_eq!(transport.stats().cache_errors, 2);
    }

    #[tokio::test]
    async fn store_write_failure_still_returns_response() {
        let store = Arc::new(CacheStore::new());
        let transport = CachingTransport::with_store(Stub::ok(), Arc::clone(&store));
        let request = get("http://h/x");

        let exchange = transport.exchange(&request).await.unwrap();
        assert_eq!(exchange.response.text(), Some("ok"));
        assert_eq!(
            exchange.cache_error,
            Some(CacheWriteError::StoreWrite(CacheError::Uninitialized))
        );

        // Once the shared store is initialized the next fetch is cached.
        store.init(4);
        let exchange = transport.exchange(&request).await.unwrap();
        assert!(exchange.cache_error.is_none());
        assert!(transport.exchange(&request).await.unwrap().is_hit());
        assert_eq!(transport.inner().calls(), 2);
    }

    #[tokio::test]
    async fn clear_forces_refetch() {
        let transport = CachingTransport::new(Stub::ok());
        let request = get("http://h/x");

        transport.exchange(&request).await.unwrap();
        transport.clear();
        assert!(transport.store().is_empty());

        let exchange = transport.exchange(&request).await.unwrap();
        assert_eq!(exchange.source, Source::Network);
        assert_eq!(transport.inner().calls(), 2);
    }

    #[tokio::test]
    async fn bodiless_status_is_replayed_without_body() {
        let transport = CachingTransport::new(Stub::new(|_| {
            Ok(Response::new(StatusCode::NoContent).header("Content-Length", "5"))
        }));
        let request = Request::new(Method::Head, "http://h/x".parse().unwrap());

        transport.exchange(&request).await.unwrap();
        let cached = transport.exchange(&request).await.unwrap();
        assert!(cached.is_hit());
        assert!(cached.response.payload().is_empty());
        assert_eq!(cached.response.headers().content_length(), Some(5));
    }

    #[tokio::test]
    async fn length_mismatch_is_not_cached() {
        let transport = CachingTransport::new(Stub::new(|_| {
            Ok(Response::new(StatusCode::Ok)
                .header("Content-Length", "10")
                .body("ok"))
        }));
        let request = get("http://h/x");

        for _ in 0..3 {
            let exchange = transport.exchange(&request).await.unwrap();
            assert_eq!(exchange.source, Source::Network);
            assert_eq!(exchange.response.text(), Some("ok"));
            assert!(matches!(
                exchange.cache_error,
                Some(CacheWriteError::Serialization(WireError::LengthMismatch {
                    declared: 10,
                    actual: 2
                }))
            ));
        }
        assert!(transport.store().is_empty());
        assert_eq!(transport.inner().calls(), 3);
    }

    #[tokio::test]
    async fn head_response_does_not_answer_a_later_get() {
        // A HEAD reply declares the length of a body it never sends.
        let transport = CachingTransport::new(Stub::new(|req| {
            let response = Response::new(StatusCode::Ok).header("Content-Length", "5");
            Ok(match req.method() {
                Method::Head => response,
                _ => response.body("hello"),
            })
        }));

        let head = Request::new(Method::Head, "http://h/x".parse().unwrap());
        let exchange = transport.exchange(&head).await.unwrap();
        assert!(exchange.cache_error.is_some());

        let fetched = transport.exchange(&get("http://h/x")).await.unwrap();
        assert_eq!(fetched.source, Source::Network);
        assert_eq!(fetched.response.text(), Some("hello"));
        assert!(transport.exchange(&get("http://h/x")).await.unwrap().is_hit());
    }

    #[tokio::test]
    async fn unreadable_entry_is_refetched_and_replaced() {
        let transport = CachingTransport::new(Stub::ok());
        transport.store().set("http://h/x", "not a response").unwrap();

        let refetched = transport.exchange(&get("http://h/x")).await.unwrap();
        assert_eq!(refetched.source, Source::Network);
        assert_eq!(refetched.response.text(), Some("ok"));
        assert!(refetched.cache_error.is_none());
        assert_eq!(transport.inner().calls(), 1);

        let cached = transport.exchange(&get("http://h/x")).await.unwrap();
        assert!(cached.is_hit());
        assert_eq!(cached.response.text(), Some("ok"));
        assert_eq!(transport.inner().calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_are_not_coalesced() {
        let transport = Arc::new(CachingTransport::new(Stub::ok()));
        let request = Arc::new(get("http://h/x"));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let transport = Arc::clone(&transport);
                let request = Arc::clone(&request);
                tokio::spawn(async move { transport.exchange(&request).await })
            })
            .collect();
        for task in tasks {
            let exchange = task.await.unwrap().unwrap();
            assert_eq!(exchange.response.text(), Some("ok"));
        }

        let calls = transport.inner().calls();
        assert!((1..=8).contains(&calls));
        assert_eq!(transport.store().len(), 1);
        assert_eq!(transport.stats().misses, calls as u64);
    }
}
