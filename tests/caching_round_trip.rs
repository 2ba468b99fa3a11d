use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rttp_cache::driver::{Driver, DriverConfig};
use rttp_cache::http::{Request, Response, StatusCode};
use rttp_cache::server::Server;
use rttp_cache::transport::{CachingTransport, Source, TcpTransport};
use tokio_util::sync::CancellationToken;

async fn counting_server() -> (String, Arc<AtomicUsize>, CancellationToken) {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    let calls = Arc::new(AtomicUsize::new(0));
    let shutdown = CancellationToken::new();

    let counter = Arc::clone(&calls);
    let token = shutdown.clone();
    tokio::spawn(async move {
        server
            .run(
                move |_request: Request| {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { Response::new(StatusCode::Ok).body(format!("call {n}")) }
                },
                token,
            )
            .await
            .unwrap();
    });

    (format!("http://{addr}/greeting"), calls, shutdown)
}

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let (url, calls, shutdown) = counting_server().await;
    let transport = CachingTransport::new(TcpTransport::new().with_timeout(Duration::from_secs(5)));
    let request = Request::get(&url).unwrap();

    let first = transport.exchange(&request).await.unwrap();
    let second = transport.exchange(&request).await.unwrap();

    assert_eq!(first.source, Source::Network);
    assert!(first.cache_error.is_none());
    assert_eq!(second.source, Source::Cache);
    assert_eq!(first.response.payload(), second.response.payload());
    assert_eq!(second.response.text().unwrap(), "call 1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    shutdown.cancel();
}

#[tokio::test]
async fn clearing_forces_a_refetch() {
    let (url, calls, shutdown) = counting_server().await;
    let transport = CachingTransport::new(TcpTransport::new().with_timeout(Duration::from_secs(5)));
    let request = Request::get(&url).unwrap();

    transport.exchange(&request).await.unwrap();
    transport.clear();
    let refetched = transport.exchange(&request).await.unwrap();

    assert_eq!(refetched.source, Source::Network);
    assert_eq!(refetched.response.text().unwrap(), "call 2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let stats = transport.stats();
    assert_eq!((stats.hits, stats.misses, stats.stored), (0, 2, 2));

    shutdown.cancel();
}

#[tokio::test]
async fn driver_hits_the_network_once_per_clear_window() {
    let (url, calls, shutdown) = counting_server().await;
    let transport = CachingTransport::new(TcpTransport::new().with_timeout(Duration::from_secs(5)));
    let request = Request::get(&url).unwrap();
    let config = DriverConfig::new(Duration::from_millis(20), Duration::from_secs(60)).unwrap();
    let driver = Driver::new(transport, request, config);

    let stop = CancellationToken::new();
    let timer = stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        timer.cancel();
    });
    let report = driver.run(stop).await;

    assert!(report.requests >= 2, "{report:?}");
    assert_eq!(report.failures, 0);
    assert_eq!(report.clears, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(driver.transport().stats().hits, report.requests - 1);

    shutdown.cancel();
}
