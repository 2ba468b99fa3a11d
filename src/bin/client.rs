//! Requests a target on a fixed cadence through the response cache, flushing
//! the cache on a slower cadence, until SIGHUP or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use rttp_cache::config::{ClientArgs, ClientConfig};
use rttp_cache::driver::{Driver, cancel_on_signal};
use rttp_cache::http::{Method, Request};
use rttp_cache::transport::{CachingTransport, TcpTransport};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = ClientArgs::parse();
    let config = ClientConfig::load(&args).context("loading configuration")?;
    config.validate()?;

    let mut network = TcpTransport::new();
    if let Some(timeout) = config.timeout() {
        network = network.with_timeout(timeout);
    }
    let transport = CachingTransport::with_capacity(network, config.cache_capacity);
    let request = Request::new(Method::Get, config.target_url()?);
    let driver = Driver::new(transport, request, config.driver_config()?);

    let shutdown = CancellationToken::new();
    let signals = cancel_on_signal(shutdown.clone());
    let report = driver.run(shutdown).await;
    signals.abort();

    let stats = driver.transport().stats();
    info!(
        requests = report.requests,
        failures = report.failures,
        clears = report.clears,
        hits = stats.hits,
        misses = stats.misses,
        "client exiting"
    );
    Ok(())
}
