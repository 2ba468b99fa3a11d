//! Greets every caller; the default target of `rttp-cache-client`.

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use rttp_cache::config::ServerArgs;
use rttp_cache::driver::cancel_on_signal;
use rttp_cache::server::{Server, hello};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = ServerArgs::parse();
    let server = Server::bind(args.bind_addr()).await?;

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());
    server.run(hello, shutdown).await?;
    Ok(())
}
