//! Process termination signals.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Resolves when the process is asked to stop: SIGHUP, SIGTERM, or Ctrl-C.
///
/// # Errors
///
/// Returns an error if a signal handler cannot be installed.
#[cfg(unix)]
pub async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = hangup.recv() => info!("received SIGHUP"),
        _ = terminate.recv() => info!("received SIGTERM"),
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("received Ctrl-C");
        }
    }
    Ok(())
}

/// Resolves on Ctrl-C; other platforms have no hangup or terminate signal.
///
/// # Errors
///
/// Returns an error if the Ctrl-C handler cannot be installed.
#[cfg(not(unix))]
pub async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("received Ctrl-C");
    Ok(())
}

/// Spawns a task that cancels `token` when [`shutdown_signal`] resolves.
///
/// If the handlers cannot be installed the error is logged and the token is
/// cancelled immediately.
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!(error = %e, "failed to install signal handlers");
        }
        token.cancel();
    })
}
