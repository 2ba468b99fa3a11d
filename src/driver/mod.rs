//! Periodic request driver.
//!
//! [`Driver`] owns a [`CachingTransport`] and a fixed [`Request`]. Its
//! [`run`](Driver::run) loop waits on three sources at once:
//!
//! | Source        | Effect                                            |
//! |---------------|---------------------------------------------------|
//! | request tick  | send the request, log the body or the error       |
//! | clear tick    | flush the cache                                   |
//! | shutdown      | stop both tickers and return                      |
//!
//! A failed request is logged and counted; it never stops the loop. The
//! request is awaited inside the loop, so at most one is in flight and a
//! shutdown requested during it is seen once it completes.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::http::Request;
use crate::transport::{CachingTransport, Transport};

pub mod signal;

pub use signal::{cancel_on_signal, shutdown_signal};

/// Errors produced while configuring a [`Driver`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("{which} interval must be greater than zero")]
    ZeroInterval { which: &'static str },
}

/// Request and clear cadences for a [`Driver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    request_interval: Duration,
    clear_interval: Duration,
}

impl DriverConfig {
    /// Default delay between requests.
    pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

    /// Default delay between cache flushes.
    pub const DEFAULT_CLEAR_INTERVAL: Duration = Duration::from_secs(5);

    /// # Errors
    ///
    /// Returns [`DriverError::ZeroInterval`] if either interval is zero.
    pub fn new(request_interval: Duration, clear_interval: Duration) -> Result<Self, DriverError> {
        if request_interval.is_zero() {
            return Err(DriverError::ZeroInterval { which: "request" });
        }
        if clear_interval.is_zero() {
            return Err(DriverError::ZeroInterval { which: "clear" });
        }
        Ok(Self {
            request_interval,
            clear_interval,
        })
    }

    pub fn request_interval(&self) -> Duration {
        self.request_interval
    }

    pub fn clear_interval(&self) -> Duration {
        self.clear_interval
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            request_interval: Self::DEFAULT_REQUEST_INTERVAL,
            clear_interval: Self::DEFAULT_CLEAR_INTERVAL,
        }
    }
}

/// What a [`Driver`] did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverReport {
    /// Request ticks handled.
    pub requests: u64,
    /// Requests that ended in a transport error.
    pub failures: u64,
    /// Cache flushes performed.
    pub clears: u64,
}

/// Issues one request on a fixed cadence and flushes the cache on another.
pub struct Driver<T> {
    transport: CachingTransport<T>,
    request: Request,
    config: DriverConfig,
}

impl<T: Transport> Driver<T> {
    pub fn new(transport: CachingTransport<T>, request: Request, config: DriverConfig) -> Self {
        Self {
            transport,
            request,
            config,
        }
    }

    pub fn transport(&self) -> &CachingTransport<T> {
        &self.transport
    }

    pub fn config(&self) -> DriverConfig {
        self.config
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// Both tickers first fire one full interval after the call. Ticks that
    /// come due while a request is in flight are delayed, not bursted.
    /// When the same instant is due for several sources, shutdown wins,
    /// then the request, then the flush.
    pub async fn run(&self, shutdown: CancellationToken) -> DriverReport {
        let mut report = DriverReport::default();
        let start = Instant::now();

        let mut request_ticker = interval_at(
            start + self.config.request_interval,
            self.config.request_interval,
        );
        request_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut clear_ticker = interval_at(
            start + self.config.clear_interval,
            self.config.clear_interval,
        );
        clear_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            url = %self.request.url(),
            request_interval = ?self.config.request_interval,
            clear_interval = ?self.config.clear_interval,
            "driver started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("shutdown requested, stopping driver");
                    break;
                }

                _ = request_ticker.tick() => {
                    report.requests += 1;
                    self.send_once(&mut report).await;
                }

                _ = clear_ticker.tick() => {
                    self.transport.clear();
                    report.clears += 1;
                    debug!("cache flushed");
                }
            }
        }

        drop(request_ticker);
        drop(clear_ticker);
        info!(
            requests = report.requests,
            failures = report.failures,
            clears = report.clears,
            "driver stopped"
        );
        report
    }

    async fn send_once(&self, report: &mut DriverReport) {
        match self.transport.exchange(&self.request).await {
            Ok(exchange) => {
                if let Some(e) = &exchange.cache_error {
                    warn!(error = %e, "response not cached");
                }
                let response = &exchange.response;
                info!(
                    status = response.status().as_u16(),
                    source = ?exchange.source,
                    body = %String::from_utf8_lossy(response.payload()),
                    "response"
                );
            }
            Err(e) => {
                report.failures += 1;
                error!(error = %e, "request failed");
            }
        }
    }
}
