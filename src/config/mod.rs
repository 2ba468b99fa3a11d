//! Client configuration.
//!
//! Settings are layered, later layers winning:
//!
//! 1. built-in defaults ([`ClientConfig::default`]),
//! 2. an optional JSON file (`--config`),
//! 3. command-line flags and their environment variables ([`ClientArgs`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::driver::{DriverConfig, DriverError};
use crate::http::Url;
use crate::http::url::UrlError;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid target URL: {0}")]
    Url(#[from] UrlError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Everything the client binary needs to build and run a driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub request_interval_ms: u64,
    pub clear_interval_ms: u64,
    pub cache_capacity: usize,
    /// Per-exchange timeout for the network transport; none when absent.
    pub timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            scheme: "http".to_owned(),
            request_interval_ms: 1_000,
            clear_interval_ms: 5_000,
            cache_capacity: 1024,
            timeout_ms: None,
        }
    }
}

impl ClientConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Resolves the full configuration for `args`: defaults, then the file
    /// named by `--config` if any, then the flags.
    pub fn load(args: &ClientArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        args.apply(&mut config);
        Ok(config)
    }

    /// The URL every driver tick requests: `scheme://host:port`.
    pub fn target_url(&self) -> Result<Url, UrlError> {
        Url::from_parts(&self.scheme, &self.host, self.port)
    }

    pub fn driver_config(&self) -> Result<DriverConfig, DriverError> {
        DriverConfig::new(
            Duration::from_millis(self.request_interval_ms),
            Duration::from_millis(self.clear_interval_ms),
        )
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Checks that the target URL and intervals are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.target_url()?;
        self.driver_config()?;
        Ok(())
    }
}

/// Command-line flags for the client binary.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "rttp-cache-client",
    version,
    about = "Requests a URL on a fixed cadence through an in-memory response cache"
)]
pub struct ClientArgs {
    /// JSON config file; flags override its values.
    #[arg(long, env = "RTTP_CACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Target host.
    #[arg(long, env = "RTTP_CACHE_HOST")]
    pub host: Option<String>,

    /// Target port.
    #[arg(long, env = "RTTP_CACHE_PORT")]
    pub port: Option<u16>,

    /// Target scheme.
    #[arg(long, env = "RTTP_CACHE_SCHEME")]
    pub scheme: Option<String>,

    /// Milliseconds between requests.
    #[arg(long, env = "RTTP_CACHE_REQUEST_INTERVAL_MS")]
    pub request_interval_ms: Option<u64>,

    /// Milliseconds between cache flushes.
    #[arg(long, env = "RTTP_CACHE_CLEAR_INTERVAL_MS")]
    pub clear_interval_ms: Option<u64>,

    /// Initial cache capacity hint.
    #[arg(long, env = "RTTP_CACHE_CAPACITY")]
    pub cache_capacity: Option<usize>,

    /// Network timeout per request, in milliseconds.
    #[arg(long, env = "RTTP_CACHE_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,
}

impl ClientArgs {
    /// Overwrites every field of `config` that was given on the command line.
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(scheme) = &self.scheme {
            config.scheme.clone_from(scheme);
        }
        if let Some(ms) = self.request_interval_ms {
            config.request_interval_ms = ms;
        }
        if let Some(ms) = self.clear_interval_ms {
            config.clear_interval_ms = ms;
        }
        if let Some(capacity) = self.cache_capacity {
            config.cache_capacity = capacity;
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout_ms = Some(ms);
        }
    }
}

/// Command-line flags for the hello server binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rttp-cache-hello",
    version,
    about = "Answers every request with a greeting"
)]
pub struct ServerArgs {
    /// Address to bind.
    #[arg(long, env = "RTTP_CACHE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind.
    #[arg(long, env = "RTTP_CACHE_PORT", default_value_t = 8080)]
    pub port: u16,
}

impl ServerArgs {
    /// The `host:port` string to bind, bracketing IPv6 hosts.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
