//! Shared configuration for the keel control-plane daemon.
//!
//! Configuration is layered with `ortho_config`: built-in defaults, then a
//! `.keel.toml` file (or the file named by `--config-path` /
//! `KEEL_CONFIG_PATH`), then `KEEL_*` environment variables, and finally
//! command-line flags.

mod defaults;
mod logging;
mod socket;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_MAX_REQUEST_BYTES, DEFAULT_TCP_PORT, DEFAULT_WATCHER_POLL_MS,
    default_log_filter, default_log_format, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "KEEL")]
pub struct Config {
    /// Endpoint the daemon listens on.
    #[ortho_config(default = default_socket_endpoint())]
    pub daemon_socket: SocketEndpoint,
    /// `tracing_subscriber::EnvFilter` expression.
    #[ortho_config(default = default_log_filter())]
    pub log_filter: String,
    /// Output format for log records.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Upper bound on the size of a single JSONL request line.
    #[ortho_config(default = DEFAULT_MAX_REQUEST_BYTES)]
    pub max_request_bytes: usize,
    /// Idle poll interval for watcher subscriptions, in milliseconds.
    #[ortho_config(default = DEFAULT_WATCHER_POLL_MS)]
    pub watcher_poll_ms: u64,
    /// Optional JSON document used to seed the in-memory state backend.
    pub state_seed: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            log_filter: default_log_filter(),
            log_format: default_log_format(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            watcher_poll_ms: DEFAULT_WATCHER_POLL_MS,
            state_seed: None,
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments, environment, and files.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads configuration from an explicit argument list.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Endpoint the daemon listens on.
    #[must_use]
    pub fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Maximum accepted request line length in bytes.
    #[must_use]
    pub fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }

    /// Idle poll interval used by watcher subscriptions.
    #[must_use]
    pub fn watcher_poll_interval(&self) -> Duration {
        Duration::from_millis(self.watcher_poll_ms.max(1))
    }

    /// Path of the state seed document, if configured.
    #[must_use]
    pub fn state_seed(&self) -> Option<&str> {
        self.state_seed.as_deref()
    }
}
