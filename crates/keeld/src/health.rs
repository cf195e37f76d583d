//! Lifecycle and connection health events.
//!
//! Bootstrap reports its progress through a [`HealthReporter`], and so does
//! every connection handler when a session opens and when its resources have
//! been torn down. The production reporter turns these into `tracing` records
//! on the `keeld::health` target.

use std::sync::atomic::{AtomicUsize, Ordering};

use keel_config::Config;
use tracing::{debug, error, info};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Receives daemon lifecycle events.
pub trait HealthReporter: Send + Sync {
    /// Bootstrap is about to load configuration.
    fn bootstrap_starting(&self);

    /// Bootstrap finished; `config` is what the daemon will serve with.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Bootstrap stopped at `error`.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Every built-in facade has been registered.
    fn registry_ready(&self, facades: usize);

    /// A client connected.
    fn connection_opened(&self, peer: &str);

    /// A client went away and `stopped` resources were released for it.
    fn connection_closed(&self, peer: &str, stopped: usize);
}

/// Logs health events and keeps a gauge of open connections.
#[derive(Debug, Default)]
pub struct StructuredHealthReporter {
    open: AtomicUsize,
}

impl StructuredHealthReporter {
    /// Creates a reporter with no open connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections opened and not yet closed.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::Relaxed)
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        info!(target: HEALTH_TARGET, event = "bootstrap_starting", "bootstrapping keeld");
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.daemon_socket(),
            log_format = %config.log_format(),
            max_request_bytes = config.max_request_bytes(),
            watcher_poll_ms = config.watcher_poll_ms,
            seeded = config.state_seed().is_some(),
            "keeld bootstrapped"
        );
    }

    fn bootstrap_failed(&self, failure: &BootstrapError) {
        error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %failure,
            "keeld bootstrap failed"
        );
    }

    fn registry_ready(&self, facades: usize) {
        info!(target: HEALTH_TARGET, event = "registry_ready", facades, "facades registered");
    }

    fn connection_opened(&self, peer: &str) {
        let open = self.open.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(target: HEALTH_TARGET, event = "connection_opened", peer, open, "session opened");
    }

    fn connection_closed(&self, peer: &str, stopped: usize) {
        let open = self
            .open
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        debug!(
            target: HEALTH_TARGET,
            event = "connection_closed",
            peer,
            stopped,
            open,
            "session closed"
        );
    }
}
