//! Termination signals that end the serve loop.

use std::fmt;
use std::io;
use std::sync::Mutex;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Why the daemon is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// `SIGTERM`.
    Terminate,
    /// `SIGINT`.
    Interrupt,
    /// `SIGQUIT`.
    Quit,
    /// `SIGHUP`.
    Hangup,
    /// Shutdown was requested without a signal, for example by a test.
    Requested,
}

impl ShutdownReason {
    fn from_signal(signal: i32) -> Self {
        match signal {
            SIGTERM => Self::Terminate,
            SIGINT => Self::Interrupt,
            SIGQUIT => Self::Quit,
            SIGHUP => Self::Hangup,
            _ => Self::Requested,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Terminate => "SIGTERM",
            Self::Interrupt => "SIGINT",
            Self::Quit => "SIGQUIT",
            Self::Hangup => "SIGHUP",
            Self::Requested => "requested",
        })
    }
}

/// Blocks the launcher until the daemon should stop serving.
pub trait ShutdownSignal: Send + Sync {
    /// Returns once shutdown should proceed.
    fn wait(&self) -> Result<ShutdownReason, ShutdownError>;
}

/// Failures while watching for termination signals.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The signal handlers could not be registered.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The signal iterator closed without delivering a signal.
    #[error("signal delivery ended before a termination signal arrived")]
    Closed,
}

/// Waits for `SIGTERM`, `SIGINT`, `SIGQUIT`, or `SIGHUP`.
///
/// Handlers are registered by [`SystemShutdownSignal::install`], so a signal
/// that arrives during bootstrap is held until [`ShutdownSignal::wait`] runs.
pub struct SystemShutdownSignal {
    signals: Mutex<Signals>,
}

impl fmt::Debug for SystemShutdownSignal {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("SystemShutdownSignal").finish_non_exhaustive()
    }
}

impl SystemShutdownSignal {
    /// Registers the termination signal handlers.
    pub fn install() -> Result<Self, ShutdownError> {
        let signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        Ok(Self {
            signals: Mutex::new(signals),
        })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<ShutdownReason, ShutdownError> {
        let mut signals = match self.signals.lock() {
            Ok(signals) => signals,
            Err(poisoned) => poisoned.into_inner(),
        };
        let signal = signals.forever().next().ok_or(ShutdownError::Closed)?;
        let reason = ShutdownReason::from_signal(signal);
        info!(target: PROCESS_TARGET, %reason, "shutdown signal received");
        Ok(reason)
    }
}
