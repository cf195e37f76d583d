//! Launch failures, tagged with the lifecycle stage that produced them.

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::transport::ListenerError;

use super::shutdown::ShutdownError;

/// Errors that stop `keeld` from starting or from shutting down cleanly.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration, telemetry, seeding, or registry construction failed.
    #[error("bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[from]
        source: BootstrapError,
    },
    /// The endpoint could not be bound, or the accept loop died.
    #[error("listener failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[from]
        source: ListenerError,
    },
    /// Termination signals could not be observed.
    #[error("shutdown handling failed: {source}")]
    Shutdown {
        /// Underlying signal error.
        #[from]
        source: ShutdownError,
    },
}

impl LaunchError {
    /// Lifecycle stage that failed, as recorded in the launch log.
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Bootstrap { .. } => "bootstrap",
            Self::Listener { .. } => "listen",
            Self::Shutdown { .. } => "signals",
        }
    }
}
