//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;

use tracing::{error, info};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::transport::SocketListener;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Runs the daemon using the production collaborators.
///
/// Signal handlers are installed before bootstrap begins.
pub fn run_daemon() -> Result<(), LaunchError> {
    let shutdown = SystemShutdownSignal::install()?;
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        &shutdown,
    )
}

/// Runs the daemon with injected collaborators.
///
/// Returns once `shutdown` fires and the listener has stopped accepting.
/// Connections still open at that point finish on their own threads.
pub(crate) fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), LaunchError> {
    serve(loader, reporter, shutdown).inspect_err(|failure| {
        error!(
            target: PROCESS_TARGET,
            stage = failure.stage(),
            error = %failure,
            "daemon launch failed"
        );
    })
}

fn serve(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), LaunchError> {
    let daemon = bootstrap_with(loader, reporter)?;
    let endpoint = daemon.config().daemon_socket();
    let listener = SocketListener::bind(endpoint)?;
    let handle = listener.start(Arc::new(daemon.connection_handler()))?;
    info!(
        target: PROCESS_TARGET,
        %endpoint,
        facades = daemon.registry().len(),
        "daemon serving"
    );

    let reason = shutdown.wait();
    handle.shutdown();
    handle.join()?;
    let reason = reason?;
    info!(target: PROCESS_TARGET, %reason, "daemon stopped");
    Ok(())
}
