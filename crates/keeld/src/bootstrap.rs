//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;
use tracing::info;

use keel_config::{Config, SocketPreparationError};

use crate::dispatch::{Collaborators, SessionConnectionHandler, SessionSettings};
use crate::facades::build_registry;
use crate::health::HealthReporter;
use crate::registry::{FacadeRegistry, RegistryError};
use crate::state::{MemoryState, Model, Seed, SeedError};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Uuid of the model hosted when no state seed is configured.
pub const DEFAULT_MODEL_UUID: &str = "00000000-0000-4000-8000-000000000000";

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out an already resolved configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare daemon socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// The state seed could not be loaded.
    #[error("failed to load state seed: {source}")]
    Seed {
        /// Underlying seed error.
        #[source]
        source: SeedError,
    },
    /// Two built-in facades claimed the same name and version.
    #[error("failed to build facade registry: {source}")]
    Registry {
        /// Underlying registration conflict.
        #[source]
        source: RegistryError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    registry: Arc<FacadeRegistry>,
    state: Arc<MemoryState>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Daemon")
            .field("config", &self.config)
            .field("facades", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The immutable facade registry shared by every connection.
    #[must_use]
    pub fn registry(&self) -> &Arc<FacadeRegistry> {
        &self.registry
    }

    /// The state backend serving entity lookups, permissions and logins.
    #[must_use]
    pub fn state(&self) -> &Arc<MemoryState> {
        &self.state
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Builds the connection handler the listener serves sessions with.
    #[must_use]
    pub fn connection_handler(&self) -> SessionConnectionHandler {
        SessionConnectionHandler::new(
            Arc::clone(&self.registry),
            Collaborators::from_memory(Arc::clone(&self.state)),
            Arc::clone(&self.reporter),
            SessionSettings::from_config(&self.config),
        )
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// Every failure is reported through `reporter` before it is returned.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    match assemble(loader, &reporter) {
        Ok(daemon) => {
            reporter.bootstrap_succeeded(&daemon.config);
            Ok(daemon)
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn assemble(
    loader: &dyn ConfigLoader,
    reporter: &Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    config
        .daemon_socket()
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;

    let state = Arc::new(MemoryState::from_seed(load_seed(&config)?));
    let registry = build_registry().map_err(|source| BootstrapError::Registry { source })?;
    reporter.registry_ready(registry.len());

    Ok(Daemon {
        config,
        registry: Arc::new(registry),
        state,
        telemetry,
        reporter: Arc::clone(reporter),
    })
}

fn load_seed(config: &Config) -> Result<Seed, BootstrapError> {
    match config.state_seed() {
        Some(path) => {
            info!(target: BOOTSTRAP_TARGET, seed = path, "loading state seed");
            Seed::from_path(path).map_err(|source| BootstrapError::Seed { source })
        }
        None => Ok(Seed::empty(Model {
            uuid: DEFAULT_MODEL_UUID.to_owned(),
            name: "default".to_owned(),
            owner: "admin".to_owned(),
        })),
    }
}
