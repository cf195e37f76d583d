//! The keel control-plane daemon.
//!
//! `keeld` exposes a fixed set of versioned facades over a newline-delimited
//! JSON protocol. Each client connection gets its own session: it must log in
//! through `Admin` v3 before any other call, after which requests are routed
//! through the immutable [`FacadeRegistry`] to typed facade methods. Facades
//! that outlive a single request (watchers) are stored in the connection's
//! [`resources::ResourceTable`] and stopped when the connection closes.
//!
//! ## Request flow
//!
//! 1. The transport layer accepts a TCP or Unix socket
//!    connection and hands it to a [`SessionConnectionHandler`].
//! 2. The handler reads one JSON request per line and dispatches each on its
//!    own thread, so a blocking watcher `Next` never stalls the connection.
//! 3. The [`Session`] checks login state, looks up the facade, builds it
//!    through its factory (which performs authorization), and calls the
//!    method.
//! 4. Responses are written back in completion order, tagged with the
//!    request's `request_id`.
//!
//! Startup is handled by [`bootstrap_with`], which loads configuration,
//! initialises telemetry, seeds the state backend and builds the registry.

pub mod auth;
mod bootstrap;
mod dispatch;
mod facades;
mod health;
mod hook_context;
pub mod names;
mod process;
pub mod registry;
pub mod resources;
pub mod state;
mod telemetry;
mod transport;
pub mod watcher;

pub use bootstrap::{
    BootstrapError, ConfigLoader, DEFAULT_MODEL_UUID, Daemon, StaticConfigLoader,
    SystemConfigLoader, bootstrap_with,
};
pub use dispatch::{
    Collaborators, DispatchError, Session, SessionConnectionHandler, SessionSettings,
};
pub use facades::build_registry;
pub use health::{HealthReporter, StructuredHealthReporter};
pub use hook_context::hook_context_factory;
pub use process::{
    LaunchError, ShutdownError, ShutdownReason, ShutdownSignal, SystemShutdownSignal, run_daemon,
};
pub use registry::FacadeRegistry;
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
