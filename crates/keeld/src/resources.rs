//! Per-connection registry of long-lived, stoppable objects.
//!
//! Watchers created by facade methods are handed to the connection's
//! [`ResourceTable`], which owns them until the client stops them or the
//! connection closes. Ids are decimal strings allocated from a counter and are
//! never reused for the lifetime of the table.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, warn};

const RESOURCES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::resources");

/// Converts a shared resource into a type-erased handle for downcasting.
pub trait IntoAnyArc {
    /// Erases the concrete type.
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> IntoAnyArc for T {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A long-lived object owned by a connection.
pub trait Resource: IntoAnyArc + Send + Sync {
    /// Short description used in logs.
    fn kind(&self) -> &'static str;

    /// Stops the resource. Must be idempotent and must not return until any
    /// background work owned by the resource has exited.
    fn stop(&self) -> Result<(), ResourceError>;
}

/// Errors raised by [`ResourceTable`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// No resource is registered under the id.
    #[error("resource \"{id}\" not found")]
    NotFound {
        /// Requested id.
        id: String,
    },
    /// The resource exists but is of another kind.
    #[error("resource \"{id}\" is a {actual}, not a {expected}")]
    WrongKind {
        /// Requested id.
        id: String,
        /// Kind the caller asked for.
        expected: &'static str,
        /// Kind actually registered.
        actual: &'static str,
    },
    /// The table has already been drained.
    #[error("resource table is closed")]
    Closed,
    /// Stopping a resource failed.
    #[error("failed to stop {kind}: {message}")]
    Stop {
        /// Kind of the failing resource.
        kind: &'static str,
        /// Failure description.
        message: String,
    },
    /// The table lock was poisoned.
    #[error("resource table lock poisoned")]
    Poisoned,
}

#[derive(Default)]
struct Entries {
    next_id: u64,
    resources: HashMap<String, Arc<dyn Resource>>,
    closed: bool,
}

/// Table of resources belonging to one connection.
#[derive(Default)]
pub struct ResourceTable {
    entries: Mutex<Entries>,
}

impl std::fmt::Debug for ResourceTable {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ResourceTable")
            .field("len", &self.len())
            .finish()
    }
}

impl ResourceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource and returns its id.
    ///
    /// Registering into a drained table stops the resource immediately and
    /// returns [`ResourceError::Closed`], so nothing outlives its connection.
    pub fn register(&self, resource: Arc<dyn Resource>) -> Result<String, ResourceError> {
        let mut entries = self.entries()?;
        if entries.closed {
            drop(entries);
            stop_resource("late", resource.as_ref());
            return Err(ResourceError::Closed);
        }
        entries.next_id += 1;
        let id = entries.next_id.to_string();
        debug!(
            target: RESOURCES_TARGET,
            id = %id,
            kind = resource.kind(),
            "resource registered"
        );
        entries.resources.insert(id.clone(), resource);
        Ok(id)
    }

    /// Returns the resource registered under `id`.
    pub fn get(&self, id: &str) -> Result<Arc<dyn Resource>, ResourceError> {
        self.entries()?
            .resources
            .get(id)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound { id: id.to_owned() })
    }

    /// Returns the resource registered under `id` as a concrete type.
    pub fn get_as<T: Resource + Any>(&self, id: &str) -> Result<Arc<T>, ResourceError> {
        let resource = self.get(id)?;
        let actual = resource.kind();
        resource
            .into_any_arc()
            .downcast::<T>()
            .map_err(|_| ResourceError::WrongKind {
                id: id.to_owned(),
                expected: std::any::type_name::<T>(),
                actual,
            })
    }

    /// Removes and stops the resource registered under `id`.
    ///
    /// Unknown ids are accepted so that repeated stops are harmless. The
    /// resource is stopped after the table lock is released, so a stop never
    /// waits behind other table operations and vice versa.
    pub fn stop(&self, id: &str) -> Result<(), ResourceError> {
        let removed = self.entries()?.resources.remove(id);
        match removed {
            Some(resource) => resource.stop(),
            None => Ok(()),
        }
    }

    /// Stops every resource and closes the table, returning how many
    /// resources were stopped.
    ///
    /// Blocks until each resource's background work has exited. Resources are
    /// stopped newest first.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<(String, Arc<dyn Resource>)> = match self.entries.lock() {
            Ok(mut entries) => {
                entries.closed = true;
                entries.resources.drain().collect()
            }
            Err(poisoned) => {
                let mut entries = poisoned.into_inner();
                entries.closed = true;
                entries.resources.drain().collect()
            }
        };
        let mut ordered: Vec<(u64, String, Arc<dyn Resource>)> = drained
            .into_iter()
            .map(|(id, resource)| (id.parse().unwrap_or(u64::MAX), id, resource))
            .collect();
        ordered.sort_by(|left, right| right.0.cmp(&left.0));

        let count = ordered.len();
        for (_, id, resource) in ordered {
            stop_resource(&id, resource.as_ref());
        }
        count
    }

    /// Number of live resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.resources.len())
            .unwrap_or(0)
    }

    /// Whether no resources are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Result<MutexGuard<'_, Entries>, ResourceError> {
        self.entries.lock().map_err(|_| ResourceError::Poisoned)
    }
}

fn stop_resource(id: &str, resource: &dyn Resource) {
    if let Err(error) = resource.stop() {
        warn!(
            target: RESOURCES_TARGET,
            id,
            kind = resource.kind(),
            %error,
            "resource failed to stop cleanly"
        );
    }
}
