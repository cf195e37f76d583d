//! Built-in facades and the startup routine that registers them.
//!
//! | facade                | versions | entry points                         |
//! |-----------------------|----------|--------------------------------------|
//! | `Pinger`              | 1        | `Ping`                               |
//! | `Client`              | 1        | `WatchAll`, `WatchAllModels`, ...    |
//! | `NotifyWatcher`       | 1        | `Next`, `Stop`                       |
//! | `StringsWatcher`      | 1        | `Next`, `Stop`                       |
//! | `EntityWatcher`       | 2        | `Next`, `Stop`                       |
//! | `AllWatcher`          | 1, 2     | `Next`, `Stop`                       |
//! | `AllModelWatcher`     | 2, 3     | `Next`, `Stop`                       |
//! | `SSHClient`           | 2, 3     | addresses, `Leader` from v3          |
//! | `StatusHistory`       | 2        | `Prune`                              |
//! | `ResourcesHookContext`| 1        | `ListResources`                      |

mod client;
mod pinger;
mod resources_hook;
mod sshclient;
mod status_history;
mod watchers;

use serde::{Deserialize, Serialize};

use crate::auth::Authorizer;
use crate::names::Tag;
use crate::registry::{FacadeError, FacadeRegistry, RegistryError};

pub(crate) const FACADES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::facades");

/// Builds the registry served by the daemon.
///
/// Fails on the first conflicting registration.
pub fn build_registry() -> Result<FacadeRegistry, RegistryError> {
    let mut registry = FacadeRegistry::new();
    pinger::register(&mut registry)?;
    client::register(&mut registry)?;
    watchers::register(&mut registry)?;
    sshclient::register(&mut registry)?;
    status_history::register(&mut registry)?;
    resources_hook::register(&mut registry)?;
    Ok(registry)
}

/// Result of a method that only reports success.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Result of a method that created a watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchResult {
    /// Resource id to pass to the watcher facade's `Next` and `Stop`.
    pub watcher_id: String,
}

/// One entity named by its tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTag {
    /// Tag string such as `unit-mysql-0`.
    pub tag: String,
}

/// Bulk argument naming several entities.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    /// Entities to operate on.
    #[serde(default)]
    pub entities: Vec<EntityTag>,
}

impl EntityTag {
    pub(crate) fn parse(&self) -> Result<Tag, FacadeError> {
        self.tag
            .parse()
            .map_err(|error: crate::names::TagError| FacadeError::bad_request(error.to_string()))
    }
}

/// Whether the caller is any kind of logged-in agent or client.
pub(crate) const fn is_agent_or_client(auth: &Authorizer) -> bool {
    auth.auth_client()
        || auth.auth_unit_agent()
        || auth.auth_machine_agent()
        || auth.auth_application_agent()
        || auth.auth_controller()
}
