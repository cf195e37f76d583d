//! Entity model and the state backend boundary.
//!
//! Facades and watchers never touch storage directly. They read entities and
//! subscribe to change events through [`State`], which the daemon receives as
//! a shared handle at startup. [`MemoryState`] is the bundled implementation.

mod memory;
mod seed;

use std::sync::mpsc::Receiver;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryState;
pub use seed::{Seed, SeedError, SeedGrant, SeedStatus, SeedUser};

/// Collections tracked by the state backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// The hosted model itself.
    Model,
    /// Provisioned machines.
    Machine,
    /// Deployed applications.
    Application,
    /// Units of an application.
    Unit,
}

impl EntityKind {
    /// Lower-case collection name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Machine => "machine",
            Self::Application => "application",
            Self::Unit => "unit",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// How an entity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The entity appeared.
    Created,
    /// The entity was updated.
    Changed,
    /// The entity disappeared.
    Removed,
}

/// Model metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Model {
    /// Model uuid.
    pub uuid: String,
    /// Human readable name.
    pub name: String,
    /// User name of the model owner.
    pub owner: String,
}

/// A provisioned machine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Machine {
    /// Machine id such as `0` or `0/lxd/1`.
    pub id: String,
    /// Address reachable from outside the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_address: Option<String>,
    /// Address reachable inside the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_address: Option<String>,
    /// Every known address of the machine.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
}

/// A resource attached to an application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceInfo {
    /// Resource name declared by the charm.
    pub name: String,
    /// Uploaded revision.
    pub revision: u32,
    /// Content fingerprint.
    #[serde(default)]
    pub fingerprint: String,
}

/// A deployed application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Application {
    /// Application name.
    pub name: String,
    /// Unit currently holding leadership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<String>,
    /// Resources attached to the application.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceInfo>,
}

/// A unit of an application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Unit {
    /// Unit name such as `mysql/0`.
    pub name: String,
    /// Machine hosting the unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
    /// Public address recorded for the unit itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_address: Option<String>,
    /// Private address recorded for the unit itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_address: Option<String>,
}

impl Unit {
    /// Application the unit belongs to.
    #[must_use]
    pub fn application(&self) -> &str {
        self.name
            .split_once('/')
            .map_or(self.name.as_str(), |(application, _)| application)
    }
}

/// Any entity tracked by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    /// The model.
    Model(Model),
    /// A machine.
    Machine(Machine),
    /// An application.
    Application(Application),
    /// A unit.
    Unit(Unit),
}

impl Entity {
    /// Collection the entity belongs to.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Model(_) => EntityKind::Model,
            Self::Machine(_) => EntityKind::Machine,
            Self::Application(_) => EntityKind::Application,
            Self::Unit(_) => EntityKind::Unit,
        }
    }

    /// Id of the entity within its collection.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Model(model) => &model.uuid,
            Self::Machine(machine) => &machine.id,
            Self::Application(application) => &application.name,
            Self::Unit(unit) => &unit.name,
        }
    }
}

/// A single change published by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Collection of the changed entity.
    pub kind: EntityKind,
    /// Id of the changed entity.
    pub id: String,
    /// Nature of the change.
    pub change: ChangeKind,
    /// Entity state after the change, or the last known state on removal.
    pub entity: Option<Entity>,
}

impl ChangeEvent {
    /// Builds an event from the entity's new state.
    #[must_use]
    pub fn of(change: ChangeKind, entity: Entity) -> Self {
        Self {
            kind: entity.kind(),
            id: entity.id().to_owned(),
            change,
            entity: Some(entity),
        }
    }
}

/// Errors reported by the state backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The named entity does not exist.
    #[error("{kind} \"{id}\" not found")]
    NotFound {
        /// Collection that was searched.
        kind: EntityKind,
        /// Id that was requested.
        id: String,
    },
    /// The backend failed to serve the call.
    #[error("state backend failure: {0}")]
    Backend(String),
}

impl StateError {
    pub(crate) fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Entity lookup and change subscription interface.
pub trait State: Send + Sync {
    /// Returns the hosted model.
    fn model(&self) -> Result<Model, StateError>;

    /// Looks up a machine by id.
    fn machine(&self, id: &str) -> Result<Machine, StateError>;

    /// Looks up an application by name.
    fn application(&self, name: &str) -> Result<Application, StateError>;

    /// Looks up a unit by name.
    fn unit(&self, name: &str) -> Result<Unit, StateError>;

    /// Snapshot of every entity, model first.
    fn all_entities(&self) -> Result<Vec<Entity>, StateError>;

    /// Opens a stream of every change published after the call.
    ///
    /// The stream disconnects when the backend can no longer deliver events.
    fn subscribe(&self) -> Result<Receiver<ChangeEvent>, StateError>;

    /// Drops status history older than `max_age` and beyond `max_entries`
    /// newest records, returning how many records were removed.
    fn prune_status_history(
        &self,
        max_age: Duration,
        max_entries: usize,
    ) -> Result<usize, StateError>;
}
