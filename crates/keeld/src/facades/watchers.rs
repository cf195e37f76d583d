//! `Next` / `Stop` facades for every watcher kind.
//!
//! Watcher facades do not own their watchers. A watch method elsewhere
//! registers the watcher in the connection's resource table and returns its
//! id; these facades look the id up on every call. Once a watcher has been
//! stopped its id is gone, so later calls report not-found.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;

use crate::registry::{Context, FacadeError, FacadeRegistry, MethodTable, NoParams, RegistryError};
use crate::resources::{ResourceError, ResourceTable};
use crate::state::{ChangeKind, Entity, EntityKind};
use crate::watcher::{
    Coalesce, Delta, DeltaBuffer, EntityBuffer, EntityChanges, NotifyBuffer, StringsBuffer,
    Watcher,
};

use super::{Empty, is_agent_or_client};

pub(super) fn register(registry: &mut FacadeRegistry) -> Result<(), RegistryError> {
    register_watcher::<NotifyBuffer, _>(registry, "NotifyWatcher", 1, |()| Empty {})?;
    register_watcher::<StringsBuffer, _>(registry, "StringsWatcher", 1, |changes| {
        StringsChanges { changes }
    })?;
    register_watcher::<EntityBuffer, _>(registry, "EntityWatcher", 2, |changes: EntityChanges| {
        changes
    })?;
    register_watcher::<DeltaBuffer, _>(registry, "AllWatcher", 1, LegacyDeltas::from)?;
    register_watcher::<DeltaBuffer, _>(registry, "AllWatcher", 2, |deltas| Deltas { deltas })?;
    register_watcher::<DeltaBuffer, _>(registry, "AllModelWatcher", 2, LegacyDeltas::from)?;
    register_watcher::<DeltaBuffer, _>(registry, "AllModelWatcher", 3, |deltas| Deltas {
        deltas,
    })?;
    Ok(())
}

/// `StringsWatcher.Next` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringsChanges {
    /// Ids that changed since the previous batch.
    pub changes: Vec<String>,
}

/// `AllWatcher` v2 / `AllModelWatcher` v3 `Next` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deltas {
    /// At most one entry per entity, oldest change first.
    pub deltas: Vec<Delta>,
}

/// Delta in the older format, which has no separate `created` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyDelta {
    /// Collection of the entity.
    pub kind: EntityKind,
    /// Id within the collection.
    pub id: String,
    /// Whether the entity is gone.
    pub removed: bool,
    /// Latest known entity state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<Entity>,
}

/// `AllWatcher` v1 / `AllModelWatcher` v2 `Next` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyDeltas {
    /// Deltas with `created` folded into `changed`.
    pub deltas: Vec<LegacyDelta>,
}

impl From<Vec<Delta>> for LegacyDeltas {
    fn from(deltas: Vec<Delta>) -> Self {
        let deltas = deltas
            .into_iter()
            .map(|delta| LegacyDelta {
                kind: delta.kind,
                id: delta.id,
                removed: delta.change == ChangeKind::Removed,
                entity: delta.entity,
            })
            .collect();
        Self { deltas }
    }
}

/// Handle on one watcher id in the connection's resource table.
struct WatcherHandle<C> {
    resources: Arc<ResourceTable>,
    id: String,
    buffer: PhantomData<fn() -> C>,
}

impl<C: Coalesce> WatcherHandle<C> {
    fn build(context: &Context) -> Result<Self, FacadeError> {
        if !is_agent_or_client(context.auth()) {
            return Err(FacadeError::PermissionDenied);
        }
        let id = context
            .id()
            .ok_or_else(|| FacadeError::bad_request("watcher id is required"))?;
        Ok(Self {
            resources: Arc::clone(context.resources()),
            id: id.to_owned(),
            buffer: PhantomData,
        })
    }

    fn next(&self) -> Result<C::Batch, FacadeError> {
        let watcher = self.resources.get_as::<Watcher<C>>(&self.id)?;
        Ok(watcher.next()?)
    }

    /// Stops the watcher. An id that is already gone is accepted so that
    /// repeated stops are harmless, but an id naming another kind of
    /// resource is rejected and left running.
    fn stop(&self) -> Result<Empty, FacadeError> {
        match self.resources.get_as::<Watcher<C>>(&self.id) {
            Ok(_) | Err(ResourceError::NotFound { .. }) => {}
            Err(error) => return Err(error.into()),
        }
        self.resources.stop(&self.id)?;
        Ok(Empty {})
    }
}

fn register_watcher<C, R>(
    registry: &mut FacadeRegistry,
    name: &str,
    version: u32,
    render: fn(C::Batch) -> R,
) -> Result<(), RegistryError>
where
    C: Coalesce,
    R: Serialize + 'static,
{
    let methods = MethodTable::new()
        .method("Next", move |handle: &WatcherHandle<C>, _: NoParams| {
            handle.next().map(render)
        })
        .method("Stop", |handle: &WatcherHandle<C>, _: NoParams| handle.stop());
    registry.register(name, version, WatcherHandle::<C>::build, methods)
}
