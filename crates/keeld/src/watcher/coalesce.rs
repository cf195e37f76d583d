//! Buffers that fold changes together between deliveries.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::state::{ChangeKind, Entity, EntityKind};

use super::Coalesce;

/// Collapses any number of changes into one signal.
#[derive(Debug, Default)]
pub struct NotifyBuffer {
    pending: bool,
}

impl Coalesce for NotifyBuffer {
    type Change = ();
    type Batch = ();

    fn push(&mut self, (): ()) {
        self.pending = true;
    }

    fn is_empty(&self) -> bool {
        !self.pending
    }

    fn take(&mut self) {
        self.pending = false;
    }
}

/// Collects the distinct ids that changed, in sorted order.
#[derive(Debug, Default)]
pub struct StringsBuffer {
    pending: BTreeSet<String>,
}

impl Coalesce for StringsBuffer {
    type Change = String;
    type Batch = Vec<String>;

    fn push(&mut self, change: String) {
        self.pending.insert(change);
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}

/// Ids grouped by their latest change tag.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct EntityChanges {
    /// Keys whose latest change is a creation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub created: Vec<String>,
    /// Keys whose latest change is an update.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<String>,
    /// Keys whose latest change is a removal.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
}

/// Keeps the latest change tag per key.
#[derive(Debug, Default)]
pub struct EntityBuffer {
    pending: BTreeMap<String, ChangeKind>,
}

impl Coalesce for EntityBuffer {
    type Change = (String, ChangeKind);
    type Batch = EntityChanges;

    fn push(&mut self, (key, change): (String, ChangeKind)) {
        self.pending.insert(key, change);
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take(&mut self) -> EntityChanges {
        let mut batch = EntityChanges::default();
        for (key, change) in std::mem::take(&mut self.pending) {
            match change {
                ChangeKind::Created => batch.created.push(key),
                ChangeKind::Changed => batch.changed.push(key),
                ChangeKind::Removed => batch.removed.push(key),
            }
        }
        batch
    }
}

/// One entry of the merged multi-entity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delta {
    /// Collection of the entity.
    pub kind: EntityKind,
    /// Id of the entity within its collection.
    pub id: String,
    /// Net change since the previous delivery.
    pub change: ChangeKind,
    /// Latest known state of the entity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<Entity>,
}

impl Delta {
    /// Builds a delta carrying the entity's state.
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

#[derive(Debug)]
struct Slot {
    seq: u64,
    delta: Delta,
}

/// Merges deltas from every collection, one entry per `(kind, id)`.
///
/// Entries are delivered in the order of their most recent change.
#[derive(Debug, Default)]
pub struct DeltaBuffer {
    seq: u64,
    pending: HashMap<(EntityKind, String), Slot>,
}

impl DeltaBuffer {
    /// A buffer pre-loaded with a `created` delta for every entity.
    #[must_use]
    pub fn seeded(entities: Vec<Entity>) -> Self {
        let mut buffer = Self::default();
        for entity in entities {
            buffer.push(Delta::of(ChangeKind::Created, entity));
        }
        buffer
    }
}

/// Net effect of two consecutive undelivered changes, or `None` when they
/// cancel out.
const fn merge(earlier: ChangeKind, later: ChangeKind) -> Option<ChangeKind> {
    match (earlier, later) {
        (ChangeKind::Created, ChangeKind::Removed) => None,
        (ChangeKind::Created, _) => Some(ChangeKind::Created),
        (ChangeKind::Changed | ChangeKind::Removed, ChangeKind::Removed) => {
            Some(ChangeKind::Removed)
        }
        (ChangeKind::Changed | ChangeKind::Removed, _) => Some(ChangeKind::Changed),
    }
}

impl Coalesce for DeltaBuffer {
    type Change = Delta;
    type Batch = Vec<Delta>;

    fn push(&mut self, delta: Delta) {
        self.seq += 1;
        let key = (delta.kind, delta.id.clone());
        let merged = match self.pending.remove(&key) {
            None => Some(delta),
            Some(previous) => merge(previous.delta.change, delta.change).map(|change| Delta {
                change,
                entity: delta.entity.or(previous.delta.entity),
                ..delta
            }),
        };
        if let Some(delta) = merged {
            self.pending.insert(
                key,
                Slot {
                    seq: self.seq,
                    delta,
                },
            );
        }
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take(&mut self) -> Vec<Delta> {
        let mut slots: Vec<Slot> = std::mem::take(&mut self.pending).into_values().collect();
        slots.sort_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| slot.delta).collect()
    }
}
