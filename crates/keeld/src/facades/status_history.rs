//! `StatusHistory` v2: controller-driven pruning of entity status history.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::{Context, FacadeError, FacadeRegistry, MethodTable, RegistryError};

pub(super) fn register(registry: &mut FacadeRegistry) -> Result<(), RegistryError> {
    let methods = MethodTable::new().method("Prune", StatusHistory::prune);
    registry.register("StatusHistory", 2, StatusHistory::build, methods)
}

/// Retention bounds for one pruning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PruneParams {
    /// Records older than this many seconds are dropped.
    pub max_history_time_secs: u64,
    /// At most this many of the newest records are kept.
    pub max_history_entries: usize,
}

/// Outcome of a pruning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PruneResult {
    /// Number of records removed.
    pub removed: usize,
}

struct StatusHistory {
    context: Context,
}

impl StatusHistory {
    fn build(context: &Context) -> Result<Self, FacadeError> {
        if !context.auth().auth_controller() {
            return Err(FacadeError::PermissionDenied);
        }
        Ok(Self {
            context: context.clone(),
        })
    }

    fn prune(&self, params: PruneParams) -> Result<PruneResult, FacadeError> {
        let removed = self.context.state().prune_status_history(
            Duration::from_secs(params.max_history_time_secs),
            params.max_history_entries,
        )?;
        tracing::debug!(
            target: crate::facades::FACADES_TARGET,
            removed,
            max_history_entries = params.max_history_entries,
            "pruned status history"
        );
        Ok(PruneResult { removed })
    }
}
