//! `ResourcesHookContext` v1: resource listing for hook tools.
//!
//! Served through the hook-context adapter, so the facade only ever sees the
//! calling unit and its application.

use std::sync::Arc;

use serde::Serialize;

use crate::registry::{FacadeError, FacadeRegistry, MethodTable, NoParams, RegistryError};
use crate::state::{ResourceInfo, State, Unit};

pub(super) fn register(registry: &mut FacadeRegistry) -> Result<(), RegistryError> {
    let methods = MethodTable::new().method("ListResources", |hook: &ResourcesHook, _: NoParams| {
        hook.list_resources()
    });
    registry.register_hook_context("ResourcesHookContext", 1, ResourcesHook::new, methods)
}

/// Resources attached to the unit's application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListResourcesResult {
    /// One entry per declared resource.
    pub resources: Vec<ResourceInfo>,
}

struct ResourcesHook {
    state: Arc<dyn State>,
    unit: Unit,
}

impl ResourcesHook {
    fn new(state: Arc<dyn State>, unit: Unit) -> Result<Self, FacadeError> {
        Ok(Self { state, unit })
    }

    fn list_resources(&self) -> Result<ListResourcesResult, FacadeError> {
        let application = self.state.application(self.unit.application())?;
        Ok(ListResourcesResult {
            resources: application.resources,
        })
    }
}
