//! `Pinger` v1: connection liveness probe.

use crate::registry::{Context, FacadeError, FacadeRegistry, MethodTable, NoParams, RegistryError};

use super::Empty;

pub(super) fn register(registry: &mut FacadeRegistry) -> Result<(), RegistryError> {
    let methods = MethodTable::new().method("Ping", |_: &Pinger, _: NoParams| Ok(Empty {}));
    registry.register("Pinger", 1, |_: &Context| Ok::<_, FacadeError>(Pinger), methods)
}

struct Pinger;
