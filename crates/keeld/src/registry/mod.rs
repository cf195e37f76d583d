//! Process-wide table of versioned facades.
//!
//! The registry is filled once by the startup routine and then shared
//! read-only with every connection, so lookups take no locks. Each entry pairs
//! a facade factory with the facade's explicit [`MethodTable`].

mod context;
mod errors;
mod methods;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use keel_rpc_types::FacadeVersions;
use serde_json::Value;

use crate::hook_context::hook_context_factory;
use crate::state::{State, Unit};

use self::methods::{FacadeKind, TypedFacade};

pub use self::context::Context;
pub use self::errors::{FacadeError, RegistryError};
pub use self::methods::{MethodTable, NoParams};

/// A registered `(name, version)` facade.
pub struct FacadeDescriptor {
    name: String,
    version: u32,
    facade_type: &'static str,
    kind: Box<dyn FacadeKind>,
}

impl fmt::Debug for FacadeDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("FacadeDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("facade_type", &self.facade_type)
            .finish_non_exhaustive()
    }
}

impl FacadeDescriptor {
    /// Facade name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Facade version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Rust type produced by the factory.
    #[must_use]
    pub const fn facade_type(&self) -> &'static str {
        self.facade_type
    }

    /// Methods the facade serves, sorted.
    #[must_use]
    pub fn methods(&self) -> Vec<&'static str> {
        self.kind.methods()
    }

    /// Constructs the facade for `context` and invokes `method`.
    ///
    /// Unknown methods are rejected before the factory runs, so neither
    /// authorization nor backend access happens for them.
    pub fn call(
        &self,
        context: &Context,
        method: &str,
        params: Value,
    ) -> Result<Value, FacadeError> {
        self.kind
            .call(context, method, params)
            .unwrap_or_else(|| {
                Err(FacadeError::NoSuchMethod {
                    facade: self.name.clone(),
                    version: self.version,
                    method: method.to_owned(),
                })
            })
    }
}

/// Name → version → descriptor map.
#[derive(Debug, Default)]
pub struct FacadeRegistry {
    facades: BTreeMap<String, BTreeMap<u32, FacadeDescriptor>>,
}

impl FacadeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers facade type `F` under `(name, version)`.
    ///
    /// The factory runs once per request and must perform its authorization
    /// checks before touching the state backend.
    pub fn register<F, Factory>(
        &mut self,
        name: &str,
        version: u32,
        factory: Factory,
        methods: MethodTable<F>,
    ) -> Result<(), RegistryError>
    where
        F: 'static,
        Factory: Fn(&Context) -> Result<F, FacadeError> + Send + Sync + 'static,
    {
        let versions = self.facades.entry(name.to_owned()).or_default();
        if let Some(existing) = versions.get(&version) {
            return Err(RegistryError::Duplicate {
                name: name.to_owned(),
                version,
                existing: existing.facade_type,
            });
        }
        versions.insert(
            version,
            FacadeDescriptor {
                name: name.to_owned(),
                version,
                facade_type: std::any::type_name::<F>(),
                kind: Box::new(TypedFacade::new(factory, methods)),
            },
        );
        Ok(())
    }

    /// Registers a facade whose factory only needs the caller's own unit.
    ///
    /// Kept for hook tools that predate explicit contexts; new facades should
    /// use [`Self::register`].
    pub fn register_hook_context<F, Inner>(
        &mut self,
        name: &str,
        version: u32,
        inner: Inner,
        methods: MethodTable<F>,
    ) -> Result<(), RegistryError>
    where
        F: 'static,
        Inner: Fn(Arc<dyn State>, Unit) -> Result<F, FacadeError> + Send + Sync + 'static,
    {
        self.register(name, version, hook_context_factory(inner), methods)
    }

    /// Returns the descriptor for `(name, version)`.
    pub fn lookup(&self, name: &str, version: u32) -> Result<&FacadeDescriptor, RegistryError> {
        let versions = self
            .facades
            .get(name)
            .ok_or_else(|| RegistryError::UnknownFacade {
                name: name.to_owned(),
            })?;
        versions
            .get(&version)
            .ok_or_else(|| RegistryError::UnknownVersion {
                name: name.to_owned(),
                version,
            })
    }

    /// Highest registered version of `name`.
    pub fn best_version(&self, name: &str) -> Result<u32, RegistryError> {
        self.facades
            .get(name)
            .and_then(|versions| versions.keys().next_back().copied())
            .ok_or_else(|| RegistryError::UnknownFacade {
                name: name.to_owned(),
            })
    }

    /// Every facade with its versions, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<FacadeVersions> {
        self.facades
            .iter()
            .map(|(name, versions)| FacadeVersions {
                name: name.clone(),
                versions: versions.keys().copied().collect(),
            })
            .collect()
    }

    /// Picks, per facade the client asked about, the highest version both
    /// sides support. Names without a shared version are omitted.
    #[must_use]
    pub fn negotiate(&self, client: &BTreeMap<String, Vec<u32>>) -> BTreeMap<String, u32> {
        client
            .iter()
            .filter_map(|(name, offered)| {
                let served = self.facades.get(name)?;
                offered
                    .iter()
                    .filter(|version| served.contains_key(version))
                    .max()
                    .map(|version| (name.clone(), *version))
            })
            .collect()
    }

    /// Number of registered `(name, version)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facades.values().map(BTreeMap::len).sum()
    }

    /// Whether nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facades.is_empty()
    }
}
