//! Explicit per-facade method tables.
//!
//! Each facade type registers a [`MethodTable`] mapping wire method names to
//! typed handler closures. Parameters are decoded from JSON into the
//! handler's argument type and results are encoded back, so handler
//! signatures are checked at compile time while dispatch stays by name.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::context::Context;
use super::errors::FacadeError;

type Handler<F> = Box<dyn Fn(&F, Value) -> Result<Value, FacadeError> + Send + Sync>;
type Factory<F> = Box<dyn Fn(&Context) -> Result<F, FacadeError> + Send + Sync>;

/// Argument type for methods that take no parameters.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct NoParams {}

/// Name → handler table for facade type `F`.
pub struct MethodTable<F> {
    handlers: BTreeMap<&'static str, Handler<F>>,
}

impl<F> Default for MethodTable<F> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }
}

impl<F: 'static> MethodTable<F> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method. A later registration under the same name replaces the
    /// earlier one.
    #[must_use]
    pub fn method<P, R, H>(mut self, name: &'static str, handler: H) -> Self
    where
        P: DeserializeOwned,
        R: Serialize,
        H: Fn(&F, P) -> Result<R, FacadeError> + Send + Sync + 'static,
    {
        let wrapped = move |facade: &F, params: Value| {
            let params = if params.is_null() {
                Value::Object(serde_json::Map::new())
            } else {
                params
            };
            let decoded: P = serde_json::from_value(params).map_err(|error| {
                FacadeError::bad_request(format!("invalid parameters for {name}: {error}"))
            })?;
            let result = handler(facade, decoded)?;
            serde_json::to_value(result).map_err(|error| {
                FacadeError::internal(format!("failed to encode {name} result: {error}"))
            })
        };
        self.handlers.insert(name, Box::new(wrapped));
        self
    }

    /// Method names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    fn handler(&self, name: &str) -> Option<&Handler<F>> {
        self.handlers.get(name)
    }
}

/// Type-erased behaviour of a registered facade.
pub(crate) trait FacadeKind: Send + Sync {
    /// Method names the facade serves.
    fn methods(&self) -> Vec<&'static str>;

    /// Builds the facade and invokes `method`, or returns `None` when the
    /// method does not exist. The facade is only constructed for known
    /// methods.
    fn call(
        &self,
        context: &Context,
        method: &str,
        params: Value,
    ) -> Option<Result<Value, FacadeError>>;
}

/// Factory plus method table for facade type `F`.
pub(crate) struct TypedFacade<F> {
    factory: Factory<F>,
    methods: MethodTable<F>,
}

impl<F: 'static> TypedFacade<F> {
    pub(crate) fn new(
        factory: impl Fn(&Context) -> Result<F, FacadeError> + Send + Sync + 'static,
        methods: MethodTable<F>,
    ) -> Self {
        Self {
            factory: Box::new(factory),
            methods,
        }
    }
}

impl<F: 'static> FacadeKind for TypedFacade<F> {
    fn methods(&self) -> Vec<&'static str> {
        self.methods.names()
    }

    fn call(
        &self,
        context: &Context,
        method: &str,
        params: Value,
    ) -> Option<Result<Value, FacadeError>> {
        let handler = self.methods.handler(method)?;
        Some((self.factory)(context).and_then(|facade| handler(&facade, params)))
    }
}
