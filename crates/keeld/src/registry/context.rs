//! Request-scoped inputs handed to facade factories.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::Authorizer;
use crate::names::Tag;
use crate::resources::ResourceTable;
use crate::state::{State, StateError};

/// Everything a facade factory may consult for one request.
///
/// Contexts are cheap to build and are never shared between requests.
#[derive(Clone)]
pub struct Context {
    auth: Arc<Authorizer>,
    state: Arc<dyn State>,
    resources: Arc<ResourceTable>,
    id: Option<String>,
    watcher_poll: Duration,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Context")
            .field("auth", &self.auth)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Builds a context for one request.
    #[must_use]
    pub fn new(
        auth: Arc<Authorizer>,
        state: Arc<dyn State>,
        resources: Arc<ResourceTable>,
        id: Option<String>,
        watcher_poll: Duration,
    ) -> Self {
        Self {
            auth,
            state,
            resources,
            id,
            watcher_poll,
        }
    }

    /// Capability checks for the connection.
    #[must_use]
    pub fn auth(&self) -> &Authorizer {
        &self.auth
    }

    /// Shared state backend.
    #[must_use]
    pub fn state(&self) -> &Arc<dyn State> {
        &self.state
    }

    /// The connection's resource table.
    #[must_use]
    pub fn resources(&self) -> &Arc<ResourceTable> {
        &self.resources
    }

    /// Resource id named by the request, if any.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Tag of the hosted model, the target of model-level permission checks.
    pub fn model_tag(&self) -> Result<Tag, StateError> {
        self.state.model().map(|model| Tag::Model(model.uuid))
    }

    /// Poll interval for watchers created during the request.
    #[must_use]
    pub const fn watcher_poll(&self) -> Duration {
        self.watcher_poll
    }
}
