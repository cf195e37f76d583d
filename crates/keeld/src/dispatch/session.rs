//! Per-connection session state: login, dispatch, and teardown.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use keel_rpc_types::{
    ADMIN_FACADE, ADMIN_VERSION, FacadeVersions, LOGIN_METHOD, LoginRequest, LoginResult,
    Request, Response,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::{Authenticator, Authorizer, PermissionLookup};
use crate::names::Tag;
use crate::registry::{Context, FacadeError, FacadeRegistry, RegistryError};
use crate::resources::ResourceTable;
use crate::state::{MemoryState, State};

use super::DISPATCH_TARGET;

/// External services a session consults.
#[derive(Clone)]
pub struct Collaborators {
    /// Entity lookup and change subscriptions.
    pub state: Arc<dyn State>,
    /// Permission grants.
    pub permissions: Arc<dyn PermissionLookup>,
    /// Login verification.
    pub authenticator: Arc<dyn Authenticator>,
}

impl Collaborators {
    /// Uses one in-memory backend for all three roles.
    #[must_use]
    pub fn from_memory(state: Arc<MemoryState>) -> Self {
        Self {
            state: state.clone(),
            permissions: state.clone(),
            authenticator: state,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// State owned by one client connection.
///
/// The session is unauthenticated until an `Admin.Login` succeeds; from then
/// on its authorizer is fixed. Every watcher created on the connection lives
/// in the session's [`ResourceTable`] and is stopped by [`Session::close`].
pub struct Session {
    registry: Arc<FacadeRegistry>,
    collaborators: Collaborators,
    resources: Arc<ResourceTable>,
    authorizer: OnceLock<Arc<Authorizer>>,
    watcher_poll: Duration,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Session")
            .field("authorizer", &self.authorizer.get())
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates an unauthenticated session.
    #[must_use]
    pub fn new(
        registry: Arc<FacadeRegistry>,
        collaborators: Collaborators,
        watcher_poll: Duration,
    ) -> Self {
        Self {
            registry,
            collaborators,
            resources: Arc::new(ResourceTable::new()),
            authorizer: OnceLock::new(),
            watcher_poll,
        }
    }

    /// Handles one request and builds its response.
    ///
    /// Errors are always returned as responses; the session stays usable.
    pub fn handle(&self, request: Request) -> Response {
        let request_id = request.request_id;
        debug!(
            target: DISPATCH_TARGET,
            request_id,
            facade = %request.facade,
            version = request.version,
            method = %request.method,
            "dispatching request"
        );
        match self.dispatch(request) {
            Ok(value) => Response::success(request_id, value),
            Err(error) => {
                debug!(
                    target: DISPATCH_TARGET,
                    request_id,
                    code = %error.code(),
                    %error,
                    "request failed"
                );
                Response::failure(Some(request_id), error.to_body())
            }
        }
    }

    fn dispatch(&self, request: Request) -> Result<Value, FacadeError> {
        if request.facade == ADMIN_FACADE {
            return self.admin(request);
        }
        let auth = self.authorizer.get().ok_or(FacadeError::LoginRequired)?;
        let descriptor = self.registry.lookup(&request.facade, request.version)?;
        let context = Context::new(
            Arc::clone(auth),
            Arc::clone(&self.collaborators.state),
            Arc::clone(&self.resources),
            request.id,
            self.watcher_poll,
        );
        descriptor.call(&context, &request.method, request.params)
    }

    fn admin(&self, request: Request) -> Result<Value, FacadeError> {
        if request.version != ADMIN_VERSION {
            return Err(RegistryError::UnknownVersion {
                name: request.facade,
                version: request.version,
            }
            .into());
        }
        if request.method != LOGIN_METHOD {
            return Err(FacadeError::NoSuchMethod {
                facade: request.facade,
                version: request.version,
                method: request.method,
            });
        }
        let params = if request.params.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            request.params
        };
        let login: LoginRequest = serde_json::from_value(params)
            .map_err(|error| FacadeError::bad_request(format!("invalid login request: {error}")))?;
        let result = self.login(login)?;
        serde_json::to_value(result)
            .map_err(|error| FacadeError::internal(format!("failed to encode login result: {error}")))
    }

    fn login(&self, login: LoginRequest) -> Result<LoginResult, FacadeError> {
        if self.authorizer.get().is_some() {
            return Err(FacadeError::bad_request("already logged in"));
        }
        let tag: Tag = login
            .auth_tag
            .parse()
            .map_err(|_| FacadeError::Unauthorized)?;
        let identity = self
            .collaborators
            .authenticator
            .authenticate(&tag, &login.credentials)?
            .ok_or(FacadeError::Unauthorized)?;
        let controller = identity.controller;
        let authorizer = Arc::new(Authorizer::new(
            identity,
            Arc::clone(&self.collaborators.permissions),
        ));
        self.authorizer
            .set(authorizer)
            .map_err(|_| FacadeError::bad_request("already logged in"))?;
        info!(target: DISPATCH_TARGET, %tag, controller, "connection logged in");

        Ok(LoginResult {
            tag: tag.to_string(),
            controller,
            facades: self.facade_versions(),
            negotiated: self.negotiate(&login),
        })
    }

    fn facade_versions(&self) -> Vec<FacadeVersions> {
        let mut facades = self.registry.list();
        facades.push(FacadeVersions {
            name: ADMIN_FACADE.to_owned(),
            versions: vec![ADMIN_VERSION],
        });
        facades.sort_by(|left, right| left.name.cmp(&right.name));
        facades
    }

    fn negotiate(&self, login: &LoginRequest) -> std::collections::BTreeMap<String, u32> {
        let mut negotiated = self.registry.negotiate(&login.client_facades);
        if login
            .client_facades
            .get(ADMIN_FACADE)
            .is_some_and(|versions| versions.contains(&ADMIN_VERSION))
        {
            negotiated.insert(ADMIN_FACADE.to_owned(), ADMIN_VERSION);
        }
        negotiated
    }

    /// The connection's resource table.
    #[must_use]
    pub fn resources(&self) -> &Arc<ResourceTable> {
        &self.resources
    }

    /// Identity the connection logged in as, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&Tag> {
        self.authorizer.get().map(|auth| auth.tag())
    }

    /// Stops every resource the connection created. Returns how many were
    /// stopped. Later registrations on this session are refused.
    pub fn close(&self) -> usize {
        self.resources.stop_all()
    }
}

