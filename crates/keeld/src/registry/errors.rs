//! Error types for facade registration and per-request failures.

use keel_rpc_types::{ErrorBody, ErrorCode};
use thiserror::Error;

use crate::auth::AuthError;
use crate::resources::ResourceError;
use crate::state::StateError;
use crate::watcher::WatcherError;

/// Errors raised while building or querying the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A `(name, version)` pair was registered twice.
    #[error("object \"{name}\" version {version} already registered ({existing})")]
    Duplicate {
        /// Facade name.
        name: String,
        /// Facade version.
        version: u32,
        /// Type registered first.
        existing: &'static str,
    },
    /// No facade carries the name.
    #[error("unknown object type \"{name}\"")]
    UnknownFacade {
        /// Requested facade name.
        name: String,
    },
    /// The facade exists but not at the requested version.
    #[error("unknown version ({version}) of interface \"{name}\"")]
    UnknownVersion {
        /// Requested facade name.
        name: String,
        /// Requested version.
        version: u32,
    },
}

/// Failure of a single facade request.
///
/// Every variant maps onto a wire [`ErrorCode`]; the connection always stays
/// usable after one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FacadeError {
    /// The facade name or version is not registered.
    #[error(transparent)]
    UnknownFacade(RegistryError),
    /// The facade has no such method.
    #[error("no such request - method {facade}({version}).{method} is not implemented")]
    NoSuchMethod {
        /// Facade name.
        facade: String,
        /// Facade version.
        version: u32,
        /// Requested method.
        method: String,
    },
    /// The caller lacks the required capability.
    #[error("permission denied")]
    PermissionDenied,
    /// Login credentials were rejected.
    #[error("invalid entity name or password")]
    Unauthorized,
    /// A named resource or entity does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The targeted watcher has stopped.
    #[error("watcher was stopped")]
    Stopped,
    /// The state backend failed.
    #[error("{0}")]
    Backend(String),
    /// The request is malformed or out of sequence.
    #[error("{0}")]
    BadRequest(String),
    /// The connection has not logged in.
    #[error("not logged in")]
    LoginRequired,
    /// An unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FacadeError {
    /// Wire classification of the error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownFacade(_) | Self::NoSuchMethod { .. } => ErrorCode::NoSuchRequest,
            Self::PermissionDenied | Self::Unauthorized => ErrorCode::PermissionDenied,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Stopped => ErrorCode::Stopped,
            Self::Backend(_) => ErrorCode::BackendError,
            Self::BadRequest(_) => ErrorCode::BadRequest,
            Self::LoginRequired => ErrorCode::LoginRequired,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Converts the error into its wire form.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.code(), self.to_string())
    }

    /// Builds a bad-request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Builds an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<RegistryError> for FacadeError {
    fn from(error: RegistryError) -> Self {
        Self::UnknownFacade(error)
    }
}

impl From<AuthError> for FacadeError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::PermissionDenied => Self::PermissionDenied,
            AuthError::Backend(source) => Self::Backend(source.to_string()),
        }
    }
}

impl From<StateError> for FacadeError {
    fn from(error: StateError) -> Self {
        match error {
            StateError::NotFound { .. } => Self::NotFound(error.to_string()),
            StateError::Backend(message) => Self::Backend(message),
        }
    }
}

impl From<ResourceError> for FacadeError {
    fn from(error: ResourceError) -> Self {
        match error {
            ResourceError::NotFound { .. } => Self::NotFound(error.to_string()),
            ResourceError::WrongKind { .. } => Self::BadRequest(error.to_string()),
            ResourceError::Closed => Self::Stopped,
            ResourceError::Stop { .. } | ResourceError::Poisoned => {
                Self::Internal(error.to_string())
            }
        }
    }
}

impl From<WatcherError> for FacadeError {
    fn from(error: WatcherError) -> Self {
        match error {
            WatcherError::Stopped => Self::Stopped,
            other => Self::Internal(other.to_string()),
        }
    }
}
