//! Wire envelope shared by the keel daemon and its clients.
//!
//! Every message is a single JSON object on its own line. Clients send
//! [`Request`] values naming a facade, a facade version, an optional resource
//! id, and a method. The daemon answers each with exactly one [`Response`]
//! carrying the same `request_id`, so callers may keep several requests in
//! flight on one connection.
//!
//! ```json
//! {"request_id":7,"facade":"Client","version":1,"method":"WatchAll","params":{}}
//! {"request_id":7,"response":{"watcher_id":"1"}}
//! {"request_id":8,"error":{"message":"permission denied","code":"permission-denied"}}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Facade that carries the login handshake.
pub const ADMIN_FACADE: &str = "Admin";

/// Version of the [`ADMIN_FACADE`] served by the daemon.
pub const ADMIN_VERSION: u32 = 3;

/// Method on the [`ADMIN_FACADE`] that authenticates a connection.
pub const LOGIN_METHOD: &str = "Login";

/// A single call against a facade.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Request {
    /// Caller chosen correlation id echoed in the response.
    pub request_id: u64,
    /// Facade name, for example `Client`.
    pub facade: String,
    /// Facade version the caller negotiated.
    pub version: u32,
    /// Resource the call targets, used by watcher facades.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Method name within the facade.
    pub method: String,
    /// Method arguments; absent arguments decode as `null`.
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Builds a request with empty parameters.
    #[must_use]
    pub fn new(
        request_id: u64,
        facade: impl Into<String>,
        version: u32,
        method: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            facade: facade.into(),
            version,
            id: None,
            method: method.into(),
            params: Value::Null,
        }
    }

    /// Targets the request at a resource id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attaches method parameters.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// Answer to a single [`Request`].
///
/// Exactly one of `response` and `error` is present. `request_id` is absent
/// only when the daemon could not decode the request far enough to read it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Response {
    /// Correlation id copied from the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    /// Method result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    /// Builds a successful response.
    #[must_use]
    pub const fn success(request_id: u64, response: Value) -> Self {
        Self {
            request_id: Some(request_id),
            response: Some(response),
            error: None,
        }
    }

    /// Builds an error response.
    #[must_use]
    pub const fn failure(request_id: Option<u64>, error: ErrorBody) -> Self {
        Self {
            request_id,
            response: None,
            error: Some(error),
        }
    }

    /// Returns the error code when the response is a failure.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|body| body.code)
    }
}

/// Structured failure returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorBody {
    /// Human readable description.
    pub message: String,
    /// Machine readable classification.
    pub code: ErrorCode,
}

impl ErrorBody {
    /// Builds an error body.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

/// Classification of request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Unknown facade, facade version, or method.
    NoSuchRequest,
    /// The caller lacks the capability the facade requires.
    PermissionDenied,
    /// A named resource or entity does not exist.
    NotFound,
    /// The targeted watcher has stopped.
    Stopped,
    /// The state backend failed.
    BackendError,
    /// The request could not be decoded or is out of sequence.
    BadRequest,
    /// The connection has not logged in yet.
    LoginRequired,
    /// The daemon hit an unexpected internal failure.
    Internal,
}

impl ErrorCode {
    /// Returns the wire spelling of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoSuchRequest => "no-such-request",
            Self::PermissionDenied => "permission-denied",
            Self::NotFound => "not-found",
            Self::Stopped => "stopped",
            Self::BackendError => "backend-error",
            Self::BadRequest => "bad-request",
            Self::LoginRequired => "login-required",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Parameters of `Admin.Login`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoginRequest {
    /// Tag of the entity logging in, for example `user-admin`.
    pub auth_tag: String,
    /// Secret presented by the entity.
    pub credentials: String,
    /// Facade versions the client understands, keyed by facade name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub client_facades: BTreeMap<String, Vec<u32>>,
}

/// Result of `Admin.Login`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoginResult {
    /// Tag of the authenticated entity.
    pub tag: String,
    /// Whether the entity is a controller agent.
    pub controller: bool,
    /// Every facade the daemon serves.
    pub facades: Vec<FacadeVersions>,
    /// Highest version shared with the client, per requested facade.
    #[serde(default)]
    pub negotiated: BTreeMap<String, u32>,
}

/// Versions served for one facade name, ascending.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FacadeVersions {
    /// Facade name.
    pub name: String,
    /// Registered versions in ascending order.
    pub versions: Vec<u32>,
}
