//! JSON seed documents for [`MemoryState`](super::MemoryState).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::Access;
use crate::names::Tag;

use super::{Application, Machine, Model, Unit};

/// Initial contents of the in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Seed {
    /// The hosted model.
    pub model: Model,
    /// Machines present at startup.
    #[serde(default)]
    pub machines: Vec<Machine>,
    /// Applications present at startup.
    #[serde(default)]
    pub applications: Vec<Application>,
    /// Units present at startup.
    #[serde(default)]
    pub units: Vec<Unit>,
    /// Principals allowed to log in.
    #[serde(default)]
    pub users: Vec<SeedUser>,
    /// Permission grants.
    #[serde(default)]
    pub grants: Vec<SeedGrant>,
    /// Status history records.
    #[serde(default)]
    pub status_history: Vec<SeedStatus>,
}

/// Login credentials for one principal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SeedUser {
    /// Principal tag.
    pub tag: Tag,
    /// Shared secret.
    pub password: String,
    /// Whether the principal is a controller agent.
    #[serde(default)]
    pub controller: bool,
}

/// A permission grant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SeedGrant {
    /// Principal receiving the grant.
    pub subject: Tag,
    /// Entity the grant applies to.
    pub target: Tag,
    /// Level granted.
    pub access: Access,
}

/// A status history record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SeedStatus {
    /// Entity the status belongs to.
    pub entity: Tag,
    /// Seconds since the Unix epoch.
    pub at: u64,
    /// Status message.
    pub message: String,
}

/// Errors raised while reading a seed document.
#[derive(Debug, Error)]
pub enum SeedError {
    /// The file could not be read.
    #[error("failed to read state seed '{path}': {source}")]
    Read {
        /// Seed path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The file is not a valid seed document.
    #[error("invalid state seed '{path}': {source}")]
    Parse {
        /// Seed path.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

impl Seed {
    /// Reads a seed document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SeedError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| SeedError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A seed holding only an empty model.
    #[must_use]
    pub fn empty(model: Model) -> Self {
        Self {
            model,
            machines: Vec::new(),
            applications: Vec::new(),
            units: Vec::new(),
            users: Vec::new(),
            grants: Vec::new(),
            status_history: Vec::new(),
        }
    }
}
