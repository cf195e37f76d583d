//! Entity tags naming the principals and targets known to the daemon.
//!
//! A tag is the string form of an entity used on the wire and in permission
//! grants: `user-admin`, `unit-mysql-0`, `machine-0-lxd-1`, `application-mysql`,
//! `model-<uuid>`, `controller-<uuid>`. The id carried inside a [`Tag`] is the
//! entity's natural name (`mysql/0`, `0/lxd/1`), so lookups against the state
//! backend never need to re-parse the tag.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Typed entity reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tag {
    /// Human or service account.
    User(String),
    /// Unit agent, identified by `application/number`.
    Unit(String),
    /// Machine agent, identified by its machine id.
    Machine(String),
    /// Controller agent.
    Controller(String),
    /// Application.
    Application(String),
    /// Model, identified by its uuid.
    Model(String),
}

/// Errors raised while parsing a [`Tag`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    /// The string does not name a known tag kind.
    #[error("\"{0}\" is not a valid tag")]
    Invalid(String),
    /// The tag kind is known but the id portion is malformed.
    #[error("\"{tag}\" is not a valid {kind} tag")]
    InvalidId {
        /// Offending tag text.
        tag: String,
        /// Tag kind that failed to parse.
        kind: &'static str,
    },
}

impl Tag {
    /// Short kind prefix used in the tag string.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Unit(_) => "unit",
            Self::Machine(_) => "machine",
            Self::Controller(_) => "controller",
            Self::Application(_) => "application",
            Self::Model(_) => "model",
        }
    }

    /// Natural id of the entity.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::User(id)
            | Self::Unit(id)
            | Self::Machine(id)
            | Self::Controller(id)
            | Self::Application(id)
            | Self::Model(id) => id,
        }
    }

    /// Application owning a unit tag.
    #[must_use]
    pub fn unit_application(&self) -> Option<&str> {
        match self {
            Self::Unit(name) => name.split_once('/').map(|(application, _)| application),
            _ => None,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit(name) => match name.rsplit_once('/') {
                Some((application, number)) => write!(formatter, "unit-{application}-{number}"),
                None => write!(formatter, "unit-{name}"),
            },
            Self::Machine(id) => write!(formatter, "machine-{}", id.replace('/', "-")),
            other => write!(formatter, "{}-{}", other.kind(), other.id()),
        }
    }
}

impl FromStr for Tag {
    type Err = TagError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = input
            .split_once('-')
            .ok_or_else(|| TagError::Invalid(input.to_owned()))?;
        if rest.is_empty() {
            return Err(TagError::Invalid(input.to_owned()));
        }
        let invalid = |kind: &'static str| TagError::InvalidId {
            tag: input.to_owned(),
            kind,
        };
        match kind {
            "user" => Ok(Self::User(rest.to_owned())),
            "unit" => {
                let (application, number) = rest.rsplit_once('-').ok_or_else(|| invalid("unit"))?;
                if application.is_empty() || !is_number(number) {
                    return Err(invalid("unit"));
                }
                Ok(Self::Unit(format!("{application}/{number}")))
            }
            "machine" => {
                let parts: Vec<&str> = rest.split('-').collect();
                let root_is_number = parts.first().is_some_and(|root| is_number(root));
                if !root_is_number || parts.iter().any(|part| part.is_empty()) {
                    return Err(invalid("machine"));
                }
                Ok(Self::Machine(parts.join("/")))
            }
            "controller" => Ok(Self::Controller(rest.to_owned())),
            "application" => Ok(Self::Application(rest.to_owned())),
            "model" => Ok(Self::Model(rest.to_owned())),
            _ => Err(TagError::Invalid(input.to_owned())),
        }
    }
}

fn is_number(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|byte| byte.is_ascii_digit())
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
