//! Per-connection identity and capability checks.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::names::Tag;
use crate::state::StateError;

/// Permission levels, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// May observe the target.
    Read,
    /// May modify the target.
    Write,
    /// May administer the target.
    Admin,
}

impl fmt::Display for Access {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        };
        formatter.write_str(text)
    }
}

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Tag the principal logged in as.
    pub tag: Tag,
    /// Whether the principal is a controller agent.
    pub controller: bool,
}

impl Identity {
    /// Builds an identity.
    #[must_use]
    pub const fn new(tag: Tag, controller: bool) -> Self {
        Self { tag, controller }
    }
}

/// Resolves whether a subject holds a permission on a target.
pub trait PermissionLookup: Send + Sync {
    /// Returns `Ok(true)` when `subject` holds at least `access` on `target`.
    fn has_permission(&self, subject: &Tag, access: Access, target: &Tag)
    -> Result<bool, StateError>;
}

/// Verifies login credentials.
pub trait Authenticator: Send + Sync {
    /// Returns the identity for valid credentials and `None` otherwise.
    fn authenticate(&self, tag: &Tag, credentials: &str) -> Result<Option<Identity>, StateError>;
}

/// Failures of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The caller lacks the required capability.
    #[error("permission denied")]
    PermissionDenied,
    /// The permission backend failed; distinct from a denial.
    #[error("permission lookup failed: {0}")]
    Backend(#[source] StateError),
}

/// Capability predicates bound to one authenticated connection.
///
/// The authorizer never changes after login. Permission checks are delegated
/// to the [`PermissionLookup`] collaborator on every call.
#[derive(Clone)]
pub struct Authorizer {
    identity: Identity,
    permissions: Arc<dyn PermissionLookup>,
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Authorizer")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl Authorizer {
    /// Binds an identity to a permission lookup.
    #[must_use]
    pub fn new(identity: Identity, permissions: Arc<dyn PermissionLookup>) -> Self {
        Self {
            identity,
            permissions,
        }
    }

    /// Tag of the authenticated entity.
    #[must_use]
    pub const fn tag(&self) -> &Tag {
        &self.identity.tag
    }

    /// The caller is an end user.
    #[must_use]
    pub const fn auth_client(&self) -> bool {
        matches!(self.identity.tag, Tag::User(_))
    }

    /// The caller is a unit agent.
    #[must_use]
    pub const fn auth_unit_agent(&self) -> bool {
        matches!(self.identity.tag, Tag::Unit(_))
    }

    /// The caller is a machine agent.
    #[must_use]
    pub const fn auth_machine_agent(&self) -> bool {
        matches!(self.identity.tag, Tag::Machine(_))
    }

    /// The caller is an application agent.
    #[must_use]
    pub const fn auth_application_agent(&self) -> bool {
        matches!(self.identity.tag, Tag::Application(_))
    }

    /// The caller is a controller agent.
    #[must_use]
    pub const fn auth_controller(&self) -> bool {
        self.identity.controller || matches!(self.identity.tag, Tag::Controller(_))
    }

    /// The caller is the entity named by `tag`.
    #[must_use]
    pub fn auth_owner(&self, tag: &Tag) -> bool {
        &self.identity.tag == tag
    }

    /// Asks the permission backend whether the caller holds `access` on
    /// `target`.
    pub fn has_permission(&self, access: Access, target: &Tag) -> Result<bool, AuthError> {
        self.permissions
            .has_permission(&self.identity.tag, access, target)
            .map_err(AuthError::Backend)
    }

    /// Like [`Self::has_permission`] but turns a refusal into
    /// [`AuthError::PermissionDenied`].
    pub fn check_permission(&self, access: Access, target: &Tag) -> Result<(), AuthError> {
        if self.has_permission(access, target)? {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::predicate::eq;
    use rstest::rstest;

    mock! {
        Lookup {}
        impl PermissionLookup for Lookup {
            fn has_permission(
                &self,
                subject: &Tag,
                access: Access,
                target: &Tag,
            ) -> Result<bool, StateError>;
        }
    }

    fn authorizer(tag: Tag, controller: bool, lookup: MockLookup) -> Authorizer {
        Authorizer::new(Identity::new(tag, controller), Arc::new(lookup))
    }

    #[rstest]
    #[case(Tag::User("admin".into()), false, [true, false, false, false, false])]
    #[case(Tag::Unit("mysql/0".into()), false, [false, true, false, false, false])]
    #[case(Tag::Machine("0".into()), false, [false, false, true, false, false])]
    #[case(Tag::Machine("0".into()), true, [false, false, true, false, true])]
    #[case(Tag::Application("mysql".into()), false, [false, false, false, true, false])]
    #[case(Tag::Controller("c0ffee".into()), false, [false, false, false, false, true])]
    fn predicates_follow_the_identity(
        #[case] tag: Tag,
        #[case] controller: bool,
        #[case] expected: [bool; 5],
    ) {
        let auth = authorizer(tag, controller, MockLookup::new());
        let actual = [
            auth.auth_client(),
            auth.auth_unit_agent(),
            auth.auth_machine_agent(),
            auth.auth_application_agent(),
            auth.auth_controller(),
        ];
        assert_eq!(actual, expected);
    }

    #[test]
    fn owner_check_compares_tags() {
        let tag = Tag::Unit("mysql/0".into());
        let auth = authorizer(tag.clone(), false, MockLookup::new());
        assert!(auth.auth_owner(&tag));
        assert!(!auth.auth_owner(&Tag::Unit("mysql/1".into())));
    }

    #[test]
    fn permission_checks_delegate_to_lookup() {
        let user = Tag::User("bob".into());
        let model = Tag::Model("m1".into());
        let mut lookup = MockLookup::new();
        lookup
            .expect_has_permission()
            .with(eq(user.clone()), eq(Access::Admin), eq(model.clone()))
            .times(1)
            .returning(|_, _, _| Ok(false));
        let auth = authorizer(user, false, lookup);

        let error = auth
            .check_permission(Access::Admin, &model)
            .expect_err("lookup refused");
        assert_eq!(error, AuthError::PermissionDenied);
    }

    #[test]
    fn backend_failures_are_not_denials() {
        let mut lookup = MockLookup::new();
        lookup
            .expect_has_permission()
            .returning(|_, _, _| Err(StateError::Backend("database offline".into())));
        let auth = authorizer(Tag::User("bob".into()), false, lookup);

        let error = auth
            .check_permission(Access::Read, &Tag::Model("m1".into()))
            .expect_err("lookup failed");
        assert!(matches!(error, AuthError::Backend(_)));
    }

    #[test]
    fn access_levels_are_ordered() {
        assert!(Access::Read < Access::Write);
        assert!(Access::Write < Access::Admin);
    }
}
