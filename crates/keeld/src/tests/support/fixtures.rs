//! Shared state and context builders for unit and behavioural tests.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Access, Authorizer, Identity};
use crate::names::Tag;
use crate::registry::Context;
use crate::resources::ResourceTable;
use crate::state::{
    Application, Machine, MemoryState, Model, ResourceInfo, Seed, SeedGrant, SeedStatus, SeedUser,
    State, Unit,
};

/// Uuid of the model hosted by [`demo_state`].
pub const MODEL_UUID: &str = "deadbeef-0bad-400d-8000-4b1d0d06f00d";

/// Poll interval used by watchers created in tests.
pub const TEST_POLL: Duration = Duration::from_millis(5);

/// Seed with one machine, one application with two units, and a few users.
///
/// | user            | password   | notes                     |
/// |-----------------|------------|---------------------------|
/// | `user-admin`    | `hunter2`  | model owner               |
/// | `user-alice`    | `alice`    | read on the model         |
/// | `user-bob`      | `bob`      | no grants                 |
/// | `unit-mysql-0`  | `unit`     | unit agent                |
/// | `controller-…`  | `ctrl`     | controller agent          |
#[must_use]
pub fn demo_seed() -> Seed {
    let mut seed = Seed::empty(Model {
        uuid: MODEL_UUID.to_owned(),
        name: "prod".to_owned(),
        owner: "admin".to_owned(),
    });
    seed.machines.push(Machine {
        id: "0".to_owned(),
        public_address: Some("10.0.0.1".to_owned()),
        private_address: Some("192.168.0.1".to_owned()),
        addresses: vec!["10.0.0.1".to_owned(), "192.168.0.1".to_owned()],
    });
    seed.applications.push(Application {
        name: "mysql".to_owned(),
        leader: Some("mysql/0".to_owned()),
        resources: vec![ResourceInfo {
            name: "backup-tool".to_owned(),
            revision: 3,
            fingerprint: "sha384:0f3c".to_owned(),
        }],
    });
    for name in ["mysql/0", "mysql/1"] {
        seed.units.push(Unit {
            name: name.to_owned(),
            machine: Some("0".to_owned()),
            public_address: None,
            private_address: None,
        });
    }
    seed.users = vec![
        user(Tag::User("admin".into()), "hunter2", false),
        user(Tag::User("alice".into()), "alice", false),
        user(Tag::User("bob".into()), "bob", false),
        user(Tag::Unit("mysql/0".into()), "unit", false),
        user(Tag::Controller(MODEL_UUID.into()), "ctrl", true),
    ];
    seed.grants.push(SeedGrant {
        subject: Tag::User("alice".into()),
        target: Tag::Model(MODEL_UUID.into()),
        access: Access::Read,
    });
    seed.status_history = (1..=4)
        .map(|at| SeedStatus {
            entity: Tag::Unit("mysql/0".into()),
            at,
            message: format!("status {at}"),
        })
        .collect();
    seed
}

fn user(tag: Tag, password: &str, controller: bool) -> SeedUser {
    SeedUser {
        tag,
        password: password.to_owned(),
        controller,
    }
}

/// Backend populated from [`demo_seed`].
#[must_use]
pub fn demo_state() -> Arc<MemoryState> {
    Arc::new(MemoryState::from_seed(demo_seed()))
}

/// Request context for `tag` against `state` with a fresh resource table.
#[must_use]
pub fn context_for(tag: Tag, controller: bool, state: &Arc<MemoryState>) -> Context {
    context_with(tag, controller, state, Arc::new(ResourceTable::new()), None)
}

/// Request context sharing an existing resource table.
#[must_use]
pub fn context_with(
    tag: Tag,
    controller: bool,
    state: &Arc<MemoryState>,
    resources: Arc<ResourceTable>,
    id: Option<&str>,
) -> Context {
    let auth = Authorizer::new(Identity::new(tag, controller), state.clone());
    let backend: Arc<dyn State> = state.clone();
    Context::new(
        Arc::new(auth),
        backend,
        resources,
        id.map(str::to_owned),
        TEST_POLL,
    )
}

/// Context for the model owner.
#[must_use]
pub fn admin_context(state: &Arc<MemoryState>) -> Context {
    context_for(Tag::User("admin".into()), false, state)
}
