//! `Client` v1: watch entry points for end users.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::auth::Access;
use crate::registry::{Context, FacadeError, FacadeRegistry, MethodTable, NoParams, RegistryError};
use crate::state::{ChangeEvent, Entity, EntityKind};
use crate::watcher::{
    AllWatcher, Coalesce, Delta, DeltaBuffer, EntityBuffer, EntityWatcher, NotifyBuffer,
    NotifyWatcher, StateSource, StringsBuffer, StringsWatcher, Watcher,
};

use super::WatchResult;

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::facades::client");

pub(super) fn register(registry: &mut FacadeRegistry) -> Result<(), RegistryError> {
    let methods = MethodTable::new()
        .method("WatchAll", |client: &Client, _: NoParams| client.watch_all())
        .method("WatchAllModels", |client: &Client, _: NoParams| {
            client.watch_all_models()
        })
        .method("WatchMachines", |client: &Client, _: NoParams| {
            client.watch_machines()
        })
        .method("WatchModel", |client: &Client, _: NoParams| client.watch_model())
        .method("WatchEntities", |client: &Client, params: WatchEntities| {
            client.watch_entities(&params.kinds)
        });
    registry.register("Client", 1, Client::build, methods)
}

/// `WatchEntities` parameters.
#[derive(Debug, Default, Deserialize)]
pub struct WatchEntities {
    /// Collections to watch; empty watches every collection.
    #[serde(default)]
    pub kinds: Vec<EntityKind>,
}

struct Client {
    context: Context,
}

impl Client {
    fn build(context: &Context) -> Result<Self, FacadeError> {
        let auth = context.auth();
        if !auth.auth_client() {
            return Err(FacadeError::PermissionDenied);
        }
        auth.check_permission(Access::Read, &context.model_tag()?)?;
        Ok(Self {
            context: context.clone(),
        })
    }

    fn watch_all(&self) -> Result<WatchResult, FacadeError> {
        let watcher = self.all_watcher("all-watcher")?;
        self.start(watcher)
    }

    fn watch_all_models(&self) -> Result<WatchResult, FacadeError> {
        let model = self.context.model_tag()?;
        self.context.auth().check_permission(Access::Admin, &model)?;
        let watcher = self.all_watcher("all-model-watcher")?;
        self.start(watcher)
    }

    fn all_watcher(&self, kind: &'static str) -> Result<AllWatcher, FacadeError> {
        let state = self.context.state();
        let events = state.subscribe()?;
        let snapshot = state.all_entities()?;
        let source = StateSource::new(events, |event: ChangeEvent| {
            Some(Delta {
                kind: event.kind,
                id: event.id,
                change: event.change,
                entity: event.entity,
            })
        });
        Ok(Watcher::spawn(
            kind,
            source,
            DeltaBuffer::seeded(snapshot),
            self.context.watcher_poll(),
        )?)
    }

    fn watch_machines(&self) -> Result<WatchResult, FacadeError> {
        let state = self.context.state();
        let events = state.subscribe()?;
        let mut initial = StringsBuffer::default();
        for entity in state.all_entities()? {
            if let Entity::Machine(machine) = entity {
                initial.push(machine.id);
            }
        }
        let source = StateSource::new(events, |event: ChangeEvent| {
            (event.kind == EntityKind::Machine).then_some(event.id)
        });
        let watcher: StringsWatcher = Watcher::spawn(
            "machines-watcher",
            source,
            initial,
            self.context.watcher_poll(),
        )?;
        self.start(watcher)
    }

    fn watch_model(&self) -> Result<WatchResult, FacadeError> {
        let events = self.context.state().subscribe()?;
        let mut initial = NotifyBuffer::default();
        initial.push(());
        let source = StateSource::new(events, |event: ChangeEvent| {
            (event.kind == EntityKind::Model).then_some(())
        });
        let watcher: NotifyWatcher =
            Watcher::spawn("model-watcher", source, initial, self.context.watcher_poll())?;
        self.start(watcher)
    }

    fn watch_entities(&self, kinds: &[EntityKind]) -> Result<WatchResult, FacadeError> {
        let events = self.context.state().subscribe()?;
        let kinds = kinds.to_vec();
        let source = StateSource::new(events, move |event: ChangeEvent| {
            (kinds.is_empty() || kinds.contains(&event.kind))
                .then(|| (format!("{}/{}", event.kind, event.id), event.change))
        });
        let watcher: EntityWatcher = Watcher::spawn(
            "entity-watcher",
            source,
            EntityBuffer::default(),
            self.context.watcher_poll(),
        )?;
        self.start(watcher)
    }

    fn start<C: Coalesce>(&self, watcher: Watcher<C>) -> Result<WatchResult, FacadeError> {
        let watcher_id = self.context.resources().register(Arc::new(watcher))?;
        debug!(target: CLIENT_TARGET, %watcher_id, "watcher registered");
        Ok(WatchResult { watcher_id })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use rstest::{fixture, rstest};
    use serde_json::{Value, json};

    use super::*;
    use crate::facades::build_registry;
    use crate::names::Tag;
    use crate::resources::ResourceTable;
    use crate::state::{ChangeKind, MemoryState, Unit};
    use crate::tests::support::fixtures::{context_with, demo_state};

    const SETTLE: Duration = Duration::from_millis(50);

    struct Harness {
        registry: FacadeRegistry,
        state: Arc<MemoryState>,
        resources: Arc<ResourceTable>,
    }

    impl Harness {
        fn call_as(
            &self,
            tag: Tag,
            facade: &str,
            version: u32,
            id: Option<&str>,
            method: &str,
            params: Value,
        ) -> Result<Value, FacadeError> {
            let context = context_with(tag, false, &self.state, self.resources.clone(), id);
            self.registry
                .lookup(facade, version)?
                .call(&context, method, params)
        }

        fn call(
            &self,
            facade: &str,
            version: u32,
            id: Option<&str>,
            method: &str,
            params: Value,
        ) -> Result<Value, FacadeError> {
            self.call_as(Tag::User("admin".into()), facade, version, id, method, params)
        }

        fn watch(&self, method: &str, params: Value) -> String {
            let result = self
                .call("Client", 1, None, method, params)
                .expect("watch succeeds");
            result["watcher_id"]
                .as_str()
                .expect("watcher id")
                .to_owned()
        }

        fn put_unit(&self, name: &str, address: Option<&str>) -> ChangeKind {
            self.state
                .put(Entity::Unit(Unit {
                    name: name.to_owned(),
                    machine: Some("0".to_owned()),
                    public_address: address.map(str::to_owned),
                    private_address: None,
                }))
                .expect("put unit")
        }
    }

    #[fixture]
    fn harness() -> Harness {
        Harness {
            registry: build_registry().expect("registry"),
            state: demo_state(),
            resources: Arc::new(ResourceTable::new()),
        }
    }

    #[rstest]
    #[case(Tag::User("bob".into()))]
    #[case(Tag::Machine("0".into()))]
    #[case(Tag::Unit("mysql/0".into()))]
    fn unauthorised_callers_create_nothing(harness: Harness, #[case] tag: Tag) {
        let error = harness
            .call_as(tag, "Client", 1, None, "WatchAll", Value::Null)
            .expect_err("caller lacks read access");
        assert_eq!(error, FacadeError::PermissionDenied);
        assert!(harness.resources.is_empty());
    }

    #[rstest]
    fn readers_may_watch_but_not_watch_all_models(harness: Harness) {
        let alice = || Tag::User("alice".into());
        harness
            .call_as(alice(), "Client", 1, None, "WatchAll", Value::Null)
            .expect("read access suffices");
        let error = harness
            .call_as(alice(), "Client", 1, None, "WatchAllModels", Value::Null)
            .expect_err("admin access required");
        assert_eq!(error, FacadeError::PermissionDenied);
        assert_eq!(harness.resources.len(), 1);
    }

    #[rstest]
    fn entity_watcher_reports_latest_change(harness: Harness) {
        let id = harness.watch("WatchEntities", json!({"kinds": ["unit"]}));
        harness.put_unit("mysql/0", Some("10.0.0.9"));
        harness.put_unit("mysql/0", Some("10.0.0.10"));
        thread::sleep(SETTLE);

        let batch = harness
            .call("EntityWatcher", 2, Some(&id), "Next", Value::Null)
            .expect("next");
        assert_eq!(batch, json!({"changed": ["unit/mysql/0"]}));
    }

    #[rstest]
    fn entity_watcher_ignores_other_kinds(harness: Harness) {
        let id = harness.watch("WatchEntities", json!({"kinds": ["machine"]}));
        harness.put_unit("mysql/7", None);
        thread::sleep(SETTLE);

        let watcher = harness
            .resources
            .get_as::<EntityWatcher>(&id)
            .expect("entity watcher");
        let batch = watcher
            .next_timeout(Duration::from_millis(20))
            .expect("watcher active");
        assert!(batch.is_none());
    }

    #[rstest]
    fn all_watcher_starts_from_a_snapshot(harness: Harness) {
        let id = harness.watch("WatchAll", Value::Null);
        let batch = harness
            .call("AllWatcher", 2, Some(&id), "Next", Value::Null)
            .expect("next");
        let deltas = batch["deltas"].as_array().expect("deltas");
        assert_eq!(deltas.len(), 5);
        assert!(deltas.iter().all(|delta| delta["change"] == "created"));
    }

    #[rstest]
    fn legacy_all_watcher_folds_created_into_changed(harness: Harness) {
        let id = harness.watch("WatchAll", Value::Null);
        let batch = harness
            .call("AllWatcher", 1, Some(&id), "Next", Value::Null)
            .expect("next");
        let deltas = batch["deltas"].as_array().expect("deltas");
        assert!(deltas.iter().all(|delta| delta["removed"] == false));
        assert!(deltas.iter().all(|delta| delta.get("change").is_none()));
    }

    #[rstest]
    fn create_then_remove_before_delivery_is_dropped(harness: Harness) {
        let id = harness.watch("WatchAll", Value::Null);
        harness
            .call("AllWatcher", 2, Some(&id), "Next", Value::Null)
            .expect("drain snapshot");

        harness.put_unit("mysql/5", None);
        harness
            .state
            .remove(EntityKind::Unit, "mysql/5")
            .expect("remove unit");
        harness.put_unit("mysql/1", Some("10.0.0.11"));
        thread::sleep(SETTLE);

        let batch = harness
            .call("AllWatcher", 2, Some(&id), "Next", Value::Null)
            .expect("next");
        let deltas = batch["deltas"].as_array().expect("deltas");
        assert_eq!(deltas.len(), 1, "{batch}");
        assert_eq!(deltas[0]["id"], "mysql/1");
        assert_eq!(deltas[0]["change"], "changed");
    }

    #[rstest]
    fn machines_and_model_watchers_fire_initially(harness: Harness) {
        let machines = harness.watch("WatchMachines", Value::Null);
        let batch = harness
            .call("StringsWatcher", 1, Some(&machines), "Next", Value::Null)
            .expect("next");
        assert_eq!(batch, json!({"changes": ["0"]}));

        let model = harness.watch("WatchModel", Value::Null);
        let batch = harness
            .call("NotifyWatcher", 1, Some(&model), "Next", Value::Null)
            .expect("next");
        assert_eq!(batch, json!({}));
    }

    #[rstest]
    fn stop_unblocks_next_and_forgets_the_id(harness: Harness) {
        let id = harness.watch("WatchEntities", Value::Null);
        let (stopped, after) = thread::scope(|scope| {
            let pending =
                scope.spawn(|| harness.call("EntityWatcher", 2, Some(&id), "Next", Value::Null));
            thread::sleep(SETTLE);
            harness
                .call("EntityWatcher", 2, Some(&id), "Stop", Value::Null)
                .expect("stop");
            let stopped = pending.join().expect("next thread");
            let after = harness.call("EntityWatcher", 2, Some(&id), "Next", Value::Null);
            (stopped, after)
        });

        assert_eq!(stopped, Err(FacadeError::Stopped));
        assert!(matches!(after, Err(FacadeError::NotFound(_))));
        harness
            .call("EntityWatcher", 2, Some(&id), "Stop", Value::Null)
            .expect("stopping twice is harmless");
    }

    #[rstest]
    fn wrong_watcher_facade_is_a_bad_request(harness: Harness) {
        let id = harness.watch("WatchModel", Value::Null);
        let error = harness
            .call("StringsWatcher", 1, Some(&id), "Next", Value::Null)
            .expect_err("kind mismatch");
        assert!(matches!(error, FacadeError::BadRequest(_)));
    }

    #[rstest]
    fn wrong_watcher_facade_cannot_stop_another_kind(harness: Harness) {
        let id = harness.watch("WatchAll", Value::Null);
        let error = harness
            .call("NotifyWatcher", 1, Some(&id), "Stop", Value::Null)
            .expect_err("kind mismatch");
        assert!(matches!(error, FacadeError::BadRequest(_)));
        assert_eq!(harness.resources.len(), 1);

        harness
            .call("AllWatcher", 2, Some(&id), "Stop", Value::Null)
            .expect("matching kind stops");
        assert!(harness.resources.is_empty());
    }

    #[rstest]
    fn backend_failure_stops_the_watcher(harness: Harness) {
        let id = harness.watch("WatchEntities", Value::Null);
        harness
            .state
            .disconnect_subscribers()
            .expect("disconnect subscribers");
        thread::sleep(SETTLE);

        let error = harness
            .call("EntityWatcher", 2, Some(&id), "Next", Value::Null)
            .expect_err("source closed");
        assert_eq!(error, FacadeError::Stopped);
    }
}
