//! Thread-safe in-memory state backend.

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::auth::{Access, Authenticator, Identity, PermissionLookup};
use crate::names::Tag;

use super::seed::{Seed, SeedStatus};
use super::{
    Application, ChangeEvent, ChangeKind, Entity, EntityKind, Machine, Model, State, StateError,
    Unit,
};

const STATE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::state");

#[derive(Debug)]
struct Credential {
    password: String,
    controller: bool,
}

#[derive(Debug)]
struct Contents {
    model: Model,
    machines: BTreeMap<String, Machine>,
    applications: BTreeMap<String, Application>,
    units: BTreeMap<String, Unit>,
    credentials: BTreeMap<Tag, Credential>,
    grants: BTreeMap<(Tag, Tag), Access>,
    history: Vec<SeedStatus>,
    failure: Option<String>,
}

/// State backend holding every entity in memory.
///
/// Mutations publish [`ChangeEvent`]s to every live subscriber in the order
/// they are applied. The backend also serves permission lookups and login
/// checks from the users and grants it was seeded with.
#[derive(Debug)]
pub struct MemoryState {
    contents: Mutex<Contents>,
    subscribers: Mutex<Vec<Sender<ChangeEvent>>>,
}

impl MemoryState {
    /// Builds a backend from a seed document.
    #[must_use]
    pub fn from_seed(seed: Seed) -> Self {
        let Seed {
            model,
            machines,
            applications,
            units,
            users,
            grants,
            status_history,
        } = seed;
        let contents = Contents {
            model,
            machines: machines
                .into_iter()
                .map(|machine| (machine.id.clone(), machine))
                .collect(),
            applications: applications
                .into_iter()
                .map(|application| (application.name.clone(), application))
                .collect(),
            units: units
                .into_iter()
                .map(|unit| (unit.name.clone(), unit))
                .collect(),
            credentials: users
                .into_iter()
                .map(|user| {
                    let credential = Credential {
                        password: user.password,
                        controller: user.controller,
                    };
                    (user.tag, credential)
                })
                .collect(),
            grants: grants
                .into_iter()
                .map(|grant| ((grant.subject, grant.target), grant.access))
                .collect(),
            history: status_history,
            failure: None,
        };
        Self {
            contents: Mutex::new(contents),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Builds an empty backend hosting `model`.
    #[must_use]
    pub fn new(model: Model) -> Self {
        Self::from_seed(Seed::empty(model))
    }

    /// Inserts or replaces an entity, publishing `created` or `changed`.
    pub fn put(&self, entity: Entity) -> Result<ChangeKind, StateError> {
        let mut contents = self.contents()?;
        let existed = match &entity {
            Entity::Model(model) => {
                contents.model = model.clone();
                true
            }
            Entity::Machine(machine) => contents
                .machines
                .insert(machine.id.clone(), machine.clone())
                .is_some(),
            Entity::Application(application) => contents
                .applications
                .insert(application.name.clone(), application.clone())
                .is_some(),
            Entity::Unit(unit) => contents
                .units
                .insert(unit.name.clone(), unit.clone())
                .is_some(),
        };
        let change = if existed {
            ChangeKind::Changed
        } else {
            ChangeKind::Created
        };
        self.publish(ChangeEvent::of(change, entity));
        drop(contents);
        Ok(change)
    }

    /// Removes an entity, publishing `removed` with its last known state.
    pub fn remove(&self, kind: EntityKind, id: &str) -> Result<(), StateError> {
        let mut contents = self.contents()?;
        let removed = match kind {
            EntityKind::Model => None,
            EntityKind::Machine => contents.machines.remove(id).map(Entity::Machine),
            EntityKind::Application => contents.applications.remove(id).map(Entity::Application),
            EntityKind::Unit => contents.units.remove(id).map(Entity::Unit),
        };
        let entity = removed.ok_or_else(|| StateError::not_found(kind, id))?;
        self.publish(ChangeEvent::of(ChangeKind::Removed, entity));
        drop(contents);
        Ok(())
    }

    /// Registers login credentials for a principal.
    pub fn add_user(&self, tag: Tag, password: &str, controller: bool) -> Result<(), StateError> {
        let credential = Credential {
            password: password.to_owned(),
            controller,
        };
        self.contents()?.credentials.insert(tag, credential);
        Ok(())
    }

    /// Grants `access` on `target` to `subject`.
    pub fn grant(&self, subject: Tag, target: Tag, access: Access) -> Result<(), StateError> {
        self.contents()?.grants.insert((subject, target), access);
        Ok(())
    }

    /// Appends a status history record.
    pub fn record_status(&self, record: SeedStatus) -> Result<(), StateError> {
        self.contents()?.history.push(record);
        Ok(())
    }

    /// Number of retained status history records.
    pub fn status_history_len(&self) -> Result<usize, StateError> {
        Ok(self.contents()?.history.len())
    }

    /// Makes every subsequent call fail with a backend error until
    /// [`Self::recover`] is called.
    pub fn fail_with(&self, message: &str) -> Result<(), StateError> {
        self.contents()?.failure = Some(message.to_owned());
        Ok(())
    }

    /// Clears an injected failure.
    pub fn recover(&self) -> Result<(), StateError> {
        self.contents()?.failure = None;
        Ok(())
    }

    /// Drops every subscription, disconnecting their receivers.
    pub fn disconnect_subscribers(&self) -> Result<(), StateError> {
        let mut subscribers = self.subscribers()?;
        debug!(
            target: STATE_TARGET,
            count = subscribers.len(),
            "disconnecting state subscribers"
        );
        subscribers.clear();
        Ok(())
    }

    fn contents(&self) -> Result<MutexGuard<'_, Contents>, StateError> {
        self.contents
            .lock()
            .map_err(|_| StateError::Backend("state lock poisoned".to_owned()))
    }

    fn subscribers(&self) -> Result<MutexGuard<'_, Vec<Sender<ChangeEvent>>>, StateError> {
        self.subscribers
            .lock()
            .map_err(|_| StateError::Backend("subscriber lock poisoned".to_owned()))
    }

    /// Reads the contents, honouring an injected failure.
    fn healthy(&self) -> Result<MutexGuard<'_, Contents>, StateError> {
        let contents = self.contents()?;
        match &contents.failure {
            Some(message) => Err(StateError::Backend(message.clone())),
            None => Ok(contents),
        }
    }

    fn publish(&self, event: ChangeEvent) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

impl State for MemoryState {
    fn model(&self) -> Result<Model, StateError> {
        Ok(self.healthy()?.model.clone())
    }

    fn machine(&self, id: &str) -> Result<Machine, StateError> {
        self.healthy()?
            .machines
            .get(id)
            .cloned()
            .ok_or_else(|| StateError::not_found(EntityKind::Machine, id))
    }

    fn application(&self, name: &str) -> Result<Application, StateError> {
        self.healthy()?
            .applications
            .get(name)
            .cloned()
            .ok_or_else(|| StateError::not_found(EntityKind::Application, name))
    }

    fn unit(&self, name: &str) -> Result<Unit, StateError> {
        self.healthy()?
            .units
            .get(name)
            .cloned()
            .ok_or_else(|| StateError::not_found(EntityKind::Unit, name))
    }

    fn all_entities(&self) -> Result<Vec<Entity>, StateError> {
        let contents = self.healthy()?;
        let mut entities = vec![Entity::Model(contents.model.clone())];
        entities.extend(contents.machines.values().cloned().map(Entity::Machine));
        entities.extend(
            contents
                .applications
                .values()
                .cloned()
                .map(Entity::Application),
        );
        entities.extend(contents.units.values().cloned().map(Entity::Unit));
        Ok(entities)
    }

    fn subscribe(&self) -> Result<Receiver<ChangeEvent>, StateError> {
        drop(self.healthy()?);
        let (sender, receiver) = mpsc::channel();
        self.subscribers()?.push(sender);
        Ok(receiver)
    }

    fn prune_status_history(
        &self,
        max_age: Duration,
        max_entries: usize,
    ) -> Result<usize, StateError> {
        let mut contents = self.healthy()?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|error| StateError::Backend(error.to_string()))?
            .as_secs();
        let before = contents.history.len();

        if !max_age.is_zero() {
            let cutoff = now.saturating_sub(max_age.as_secs());
            contents.history.retain(|record| record.at >= cutoff);
        }
        if max_entries > 0 && contents.history.len() > max_entries {
            contents.history.sort_by_key(|record| record.at);
            let excess = contents.history.len() - max_entries;
            contents.history.drain(..excess);
        }

        let removed = before - contents.history.len();
        debug!(target: STATE_TARGET, removed, "pruned status history");
        Ok(removed)
    }
}

impl PermissionLookup for MemoryState {
    fn has_permission(
        &self,
        subject: &Tag,
        access: Access,
        target: &Tag,
    ) -> Result<bool, StateError> {
        let contents = self.healthy()?;
        if let (Tag::User(user), Tag::Model(uuid)) = (subject, target)
            && *uuid == contents.model.uuid
            && *user == contents.model.owner
        {
            return Ok(true);
        }
        let granted = contents
            .grants
            .get(&(subject.clone(), target.clone()))
            .is_some_and(|held| *held >= access);
        Ok(granted)
    }
}

impl Authenticator for MemoryState {
    fn authenticate(&self, tag: &Tag, credentials: &str) -> Result<Option<Identity>, StateError> {
        let contents = self.healthy()?;
        let identity = contents
            .credentials
            .get(tag)
            .filter(|credential| credential.password == credentials)
            .map(|credential| Identity::new(tag.clone(), credential.controller));
        Ok(identity)
    }
}
