//! Lifecycle tests for watchers.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use super::*;
use crate::state::{ChangeEvent, ChangeKind, Entity, Unit};

const POLL: Duration = Duration::from_millis(5);
const PATIENCE: Duration = Duration::from_secs(2);

fn unit_event(name: &str, change: ChangeKind) -> ChangeEvent {
    ChangeEvent::of(
        change,
        Entity::Unit(Unit {
            name: name.into(),
            machine: None,
            public_address: None,
            private_address: None,
        }),
    )
}

struct EntityHarness {
    events: Sender<ChangeEvent>,
    watcher: Arc<EntityWatcher>,
}

#[fixture]
fn harness() -> EntityHarness {
    let (events, receiver) = mpsc::channel();
    let source = StateSource::new(receiver, |event: ChangeEvent| {
        Some((format!("{}/{}", event.kind, event.id), event.change))
    });
    let watcher = Watcher::spawn("entity-watcher", source, EntityBuffer::default(), POLL)
        .expect("spawn watcher");
    EntityHarness {
        events,
        watcher: Arc::new(watcher),
    }
}

struct FailingSource;

impl ChangeSource for FailingSource {
    type Change = ();

    fn next_change(&mut self, _timeout: Duration) -> Result<Option<()>, SourceError> {
        Err(SourceError::Backend("replica set lost".into()))
    }
}

#[rstest]
fn next_returns_pending_changes(harness: EntityHarness) {
    harness
        .events
        .send(unit_event("mysql/0", ChangeKind::Changed))
        .expect("send");
    let batch = harness.watcher.next().expect("batch");
    assert_eq!(batch.changed, vec!["unit/mysql/0".to_owned()]);
}

#[rstest]
fn two_updates_between_calls_coalesce(harness: EntityHarness) {
    harness
        .events
        .send(unit_event("mysql/0", ChangeKind::Created))
        .expect("send");
    harness
        .events
        .send(unit_event("mysql/0", ChangeKind::Changed))
        .expect("send");
    thread::sleep(POLL * 20);

    let batch = harness.watcher.next().expect("batch");
    assert_eq!(batch.changed, vec!["unit/mysql/0".to_owned()]);
    assert!(batch.created.is_empty());
    assert!(harness.watcher.next_timeout(POLL * 4).expect("wait").is_none());
}

#[rstest]
fn next_without_changes_keeps_waiting(harness: EntityHarness) {
    let batch = harness.watcher.next_timeout(POLL * 10).expect("wait");
    assert!(batch.is_none());
}

#[rstest]
fn stop_unblocks_a_pending_next(harness: EntityHarness) {
    let watcher = Arc::clone(&harness.watcher);
    let started = Arc::new(Barrier::new(2));
    let waiter_started = Arc::clone(&started);
    let waiter = thread::spawn(move || {
        waiter_started.wait();
        watcher.next()
    });

    started.wait();
    thread::sleep(POLL * 4);
    let begun = Instant::now();
    harness.watcher.stop().expect("stop");
    let outcome = waiter.join().expect("waiter thread");

    assert_eq!(outcome, Err(WatcherError::Stopped));
    assert!(begun.elapsed() < PATIENCE);
}

#[rstest]
fn stopped_watchers_fail_immediately_even_with_pending_changes(harness: EntityHarness) {
    harness
        .events
        .send(unit_event("mysql/0", ChangeKind::Changed))
        .expect("send");
    thread::sleep(POLL * 4);
    harness.watcher.stop().expect("stop");
    harness.watcher.stop().expect("second stop is harmless");
    assert_eq!(harness.watcher.next(), Err(WatcherError::Stopped));
    assert!(harness.watcher.is_stopped());
}

#[test]
fn source_failure_stops_the_watcher() {
    let watcher: NotifyWatcher =
        Watcher::spawn("notify-watcher", FailingSource, NotifyBuffer::default(), POLL)
            .expect("spawn watcher");
    assert_eq!(watcher.next(), Err(WatcherError::Stopped));
    watcher.stop().expect("stop after failure");
}

#[test]
fn disconnected_sources_stop_the_watcher() {
    let (events, receiver) = mpsc::channel::<ChangeEvent>();
    let source = StateSource::new(receiver, |_| Some(()));
    let watcher: NotifyWatcher =
        Watcher::spawn("notify-watcher", source, NotifyBuffer::default(), POLL)
            .expect("spawn watcher");
    drop(events);
    assert_eq!(watcher.next(), Err(WatcherError::Stopped));
}

#[test]
fn initial_contents_are_delivered_first() {
    let (_events, receiver) = mpsc::channel::<ChangeEvent>();
    let source = StateSource::new(receiver, |_| None::<String>);
    let mut initial = StringsBuffer::default();
    initial.push("0".into());
    let watcher: StringsWatcher =
        Watcher::spawn("strings-watcher", source, initial, POLL).expect("spawn watcher");
    assert_eq!(watcher.next(), Ok(vec!["0".to_owned()]));
    watcher.stop().expect("stop");
}
