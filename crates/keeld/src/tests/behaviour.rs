//! Behavioural tests for the daemon bootstrap sequence.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::state::State;

use super::support::{self, HealthEvent, TestWorld};

type StepResult = Result<(), String>;

#[fixture]
fn world() -> RefCell<TestWorld> {
    support::world()
}

#[given("a healthy configuration loader")]
fn given_healthy_loader(world: &RefCell<TestWorld>) {
    world.borrow_mut().use_successful_loader();
}

#[given("a seeded configuration loader")]
fn given_seeded_loader(world: &RefCell<TestWorld>) {
    world.borrow_mut().use_seeded_loader();
}

#[given("a failing configuration loader")]
fn given_failing_loader(world: &RefCell<TestWorld>) {
    world.borrow_mut().use_failing_loader();
}

#[given("a configuration naming a missing state seed")]
fn given_missing_seed(world: &RefCell<TestWorld>) {
    world.borrow_mut().use_missing_seed_loader();
}

#[when("the daemon bootstrap runs")]
fn when_bootstrap_runs(world: &RefCell<TestWorld>) {
    world.borrow_mut().bootstrap();
}

#[then("bootstrap succeeds")]
fn then_bootstrap_succeeds(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    assert!(
        world.bootstrap_error().is_none(),
        "bootstrap error: {:?}",
        world.bootstrap_error()
    );
    assert!(world.daemon().is_some(), "daemon should have been initialised");
}

#[then("bootstrap fails")]
fn then_bootstrap_fails(world: &RefCell<TestWorld>) {
    assert!(
        world.borrow().bootstrap_error().is_some(),
        "bootstrap succeeded unexpectedly"
    );
}

#[then("the reporter recorded bootstrap start")]
fn then_reporter_start(world: &RefCell<TestWorld>) {
    assert!(
        world
            .borrow()
            .reporter
            .events()
            .contains(&HealthEvent::BootstrapStarting),
        "bootstrap start event missing"
    );
}

#[then("the reporter recorded bootstrap success")]
fn then_reporter_success(world: &RefCell<TestWorld>) {
    let events = world.borrow().reporter.events();
    assert!(
        events.contains(&HealthEvent::BootstrapSucceeded),
        "bootstrap success event missing: {events:?}"
    );
    assert!(
        events
            .iter()
            .any(|event| matches!(event, HealthEvent::RegistryReady(count) if *count > 0)),
        "registry readiness missing: {events:?}"
    );
}

#[then("the reporter recorded bootstrap failure")]
fn then_reporter_failure(world: &RefCell<TestWorld>) {
    let events = world.borrow().reporter.events();
    let failed = events
        .iter()
        .any(|event| matches!(event, HealthEvent::BootstrapFailed(_)));
    assert!(failed, "bootstrap failure event missing: {events:?}");
}

#[then("the registry serves \"{name}\" up to version {version}")]
fn then_registry_serves(world: &RefCell<TestWorld>, name: String, version: u32) -> StepResult {
    let world = world.borrow();
    let daemon = world.daemon().ok_or("daemon missing")?;
    let best = daemon
        .registry()
        .best_version(&name)
        .map_err(|error| error.to_string())?;
    if best == version {
        Ok(())
    } else {
        Err(format!("expected {name} v{version}, registry offers v{best}"))
    }
}

#[then("the hosted model is named \"{name}\"")]
fn then_model_named(world: &RefCell<TestWorld>, name: String) -> StepResult {
    let world = world.borrow();
    let daemon = world.daemon().ok_or("daemon missing")?;
    let model = daemon.state().model().map_err(|error| error.to_string())?;
    if model.name == name {
        Ok(())
    } else {
        Err(format!("hosted model is {}", model.name))
    }
}

#[scenario(path = "tests/features/daemon_bootstrap.feature", index = 0)]
fn bootstrap_succeeds(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(path = "tests/features/daemon_bootstrap.feature", index = 1)]
fn seed_populates_model(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(path = "tests/features/daemon_bootstrap.feature", index = 2)]
fn configuration_failure(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(path = "tests/features/daemon_bootstrap.feature", index = 3)]
fn missing_seed_failure(world: RefCell<TestWorld>) {
    let _ = world;
}
