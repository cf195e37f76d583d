//! In-memory [`HealthReporter`] for asserting on lifecycle events.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use keel_config::Config;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;

/// One recorded health event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    /// Rendered bootstrap error.
    BootstrapFailed(String),
    /// Number of `(facade, version)` pairs registered.
    RegistryReady(usize),
    ConnectionOpened(String),
    ConnectionClosed {
        peer: String,
        stopped: usize,
    },
}

/// Appends every event to a list.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Events recorded so far.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events.lock().expect("event log poisoned").clone()
    }

    /// Polls until an event matching `predicate` is recorded or two seconds
    /// pass. Connection events are reported from connection threads, so they
    /// can trail the client's view of the socket.
    pub fn wait_for(&self, predicate: impl Fn(&HealthEvent) -> bool) -> Option<HealthEvent> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(event) = self.events().into_iter().find(|event| predicate(event)) {
                return Some(event);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn push(&self, event: HealthEvent) {
        self.events.lock().expect("event log poisoned").push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.push(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.push(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.push(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn registry_ready(&self, facades: usize) {
        self.push(HealthEvent::RegistryReady(facades));
    }

    fn connection_opened(&self, peer: &str) {
        self.push(HealthEvent::ConnectionOpened(peer.to_owned()));
    }

    fn connection_closed(&self, peer: &str, stopped: usize) {
        self.push(HealthEvent::ConnectionClosed {
            peer: peer.to_owned(),
            stopped,
        });
    }
}
