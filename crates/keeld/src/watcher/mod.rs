//! Push-style change subscriptions.
//!
//! A [`Watcher`] owns a background thread that drains a [`ChangeSource`] into
//! a coalescing buffer. Clients pull batches with [`Watcher::next`], which
//! blocks until the buffer holds something or the watcher stops. The
//! [`Coalesce`] implementation decides what a batch looks like and how
//! repeated changes to one key fold together.

mod coalesce;
mod source;

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::resources::{Resource, ResourceError};

pub use coalesce::{Delta, DeltaBuffer, EntityBuffer, EntityChanges, NotifyBuffer, StringsBuffer};
pub use source::{SourceError, StateSource};

const WATCHER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::watcher");

/// Accumulates changes between two deliveries.
pub trait Coalesce: Default + Send + 'static {
    /// A single change fed into the buffer.
    type Change: Send + 'static;
    /// What one call to [`Watcher::next`] returns.
    type Batch;

    /// Folds a change into the pending set.
    fn push(&mut self, change: Self::Change);

    /// Whether anything is waiting to be delivered.
    fn is_empty(&self) -> bool;

    /// Removes and returns everything pending.
    fn take(&mut self) -> Self::Batch;
}

/// Producer of changes for a watcher's background thread.
pub trait ChangeSource: Send + 'static {
    /// Change type produced.
    type Change: Send + 'static;

    /// Waits up to `timeout` for the next relevant change.
    ///
    /// `Ok(None)` means nothing relevant arrived in time. An error ends the
    /// subscription and stops the watcher.
    fn next_change(&mut self, timeout: Duration) -> Result<Option<Self::Change>, SourceError>;
}

/// Errors returned by watcher operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatcherError {
    /// The watcher has stopped; no further batches will be delivered.
    #[error("watcher was stopped")]
    Stopped,
    /// The background thread could not be started.
    #[error("failed to start watcher thread: {0}")]
    Spawn(String),
    /// The background thread panicked.
    #[error("watcher thread panicked")]
    WorkerPanicked,
    /// An internal lock was poisoned.
    #[error("watcher lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Status {
    Active,
    Stopped,
}

struct Pending<C> {
    buffer: C,
    status: Status,
}

struct Shared<C> {
    pending: Mutex<Pending<C>>,
    wake: Condvar,
}

impl<C: Coalesce> Shared<C> {
    fn lock(&self) -> Result<MutexGuard<'_, Pending<C>>, WatcherError> {
        self.pending.lock().map_err(|_| WatcherError::Poisoned)
    }

    fn is_stopped(&self) -> bool {
        self.lock()
            .map_or(true, |pending| pending.status == Status::Stopped)
    }

    fn push(&self, change: C::Change) {
        let Ok(mut pending) = self.lock() else {
            return;
        };
        if pending.status == Status::Active {
            pending.buffer.push(change);
            self.wake.notify_all();
        }
    }

    /// Moves the watcher to its terminal state and wakes every waiter.
    fn halt(&self) {
        match self.pending.lock() {
            Ok(mut pending) => pending.status = Status::Stopped,
            Err(poisoned) => poisoned.into_inner().status = Status::Stopped,
        }
        self.wake.notify_all();
    }
}

/// A subscription delivering coalesced batches on demand.
pub struct Watcher<C: Coalesce> {
    kind: &'static str,
    shared: Arc<Shared<C>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Watcher delivering bare "something changed" signals.
pub type NotifyWatcher = Watcher<NotifyBuffer>;
/// Watcher delivering sets of changed ids.
pub type StringsWatcher = Watcher<StringsBuffer>;
/// Watcher delivering per-key change tags.
pub type EntityWatcher = Watcher<EntityBuffer>;
/// Watcher delivering the merged multi-entity feed.
pub type AllWatcher = Watcher<DeltaBuffer>;

impl<C: Coalesce> Watcher<C> {
    /// Starts a watcher over `source`, with `initial` already pending.
    ///
    /// `poll` bounds how long the background thread waits on the source
    /// before re-checking whether it has been stopped.
    pub fn spawn<S>(
        kind: &'static str,
        source: S,
        initial: C,
        poll: Duration,
    ) -> Result<Self, WatcherError>
    where
        S: ChangeSource<Change = C::Change>,
    {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Pending {
                buffer: initial,
                status: Status::Active,
            }),
            wake: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(format!("keel-{kind}"))
            .spawn(move || drain_source(kind, source, &worker_shared, poll))
            .map_err(|error| WatcherError::Spawn(error.to_string()))?;
        debug!(target: WATCHER_TARGET, kind, "watcher started");
        Ok(Self {
            kind,
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Blocks until at least one change is pending, then returns the batch.
    ///
    /// Returns [`WatcherError::Stopped`] as soon as the watcher stops, even if
    /// changes were still pending.
    pub fn next(&self) -> Result<C::Batch, WatcherError> {
        let mut pending = self.shared.lock()?;
        loop {
            if pending.status == Status::Stopped {
                return Err(WatcherError::Stopped);
            }
            if !pending.buffer.is_empty() {
                return Ok(pending.buffer.take());
            }
            pending = self
                .shared
                .wake
                .wait(pending)
                .map_err(|_| WatcherError::Poisoned)?;
        }
    }

    /// Like [`Self::next`] but gives up after `timeout`, returning `None`.
    pub fn next_timeout(&self, timeout: Duration) -> Result<Option<C::Batch>, WatcherError> {
        let pending = self.shared.lock()?;
        let (mut pending, _) = self
            .shared
            .wake
            .wait_timeout_while(pending, timeout, |pending| {
                pending.status == Status::Active && pending.buffer.is_empty()
            })
            .map_err(|_| WatcherError::Poisoned)?;
        if pending.status == Status::Stopped {
            return Err(WatcherError::Stopped);
        }
        if pending.buffer.is_empty() {
            return Ok(None);
        }
        Ok(Some(pending.buffer.take()))
    }

    /// Stops the watcher and waits for its background thread to exit.
    ///
    /// Any pending [`Self::next`] returns [`WatcherError::Stopped`]. Calling
    /// this more than once is harmless.
    pub fn stop(&self) -> Result<(), WatcherError> {
        self.shared.halt();
        let worker = self
            .worker
            .lock()
            .map_err(|_| WatcherError::Poisoned)?
            .take();
        let Some(worker) = worker else {
            return Ok(());
        };
        if worker.thread().id() == thread::current().id() {
            return Ok(());
        }
        worker.join().map_err(|_| WatcherError::WorkerPanicked)?;
        debug!(target: WATCHER_TARGET, kind = self.kind, "watcher stopped");
        Ok(())
    }

    /// Whether the watcher has reached its terminal state.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }
}

impl<C: Coalesce> Resource for Watcher<C> {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn stop(&self) -> Result<(), ResourceError> {
        Self::stop(self).map_err(|error| ResourceError::Stop {
            kind: self.kind,
            message: error.to_string(),
        })
    }
}

impl<C: Coalesce> Drop for Watcher<C> {
    fn drop(&mut self) {
        self.shared.halt();
    }
}

fn drain_source<C, S>(kind: &'static str, mut source: S, shared: &Shared<C>, poll: Duration)
where
    C: Coalesce,
    S: ChangeSource<Change = C::Change>,
{
    while !shared.is_stopped() {
        match source.next_change(poll) {
            Ok(Some(change)) => shared.push(change),
            Ok(None) => {}
            Err(error) => {
                warn!(
                    target: WATCHER_TARGET,
                    kind,
                    %error,
                    "change source failed; stopping watcher"
                );
                shared.halt();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests;
