//! Change sources backed by a state subscription.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use thiserror::Error;

use crate::state::ChangeEvent;

use super::ChangeSource;

/// Reasons a change source ends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The backend closed the subscription.
    #[error("state subscription closed")]
    Closed,
    /// The backend reported a failure.
    #[error("state backend failure: {0}")]
    Backend(String),
}

type Filter<T> = Box<dyn FnMut(ChangeEvent) -> Option<T> + Send>;

/// Filters and maps a state subscription into watcher changes.
pub struct StateSource<T> {
    events: Receiver<ChangeEvent>,
    filter: Filter<T>,
}

impl<T> StateSource<T> {
    /// Wraps a subscription; `filter` drops irrelevant events by returning
    /// `None`.
    pub fn new(
        events: Receiver<ChangeEvent>,
        filter: impl FnMut(ChangeEvent) -> Option<T> + Send + 'static,
    ) -> Self {
        Self {
            events,
            filter: Box::new(filter),
        }
    }
}

impl<T: Send + 'static> ChangeSource for StateSource<T> {
    type Change = T;

    fn next_change(&mut self, timeout: Duration) -> Result<Option<T>, SourceError> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok((self.filter)(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Closed),
        }
    }
}
