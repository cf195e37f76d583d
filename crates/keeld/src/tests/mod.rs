//! Test suites for the keel daemon.

mod behaviour;
pub(crate) mod support;
