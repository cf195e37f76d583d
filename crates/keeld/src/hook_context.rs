//! Adapter narrowing a request context to the calling unit.
//!
//! Hook tools run inside a unit agent and only ever need that unit. The
//! adapter resolves the unit from the authenticated identity before handing
//! control to the wrapped factory, so the wrapped code cannot reach any other
//! entity. New facades should take a [`Context`] directly instead.

use std::sync::Arc;

use tracing::debug;

use crate::names::Tag;
use crate::registry::{Context, FacadeError};
use crate::state::{State, Unit};

const HOOK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::hook_context");

/// Wraps a `(state, unit)` factory into a context factory.
///
/// The returned factory requires a unit agent, looks the unit up, and only
/// then calls `inner`.
pub fn hook_context_factory<F, Inner>(
    inner: Inner,
) -> impl Fn(&Context) -> Result<F, FacadeError> + Send + Sync + 'static
where
    Inner: Fn(Arc<dyn State>, Unit) -> Result<F, FacadeError> + Send + Sync + 'static,
{
    move |context: &Context| {
        let auth = context.auth();
        if !auth.auth_unit_agent() {
            return Err(FacadeError::PermissionDenied);
        }
        let Tag::Unit(name) = auth.tag() else {
            return Err(FacadeError::internal(format!(
                "expected a unit tag, got {}",
                auth.tag()
            )));
        };
        let unit = context.state().unit(name)?;
        debug!(target: HOOK_TARGET, unit = %unit.name, "resolved hook context unit");
        inner(context.state().clone(), unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rstest::rstest;

    use crate::state::{EntityKind, MemoryState};
    use crate::tests::support::fixtures::{context_for, demo_state};

    fn unit_name_factory(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn(&Context) -> Result<String, FacadeError> {
        hook_context_factory(move |_state: Arc<dyn State>, unit: Unit| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(unit.name)
        })
    }

    #[rstest]
    fn resolves_the_calling_unit() {
        let state = demo_state();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = unit_name_factory(calls.clone());
        let context = context_for(Tag::Unit("mysql/0".into()), false, &state);

        assert_eq!(factory(&context).expect("unit resolves"), "mysql/0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[case(Tag::User("admin".into()))]
    #[case(Tag::Machine("0".into()))]
    fn non_unit_callers_are_denied(#[case] tag: Tag) {
        let state = demo_state();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = unit_name_factory(calls.clone());

        let error = factory(&context_for(tag, false, &state)).expect_err("must be denied");
        assert_eq!(error, FacadeError::PermissionDenied);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    fn missing_unit_is_not_found() {
        let state = demo_state();
        state
            .remove(EntityKind::Unit, "mysql/0")
            .expect("unit exists");
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = unit_name_factory(calls.clone());

        let error = factory(&context_for(Tag::Unit("mysql/0".into()), false, &state))
            .expect_err("removed unit");
        assert!(matches!(error, FacadeError::NotFound(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    fn backend_failure_is_reported() {
        let state: Arc<MemoryState> = demo_state();
        state.fail_with("database offline").expect("failure injected");
        let factory = unit_name_factory(Arc::new(AtomicUsize::new(0)));

        let error = factory(&context_for(Tag::Unit("mysql/0".into()), false, &state))
            .expect_err("backend is down");
        assert_eq!(error, FacadeError::Backend("database offline".into()));
    }
}
