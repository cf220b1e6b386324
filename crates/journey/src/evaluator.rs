use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::context::JourneyContext;
use crate::types::{Route, RouteName};

pub type ConditionFn = dyn Fn(&Route, &JourneyContext) -> anyhow::Result<bool> + Send + Sync;

/// A user-supplied predicate deciding whether a route may be followed.
#[derive(Clone)]
pub struct Condition {
    label: Option<String>,
    func: Arc<ConditionFn>,
}

impl Condition {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Route, &JourneyContext) -> bool + Send + Sync + 'static,
    {
        Self::fallible(move |route, context| Ok(func(route, context)))
    }

    /// Predicate that may fail. A failure counts as "not satisfied".
    pub fn fallible<F>(func: F) -> Self
    where
        F: Fn(&Route, &JourneyContext) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            label: None,
            func: Arc::new(func),
        }
    }

    /// Condition that is always satisfied.
    pub fn always() -> Self {
        Self::new(|_, _| true).labelled("always")
    }

    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The same predicate, invoked with source and target exchanged. Used to
    /// derive a "prev" condition from a "next" one.
    pub fn swapped(&self) -> Self {
        let inner = Arc::clone(&self.func);
        Self {
            label: self.label.clone(),
            func: Arc::new(move |route: &Route, context: &JourneyContext| {
                inner(&route.reversed(), context)
            }),
        }
    }

    pub fn check(&self, route: &Route, context: &JourneyContext) -> anyhow::Result<bool> {
        (self.func)(route, context)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// The waypoint whose validation gates a route: the source when moving
/// forward, the target when moving back.
pub fn gating_waypoint(route: &Route) -> Option<&str> {
    match route.name {
        RouteName::Next => Some(route.source.as_str()),
        RouteName::Prev => route.target.as_deref(),
    }
}

/// A route's condition as stored in the plan: the user predicate (if any)
/// behind the default validation gate (if enabled).
#[derive(Debug, Clone)]
pub struct RouteCondition {
    follow: Option<Condition>,
    gated: bool,
}

impl RouteCondition {
    pub fn new(follow: Option<Condition>, gated: bool) -> Self {
        Self { follow, gated }
    }

    pub fn label(&self) -> Option<&str> {
        self.follow.as_ref().and_then(Condition::label)
    }

    pub fn is_gated(&self) -> bool {
        self.gated
    }

    /// Never fails: predicate errors and panics are logged and count as
    /// "not satisfied".
    pub fn evaluate(&self, route: &Route, context: &JourneyContext) -> bool {
        if self.gated {
            let passed = gating_waypoint(route).is_some_and(|wp| context.is_page_valid(wp));
            if !passed {
                return false;
            }
        }

        let Some(follow) = &self.follow else {
            return true;
        };

        match catch_unwind(AssertUnwindSafe(|| follow.check(route, context))) {
            Ok(Ok(satisfied)) => satisfied,
            Ok(Err(e)) => {
                warn!(
                    route_source = %route.source,
                    route_target = ?route.target,
                    route_name = %route.name,
                    label = ?follow.label(),
                    error = %e,
                    "Route condition failed; treating as unsatisfied"
                );
                false
            }
            Err(_) => {
                warn!(
                    route_source = %route.source,
                    route_target = ?route.target,
                    route_name = %route.name,
                    label = ?follow.label(),
                    "Route condition panicked; treating as unsatisfied"
                );
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn route(source: &str, target: &str, name: RouteName) -> Route {
        Route {
            source: source.into(),
            target: Some(target.into()),
            name,
            label: None,
        }
    }

    #[test]
    fn test_gate_uses_source_for_next() {
        let mut ctx = JourneyContext::new();
        let cond = RouteCondition::new(None, true);
        let next = route("a", "b", RouteName::Next);
        assert!(!cond.evaluate(&next, &ctx));
        ctx.clear_validation_errors_for_page("a").unwrap();
        assert!(cond.evaluate(&next, &ctx));
    }

    #[test]
    fn test_gate_uses_target_for_prev() {
        let mut ctx = JourneyContext::new();
        let cond = RouteCondition::new(None, true);
        let prev = route("b", "a", RouteName::Prev);
        ctx.clear_validation_errors_for_page("b").unwrap();
        assert!(!cond.evaluate(&prev, &ctx));
        ctx.clear_validation_errors_for_page("a").unwrap();
        assert!(cond.evaluate(&prev, &ctx));
    }

    #[test]
    fn test_ungated_condition_is_consulted_directly() {
        let ctx = JourneyContext::new();
        let yes = RouteCondition::new(Some(Condition::always()), false);
        let no = RouteCondition::new(Some(Condition::new(|_, _| false)), false);
        let next = route("a", "b", RouteName::Next);
        assert!(yes.evaluate(&next, &ctx));
        assert!(!no.evaluate(&next, &ctx));
    }

    #[test]
    fn test_failing_and_panicking_conditions_are_unsatisfied() {
        let ctx = JourneyContext::new();
        let next = route("a", "b", RouteName::Next);
        let failing = RouteCondition::new(
            Some(Condition::fallible(|_, _| Err(anyhow!("lookup failed")))),
            false,
        );
        let panicking = RouteCondition::new(
            Some(Condition::new(|_, _| panic!("boom"))),
            false,
        );
        assert!(!failing.evaluate(&next, &ctx));
        assert!(!panicking.evaluate(&next, &ctx));
    }

    #[test]
    fn test_swapped_condition_sees_reversed_route() {
        let ctx = JourneyContext::new();
        let cond = Condition::new(|r, _| r.source == "a").labelled("from-a");
        let swapped = cond.swapped();
        assert_eq!(swapped.label(), Some("from-a"));
        assert!(swapped.check(&route("b", "a", RouteName::Prev), &ctx).unwrap());
        assert!(!swapped.check(&route("a", "b", RouteName::Prev), &ctx).unwrap());
    }
}
