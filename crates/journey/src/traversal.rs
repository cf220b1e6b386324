//! Walking a plan for a given context.
//!
//! From a start waypoint, follow the single satisfied route of the requested
//! name until none (or several unresolved) remain, a route repeats, or the
//! stop condition holds. The walk always ends because each distinct route is
//! recorded at most once.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};
use waymark_core::{WaymarkError, WaymarkResult};

use crate::arbiter::{self, ArbitrationContext, Arbiter};
use crate::context::JourneyContext;
use crate::plan::Plan;
use crate::types::{is_exit_node, Route, RouteKey, RouteName};

pub type StopCondition = dyn Fn(&Route) -> bool + Send + Sync;

#[derive(Clone, Default)]
pub struct TraversalOptions {
    /// Defaults to the plan's first waypoint.
    pub start_waypoint: Option<String>,
    pub stop_condition: Option<Arc<StopCondition>>,
    /// Overrides the plan's arbiter for this walk.
    pub arbiter: Option<Arbiter>,
}

impl TraversalOptions {
    pub fn starting_at(waypoint: impl Into<String>) -> Self {
        Self {
            start_waypoint: Some(waypoint.into()),
            ..Self::default()
        }
    }

    pub fn stop_when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Route) -> bool + Send + Sync + 'static,
    {
        self.stop_condition = Some(Arc::new(condition));
        self
    }

    pub fn with_arbiter(mut self, arbiter: Arbiter) -> Self {
        self.arbiter = Some(arbiter);
        self
    }
}

impl fmt::Debug for TraversalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraversalOptions")
            .field("start_waypoint", &self.start_waypoint)
            .field("stop_condition", &self.stop_condition.is_some())
            .field("arbiter", &self.arbiter)
            .finish()
    }
}

impl Plan {
    /// Waypoints reachable by following "next" routes, in order. The last
    /// entry is the waypoint the journey currently stops at.
    pub fn traverse(
        &self,
        context: &JourneyContext,
        options: &TraversalOptions,
    ) -> WaymarkResult<Vec<String>> {
        Ok(self
            .traverse_next_routes(context, options)?
            .into_iter()
            .map(|route| route.source)
            .collect())
    }

    pub fn traverse_next_routes(
        &self,
        context: &JourneyContext,
        options: &TraversalOptions,
    ) -> WaymarkResult<Vec<Route>> {
        self.traverse_routes(context, RouteName::Next, options)
    }

    pub fn traverse_prev_routes(
        &self,
        context: &JourneyContext,
        options: &TraversalOptions,
    ) -> WaymarkResult<Vec<Route>> {
        self.traverse_routes(context, RouteName::Prev, options)
    }

    /// Follows routes named `route_name` from the start waypoint. The result
    /// ends with a leaf route (no target) unless the stop condition halted
    /// the walk on a real route.
    pub fn traverse_routes(
        &self,
        context: &JourneyContext,
        route_name: RouteName,
        options: &TraversalOptions,
    ) -> WaymarkResult<Vec<Route>> {
        let start = match &options.start_waypoint {
            Some(waypoint) => waypoint.as_str(),
            None => self.start_waypoint().ok_or_else(|| {
                WaymarkError::InvalidArgument(
                    "plan has no waypoints and no start waypoint was given".to_string(),
                )
            })?,
        };
        if !self.contains_waypoint(start) {
            return Err(WaymarkError::UnknownWaypoint(start.to_string()));
        }
        let arbiter = options.arbiter.as_ref().unwrap_or(&self.options().arbiter);

        trace!(start = %start, route_name = %route_name, "Traversing plan");

        let mut history: HashSet<RouteKey> = HashSet::new();
        let mut path = Vec::new();
        let mut current = start.to_string();

        loop {
            // Exit nodes belong to another plan; nothing past them is walked.
            if is_exit_node(&current) {
                path.push(Route::leaf(current, route_name));
                break;
            }

            let mut satisfied: Vec<Route> = self
                .edges_from(&current)
                .iter()
                .filter(|edge| edge.name == route_name)
                .map(|edge| (edge.to_route(&current), &edge.condition))
                .filter(|(route, condition)| condition.evaluate(route, context))
                .map(|(route, _)| route)
                .collect();

            if satisfied.len() > 1 {
                satisfied =
                    self.arbitrate(satisfied, context, &current, start, route_name, arbiter);
            }

            let next = match satisfied.as_slice() {
                [route] => route.clone(),
                [] => {
                    path.push(Route::leaf(current, route_name));
                    break;
                }
                many => {
                    warn!(
                        waypoint = %current,
                        route_name = %route_name,
                        candidates = many.len(),
                        "Ambiguous routes left unresolved"
                    );
                    path.push(Route::leaf(current, route_name));
                    break;
                }
            };

            let (Some(key), Some(target)) = (next.key(), next.target.clone()) else {
                path.push(Route::leaf(current, route_name));
                break;
            };

            if !history.insert(key) {
                debug!(
                    route_source = %next.source,
                    route_target = %target,
                    route_name = %route_name,
                    "Route cycle detected; ending traversal"
                );
                path.push(Route::leaf(current, route_name));
                break;
            }

            let stop = options
                .stop_condition
                .as_ref()
                .is_some_and(|condition| condition(&next));
            path.push(next);
            if stop {
                break;
            }
            current = target;
        }

        Ok(path)
    }

    fn arbitrate(
        &self,
        candidates: Vec<Route>,
        context: &JourneyContext,
        current: &str,
        start: &str,
        route_name: RouteName,
        arbiter: &Arbiter,
    ) -> Vec<Route> {
        match arbiter {
            Arbiter::None => candidates,
            Arbiter::Custom(resolve) => resolve(
                candidates,
                &ArbitrationContext {
                    journey_context: context,
                    current_waypoint: current,
                    start_waypoint: start,
                    route_name,
                },
            ),
            Arbiter::Auto => self.arbitrate_auto(candidates, context),
        }
    }

    /// Walks forward from the plan's start, with no arbiter, until one of the
    /// candidates' targets is reached; that candidate wins. If the lookahead
    /// stops short (leaf, cycle, or its own ambiguity), nothing is chosen.
    fn arbitrate_auto(&self, candidates: Vec<Route>, context: &JourneyContext) -> Vec<Route> {
        let targets: Vec<String> = candidates.iter().filter_map(|c| c.target.clone()).collect();
        let lookahead_options = TraversalOptions {
            start_waypoint: None,
            stop_condition: Some(Arc::new(move |route: &Route| {
                route
                    .target
                    .as_ref()
                    .is_some_and(|target| targets.contains(target))
            })),
            arbiter: Some(Arbiter::None),
        };

        match self.traverse_routes(context, RouteName::Next, &lookahead_options) {
            Ok(lookahead) => arbiter::select_by_lookahead(candidates, &lookahead),
            Err(e) => {
                warn!(error = %e, "Automatic arbitration lookahead failed");
                Vec::new()
            }
        }
    }
}
