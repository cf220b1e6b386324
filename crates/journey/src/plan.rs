//! The Plan: a conditional directed multigraph of waypoints joined by named
//! "next" and "prev" routes.
//!
//! A plan is declared once (usually at startup) and then shared read-only by
//! every traversal. See [`crate::traversal`] for the walking algorithm.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};
use waymark_core::config::PlanConfig;
use waymark_core::{WaymarkError, WaymarkResult};

use crate::arbiter::Arbiter;
use crate::evaluator::{Condition, RouteCondition};
use crate::types::{is_exit_node, validate_waypoint, Route, RouteName};

#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Require the gating waypoint to have passed validation before a
    /// route's own condition is consulted.
    pub validate_before_route_condition: bool,
    pub arbiter: Arbiter,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            validate_before_route_condition: true,
            arbiter: Arbiter::None,
        }
    }
}

impl From<&PlanConfig> for PlanOptions {
    fn from(config: &PlanConfig) -> Self {
        Self {
            validate_before_route_condition: config.validate_before_route_condition,
            arbiter: config.arbiter.into(),
        }
    }
}

/// Outgoing edge stored under its source waypoint.
#[derive(Debug, Clone)]
pub(crate) struct Edge {
    pub(crate) target: String,
    pub(crate) name: RouteName,
    pub(crate) condition: RouteCondition,
}

impl Edge {
    pub(crate) fn to_route(&self, source: &str) -> Route {
        Route {
            source: source.to_string(),
            target: Some(self.target.clone()),
            name: self.name,
            label: self.condition.label().map(String::from),
        }
    }
}

/// A node as exposed to visualization tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub exit_node: bool,
    pub skippable: bool,
}

/// Read-only snapshot of a plan's nodes and edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphStructure {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<Route>,
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    // Declaration order; the first entry is the default start waypoint.
    waypoints: Vec<String>,
    adjacency: HashMap<String, Vec<Edge>>,
    skippables: Vec<String>,
    options: PlanOptions,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: PlanOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn from_config(config: &PlanConfig) -> Self {
        Self::with_options(PlanOptions::from(config))
    }

    pub fn options(&self) -> &PlanOptions {
        &self.options
    }

    pub fn is_exit_node(waypoint: &str) -> bool {
        is_exit_node(waypoint)
    }

    // ---- construction ----

    /// Links each consecutive pair with default next/prev routes.
    pub fn add_sequence(&mut self, waypoints: &[&str]) -> WaymarkResult<()> {
        for waypoint in waypoints {
            validate_waypoint(waypoint)?;
        }
        if let [only] = waypoints {
            self.add_waypoint(only);
        }
        for pair in waypoints.windows(2) {
            self.set_route(pair[0], pair[1], None, None)?;
        }
        Ok(())
    }

    /// Creates a "next" route `source -> target` and a "prev" route
    /// `target -> source`. When only `follow_next` is given, the prev
    /// condition calls it with source and target swapped.
    pub fn set_route(
        &mut self,
        source: &str,
        target: &str,
        follow_next: Option<Condition>,
        follow_prev: Option<Condition>,
    ) -> WaymarkResult<()> {
        validate_waypoint(source)?;
        validate_waypoint(target)?;
        if is_exit_node(target) {
            return Err(WaymarkError::ExitNodeReverseRoute(target.to_string()));
        }

        let follow_prev = follow_prev.or_else(|| follow_next.as_ref().map(Condition::swapped));
        self.set_named_route(source, target, RouteName::Next, follow_next)?;
        self.set_named_route(target, source, RouteName::Prev, follow_prev)
    }

    /// Low-level primitive behind every other route declaration. Redefining
    /// an existing `(source, target, name)` route replaces it.
    pub fn set_named_route(
        &mut self,
        source: &str,
        target: &str,
        name: RouteName,
        follow: Option<Condition>,
    ) -> WaymarkResult<()> {
        validate_waypoint(source)?;
        validate_waypoint(target)?;

        let edge = Edge {
            target: target.to_string(),
            name,
            condition: RouteCondition::new(follow, self.options.validate_before_route_condition),
        };

        self.add_waypoint(source);
        self.add_waypoint(target);

        let edges = self.adjacency.entry(source.to_string()).or_default();
        match edges
            .iter_mut()
            .find(|e| e.target == target && e.name == name)
        {
            Some(existing) => {
                warn!(
                    route_source = %source,
                    route_target = %target,
                    route_name = %name,
                    "Route already defined; overwriting"
                );
                *existing = edge;
            }
            None => {
                debug!(
                    route_source = %source,
                    route_target = %target,
                    route_name = %name,
                    "Route added"
                );
                edges.push(edge);
            }
        }
        Ok(())
    }

    /// Marks waypoints the hosting application may let the user skip.
    pub fn add_skippables(&mut self, waypoints: &[&str]) -> WaymarkResult<()> {
        for waypoint in waypoints {
            validate_waypoint(waypoint)?;
        }
        for waypoint in waypoints {
            if !self.is_skippable(waypoint) {
                self.skippables.push(waypoint.to_string());
            }
        }
        Ok(())
    }

    fn add_waypoint(&mut self, waypoint: &str) {
        if !self.adjacency.contains_key(waypoint) {
            self.adjacency.insert(waypoint.to_string(), Vec::new());
            self.waypoints.push(waypoint.to_string());
        }
    }

    // ---- introspection ----

    pub fn waypoints(&self) -> &[String] {
        &self.waypoints
    }

    pub fn contains_waypoint(&self, waypoint: &str) -> bool {
        self.adjacency.contains_key(waypoint)
    }

    /// First declared waypoint; the default start of a traversal.
    pub fn start_waypoint(&self) -> Option<&str> {
        self.waypoints.first().map(String::as_str)
    }

    pub fn routes(&self) -> Vec<Route> {
        self.waypoints
            .iter()
            .flat_map(|source| self.outward_routes(source, None))
            .collect()
    }

    /// Routes leaving `source`, optionally restricted to one name.
    pub fn outward_routes(&self, source: &str, name: Option<RouteName>) -> Vec<Route> {
        self.edges_from(source)
            .iter()
            .filter(|e| name.map_or(true, |n| e.name == n))
            .map(|e| e.to_route(source))
            .collect()
    }

    pub fn prev_outward_routes(&self, source: &str) -> Vec<Route> {
        self.outward_routes(source, Some(RouteName::Prev))
    }

    pub fn route_condition(
        &self,
        source: &str,
        target: &str,
        name: RouteName,
    ) -> Option<&RouteCondition> {
        self.edges_from(source)
            .iter()
            .find(|e| e.target == target && e.name == name)
            .map(|e| &e.condition)
    }

    pub fn skippables(&self) -> &[String] {
        &self.skippables
    }

    pub fn is_skippable(&self, waypoint: &str) -> bool {
        self.skippables.iter().any(|s| s == waypoint)
    }

    pub fn graph_structure(&self) -> GraphStructure {
        let nodes = self
            .waypoints
            .iter()
            .map(|id| GraphNode {
                id: id.clone(),
                exit_node: is_exit_node(id),
                skippable: self.is_skippable(id),
            })
            .collect();
        GraphStructure {
            nodes,
            edges: self.routes(),
        }
    }

    pub(crate) fn edges_from(&self, source: &str) -> &[Edge] {
        self.adjacency.get(source).map(Vec::as_slice).unwrap_or(&[])
    }
}
