//! Resolution of routes that are satisfied at the same time.

use std::fmt;
use std::sync::Arc;

use waymark_core::config::ArbiterMode;

use crate::context::JourneyContext;
use crate::types::{Route, RouteName};

/// What a custom arbiter is told about the ambiguity it has to resolve.
pub struct ArbitrationContext<'a> {
    pub journey_context: &'a JourneyContext,
    pub current_waypoint: &'a str,
    pub start_waypoint: &'a str,
    pub route_name: RouteName,
}

pub type ArbiterFn = dyn Fn(Vec<Route>, &ArbitrationContext<'_>) -> Vec<Route> + Send + Sync;

#[derive(Clone, Default)]
pub enum Arbiter {
    /// Ambiguity is left unresolved and traversal ends at the waypoint.
    #[default]
    None,
    /// Keep the candidate a forward walk from the plan's start reaches first.
    Auto,
    /// Caller-supplied filter over the candidates.
    Custom(Arc<ArbiterFn>),
}

impl Arbiter {
    pub fn custom<F>(resolver: F) -> Self
    where
        F: Fn(Vec<Route>, &ArbitrationContext<'_>) -> Vec<Route> + Send + Sync + 'static,
    {
        Arbiter::Custom(Arc::new(resolver))
    }
}

impl From<ArbiterMode> for Arbiter {
    fn from(mode: ArbiterMode) -> Self {
        match mode {
            ArbiterMode::None => Arbiter::None,
            ArbiterMode::Auto => Arbiter::Auto,
        }
    }
}

impl fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arbiter::None => f.write_str("None"),
            Arbiter::Auto => f.write_str("Auto"),
            Arbiter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Keeps the candidates whose target is where the lookahead walk stopped.
/// A lookahead that ended on a leaf resolves nothing.
pub fn select_by_lookahead(candidates: Vec<Route>, lookahead: &[Route]) -> Vec<Route> {
    let Some(reached) = lookahead.last().and_then(|r| r.target.as_deref()) else {
        return Vec::new();
    };
    candidates
        .into_iter()
        .filter(|c| c.target.as_deref() == Some(reached))
        .collect()
}
