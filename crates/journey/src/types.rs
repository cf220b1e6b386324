use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use waymark_core::{WaymarkError, WaymarkResult};

/// Separator between an exit node's scheme and the rest of its id.
pub const EXIT_NODE_SCHEME_SEPARATOR: &str = "://";

/// Returns `true` if the waypoint id carries a `scheme://` prefix, marking a
/// handoff to another plan.
pub fn is_exit_node(waypoint: &str) -> bool {
    match waypoint.find(EXIT_NODE_SCHEME_SEPARATOR) {
        Some(idx) if idx > 0 => waypoint[..idx]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'),
        _ => false,
    }
}

/// Checks that a waypoint id is usable as a graph node.
pub fn validate_waypoint(waypoint: &str) -> WaymarkResult<()> {
    if waypoint.trim().is_empty() {
        return Err(WaymarkError::InvalidWaypoint(
            "waypoint id must be a non-empty string".to_string(),
        ));
    }
    if is_exit_node(waypoint) && !waypoint.ends_with('/') {
        return Err(WaymarkError::InvalidWaypoint(format!(
            "exit node {waypoint} must end with a trailing '/'"
        )));
    }
    Ok(())
}

/// Direction of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteName {
    Next,
    Prev,
}

impl RouteName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteName::Next => "next",
            RouteName::Prev => "prev",
        }
    }
}

impl fmt::Display for RouteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteName {
    type Err = WaymarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(RouteName::Next),
            "prev" => Ok(RouteName::Prev),
            other => Err(WaymarkError::InvalidRouteName(other.to_string())),
        }
    }
}

/// Identity of a route within a plan. At most one route exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub source: String,
    pub target: String,
    pub name: RouteName,
}

/// A route as seen by conditions, arbiters and traversal results.
///
/// `target` is `None` only on the synthetic leaf that terminates a traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub source: String,
    pub target: Option<String>,
    pub name: RouteName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Route {
    /// End-of-path marker for `source`.
    pub fn leaf(source: impl Into<String>, name: RouteName) -> Self {
        Self {
            source: source.into(),
            target: None,
            name,
            label: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.target.is_none()
    }

    pub fn key(&self) -> Option<RouteKey> {
        self.target.as_ref().map(|target| RouteKey {
            source: self.source.clone(),
            target: target.clone(),
            name: self.name,
        })
    }

    /// The same route with source and target exchanged.
    pub fn reversed(&self) -> Self {
        match &self.target {
            Some(target) => Self {
                source: target.clone(),
                target: Some(self.source.clone()),
                name: self.name,
                label: self.label.clone(),
            },
            None => self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_node_detection() {
        assert!(is_exit_node("url:///other-plan/"));
        assert!(is_exit_node("app://checkout/"));
        assert!(!is_exit_node("personal-details"));
        assert!(!is_exit_node("://nothing"));
    }

    #[test]
    fn test_validate_waypoint() {
        assert!(validate_waypoint("start").is_ok());
        assert!(validate_waypoint("app://checkout/").is_ok());
        assert!(validate_waypoint("").is_err());
        assert!(validate_waypoint("   ").is_err());
        assert!(validate_waypoint("app://checkout").is_err());
    }

    #[test]
    fn test_route_name_parsing() {
        assert_eq!("next".parse::<RouteName>().unwrap(), RouteName::Next);
        assert_eq!("prev".parse::<RouteName>().unwrap(), RouteName::Prev);
        let err = "origin".parse::<RouteName>().unwrap_err();
        assert!(err.is_syntax_error());
    }

    #[test]
    fn test_route_reversed() {
        let route = Route {
            source: "a".into(),
            target: Some("b".into()),
            name: RouteName::Next,
            label: None,
        };
        let reversed = route.reversed();
        assert_eq!(reversed.source, "b");
        assert_eq!(reversed.target.as_deref(), Some("a"));
        assert!(Route::leaf("a", RouteName::Next).is_leaf());
    }
}
