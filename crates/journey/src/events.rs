//! Change listeners fired when a context is persisted.
//!
//! A snapshot of the context is captured once per unit of work. At
//! persistence time [`dispatch`] compares it with the current state and runs
//! each listener whose scope changed. Handlers may mutate the current
//! context; those mutations are saved along with everything else.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::{ContextObject, JourneyContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    WaypointChange,
    ContextChange,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::WaypointChange => f.write_str("waypoint-change"),
            EventKind::ContextChange => f.write_str("context-change"),
        }
    }
}

/// What a handler gets to see: the context about to be persisted, and the
/// state it had when listeners were attached.
pub struct EventArgs<'a> {
    pub journey_context: &'a mut JourneyContext,
    pub previous_context: &'a JourneyContext,
}

pub type EventHandler = dyn Fn(EventArgs<'_>) + Send + Sync;

#[derive(Clone)]
pub struct JourneyEventListener {
    pub event: EventKind,
    pub waypoint: Option<String>,
    pub field: Option<String>,
    handler: Arc<EventHandler>,
}

impl JourneyEventListener {
    pub fn new<F>(event: EventKind, handler: F) -> Self
    where
        F: Fn(EventArgs<'_>) + Send + Sync + 'static,
    {
        Self {
            event,
            waypoint: None,
            field: None,
            handler: Arc::new(handler),
        }
    }

    /// Fires when the waypoint's data differs from the snapshot.
    pub fn on_waypoint_change<F>(waypoint: impl Into<String>, handler: F) -> Self
    where
        F: Fn(EventArgs<'_>) + Send + Sync + 'static,
    {
        let mut listener = Self::new(EventKind::WaypointChange, handler);
        listener.waypoint = Some(waypoint.into());
        listener
    }

    /// Fires when one field of the waypoint's data differs from the snapshot.
    pub fn on_field_change<F>(
        waypoint: impl Into<String>,
        field: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(EventArgs<'_>) + Send + Sync + 'static,
    {
        let mut listener = Self::on_waypoint_change(waypoint, handler);
        listener.field = Some(field.into());
        listener
    }

    /// Fires on every persist.
    pub fn on_context_change<F>(handler: F) -> Self
    where
        F: Fn(EventArgs<'_>) + Send + Sync + 'static,
    {
        Self::new(EventKind::ContextChange, handler)
    }

    fn is_triggered(&self, before: &ContextObject, after: &JourneyContext) -> bool {
        let Some(waypoint) = &self.waypoint else {
            return true;
        };
        let Some(previous) = before.data.get(waypoint) else {
            return false;
        };
        match &self.field {
            None => waypoint_changed(before, after, waypoint),
            Some(field) => match previous.get(field) {
                Some(previous_field) => {
                    after.data_for_page(waypoint).and_then(|v| v.get(field)) != Some(previous_field)
                }
                None => false,
            },
        }
    }
}

impl fmt::Debug for JourneyEventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JourneyEventListener")
            .field("event", &self.event)
            .field("waypoint", &self.waypoint)
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

/// Snapshot plus listeners, captured once per unit of work.
#[derive(Debug, Clone)]
pub struct EventSession {
    snapshot: ContextObject,
    listeners: Vec<JourneyEventListener>,
}

impl EventSession {
    pub fn new(snapshot: ContextObject, listeners: Vec<JourneyEventListener>) -> Self {
        Self {
            snapshot,
            listeners,
        }
    }

    pub fn snapshot(&self) -> &ContextObject {
        &self.snapshot
    }

    pub fn listeners(&self) -> &[JourneyEventListener] {
        &self.listeners
    }
}

/// Runs every listener of `kind` whose scope changed between `before` and
/// `after`. Listeners are checked in order against the current state, so a
/// handler's mutations are visible to the listeners after it.
pub fn dispatch(
    before: &ContextObject,
    after: &mut JourneyContext,
    listeners: &[JourneyEventListener],
    kind: EventKind,
) -> usize {
    let previous = match JourneyContext::from_object(before.clone()) {
        Ok(previous) => previous,
        Err(e) => {
            warn!(error = %e, event = %kind, "Event snapshot could not be restored");
            return 0;
        }
    };

    let mut fired = 0;
    for listener in listeners.iter().filter(|l| l.event == kind) {
        if !listener.is_triggered(before, after) {
            continue;
        }
        debug!(
            event = %kind,
            waypoint = ?listener.waypoint,
            field = ?listener.field,
            "Firing journey event listener"
        );
        (listener.handler)(EventArgs {
            journey_context: &mut *after,
            previous_context: &previous,
        });
        fired += 1;
    }
    fired
}

/// Returns `true` if `waypoint` holds different data in the two states.
fn waypoint_changed(before: &ContextObject, after: &JourneyContext, waypoint: &str) -> bool {
    before.data.get(waypoint) != after.data_for_page(waypoint)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context_with(waypoint: &str, data: Value) -> JourneyContext {
        let mut ctx = JourneyContext::default_context();
        ctx.set_data_for_page(waypoint, data).unwrap();
        ctx.clear_validation_errors_for_page(waypoint).unwrap();
        ctx
    }

    #[test]
    fn test_waypoint_listener_fires_on_change_only() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let listener = JourneyEventListener::on_waypoint_change("a", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut ctx = context_with("a", json!({"x": 1}));
        ctx.add_event_listeners(vec![listener]);
        assert_eq!(ctx.apply_event_listeners(EventKind::WaypointChange), 0);

        ctx.set_data_for_page("a", json!({"x": 2})).unwrap();
        assert_eq!(ctx.apply_event_listeners(EventKind::WaypointChange), 1);
        assert_eq!(ctx.apply_event_listeners(EventKind::ContextChange), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_waypoint_absent_from_snapshot_does_not_fire() {
        let listener = JourneyEventListener::on_waypoint_change("b", |_| panic!("must not fire"));
        let mut ctx = context_with("a", json!({}));
        ctx.add_event_listeners(vec![listener]);
        ctx.set_data_for_page("b", json!({"new": true})).unwrap();
        assert_eq!(ctx.apply_event_listeners(EventKind::WaypointChange), 0);
    }

    #[test]
    fn test_field_listener_and_handler_mutation() {
        let listener = JourneyEventListener::on_field_change("household", "hasPartner", |args| {
            assert_eq!(
                args.previous_context.data_for_page("household"),
                Some(&json!({"hasPartner": "yes", "size": 2}))
            );
            args.journey_context.purge(&["partner-details"]);
        });
        let untouched = JourneyEventListener::on_field_change("household", "size", |_| {
            panic!("size did not change")
        });

        let mut ctx = context_with("household", json!({"hasPartner": "yes", "size": 2}));
        ctx.set_data_for_page("partner-details", json!({"name": "Sam"}))
            .unwrap();
        ctx.add_event_listeners(vec![listener, untouched]);

        ctx.set_data_for_page("household", json!({"hasPartner": "no", "size": 2}))
            .unwrap();
        assert_eq!(ctx.apply_event_listeners(EventKind::WaypointChange), 1);
        assert!(ctx.data_for_page("partner-details").is_none());
    }

    #[test]
    fn test_field_absent_from_snapshot_does_not_fire() {
        let listener = JourneyEventListener::on_field_change("household", "hasPartner", |_| {
            panic!("field was not in the snapshot")
        });
        let mut ctx = context_with("household", json!({"size": 2}));
        ctx.add_event_listeners(vec![listener]);

        ctx.set_data_for_page("household", json!({"size": 2, "hasPartner": "yes"}))
            .unwrap();
        assert_eq!(ctx.apply_event_listeners(EventKind::WaypointChange), 0);
    }

    #[test]
    fn test_context_listener_always_fires() {
        let listener = JourneyEventListener::on_context_change(|args| {
            args.journey_context.set_navigation_language("en");
        });
        let mut ctx = JourneyContext::default_context();
        ctx.add_event_listeners(vec![listener]);
        assert_eq!(ctx.apply_event_listeners(EventKind::ContextChange), 1);
        assert_eq!(ctx.navigation_language(), Some("en"));
        assert!(ctx.has_event_listeners());
    }

    #[test]
    fn test_no_listeners_is_a_no_op() {
        let mut ctx = JourneyContext::default_context();
        assert_eq!(ctx.apply_event_listeners(EventKind::ContextChange), 0);
    }

    #[test]
    fn test_waypoint_changed_helper() {
        let ctx = context_with("a", json!({"x": 1}));
        let before = ctx.to_object();
        let mut after = ctx.clone();
        assert!(!waypoint_changed(&before, &after, "a"));
        after.purge(&["a"]);
        assert!(waypoint_changed(&before, &after, "a"));
    }

    #[test]
    fn test_event_kind_wire_names() {
        assert_eq!(
            serde_json::to_value(EventKind::WaypointChange).unwrap(),
            json!("waypoint-change")
        );
        assert_eq!(EventKind::ContextChange.to_string(), "context-change");
    }
}
