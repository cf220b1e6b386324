//! Per-identity journey state: gathered data, per-waypoint validation outcome,
//! navigation metadata and identity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};
use uuid::Uuid;
use waymark_core::{WaymarkError, WaymarkResult};

use crate::events::{self, EventKind, EventSession, JourneyEventListener};
use crate::store::validate_context_id;
use crate::types::validate_waypoint;
use crate::validation::ValidationError;

/// Identity value of the context every session starts with.
pub const DEFAULT_CONTEXT_ID: &str = "default";

/// Keys that must never be used to index page data.
const UNSAFE_KEYS: [&str; 3] = ["__proto__", "prototype", "constructor"];

/// Outcome of the last validation of a waypoint.
///
/// `Unvalidated` blocks traversal, `Valid` allows it. Clearing errors yields
/// `Valid`; removing the state yields `Unvalidated`.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationState {
    Unvalidated,
    Valid,
    Invalid(Vec<ValidationError>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Serializable form of a [`JourneyContext`], as persisted in a session.
///
/// In `validation`, `null` means the waypoint passed and a list holds its
/// errors; waypoints never evaluated are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextObject {
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
    #[serde(default)]
    pub validation: BTreeMap<String, Option<Vec<ValidationError>>>,
    #[serde(default)]
    pub nav: Navigation,
    #[serde(default)]
    pub identity: ContextIdentity,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "ContextObject", into = "ContextObject")]
pub struct JourneyContext {
    data: BTreeMap<String, Value>,
    // Only `Valid` and `Invalid` are stored; absence means unvalidated.
    validation: BTreeMap<String, ValidationState>,
    nav: Navigation,
    identity: ContextIdentity,
    event_session: Option<EventSession>,
}

fn validate_page_key(waypoint: &str) -> WaymarkResult<()> {
    validate_waypoint(waypoint)?;
    if UNSAFE_KEYS.contains(&waypoint) {
        return Err(WaymarkError::UnsafeKey(waypoint.to_string()));
    }
    Ok(())
}

impl JourneyContext {
    /// Empty context with no identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty context with the given identity id.
    pub fn with_id(id: impl Into<String>) -> WaymarkResult<Self> {
        let id = id.into();
        validate_context_id(&id)?;
        let mut context = Self::new();
        context.identity.id = Some(id);
        Ok(context)
    }

    /// Empty context carrying the default identity.
    pub fn default_context() -> Self {
        let mut context = Self::new();
        context.identity.id = Some(DEFAULT_CONTEXT_ID.to_string());
        context
    }

    /// Deep copy of `source` under a freshly generated id. Only the id
    /// changes. Event listeners are not carried over.
    pub fn from_context(source: &JourneyContext) -> Self {
        let id = Uuid::new_v4().to_string();
        debug!(
            source_id = ?source.identity.id,
            new_id = %id,
            "Copying journey context"
        );
        Self {
            data: source.data.clone(),
            validation: source.validation.clone(),
            nav: source.nav.clone(),
            identity: ContextIdentity {
                id: Some(id),
                name: source.identity.name.clone(),
                tags: source.identity.tags.clone(),
            },
            event_session: None,
        }
    }

    /// Canonical serializable form.
    pub fn to_object(&self) -> ContextObject {
        let validation = self
            .validation
            .iter()
            .filter_map(|(waypoint, state)| match state {
                ValidationState::Valid => Some((waypoint.clone(), None)),
                ValidationState::Invalid(errors) => {
                    Some((waypoint.clone(), Some(errors.clone())))
                }
                ValidationState::Unvalidated => None,
            })
            .collect();
        ContextObject {
            data: self.data.clone(),
            validation,
            nav: self.nav.clone(),
            identity: self.identity.clone(),
        }
    }

    pub fn from_object(object: ContextObject) -> WaymarkResult<Self> {
        let mut validation = BTreeMap::new();
        for (waypoint, entry) in object.validation {
            validate_page_key(&waypoint)?;
            let state = match entry {
                None => ValidationState::Valid,
                Some(errors) if errors.is_empty() => {
                    return Err(WaymarkError::InvalidValidationErrors {
                        waypoint,
                        message: "error list must not be empty".to_string(),
                    })
                }
                Some(errors) => ValidationState::Invalid(errors),
            };
            validation.insert(waypoint, state);
        }
        for waypoint in object.data.keys() {
            validate_page_key(waypoint)?;
        }
        if let Some(id) = &object.identity.id {
            validate_context_id(id)?;
        }
        Ok(Self {
            data: object.data,
            validation,
            nav: object.nav,
            identity: object.identity,
            event_session: None,
        })
    }

    /// Parses a context from its JSON form.
    pub fn from_value(value: Value) -> WaymarkResult<Self> {
        let object: ContextObject = serde_json::from_value(value)?;
        Self::from_object(object)
    }

    pub fn to_value(&self) -> WaymarkResult<Value> {
        Ok(serde_json::to_value(self.to_object())?)
    }

    // ---- data ----

    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    pub fn set_data(&mut self, data: BTreeMap<String, Value>) -> WaymarkResult<()> {
        for waypoint in data.keys() {
            validate_page_key(waypoint)?;
        }
        self.data = data;
        Ok(())
    }

    pub fn data_for_page(&self, waypoint: &str) -> Option<&Value> {
        self.data.get(waypoint)
    }

    pub fn set_data_for_page(&mut self, waypoint: &str, value: Value) -> WaymarkResult<()> {
        validate_page_key(waypoint)?;
        self.data.insert(waypoint.to_string(), value);
        Ok(())
    }

    // ---- validation ----

    /// All recorded failures, keyed by waypoint. Passed and unvalidated
    /// waypoints are not included.
    pub fn validation_errors(&self) -> BTreeMap<&str, &[ValidationError]> {
        self.validation
            .iter()
            .filter_map(|(waypoint, state)| match state {
                ValidationState::Invalid(errors) => Some((waypoint.as_str(), errors.as_slice())),
                _ => None,
            })
            .collect()
    }

    /// Errors for one waypoint; empty if it passed or was never validated.
    pub fn validation_errors_for_page(&self, waypoint: &str) -> &[ValidationError] {
        match self.validation.get(waypoint) {
            Some(ValidationState::Invalid(errors)) => errors,
            _ => &[],
        }
    }

    pub fn validation_state(&self, waypoint: &str) -> ValidationState {
        self.validation
            .get(waypoint)
            .cloned()
            .unwrap_or(ValidationState::Unvalidated)
    }

    pub fn set_validation_errors_for_page(
        &mut self,
        waypoint: &str,
        errors: Vec<ValidationError>,
    ) -> WaymarkResult<()> {
        validate_page_key(waypoint)?;
        if errors.is_empty() {
            return Err(WaymarkError::InvalidValidationErrors {
                waypoint: waypoint.to_string(),
                message: "use clear_validation_errors_for_page to mark a page as passed"
                    .to_string(),
            });
        }
        self.validation
            .insert(waypoint.to_string(), ValidationState::Invalid(errors));
        Ok(())
    }

    /// Marks the waypoint as validated and passed.
    pub fn clear_validation_errors_for_page(&mut self, waypoint: &str) -> WaymarkResult<()> {
        validate_page_key(waypoint)?;
        self.validation
            .insert(waypoint.to_string(), ValidationState::Valid);
        Ok(())
    }

    /// Forgets the waypoint's validation outcome entirely.
    pub fn remove_validation_state_for_page(&mut self, waypoint: &str) {
        self.validation.remove(waypoint);
    }

    pub fn is_page_valid(&self, waypoint: &str) -> bool {
        matches!(self.validation.get(waypoint), Some(ValidationState::Valid))
    }

    // ---- bulk mutation ----

    /// Removes data and validation state for each waypoint.
    pub fn purge<S: AsRef<str>>(&mut self, waypoints: &[S]) {
        for waypoint in waypoints {
            let waypoint = waypoint.as_ref();
            self.data.remove(waypoint);
            self.validation.remove(waypoint);
        }
        trace!(count = waypoints.len(), "Purged waypoints");
    }

    /// Removes validation state only, forcing re-validation.
    pub fn invalidate<S: AsRef<str>>(&mut self, waypoints: &[S]) {
        for waypoint in waypoints {
            self.validation.remove(waypoint.as_ref());
        }
        trace!(count = waypoints.len(), "Invalidated waypoints");
    }

    // ---- navigation & identity ----

    pub fn nav(&self) -> &Navigation {
        &self.nav
    }

    pub fn navigation_language(&self) -> Option<&str> {
        self.nav.language.as_deref()
    }

    pub fn set_navigation_language(&mut self, language: impl Into<String>) {
        self.nav.language = Some(language.into());
    }

    pub fn identity(&self) -> &ContextIdentity {
        &self.identity
    }

    pub fn id(&self) -> Option<&str> {
        self.identity.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) -> WaymarkResult<()> {
        let id = id.into();
        validate_context_id(&id)?;
        self.identity.id = Some(id);
        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        self.identity.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.identity.name = Some(name.into());
    }

    pub fn tags(&self) -> &[String] {
        &self.identity.tags
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.identity.tags.contains(&tag) {
            self.identity.tags.push(tag);
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.identity.tags.iter().any(|t| t == tag)
    }

    pub fn is_default(&self) -> bool {
        self.id() == Some(DEFAULT_CONTEXT_ID)
    }

    // ---- events ----

    /// Captures the current state as the "before" image for this unit of
    /// work and registers the listeners to compare against it. Call once per
    /// request, before any mutation.
    pub fn add_event_listeners(&mut self, listeners: Vec<JourneyEventListener>) {
        self.event_session = Some(EventSession::new(self.to_object(), listeners));
    }

    /// Fires matching listeners against the captured snapshot. Returns how
    /// many handlers ran.
    pub fn apply_event_listeners(&mut self, kind: EventKind) -> usize {
        let Some(session) = self.event_session.take() else {
            trace!(event = %kind, "No event listeners registered");
            return 0;
        };
        let fired = events::dispatch(session.snapshot(), self, session.listeners(), kind);
        // A handler may have registered a fresh session; keep it if so.
        if self.event_session.is_none() {
            self.event_session = Some(session);
        }
        fired
    }

    pub fn has_event_listeners(&self) -> bool {
        self.event_session.is_some()
    }
}

impl From<JourneyContext> for ContextObject {
    fn from(context: JourneyContext) -> Self {
        context.to_object()
    }
}

impl TryFrom<ContextObject> for JourneyContext {
    type Error = WaymarkError;

    fn try_from(object: ContextObject) -> Result<Self, Self::Error> {
        Self::from_object(object)
    }
}

impl PartialEq for JourneyContext {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
            && self.validation == other.validation
            && self.nav == other.nav
            && self.identity == other.identity
    }
}
