//! Journey contexts kept inside a session.
//!
//! A session is a plain key-value bag. Under one store key it holds an
//! object mapping each context id to that context's serialized form. The
//! default context always resolves, and is created on first write.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;
use waymark_core::{WaymarkError, WaymarkResult};

use crate::context::{JourneyContext, DEFAULT_CONTEXT_ID};
use crate::events::EventKind;

/// Length of a hyphenated UUID.
const UUID_LEN: usize = 36;

/// Key-value state attached to one user session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData(Map<String, Value>);

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Accepts the default id or a hyphenated UUID.
pub fn validate_context_id(id: &str) -> WaymarkResult<()> {
    if id == DEFAULT_CONTEXT_ID || (id.len() == UUID_LEN && Uuid::parse_str(id).is_ok()) {
        Ok(())
    } else {
        Err(WaymarkError::InvalidContextId(id.to_string()))
    }
}

fn store<'a>(
    session: &'a SessionData,
    store_key: &str,
) -> WaymarkResult<Option<&'a Map<String, Value>>> {
    match session.get(store_key) {
        None => Ok(None),
        Some(Value::Object(contexts)) => Ok(Some(contexts)),
        Some(_) => Err(WaymarkError::InvalidSession(format!(
            "{store_key} must hold an object of journey contexts"
        ))),
    }
}

fn store_mut<'a>(
    session: &'a mut SessionData,
    store_key: &str,
) -> WaymarkResult<&'a mut Map<String, Value>> {
    init_context_store(session, store_key)?;
    match session.0.get_mut(store_key) {
        Some(Value::Object(contexts)) => Ok(contexts),
        _ => Err(WaymarkError::InvalidSession(format!(
            "{store_key} must hold an object of journey contexts"
        ))),
    }
}

/// Creates the context store with a default context if it does not exist,
/// and restores the default context if it was removed.
pub fn init_context_store(session: &mut SessionData, store_key: &str) -> WaymarkResult<()> {
    let default = JourneyContext::default_context().to_value()?;
    match session.0.get_mut(store_key) {
        None => {
            let mut contexts = Map::new();
            contexts.insert(DEFAULT_CONTEXT_ID.to_string(), default);
            session.insert(store_key, Value::Object(contexts));
            debug!(store_key = %store_key, "Initialised context store");
            Ok(())
        }
        Some(Value::Object(contexts)) => {
            contexts
                .entry(DEFAULT_CONTEXT_ID.to_string())
                .or_insert(default);
            Ok(())
        }
        Some(_) => Err(WaymarkError::InvalidSession(format!(
            "{store_key} must hold an object of journey contexts"
        ))),
    }
}

pub fn get_context_by_id(
    session: &SessionData,
    store_key: &str,
    id: &str,
) -> WaymarkResult<Option<JourneyContext>> {
    let stored = store(session, store_key)?.and_then(|contexts| contexts.get(id));
    match stored {
        Some(value) => Ok(Some(JourneyContext::from_value(value.clone())?)),
        None if id == DEFAULT_CONTEXT_ID => Ok(Some(JourneyContext::default_context())),
        None => Ok(None),
    }
}

pub fn get_context_by_name(
    session: &SessionData,
    store_key: &str,
    name: &str,
) -> WaymarkResult<Option<JourneyContext>> {
    Ok(get_contexts(session, store_key)?
        .into_iter()
        .find(|c| c.name() == Some(name)))
}

pub fn get_contexts_by_tag(
    session: &SessionData,
    store_key: &str,
    tag: &str,
) -> WaymarkResult<Vec<JourneyContext>> {
    Ok(get_contexts(session, store_key)?
        .into_iter()
        .filter(|c| c.has_tag(tag))
        .collect())
}

/// Every stored context. The default context is included even before the
/// store has been written to.
pub fn get_contexts(session: &SessionData, store_key: &str) -> WaymarkResult<Vec<JourneyContext>> {
    let mut contexts = match store(session, store_key)? {
        Some(contexts) => contexts
            .values()
            .map(|value| JourneyContext::from_value(value.clone()))
            .collect::<WaymarkResult<Vec<_>>>()?,
        None => Vec::new(),
    };
    if !contexts.iter().any(JourneyContext::is_default) {
        contexts.insert(0, JourneyContext::default_context());
    }
    Ok(contexts)
}

/// Fires the context's waypoint-change then context-change listeners, and
/// writes the result into the session. Handler mutations are included in
/// what gets written.
pub fn put_context(
    session: &mut SessionData,
    store_key: &str,
    context: &mut JourneyContext,
) -> WaymarkResult<()> {
    let id = context.id().ok_or(WaymarkError::MissingIdentity)?.to_string();
    validate_context_id(&id)?;
    store(session, store_key)?;

    let waypoint_events = context.apply_event_listeners(EventKind::WaypointChange);
    let context_events = context.apply_event_listeners(EventKind::ContextChange);

    let value = context.to_value()?;
    store_mut(session, store_key)?.insert(id.clone(), value);

    info!(
        context_id = %id,
        waypoint_events,
        context_events,
        "Persisted journey context"
    );
    Ok(())
}

pub fn remove_context(
    session: &mut SessionData,
    store_key: &str,
    context: &JourneyContext,
) -> WaymarkResult<bool> {
    let id = context.id().ok_or(WaymarkError::MissingIdentity)?;
    remove_context_by_id(session, store_key, id)
}

pub fn remove_context_by_id(
    session: &mut SessionData,
    store_key: &str,
    id: &str,
) -> WaymarkResult<bool> {
    let Some(contexts) = store(session, store_key)? else {
        return Ok(false);
    };
    if !contexts.contains_key(id) {
        return Ok(false);
    }
    let removed = store_mut(session, store_key)?.remove(id).is_some();
    debug!(context_id = %id, "Removed journey context");
    Ok(removed)
}

pub fn remove_context_by_name(
    session: &mut SessionData,
    store_key: &str,
    name: &str,
) -> WaymarkResult<bool> {
    match get_context_by_name(session, store_key, name)? {
        Some(context) => remove_context(session, store_key, &context),
        None => Ok(false),
    }
}

pub fn remove_contexts_by_tag(
    session: &mut SessionData,
    store_key: &str,
    tag: &str,
) -> WaymarkResult<usize> {
    let mut removed = 0;
    for context in get_contexts_by_tag(session, store_key, tag)? {
        if remove_context(session, store_key, &context)? {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Drops the whole store. The default context resolves again as a fresh one.
pub fn remove_contexts(session: &mut SessionData, store_key: &str) -> WaymarkResult<()> {
    store(session, store_key)?;
    session.remove(store_key);
    debug!(store_key = %store_key, "Removed all journey contexts");
    Ok(())
}

/// Resolves the context a request refers to. A malformed id is an error; an
/// absent or unknown one falls back to the default context.
pub fn extract_context_from_request(
    session: &SessionData,
    store_key: &str,
    requested_id: Option<&str>,
) -> WaymarkResult<JourneyContext> {
    if let Some(id) = requested_id {
        validate_context_id(id)?;
        if let Some(context) = get_context_by_id(session, store_key, id)? {
            return Ok(context);
        }
        debug!(context_id = %id, "Requested context not found; using default");
    }
    get_context_by_id(session, store_key, DEFAULT_CONTEXT_ID)?
        .ok_or_else(|| WaymarkError::InvalidSession("default context missing".to_string()))
}
