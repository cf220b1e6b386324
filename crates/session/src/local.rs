//! In-process session store backed by DashMap for lock-free concurrent access.
//! Each session holds its journey contexts under the configured store key.
//!
//! There is no per-session locking: two requests saving the same session
//! race, and the last write wins.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;
use waymark_core::config::SessionConfig;
use waymark_core::{WaymarkError, WaymarkResult};
use waymark_journey::store::{self, SessionData};
use waymark_journey::JourneyContext;

struct SessionEntry {
    data: SessionData,
    touched_at: Instant,
}

pub struct MemorySessionStore {
    sessions: Arc<DashMap<String, SessionEntry>>,
    store_key: String,
    ttl: Duration,
    max_sessions: usize,
}

impl MemorySessionStore {
    pub fn new(store_key: impl Into<String>, ttl_secs: u64, max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            store_key: store_key.into(),
            ttl: Duration::from_secs(ttl_secs),
            max_sessions,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.store_key.clone(), config.ttl_secs, config.max_sessions)
    }

    pub fn store_key(&self) -> &str {
        &self.store_key
    }

    /// Allocates a new, empty session and returns its id.
    pub fn create_session(&self) -> WaymarkResult<String> {
        let id = Uuid::new_v4().to_string();
        self.save(&id, SessionData::new())?;
        Ok(id)
    }

    /// Session data, or an empty session if it is missing or expired.
    pub fn load(&self, session_id: &str) -> SessionData {
        if let Some(entry) = self.sessions.get(session_id) {
            if entry.touched_at.elapsed() <= self.ttl {
                return entry.data.clone();
            }
        }
        if self.remove_if_expired(session_id) {
            debug!(session_id = %session_id, "Session expired");
        }
        SessionData::new()
    }

    /// Expiry is re-checked under the shard lock, so a session saved again
    /// since it was read is left alone.
    fn remove_if_expired(&self, session_id: &str) -> bool {
        self.sessions
            .remove_if(session_id, |_, entry| entry.touched_at.elapsed() > self.ttl)
            .is_some()
    }

    /// Writes the session. Fails rather than dropping the write when the
    /// store is full, so callers never respond on unsaved state.
    pub fn save(&self, session_id: &str, data: SessionData) -> WaymarkResult<()> {
        if self.sessions.len() >= self.max_sessions && !self.sessions.contains_key(session_id) {
            self.evict_expired();
            if self.sessions.len() >= self.max_sessions {
                return Err(WaymarkError::InvalidSession(format!(
                    "session store is full ({} sessions)",
                    self.max_sessions
                )));
            }
        }
        self.sessions.insert(
            session_id.to_string(),
            SessionEntry {
                data,
                touched_at: Instant::now(),
            },
        );
        Ok(())
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Remove expired sessions. Call this periodically from a background task.
    pub fn evict_expired(&self) -> usize {
        let evicted = AtomicUsize::new(0);
        self.sessions.retain(|_, entry| {
            let live = entry.touched_at.elapsed() <= self.ttl;
            if !live {
                evicted.fetch_add(1, Ordering::Relaxed);
            }
            live
        });
        let evicted = evicted.into_inner();
        if evicted > 0 {
            info!(evicted, "Evicted expired sessions");
        }
        evicted
    }

    /// The context a request refers to, falling back to the default one.
    pub fn load_context(
        &self,
        session_id: &str,
        requested_id: Option<&str>,
    ) -> WaymarkResult<JourneyContext> {
        let session = self.load(session_id);
        store::extract_context_from_request(&session, &self.store_key, requested_id)
    }

    /// Dispatches the context's events, then persists it. Returns once the
    /// session has been written.
    pub fn save_context(
        &self,
        session_id: &str,
        context: &mut JourneyContext,
    ) -> WaymarkResult<()> {
        let mut session = self.load(session_id);
        store::put_context(&mut session, &self.store_key, context)?;
        self.save(session_id, session)
    }

    pub fn contexts(&self, session_id: &str) -> WaymarkResult<Vec<JourneyContext>> {
        store::get_contexts(&self.load(session_id), &self.store_key)
    }

    pub fn remove_context(&self, session_id: &str, context_id: &str) -> WaymarkResult<bool> {
        let mut session = self.load(session_id);
        let removed = store::remove_context_by_id(&mut session, &self.store_key, context_id)?;
        if removed {
            self.save(session_id, session)?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use waymark_journey::DEFAULT_CONTEXT_ID;

    fn store() -> MemorySessionStore {
        MemorySessionStore::from_config(&SessionConfig::default())
    }

    #[test]
    fn test_unknown_session_loads_empty() {
        let store = store();
        assert!(store.load("missing").is_empty());
        let ctx = store.load_context("missing", None).unwrap();
        assert!(ctx.is_default());
    }

    #[test]
    fn test_save_and_load_context() {
        let store = store();
        let session_id = store.create_session().unwrap();

        let mut ctx = store.load_context(&session_id, None).unwrap();
        ctx.set_data_for_page("name", json!({"first": "Ada"})).unwrap();
        ctx.clear_validation_errors_for_page("name").unwrap();
        store.save_context(&session_id, &mut ctx).unwrap();

        let loaded = store.load_context(&session_id, Some(DEFAULT_CONTEXT_ID)).unwrap();
        assert_eq!(loaded.data_for_page("name"), Some(&json!({"first": "Ada"})));
        assert!(loaded.is_page_valid("name"));
        assert_eq!(store.contexts(&session_id).unwrap().len(), 1);
    }

    #[test]
    fn test_parallel_context_and_removal() {
        let store = store();
        let session_id = store.create_session().unwrap();
        let base = store.load_context(&session_id, None).unwrap();
        let mut copy = JourneyContext::from_context(&base);
        store.save_context(&session_id, &mut copy).unwrap();
        let copy_id = copy.id().unwrap().to_string();

        assert_eq!(store.contexts(&session_id).unwrap().len(), 2);
        assert_eq!(
            store.load_context(&session_id, Some(&copy_id)).unwrap().id(),
            Some(copy_id.as_str())
        );
        assert!(store.remove_context(&session_id, &copy_id).unwrap());
        assert!(store.load_context(&session_id, Some(&copy_id)).unwrap().is_default());
    }

    #[test]
    fn test_expired_sessions() {
        let store = MemorySessionStore::new("journeyContextList", 0, 10);
        let session_id = store.create_session().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.load(&session_id).is_empty());
        store.create_session().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.evict_expired(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_is_enforced() {
        let store = MemorySessionStore::new("journeyContextList", 3600, 1);
        let first = store.create_session().unwrap();
        assert!(store.create_session().is_err());
        assert!(store.save(&first, SessionData::new()).is_ok());
        assert!(store.remove(&first));
        assert!(store.create_session().is_ok());
    }

    #[test]
    fn test_eviction_races_with_saves() {
        let store = Arc::new(MemorySessionStore::new("journeyContextList", 0, 64));
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        let _ = store.save(&Uuid::new_v4().to_string(), SessionData::new());
                    }
                })
            })
            .collect();
        let evictor = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..2_000 {
                    store.evict_expired();
                }
            })
        };
        for writer in writers {
            writer.join().unwrap();
        }
        evictor.join().unwrap();
    }

    #[test]
    fn test_expired_load_keeps_fresh_session() {
        let store = MemorySessionStore::new("journeyContextList", 3600, 10);
        let session_id = store.create_session().unwrap();

        // Another request saves between the stale read and the removal.
        let mut data = SessionData::new();
        data.insert("fresh", json!(true));
        store.save(&session_id, data).unwrap();
        assert!(!store.remove_if_expired(&session_id));
        assert_eq!(store.load(&session_id).get("fresh"), Some(&json!(true)));

        let expiring = MemorySessionStore::new("journeyContextList", 0, 10);
        let stale = expiring.create_session().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(expiring.load(&stale).is_empty());
        assert!(expiring.is_empty());
    }
}
