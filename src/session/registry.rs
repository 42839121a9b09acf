//! Live sessions keyed by id
//!
//! Each session sits behind its own async mutex so turns on one session
//! run one at a time while different sessions proceed independently. An
//! idle session is evicted from memory; its durable copy stays in the
//! store and is reloaded on the next access.
//!
//! A session whose last write failed is pinned outside the cache until a
//! write succeeds. The stored copy is stale while pinned, so it must never
//! be reloaded in place of the live one.

use crate::config::SessionConfig;
use crate::context::models::ConversationState;
use crate::error::{ContextError, Result};
use crate::storage::{validate_session_id, SessionStore};
use dashmap::DashMap;
use moka::future::Cache;
use moka::notification::RemovalCause;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// In-memory session plus its write status
#[derive(Debug)]
pub struct SessionEntry {
    pub state: ConversationState,
    /// The last write of `state` failed and has not been retried successfully
    pub dirty: bool,
}

impl SessionEntry {
    pub fn new(state: ConversationState) -> Self {
        Self { state, dirty: false }
    }
}

pub type SessionHandle = Arc<Mutex<SessionEntry>>;

pub struct SessionRegistry {
    cache: Cache<String, SessionHandle>,
    pinned: DashMap<String, SessionHandle>,
    store: Arc<dyn SessionStore>,
}

impl SessionRegistry {
    pub fn new(config: &SessionConfig, store: Arc<dyn SessionStore>) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_sessions)
            .time_to_idle(config.idle_timeout())
            .eviction_listener(|id: Arc<String>, handle: SessionHandle, cause: RemovalCause| {
                if !cause.was_evicted() {
                    return;
                }
                let dirty = handle.try_lock().map(|entry| entry.dirty).unwrap_or(false);
                if dirty {
                    warn!("Session {} evicted from cache with unsaved changes, kept pinned", id);
                } else {
                    debug!("Session {} evicted ({:?})", id, cause);
                }
            })
            .build();

        Self {
            cache,
            pinned: DashMap::new(),
            store,
        }
    }

    /// Register a new session, replacing any live one with the same id
    pub async fn insert(&self, state: ConversationState) -> SessionHandle {
        let handle = Arc::new(Mutex::new(SessionEntry::new(state)));
        let id = handle.lock().await.state.session_id.clone();
        self.cache.insert(id, Arc::clone(&handle)).await;
        handle
    }

    /// Live handle for `session_id`, reloading it from the store when evicted
    pub async fn open(&self, session_id: &str) -> Result<SessionHandle> {
        if validate_session_id(session_id).is_err() {
            return Err(ContextError::SessionNotFound(session_id.to_string()));
        }

        if let Some(handle) = self.pinned_handle(session_id) {
            return Ok(handle);
        }

        let store = Arc::clone(&self.store);
        let id = session_id.to_string();
        self.cache
            .try_get_with(session_id.to_string(), async move {
                match store.load(&id).await {
                    Ok(Some(state)) => {
                        debug!("Loaded session {} from store ({} messages)", id, state.len());
                        Ok(Arc::new(Mutex::new(SessionEntry::new(state))))
                    }
                    Ok(None) => Err(ContextError::SessionNotFound(id)),
                    Err(e) => Err(ContextError::from(e)),
                }
            })
            .await
            .map_err(|e: Arc<ContextError>| e.as_ref().clone())
    }

    /// Live handle without touching the store
    pub async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        match self.pinned_handle(session_id) {
            Some(handle) => Some(handle),
            None => self.cache.get(session_id).await,
        }
    }

    pub async fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        let pinned = self.pinned.remove(session_id).map(|(_, handle)| handle);
        self.cache.remove(session_id).await.or(pinned)
    }

    fn pinned_handle(&self, session_id: &str) -> Option<SessionHandle> {
        self.pinned.get(session_id).map(|handle| Arc::clone(handle.value()))
    }

    /// Keep `handle` live regardless of idle time or capacity
    pub fn pin(&self, session_id: &str, handle: &SessionHandle) {
        self.pinned
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::clone(handle));
    }

    /// Return a pinned session to normal eviction
    pub async fn unpin(&self, session_id: &str) {
        if let Some((id, handle)) = self.pinned.remove(session_id) {
            // Evicted while pinned: hand it back to the cache so it stays reachable
            if self.cache.get(&id).await.is_none() {
                self.cache.insert(id, handle).await;
            }
        }
    }
}
