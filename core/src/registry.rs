//! Per-session hook state keyed by session ID.
//!
//! Each hook owns one registry (or is handed one at construction). Entries are
//! created lazily on first observation and removed only on explicit eviction.

use dashmap::DashMap;
use std::collections::HashMap;

/// Concurrent map from session ID to hook state
#[derive(Debug)]
pub struct SessionRegistry<T> {
    sessions: DashMap<String, T>,
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl<T> SessionRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate a session's state, creating it with `init` on first touch.
    ///
    /// The shard lock is held only for the duration of `f`; callers must not
    /// await inside it.
    pub fn update<R>(
        &self,
        session_id: &str,
        init: impl FnOnce() -> T,
        f: impl FnOnce(&mut T) -> R,
    ) -> R {
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(init);
        f(entry.value_mut())
    }

    /// Mutate a session's state only if it already exists
    pub fn update_existing<R>(&self, session_id: &str, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.sessions
            .get_mut(session_id)
            .map(|mut entry| f(entry.value_mut()))
    }

    /// Check whether a session has state
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Remove a session, returning its final state
    pub fn clear(&self, session_id: &str) -> Option<T> {
        self.sessions.remove(session_id).map(|(_, v)| v)
    }

    /// Remove every session
    pub fn clear_all(&self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<T: Clone> SessionRegistry<T> {
    /// Snapshot of a session's state
    pub fn get(&self, session_id: &str) -> Option<T> {
        self.sessions.get(session_id).map(|r| r.value().clone())
    }

    /// Snapshot of every session's state
    pub fn all(&self) -> HashMap<String, T> {
        self.sessions
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }
}
