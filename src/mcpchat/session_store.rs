//! The `session_store` module keeps every live conversation in process memory, keyed
//! by an opaque session identifier.
//!
//! **Key features:**
//! - **Lazy sessions**: nothing is "opened"; an unknown id simply reads as empty history.
//! - **Turn commits**: `commit_turn()` appends the user and assistant messages of a
//!   successful turn under one write lock, so readers never see half a turn.
//! - **Bounded**: at most `capacity` sessions are kept; creating one more evicts the
//!   least recently active session.
//!
//! ## Quickstart
//!
//! ```rust
//! use mcpchat::session_store::SessionStore;
//!
//! # async {
//! let store = SessionStore::new();
//! let id = SessionStore::new_session_id();
//!
//! store.commit_turn(&id, "What tools do you have?", "I can look things up.").await;
//! assert_eq!(store.get(&id).await.len(), 2);
//!
//! store.clear(&id).await;
//! assert!(store.get(&id).await.is_empty());
//! # };
//! ```
//!
//! The store does no per-session locking of turns: a caller submitting two turns for
//! the same session at once may interleave their commits.

use crate::client_wrapper::Message;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Number of sessions kept by [`SessionStore::new`].
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

struct SessionEntry {
    history: Vec<Message>,
    last_active: DateTime<Utc>,
    // Logical clock value of the last write; eviction order.
    touched: u64,
}

struct Sessions {
    entries: HashMap<String, SessionEntry>,
    clock: u64,
}

impl Sessions {
    /// Fetch or lazily create a session, evicting the stalest one when full.
    fn entry_mut(&mut self, session_id: &str, capacity: usize) -> &mut SessionEntry {
        if !self.entries.contains_key(session_id) && self.entries.len() >= capacity {
            let stalest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.touched)
                .map(|(id, _)| id.clone());
            if let Some(id) = stalest {
                log::debug!("session store full ({}), evicting {}", capacity, id);
                self.entries.remove(&id);
            }
        }

        self.clock += 1;
        let touched = self.clock;
        let entry = self
            .entries
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                history: Vec::new(),
                last_active: Utc::now(),
                touched,
            });
        entry.last_active = Utc::now();
        entry.touched = touched;
        entry
    }
}

/// In-memory map from session id to conversation history.
pub struct SessionStore {
    sessions: RwLock<Sessions>,
    capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a store holding at most [`DEFAULT_MAX_SESSIONS`] sessions.
    pub fn new() -> Self {
        Self::with_capacity_limit(DEFAULT_MAX_SESSIONS)
    }

    /// Create a store holding at most `max_sessions` sessions (minimum 1).
    pub fn with_capacity_limit(max_sessions: usize) -> Self {
        SessionStore {
            sessions: RwLock::new(Sessions {
                entries: HashMap::new(),
                clock: 0,
            }),
            capacity: max_sessions.max(1),
        }
    }

    /// Generate an identifier for a server-created session.
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the session's history; empty if the session is unknown.
    pub async fn get(&self, session_id: &str) -> Vec<Message> {
        self.sessions
            .read()
            .await
            .entries
            .get(session_id)
            .map(|entry| entry.history.clone())
            .unwrap_or_default()
    }

    /// Append one message, creating the session if needed.
    pub async fn append(&self, session_id: &str, message: Message) {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry_mut(session_id, self.capacity)
            .history
            .push(message);
    }

    /// Replace the whole history, creating the session if needed.
    pub async fn replace(&self, session_id: &str, history: Vec<Message>) {
        let mut sessions = self.sessions.write().await;
        sessions.entry_mut(session_id, self.capacity).history = history;
    }

    /// Persist a successful turn: the user message followed by the final answer.
    pub async fn commit_turn(&self, session_id: &str, user_message: &str, response: &str) {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry_mut(session_id, self.capacity);
        entry.history.push(Message::user(user_message));
        entry.history.push(Message::assistant_text(response));
    }

    /// Reset the history to empty. The session itself stays known.
    pub async fn clear(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.entry_mut(session_id, self.capacity).history.clear();
    }

    /// Forget the session entirely. Returns whether it existed.
    pub async fn drop_session(&self, session_id: &str) -> bool {
        self.sessions
            .write()
            .await
            .entries
            .remove(session_id)
            .is_some()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.entries.contains_key(session_id)
    }

    /// When the session last changed, if it is known.
    pub async fn last_active(&self, session_id: &str) -> Option<DateTime<Utc>> {
        self.sessions
            .read()
            .await
            .entries
            .get(session_id)
            .map(|entry| entry.last_active)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.entries.is_empty()
    }
}
