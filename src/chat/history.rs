//! # Session History Store
//!
//! Append-only, in-memory conversation history keyed by session id.
//!
//! ## Semantics:
//! - Appending to an unknown session creates it implicitly
//! - Reading an unknown session yields an empty history, never an error
//! - Clearing empties a session but keeps its id valid
//! - Turns are never mutated or reordered once appended
//!
//! Histories live for the process lifetime; there is no eviction.

use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One immutable conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,

    /// RFC 3339 creation time, assigned by the store at append
    pub timestamp: String,
}

impl ConversationTurn {
    pub fn new(role: Role, text: String) -> Self {
        Self {
            role,
            text,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Thread-safe store of per-session conversation histories.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Vec<ConversationTurn>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty session and return its id.
    pub async fn create_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions.write().await.insert(id.clone(), Vec::new());
        tracing::debug!("created session {}", id);
        id
    }

    /// Append one turn to a session, creating the session if needed.
    ///
    /// The append is atomic: the turn is either fully visible to subsequent
    /// reads or not at all.
    pub async fn append(&self, session_id: &str, role: Role, text: String) -> ConversationTurn {
        let turn = ConversationTurn::new(role, text);
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(turn.clone());
        turn
    }

    /// Read a session's full history in append order. Unknown sessions read
    /// as empty.
    pub async fn read(&self, session_id: &str) -> Vec<ConversationTurn> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Empty a session's history. The session id stays valid either way;
    /// returns whether the session previously existed.
    pub async fn clear(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let existed = sessions.contains_key(session_id);
        sessions.insert(session_id.to_string(), Vec::new());
        existed
    }

    /// Ids of every known session, in no particular order.
    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = SessionStore::new();
        let id = store.create_session().await;

        store.append(&id, Role::User, "first".to_string()).await;
        store.append(&id, Role::Assistant, "second".to_string()).await;
        store.append(&id, Role::User, "third".to_string()).await;

        let history = store.read(&id).await;
        let texts: Vec<&str> = history.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        let a = store.create_session().await;
        let b = store.create_session().await;
        assert_ne!(a, b);

        store.append(&a, Role::User, "only in a".to_string()).await;

        assert_eq!(store.read(&a).await.len(), 1);
        assert!(store.read(&b).await.is_empty());
    }

    #[tokio::test]
    async fn test_append_creates_session_implicitly() {
        let store = SessionStore::new();
        store.append("ad-hoc", Role::User, "hi".to_string()).await;

        assert_eq!(store.read("ad-hoc").await.len(), 1);
        assert!(store.session_ids().await.contains(&"ad-hoc".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_session_reads_empty() {
        let store = SessionStore::new();
        assert!(store.read("never-seen").await.is_empty());
        // And reading must not create the session as a side effect.
        assert!(store.session_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_keeps_session_valid() {
        let store = SessionStore::new();
        let id = store.create_session().await;
        store.append(&id, Role::User, "gone soon".to_string()).await;

        assert!(store.clear(&id).await);
        assert!(store.read(&id).await.is_empty());
        assert!(store.session_ids().await.contains(&id));

        // Appending after a clear works as for a fresh session.
        store.append(&id, Role::User, "back".to_string()).await;
        assert_eq!(store.read(&id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_unknown_session_reports_absent() {
        let store = SessionStore::new();
        assert!(!store.clear("missing").await);
        // The clear itself still leaves a valid empty session behind.
        assert!(store.session_ids().await.contains(&"missing".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_appends_all_land() {
        let store = std::sync::Arc::new(SessionStore::new());
        let id = store.create_session().await;

        let mut tasks = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                store.append(&id, Role::User, format!("msg {}", i)).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.read(&id).await.len(), 32);
    }
}
