use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use verde_core::session::Session;

/// A session behind its own lock.
///
/// User turns and the watcher both take this mutex, so a phase flip is
/// either seen by the next turn or finds `phase2_activated` already set.
pub type SharedSession = Arc<Mutex<Session>>;

/// In-memory sessions keyed by caller-supplied id.
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SharedSession>>>,
}

impl SessionRegistry {
    /// Creates a new empty SessionRegistry.
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Gets a session by id.
    pub async fn get(&self, session_id: &str) -> Option<SharedSession> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    /// Returns the session with this id, creating it on first use.
    pub async fn get_or_create(&self, session_id: &str) -> SharedSession {
        if let Some(existing) = self.get(session_id).await {
            return existing;
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!("[SessionRegistry] New session {}", session_id);
                Arc::new(Mutex::new(Session::new(session_id)))
            })
            .clone()
    }

    /// Every registered session, ordered by id.
    pub async fn entries(&self) -> Vec<(String, SharedSession)> {
        let sessions = self.sessions.read().await;
        let mut entries: Vec<_> = sessions
            .iter()
            .map(|(id, session)| (id.clone(), session.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
