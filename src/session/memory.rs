use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::session::{Session, SessionRepository, SetOutcome};

/// Process-lifetime session map. Valid for single-instance deployments only;
/// a restart silently returns every user to idle.
#[derive(Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    timeout: Duration,
}

impl InMemorySessionStore {
    pub fn new(timeout: Duration) -> Self {
        InMemorySessionStore {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn compare_and_store(&self, user_id: &str, session: &Session) -> SetOutcome {
        let mut sessions = self.sessions.lock();
        let current_version = sessions.get(user_id).map(|s| s.version).unwrap_or(0);
        if current_version != session.version {
            return SetOutcome::Conflict;
        }
        let mut stored = session.clone();
        stored.version = current_version + 1;
        sessions.insert(user_id.to_string(), stored);
        SetOutcome::Stored
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> Session {
        self.sessions
            .lock()
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| Session::idle(Utc::now()))
    }

    async fn set(&self, user_id: &str, session: &Session) -> SetOutcome {
        self.compare_and_store(user_id, session)
    }

    async fn delete(&self, user_id: &str) {
        self.sessions.lock().remove(user_id);
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, self.timeout));
        before - sessions.len()
    }
}
