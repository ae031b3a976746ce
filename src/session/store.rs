//! Registry of running sessions, passed explicitly to the control API.

use crate::errors::SessionError;
use crate::orchestrator::SessionHandle;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, handle: SessionHandle) {
        self.sessions
            .write()
            .await
            .insert(handle.session_id().to_string(), handle);
    }

    pub async fn get(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound {
                id: session_id.to_string(),
            })
    }

    /// Session ids in sorted order.
    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.write().await.remove(session_id)
    }
}
