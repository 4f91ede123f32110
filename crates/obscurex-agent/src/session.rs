//! In-memory conversation sessions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use obscurex_core::{Metadata, SessionId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub messages: Vec<SessionMessage>,
    pub metadata: Metadata,
}

/// Sessions keyed by id. Sessions are never removed implicitly.
#[derive(Debug, Default)]
pub struct InMemorySessionService {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for `user_id`, generating an id unless one is given.
    pub async fn create_session(
        &self,
        user_id: &str,
        session_id: Option<SessionId>,
    ) -> Result<SessionId, SessionError> {
        let session_id = session_id.unwrap_or_else(|| SessionId::generate_for_user(user_id));
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session_id) {
            return Err(SessionError::AlreadyExists(session_id.to_string()));
        }

        tracing::debug!(session.id = %session_id, user = %user_id, "Created session");
        sessions.insert(
            session_id.clone(),
            Session {
                session_id: session_id.clone(),
                user_id: user_id.to_string(),
                created_at: Utc::now(),
                updated_at: None,
                messages: Vec::new(),
                metadata: Metadata::new(),
            },
        );
        Ok(session_id)
    }

    pub async fn get_session(&self, session_id: &SessionId) -> Option<Session> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Merge `metadata` into the session's metadata and stamp `updated_at`.
    pub async fn update_session(
        &self,
        session_id: &SessionId,
        metadata: Metadata,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        session.metadata.extend(metadata);
        session.updated_at = Some(Utc::now());
        Ok(())
    }

    /// Returns whether a session was removed.
    pub async fn delete_session(&self, session_id: &SessionId) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn add_message(
        &self,
        session_id: &SessionId,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        session.messages.push(SessionMessage {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Message history, empty for unknown sessions.
    pub async fn get_messages(&self, session_id: &SessionId) -> Vec<SessionMessage> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// Returns whether the session exists.
    pub async fn clear_messages(&self, session_id: &SessionId) -> bool {
        match self.sessions.write().await.get_mut(session_id) {
            Some(session) => {
                session.messages.clear();
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
