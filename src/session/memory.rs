//! In-memory `SessionStore`, a reader-preferred `RwLock<HashMap<..>>` over
//! the session table, the same shape as the teacher's
//! `BrowserSessionManager` session map (`tools/browser/session.rs`).

use super::{NewSession, Session, SessionId, SessionPatch, SessionStore};
use crate::error::ErrorKind;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, data: NewSession) -> Result<SessionId, ErrorKind> {
        let id = SessionId::new();
        let now = Utc::now();
        let session = Session {
            id,
            user_id: data.user_id,
            username: data.username,
            roles: data.roles,
            metadata: data.metadata,
            created_at: now,
            expires_at: now
                + chrono::Duration::from_std(data.ttl)
                    .map_err(|e| ErrorKind::BadArgument(e.to_string()))?,
            last_activity_at: now,
        };
        self.sessions
            .write()
            .map_err(|_| ErrorKind::Internal("session map poisoned".into()))?
            .insert(id, session);
        Ok(id)
    }

    async fn get(&self, id: SessionId) -> Result<Option<Session>, ErrorKind> {
        Ok(self
            .sessions
            .read()
            .map_err(|_| ErrorKind::Internal("session map poisoned".into()))?
            .get(&id)
            .cloned())
    }

    async fn update(&self, id: SessionId, patch: SessionPatch) -> Result<Session, ErrorKind> {
        let mut guard = self
            .sessions
            .write()
            .map_err(|_| ErrorKind::Internal("session map poisoned".into()))?;
        let session = guard
            .get_mut(&id)
            .ok_or_else(|| ErrorKind::NotFound(format!("session {id}")))?;
        if let Some(roles) = patch.roles {
            session.roles = roles;
        }
        if let Some(metadata) = patch.metadata {
            session.metadata = metadata;
        }
        if let Some(extra) = patch.extend_ttl {
            session.expires_at += chrono::Duration::from_std(extra)
                .map_err(|e| ErrorKind::BadArgument(e.to_string()))?;
        }
        session.last_activity_at = Utc::now();
        Ok(session.clone())
    }

    async fn delete(&self, id: SessionId) -> Result<bool, ErrorKind> {
        Ok(self
            .sessions
            .write()
            .map_err(|_| ErrorKind::Internal("session map poisoned".into()))?
            .remove(&id)
            .is_some())
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<Session>, ErrorKind> {
        let guard = self
            .sessions
            .read()
            .map_err(|_| ErrorKind::Internal("session map poisoned".into()))?;
        Ok(guard
            .values()
            .filter(|s| user_id.map_or(true, |u| s.user_id == u))
            .cloned()
            .collect())
    }

    async fn touch(&self, id: SessionId) -> Result<(), ErrorKind> {
        let mut guard = self
            .sessions
            .write()
            .map_err(|_| ErrorKind::Internal("session map poisoned".into()))?;
        if let Some(session) = guard.get_mut(&id) {
            session.last_activity_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_expired(&self) -> Result<usize, ErrorKind> {
        let mut guard = self
            .sessions
            .write()
            .map_err(|_| ErrorKind::Internal("session map poisoned".into()))?;
        let now = Utc::now();
        let before = guard.len();
        guard.retain(|_, s| s.expires_at > now);
        Ok(before - guard.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session(ttl_secs: u64) -> NewSession {
        NewSession {
            user_id: "u1".into(),
            username: "demo".into(),
            roles: vec!["user".into()],
            metadata: serde_json::json!({}),
            ttl: std::time::Duration::from_secs(ttl_secs),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = MemorySessionStore::new();
        let id = store.create(new_session(3600)).await.unwrap();
        let session = store.get(id).await.unwrap().unwrap();
        assert_eq!(session.user_id, "u1");
    }

    #[tokio::test]
    async fn get_missing_returns_none_not_error() {
        let store = MemorySessionStore::new();
        assert!(store.get(SessionId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_missing_returns_not_found() {
        let store = MemorySessionStore::new();
        let err = store
            .update(SessionId::new(), SessionPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_expired_sweeps_only_expired_entries() {
        let store = MemorySessionStore::new();
        let expired = store.create(new_session(0)).await.unwrap();
        let alive = store.create(new_session(3600)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let swept = store.delete_expired().await.unwrap();
        assert_eq!(swept, 1);
        assert!(store.get(expired).await.unwrap().is_none());
        assert!(store.get(alive).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn double_delete_is_idempotent() {
        let store = MemorySessionStore::new();
        let id = store.create(new_session(3600)).await.unwrap();
        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
    }
}
