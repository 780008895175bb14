//! Networked `SessionStore` backend. The wire protocol to the actual KV
//! store is out of scope (treated as a capability); this module only
//! carries the contract plus the one backend the crate ships —
//! `NullKvBackend`, which always reports unavailable so the factory's
//! fallback-to-memory path is always exercised honestly rather than faked.

use super::{NewSession, Session, SessionId, SessionPatch, SessionStore};
use crate::error::ErrorKind;
use async_trait::async_trait;

#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn ping(&self) -> Result<(), ErrorKind>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ErrorKind>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), ErrorKind>;
    async fn delete(&self, key: &str) -> Result<bool, ErrorKind>;
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, ErrorKind>;
}

pub struct NullKvBackend;

#[async_trait]
impl KvBackend for NullKvBackend {
    async fn ping(&self) -> Result<(), ErrorKind> {
        Err(ErrorKind::StoreUnavailable(
            "no networked KV backend configured".into(),
        ))
    }
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, ErrorKind> {
        Err(ErrorKind::StoreUnavailable("kv backend unavailable".into()))
    }
    async fn set(&self, _key: &str, _value: Vec<u8>) -> Result<(), ErrorKind> {
        Err(ErrorKind::StoreUnavailable("kv backend unavailable".into()))
    }
    async fn delete(&self, _key: &str) -> Result<bool, ErrorKind> {
        Err(ErrorKind::StoreUnavailable("kv backend unavailable".into()))
    }
    async fn keys(&self, _prefix: &str) -> Result<Vec<String>, ErrorKind> {
        Err(ErrorKind::StoreUnavailable("kv backend unavailable".into()))
    }
}

pub struct RemoteSessionStore<B: KvBackend> {
    backend: B,
}

impl<B: KvBackend> RemoteSessionStore<B> {
    /// Connects eagerly so the factory can detect an unreachable backend at
    /// startup and fall back to memory (design §4.A).
    pub async fn connect(backend: B) -> Result<Self, ErrorKind> {
        backend.ping().await?;
        Ok(Self { backend })
    }

    fn key(id: SessionId) -> String {
        format!("session:{id}")
    }
}

#[async_trait]
impl<B: KvBackend> SessionStore for RemoteSessionStore<B> {
    async fn create(&self, data: NewSession) -> Result<SessionId, ErrorKind> {
        let id = SessionId::new();
        let now = chrono::Utc::now();
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
        let bytes = serde_json::to_vec(&session)
            .map_err(|e| ErrorKind::Serialization(e.to_string()))?;
        self.backend.set(&Self::key(id), bytes).await?;
        Ok(id)
    }

    async fn get(&self, id: SessionId) -> Result<Option<Session>, ErrorKind> {
        match self.backend.get(&Self::key(id)).await? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ErrorKind::Serialization(e.to_string())),
        }
    }

    async fn update(&self, id: SessionId, patch: SessionPatch) -> Result<Session, ErrorKind> {
        let mut session = self
            .get(id)
            .await?
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
        session.last_activity_at = chrono::Utc::now();
        let bytes = serde_json::to_vec(&session)
            .map_err(|e| ErrorKind::Serialization(e.to_string()))?;
        self.backend.set(&Self::key(id), bytes).await?;
        Ok(session)
    }

    async fn delete(&self, id: SessionId) -> Result<bool, ErrorKind> {
        self.backend.delete(&Self::key(id)).await
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<Session>, ErrorKind> {
        let keys = self.backend.keys("session:").await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(bytes) = self.backend.get(&key).await? {
                let session: Session = serde_json::from_slice(&bytes)
                    .map_err(|e| ErrorKind::Serialization(e.to_string()))?;
                if user_id.map_or(true, |u| session.user_id == u) {
                    out.push(session);
                }
            }
        }
        Ok(out)
    }

    async fn touch(&self, id: SessionId) -> Result<(), ErrorKind> {
        if let Some(mut session) = self.get(id).await? {
            session.last_activity_at = chrono::Utc::now();
            let bytes = serde_json::to_vec(&session)
                .map_err(|e| ErrorKind::Serialization(e.to_string()))?;
            self.backend.set(&Self::key(id), bytes).await?;
        }
        Ok(())
    }

    async fn delete_expired(&self) -> Result<usize, ErrorKind> {
        let sessions = self.list(None).await?;
        let now = chrono::Utc::now();
        let mut count = 0;
        for session in sessions {
            if session.expires_at <= now {
                self.delete(session.id).await?;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_fails_fast_against_null_backend() {
        let err = RemoteSessionStore::connect(NullKvBackend).await.unwrap_err();
        assert!(matches!(err, ErrorKind::StoreUnavailable(_)));
    }
}
