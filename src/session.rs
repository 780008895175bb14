//! SessionStore capability (component A).
//!
//! Trait shape and `Arc<T>` blanket impl follow the teacher's
//! `runtime::traits::{MessageStore, StateStore}` pattern so any backend can
//! be injected behind `Arc<dyn SessionStore>`.

pub mod memory;
pub mod model;
pub mod remote;

pub use model::{NewSession, Session, SessionId, SessionPatch};

use crate::error::ErrorKind;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, data: NewSession) -> Result<SessionId, ErrorKind>;
    /// Missing id returns `Ok(None)`, never an error (design §4.A).
    async fn get(&self, id: SessionId) -> Result<Option<Session>, ErrorKind>;
    /// Missing id returns `Err(NotFound)`.
    async fn update(&self, id: SessionId, patch: SessionPatch) -> Result<Session, ErrorKind>;
    async fn delete(&self, id: SessionId) -> Result<bool, ErrorKind>;
    async fn list(&self, user_id: Option<&str>) -> Result<Vec<Session>, ErrorKind>;
    async fn touch(&self, id: SessionId) -> Result<(), ErrorKind>;
    async fn delete_expired(&self) -> Result<usize, ErrorKind>;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn create(&self, data: NewSession) -> Result<SessionId, ErrorKind> {
        (**self).create(data).await
    }
    async fn get(&self, id: SessionId) -> Result<Option<Session>, ErrorKind> {
        (**self).get(id).await
    }
    async fn update(&self, id: SessionId, patch: SessionPatch) -> Result<Session, ErrorKind> {
        (**self).update(id, patch).await
    }
    async fn delete(&self, id: SessionId) -> Result<bool, ErrorKind> {
        (**self).delete(id).await
    }
    async fn list(&self, user_id: Option<&str>) -> Result<Vec<Session>, ErrorKind> {
        (**self).list(user_id).await
    }
    async fn touch(&self, id: SessionId) -> Result<(), ErrorKind> {
        (**self).touch(id).await
    }
    async fn delete_expired(&self) -> Result<usize, ErrorKind> {
        (**self).delete_expired().await
    }
}

/// Builds the configured backend, falling back to memory when a `remote`
/// backend is requested but reports unavailable at startup (design §4.A).
pub struct SessionStoreFactory;

impl SessionStoreFactory {
    pub async fn build(cfg: &crate::config::Config) -> Arc<dyn SessionStore> {
        use crate::config::SessionStoreType;
        match cfg.session_store_type {
            SessionStoreType::Memory => Arc::new(memory::MemorySessionStore::new()),
            SessionStoreType::Remote => {
                let backend = remote::NullKvBackend;
                match remote::RemoteSessionStore::connect(backend).await {
                    Ok(store) => Arc::new(store),
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            "remote session store unavailable at startup, falling back to memory"
                        );
                        Arc::new(memory::MemorySessionStore::new())
                    }
                }
            }
        }
    }
}

/// Spawns the TTL sweep task (design §4.A "background sweep"); mirrors the
/// teacher's weak-owner background-cleanup-loop shape in
/// `tools/browser/session.rs`.
pub fn spawn_cleanup_task(
    store: Arc<dyn SessionStore>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.delete_expired().await {
                Ok(n) if n > 0 => tracing::info!(count = n, "swept expired sessions"),
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "session sweep failed"),
            }
        }
    })
}
