//! AuthGate (component H).

pub mod capability;
pub mod principal;
pub mod verify;

pub use capability::Operation;
pub use principal::{Credentials, Principal, TransportMetadata};
pub use verify::{Claims, TokenCodec};

use crate::audit::{AuditEvent, AuditSink};
use crate::error::ErrorKind;
use crate::session::{SessionId, SessionStore};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait AuthGate: Send + Sync {
    async fn authenticate(
        &self,
        credentials: Credentials,
        meta: TransportMetadata,
    ) -> Result<Principal, ErrorKind>;

    fn is_public_path(&self, path: &str) -> bool {
        matches!(
            path,
            "/health" | "/health/live" | "/health/ready" | "/api/v1/capabilities"
        )
    }

    fn authorize(&self, principal: &Principal, op: Operation) -> Result<(), ErrorKind> {
        if capability::is_allowed(principal, op) {
            Ok(())
        } else {
            Err(ErrorKind::Forbidden(format!(
                "role(s) {:?} may not perform {op:?}",
                principal.roles
            )))
        }
    }
}

/// Production `AuthGate`: bearer tokens via `TokenCodec`, API keys via a
/// static map (loaded from config at startup — the underlying key store is
/// out of scope, same as `SessionStore`'s KV backend), and raw session ids
/// resolved through `SessionStore`.
pub struct DefaultAuthGate {
    codec: TokenCodec,
    api_keys: std::collections::HashMap<String, Principal>,
    sessions: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditSink>,
}

impl DefaultAuthGate {
    pub fn new(
        jwt_secret: impl Into<Vec<u8>>,
        api_keys: std::collections::HashMap<String, Principal>,
        sessions: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            codec: TokenCodec::new(jwt_secret),
            api_keys,
            sessions,
            audit,
        }
    }

    async fn session_to_principal(&self, id: SessionId) -> Result<Principal, ErrorKind> {
        let session = self
            .sessions
            .get(id)
            .await?
            .ok_or(ErrorKind::SessionExpired)?;
        if session.is_expired() {
            return Err(ErrorKind::SessionExpired);
        }
        self.sessions.touch(id).await?;
        Ok(Principal {
            user_id: session.user_id,
            roles: session.roles,
            scopes: vec![],
            session_id: Some(id),
        })
    }
}

#[async_trait]
impl AuthGate for DefaultAuthGate {
    async fn authenticate(
        &self,
        credentials: Credentials,
        meta: TransportMetadata,
    ) -> Result<Principal, ErrorKind> {
        self.audit.emit(AuditEvent::auth_attempt(&meta)).await;

        let result = match credentials {
            Credentials::Bearer(token) => self
                .codec
                .verify(&token)
                .map(|claims| Principal {
                    user_id: claims.user_id,
                    roles: claims.roles,
                    scopes: claims.scopes,
                    session_id: claims.session_id,
                }),
            Credentials::ApiKey(key) => self
                .api_keys
                .get(&key)
                .cloned()
                .ok_or(ErrorKind::Unauthenticated),
            Credentials::SessionId(id) => self.session_to_principal(id).await,
        };

        match &result {
            Ok(principal) => {
                self.audit
                    .emit(AuditEvent::auth_success(&principal.user_id, &meta))
                    .await;
            }
            Err(err) => {
                self.audit
                    .emit(AuditEvent::auth_failure(err, &meta))
                    .await;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NullAuditSink;
    use crate::session::memory::MemorySessionStore;

    fn gate() -> DefaultAuthGate {
        DefaultAuthGate::new(
            "a-long-enough-test-secret-value",
            std::collections::HashMap::new(),
            Arc::new(MemorySessionStore::new()),
            Arc::new(NullAuditSink),
        )
    }

    #[tokio::test]
    async fn unknown_api_key_is_unauthenticated() {
        let gate = gate();
        let err = gate
            .authenticate(
                Credentials::ApiKey("nope".into()),
                TransportMetadata::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ErrorKind::Unauthenticated));
    }

    #[test]
    fn public_paths_bypass_auth() {
        let gate = gate();
        assert!(gate.is_public_path("/health"));
        assert!(!gate.is_public_path("/api/v1/contexts"));
    }
}
