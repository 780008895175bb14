use crate::session::SessionId;
use serde::{Deserialize, Serialize};

/// Authenticated identity bound to one request, created by `AuthGate`
/// (design §3 "Principal").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub roles: Vec<String>,
    pub scopes: Vec<String>,
    pub session_id: Option<SessionId>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }

    /// Invariant 5: only the owning session or an admin may touch a
    /// session-owned resource.
    pub fn owns_session(&self, owner: SessionId) -> bool {
        self.is_admin() || self.session_id == Some(owner)
    }
}

/// Credentials a caller may present, uniform across all four adapters
/// (design §4.H).
#[derive(Debug, Clone)]
pub enum Credentials {
    Bearer(String),
    ApiKey(String),
    SessionId(SessionId),
}

#[derive(Debug, Clone, Default)]
pub struct TransportMetadata {
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub protocol: &'static str,
}
