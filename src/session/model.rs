use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub username: String,
    pub roles: Vec<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Fields a caller may supply when creating a session. `sessionId` itself is
/// always server-generated.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSession {
    pub user_id: String,
    pub username: String,
    pub roles: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
    pub ttl: std::time::Duration,
}

/// Partial update applied by `SessionStore::update`; absent fields are
/// left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionPatch {
    pub roles: Option<Vec<String>>,
    pub metadata: Option<Value>,
    pub extend_ttl: Option<std::time::Duration>,
}
