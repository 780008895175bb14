//! Logical grouping of pages (design §3 "Context"): identical access model
//! to pages, may pin configuration inherited by child pages.

use crate::driver::PageOptions;
use crate::session::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub uuid::Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ContextInfo {
    pub id: ContextId,
    pub session_id: SessionId,
    pub default_page_options: PageOptions,
}
