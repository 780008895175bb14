use crate::driver::PageOptions;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PageId(pub uuid::Uuid);

impl PageId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    Loading,
    Active,
    Closed,
}

#[derive(Debug, Clone)]
pub struct PageInfo {
    pub id: PageId,
    pub browser_id: String,
    pub driver_page_id: String,
    pub session_id: SessionId,
    pub context_id: Option<super::context::ContextId>,
    pub url: String,
    pub title: String,
    pub state: PageState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// Capped at 50 entries (design §3 "Page").
    pub navigation_history: Vec<String>,
    pub error_count: u64,
    pub options: PageOptions,
}

const MAX_HISTORY: usize = 50;

impl PageInfo {
    pub fn record_navigation(&mut self, url: String) {
        self.navigation_history.push(url.clone());
        if self.navigation_history.len() > MAX_HISTORY {
            self.navigation_history.remove(0);
        }
        self.url = url;
        self.last_activity_at = Utc::now();
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    pub fn idle_time(&self) -> chrono::Duration {
        Utc::now() - self.last_activity_at
    }
}
