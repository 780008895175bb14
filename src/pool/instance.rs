//! Per-instance state machine (design §3 "BrowserInstance", §4.C diagram).

use crate::session::SessionId;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserState {
    Starting,
    Idle,
    Active,
    Unhealthy,
    Recycling,
    Closed,
}

impl BrowserState {
    /// Enforces the diagram in design §4.C: `closed` is terminal, and the
    /// only path into `active` is from `idle`.
    pub fn can_transition_to(self, next: BrowserState) -> bool {
        use BrowserState::*;
        matches!(
            (self, next),
            (Starting, Idle)
                | (Starting, Recycling) // launch failed
                | (Idle, Active)
                | (Active, Idle)
                | (Idle, Unhealthy)
                | (Active, Unhealthy)
                | (Unhealthy, Recycling)
                | (Idle, Recycling)
                | (Recycling, Closed)
        )
    }
}

#[derive(Debug, Clone)]
pub struct BrowserInstance {
    pub id: String,
    pub state: BrowserState,
    pub acquired_by: Option<SessionId>,
    pub page_count: usize,
    pub use_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub error_count: u64,
    pub health_score: f64,
}

impl BrowserInstance {
    pub fn starting(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: BrowserState::Starting,
            acquired_by: None,
            page_count: 0,
            use_count: 0,
            created_at: now,
            last_used_at: now,
            error_count: 0,
            health_score: 1.0,
        }
    }

    /// Returns `Err` rather than panicking so a caller under a pool mutex
    /// can decide whether an invalid transition is a bug or a race to
    /// tolerate (invariant 2: never more than one acquirer while `active`).
    pub fn transition(&mut self, next: BrowserState) -> Result<(), crate::error::ErrorKind> {
        if !self.state.can_transition_to(next) {
            return Err(crate::error::ErrorKind::Internal(format!(
                "illegal browser state transition {:?} -> {next:?}",
                self.state
            )));
        }
        self.state = next;
        Ok(())
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }

    pub fn idle_time(&self) -> chrono::Duration {
        Utc::now() - self.last_used_at
    }
}
