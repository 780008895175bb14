//! `Action`/`ActionResult` (component F/G data types).

use crate::driver::CookieSpec;
use crate::pages::PageId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Select,
    Keyboard,
    Mouse,
    Screenshot,
    Pdf,
    Content,
    Wait,
    Scroll,
    Evaluate,
    Upload,
    Cookie,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self).unwrap_or_default();
        write!(f, "{}", s.as_str().unwrap_or("unknown"))
    }
}

/// Discriminated action payload. Every variant carries `page_id` and an
/// optional `timeout` (invariant: the validator runs before the dispatcher —
/// the dispatcher only ever sees a payload that already passed validation).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "actionType", rename_all = "snake_case")]
pub enum Action {
    Navigate {
        page_id: PageId,
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },
    Click {
        page_id: PageId,
        selector: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },
    Type {
        page_id: PageId,
        selector: String,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },
    Select {
        page_id: PageId,
        selector: String,
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },
    Keyboard {
        page_id: PageId,
        key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },
    Mouse {
        page_id: PageId,
        x: f64,
        y: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },
    Screenshot {
        page_id: PageId,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },
    Pdf {
        page_id: PageId,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },
    Content {
        page_id: PageId,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },
    Wait {
        page_id: PageId,
        selector: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },
    Scroll {
        page_id: PageId,
        x: f64,
        y: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },
    Evaluate {
        page_id: PageId,
        script: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },
    Upload {
        page_id: PageId,
        selector: String,
        file_paths: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },
    Cookie {
        page_id: PageId,
        #[serde(default)]
        set: Vec<CookieSpec>,
        #[serde(default)]
        get: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Navigate { .. } => ActionKind::Navigate,
            Action::Click { .. } => ActionKind::Click,
            Action::Type { .. } => ActionKind::Type,
            Action::Select { .. } => ActionKind::Select,
            Action::Keyboard { .. } => ActionKind::Keyboard,
            Action::Mouse { .. } => ActionKind::Mouse,
            Action::Screenshot { .. } => ActionKind::Screenshot,
            Action::Pdf { .. } => ActionKind::Pdf,
            Action::Content { .. } => ActionKind::Content,
            Action::Wait { .. } => ActionKind::Wait,
            Action::Scroll { .. } => ActionKind::Scroll,
            Action::Evaluate { .. } => ActionKind::Evaluate,
            Action::Upload { .. } => ActionKind::Upload,
            Action::Cookie { .. } => ActionKind::Cookie,
        }
    }

    pub fn page_id(&self) -> PageId {
        match self {
            Action::Navigate { page_id, .. }
            | Action::Click { page_id, .. }
            | Action::Type { page_id, .. }
            | Action::Select { page_id, .. }
            | Action::Keyboard { page_id, .. }
            | Action::Mouse { page_id, .. }
            | Action::Screenshot { page_id, .. }
            | Action::Pdf { page_id, .. }
            | Action::Content { page_id, .. }
            | Action::Wait { page_id, .. }
            | Action::Scroll { page_id, .. }
            | Action::Evaluate { page_id, .. }
            | Action::Upload { page_id, .. }
            | Action::Cookie { page_id, .. } => *page_id,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Action::Navigate { timeout, .. }
            | Action::Click { timeout, .. }
            | Action::Type { timeout, .. }
            | Action::Select { timeout, .. }
            | Action::Keyboard { timeout, .. }
            | Action::Mouse { timeout, .. }
            | Action::Screenshot { timeout, .. }
            | Action::Pdf { timeout, .. }
            | Action::Content { timeout, .. }
            | Action::Wait { timeout, .. }
            | Action::Scroll { timeout, .. }
            | Action::Evaluate { timeout, .. }
            | Action::Upload { timeout, .. }
            | Action::Cookie { timeout, .. } => *timeout,
        }
    }
}

/// `{success, actionType, data?, error?, duration, timestamp, metadata}`.
/// Monotonic invariant: `success == false` implies `data` is `None`.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub action_type: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub metadata: HashMap<String, Value>,
}

impl ActionResult {
    pub fn ok(kind: ActionKind, data: Option<Value>, duration: Duration, metadata: HashMap<String, Value>) -> Self {
        Self {
            success: true,
            action_type: kind,
            data,
            error: None,
            duration,
            timestamp: chrono::Utc::now(),
            metadata,
        }
    }

    pub fn failed(kind: ActionKind, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            action_type: kind,
            data: None,
            error: Some(error.into()),
            duration,
            timestamp: chrono::Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}
