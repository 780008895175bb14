//! Canonical error taxonomy shared by every protocol adapter.
//!
//! One `ErrorKind` per kind named in the error-handling design, with enough
//! metadata attached that each adapter (REST, gRPC, WS, tool protocol) can
//! render it without re-deriving severity/retryability/user messaging.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stable, serializable backoff hint attached to retryable errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryConfig {
    pub const fn transient() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }

    pub const fn single_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(50),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_millis(50),
            jitter: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Input,
    Auth,
    Resource,
    Capacity,
    Driver,
    System,
}

/// All error kinds named in the design, `thiserror`-derived so every
/// producer (`?`) site gets a real `std::error::Error` impl.
#[derive(Debug, thiserror::Error, Clone)]
pub enum ErrorKind {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unsupported action: {0}")]
    Unsupported(String),
    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("unauthenticated")]
    Unauthenticated,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("token expired")]
    TokenExpired,
    #[error("session expired")]
    SessionExpired,

    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("locked: {0}")]
    Locked(String),
    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("rate limited")]
    RateLimited,
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("timeout")]
    Timeout,
    #[error("canceled")]
    Canceled,

    #[error("browser launch failed: {0}")]
    BrowserLaunchFailed(String),
    #[error("browser crashed: {0}")]
    BrowserCrashed(String),
    #[error("page closed")]
    PageClosed,
    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::Unsupported(_) => "UNSUPPORTED",
            Self::BadArgument(_) => "BAD_ARGUMENT",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Locked(_) => "LOCKED",
            Self::Duplicate(_) => "DUPLICATE",
            Self::RateLimited => "RATE_LIMITED",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::Canceled => "CANCELED",
            Self::BrowserLaunchFailed(_) => "BROWSER_LAUNCH_FAILED",
            Self::BrowserCrashed(_) => "BROWSER_CRASHED",
            Self::PageClosed => "PAGE_CLOSED",
            Self::NavigationFailed(_) => "NAVIGATION_FAILED",
            Self::Internal(_) => "INTERNAL",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Serialization(_) => "SERIALIZATION",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Self::Validation(_) | Self::Unsupported(_) | Self::BadArgument(_) => Category::Input,
            Self::Unauthenticated
            | Self::Forbidden(_)
            | Self::TokenExpired
            | Self::SessionExpired => Category::Auth,
            Self::NotFound(_) | Self::Conflict(_) | Self::Locked(_) | Self::Duplicate(_) => {
                Category::Resource
            }
            Self::RateLimited | Self::Unavailable(_) | Self::Timeout | Self::Canceled => {
                Category::Capacity
            }
            Self::BrowserLaunchFailed(_)
            | Self::BrowserCrashed(_)
            | Self::PageClosed
            | Self::NavigationFailed(_) => Category::Driver,
            Self::Internal(_) | Self::StoreUnavailable(_) | Self::Serialization(_) => {
                Category::System
            }
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Validation(_) | Self::BadArgument(_) | Self::NotFound(_) => Severity::Info,
            Self::Unsupported(_)
            | Self::Conflict(_)
            | Self::Locked(_)
            | Self::Duplicate(_)
            | Self::RateLimited
            | Self::Timeout
            | Self::Canceled
            | Self::PageClosed => Severity::Warning,
            Self::Unauthenticated
            | Self::Forbidden(_)
            | Self::TokenExpired
            | Self::SessionExpired
            | Self::Unavailable(_)
            | Self::NavigationFailed(_) => Severity::Error,
            Self::BrowserLaunchFailed(_)
            | Self::BrowserCrashed(_)
            | Self::Internal(_)
            | Self::StoreUnavailable(_)
            | Self::Serialization(_) => Severity::Critical,
        }
    }

    /// Mirrors `LlmErrorKind::is_retryable` (teacher's `llm/error.rs`),
    /// generalized to the full taxonomy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::Unavailable(_)
                | Self::BrowserCrashed(_)
                | Self::StoreUnavailable(_)
        )
    }

    pub fn retry_config(&self) -> Option<RetryConfig> {
        if !self.is_retryable() {
            return None;
        }
        Some(RetryConfig::transient())
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Unsupported(_) | Self::BadArgument(_) => 400,
            Self::Unauthenticated | Self::TokenExpired | Self::SessionExpired => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) | Self::Duplicate(_) => 409,
            Self::Locked(_) => 423,
            Self::RateLimited => 429,
            Self::Timeout => 504,
            Self::Canceled => 499,
            Self::Unavailable(_) => 503,
            Self::BrowserLaunchFailed(_)
            | Self::BrowserCrashed(_)
            | Self::PageClosed
            | Self::NavigationFailed(_)
            | Self::Internal(_)
            | Self::StoreUnavailable(_)
            | Self::Serialization(_) => 500,
        }
    }

    /// HTTP status -> gRPC status code, per the external-interfaces table.
    pub fn grpc_code(&self) -> i32 {
        match self.http_status() {
            400 => 3,  // INVALID_ARGUMENT
            401 => 16, // UNAUTHENTICATED
            403 => 7,  // PERMISSION_DENIED
            404 => 5,  // NOT_FOUND
            409 => 6,  // ALREADY_EXISTS
            429 => 8,  // RESOURCE_EXHAUSTED
            503 => 14, // UNAVAILABLE
            504 => 4,  // DEADLINE_EXCEEDED
            _ => 13,   // INTERNAL
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Internal(_) | Self::StoreUnavailable(_) | Self::Serialization(_) => {
                "An internal error occurred. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::TokenExpired | Self::SessionExpired => vec!["refresh the session"],
            Self::RateLimited => vec!["retry after the backoff window"],
            Self::Unavailable(_) => vec!["retry later", "check pool capacity"],
            Self::Timeout => vec!["retry with a longer deadline"],
            Self::BrowserLaunchFailed(_) | Self::BrowserCrashed(_) => {
                vec!["retry the action", "check browser pool health"]
            }
            _ => vec![],
        }
    }
}

/// Wire-serializable error envelope, shared by REST/WS/MCP (gRPC uses
/// `tonic::Status` with the same fields folded into metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub user_message: String,
    pub category: Category,
    pub severity: Severity,
    pub recovery_suggestions: Vec<String>,
    pub retry_config: Option<RetryConfig>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub request_id: String,
}

/// Redact values whose key matches the sanitization rule before an error's
/// `technicalDetails` (or any freeform map) is serialized.
pub fn sanitize_value(key: &str, value: serde_json::Value) -> serde_json::Value {
    static REDACT_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = REDACT_RE.get_or_init(|| {
        regex::Regex::new(
            r"(?i)password|secret|token|authorization|cookie|key|credential|jwt|bearer|signature|hash|salt",
        )
        .expect("static redaction pattern is valid")
    });
    if re.is_match(key) {
        serde_json::Value::String("[REDACTED]".to_string())
    } else {
        value
    }
}

impl ErrorEnvelope {
    pub fn from_kind(kind: &ErrorKind, request_id: impl Into<String>) -> Self {
        Self {
            code: kind.code().to_string(),
            message: kind.to_string(),
            user_message: kind.user_message(),
            category: kind.category(),
            severity: kind.severity(),
            recovery_suggestions: kind
                .recovery_suggestions()
                .into_iter()
                .map(str::to_string)
                .collect(),
            retry_config: kind.retry_config(),
            timestamp: chrono::Utc::now(),
            request_id: request_id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ErrorKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_carry_a_retry_config() {
        assert!(ErrorKind::Timeout.retry_config().is_some());
        assert!(ErrorKind::Validation("x".into()).retry_config().is_none());
    }

    #[test]
    fn http_to_grpc_table_matches_the_design() {
        assert_eq!(ErrorKind::Validation("x".into()).grpc_code(), 3);
        assert_eq!(ErrorKind::Unauthenticated.grpc_code(), 16);
        assert_eq!(ErrorKind::Forbidden("x".into()).grpc_code(), 7);
        assert_eq!(ErrorKind::NotFound("x".into()).grpc_code(), 5);
        assert_eq!(ErrorKind::Duplicate("x".into()).grpc_code(), 6);
        assert_eq!(ErrorKind::RateLimited.grpc_code(), 8);
        assert_eq!(ErrorKind::Internal("x".into()).grpc_code(), 13);
        assert_eq!(ErrorKind::Unavailable("x".into()).grpc_code(), 14);
        assert_eq!(ErrorKind::Timeout.grpc_code(), 4);
    }

    #[test]
    fn sanitize_redacts_sensitive_keys_case_insensitively() {
        let v = serde_json::json!("sekrit");
        assert_eq!(
            sanitize_value("Authorization", v.clone()),
            serde_json::json!("[REDACTED]")
        );
        assert_eq!(sanitize_value("url", v), serde_json::json!("sekrit"));
    }

    #[test]
    fn round_trip_preserves_code_category_severity_retryable() {
        let kind = ErrorKind::Timeout;
        let env = ErrorEnvelope::from_kind(&kind, "req-1");
        let json = serde_json::to_string(&env).unwrap();
        let back: ErrorEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, env.code);
        assert_eq!(back.category, env.category);
        assert_eq!(back.severity, env.severity);
        assert_eq!(back.retry_config.is_some(), env.retry_config.is_some());
    }
}
