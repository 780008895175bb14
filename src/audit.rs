//! AuditSink capability (component J): append structured security events.
//! Async, bounded-queue writer appending JSON lines, grounded in the
//! teacher's `tracing_subscriber` JSON layer plus the per-file daily-rotation
//! idiom the design calls for explicitly (`audit-YYYY-MM-DD.log`).

use crate::auth::TransportMetadata;
use crate::error::{sanitize_value, ErrorKind};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub kind: &'static str,
    pub timestamp: chrono::DateTime<Utc>,
    pub resource: Option<String>,
    pub user_id: Option<String>,
    pub remote_addr: Option<String>,
    pub details: Value,
}

impl AuditEvent {
    fn new(kind: &'static str, details: Value) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            resource: None,
            user_id: None,
            remote_addr: None,
            details,
        }
    }

    pub fn auth_attempt(meta: &TransportMetadata) -> Self {
        Self::new("AUTH_ATTEMPT", serde_json::json!({"protocol": meta.protocol}))
            .with_remote(meta)
    }

    pub fn auth_success(user_id: &str, meta: &TransportMetadata) -> Self {
        Self::new("AUTH_SUCCESS", Value::Null)
            .with_remote(meta)
            .with_user(user_id)
    }

    pub fn auth_failure(err: &ErrorKind, meta: &TransportMetadata) -> Self {
        Self::new("AUTH_FAILURE", serde_json::json!({"code": err.code()})).with_remote(meta)
    }

    pub fn access_denied(resource: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::new("ACCESS_DENIED", Value::Null)
            .with_resource(resource)
            .with_user(user_id)
    }

    pub fn validation_failure(resource: impl Into<String>, errors: Value) -> Self {
        Self::new("VALIDATION_FAILURE", errors).with_resource(resource)
    }

    pub fn command_executed(resource: impl Into<String>, phase: &str, duration_ms: u128) -> Self {
        Self::new(
            "COMMAND_EXECUTED",
            serde_json::json!({"phase": phase, "durationMs": duration_ms}),
        )
        .with_resource(resource)
    }

    pub fn suspicious_activity(resource: impl Into<String>, reason: &str) -> Self {
        Self::new("SUSPICIOUS_ACTIVITY", serde_json::json!({"reason": reason}))
            .with_resource(resource)
    }

    fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    fn with_remote(mut self, meta: &TransportMetadata) -> Self {
        self.remote_addr = meta.remote_addr.clone();
        self
    }

    /// Redacts sensitive keys from `details` before the event leaves the
    /// process (design §7 "Sanitization").
    fn sanitized(&self) -> Self {
        let mut clone = self.clone();
        if let Value::Object(map) = &clone.details {
            let sanitized: serde_json::Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), sanitize_value(k, v.clone())))
                .collect();
            clone.details = Value::Object(sanitized);
        }
        clone
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn emit(&self, event: AuditEvent);
    fn dropped_count(&self) -> u64 {
        0
    }
}

pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn emit(&self, _event: AuditEvent) {}
}

/// Bounded-queue file sink. Overflow drops the event and increments a
/// counter rather than applying backpressure to callers (design §5).
pub struct FileAuditSink {
    sender: mpsc::Sender<AuditEvent>,
    dropped: Arc<AtomicU64>,
}

impl FileAuditSink {
    pub fn spawn(dir: PathBuf, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<AuditEvent>(capacity);
        let dropped = Arc::new(AtomicU64::new(0));

        tokio::spawn(async move {
            if let Err(err) = tokio::fs::create_dir_all(&dir).await {
                tracing::error!(error = %err, "failed to create audit log directory");
                return;
            }
            while let Some(event) = receiver.recv().await {
                let path = dir.join(format!(
                    "audit-{}.log",
                    Utc::now().format("%Y-%m-%d")
                ));
                let line = match serde_json::to_string(&event.sanitized()) {
                    Ok(line) => line,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to serialize audit event");
                        continue;
                    }
                };
                match tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await
                {
                    Ok(mut file) => {
                        if let Err(err) = file.write_all(format!("{line}\n").as_bytes()).await {
                            tracing::warn!(error = %err, "failed to write audit event");
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "failed to open audit log file"),
                }
            }
        });

        Self { sender, dropped }
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn emit(&self, event: AuditEvent) {
        if self.sender.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_sensitive_detail_keys() {
        let event = AuditEvent::new(
            "TEST",
            serde_json::json!({"token": "secret-value", "url": "https://example.com"}),
        )
        .sanitized();
        assert_eq!(event.details["token"], serde_json::json!("[REDACTED]"));
        assert_eq!(
            event.details["url"],
            serde_json::json!("https://example.com")
        );
    }

    #[tokio::test]
    async fn file_sink_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileAuditSink::spawn(dir.path().to_path_buf(), 8);
        sink.emit(AuditEvent::access_denied("page:1", "u2")).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let path = dir.path().join(format!("audit-{}.log", Utc::now().format("%Y-%m-%d")));
        let contents = tokio::fs::read_to_string(path).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("ACCESS_DENIED"));
    }
}
