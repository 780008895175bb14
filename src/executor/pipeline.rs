//! Five-phase action pipeline (component G), grounded in the teacher's
//! `runtime/executor.rs` + `runtime/recovery.rs` retry-wrapped dispatch
//! shape.

use super::retry::{backoff_delay, retry_policy, should_retry};
use crate::actions::{Action, ActionDispatcher, ActionResult, ActionValidator};
use crate::audit::{AuditEvent, AuditSink};
use crate::auth::Principal;
use crate::driver::Driver;
use crate::error::ErrorKind;
use crate::pages::PageManager;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct PipelineContext {
    pub dispatcher: Arc<ActionDispatcher>,
    pub validator: Arc<ActionValidator>,
    pub pages: Arc<PageManager>,
    pub driver: Arc<dyn Driver>,
    pub audit: Arc<dyn AuditSink>,
}

/// Runs the five phases for a single `Action`. Never panics: every failure
/// path returns an `ActionResult` with `success: false` so the caller can
/// always record something into history.
pub async fn run_action(ctx: &PipelineContext, action: Action, principal: &Principal) -> ActionResult {
    let start = Instant::now();
    let kind = action.kind();

    // Phase 1: pre-check.
    if !ctx.dispatcher.is_action_supported(kind) {
        return ActionResult::failed(kind, ErrorKind::Unsupported(kind.to_string()).to_string(), start.elapsed());
    }

    // Phase 2: validate.
    let report = ctx.validator.validate(&action);
    if !report.valid {
        ctx.audit
            .emit(AuditEvent::validation_failure(
                action.page_id().to_string(),
                serde_json::json!({"actionType": kind.to_string(), "errors": report.errors}),
            ))
            .await;
        return ActionResult::failed(kind, report.errors.join("; "), start.elapsed());
    }

    // Phase 3: page setup.
    let page = match ctx.pages.get_page(action.page_id(), principal).await {
        Ok(page) => page,
        Err(err) => {
            if matches!(err, ErrorKind::Forbidden(_)) {
                ctx.audit
                    .emit(AuditEvent::access_denied(action.page_id().to_string(), principal.user_id.clone()))
                    .await;
            }
            return ActionResult::failed(kind, err.to_string(), start.elapsed());
        }
    };
    let deadline = action.timeout().unwrap_or(Duration::from_secs(30));

    ctx.audit
        .emit(AuditEvent::command_executed(action.page_id().to_string(), "start", 0))
        .await;

    // Phase 4: dispatch with retry.
    let policy = retry_policy(kind);
    let mut attempt = 0u32;
    let result = loop {
        let attempt_result = tokio::time::timeout(
            deadline,
            ctx.dispatcher.dispatch(&action, &page.driver_page_id, ctx.driver.as_ref()),
        )
        .await;

        let outcome = match attempt_result {
            Ok(inner) => inner,
            Err(_) => Err(ErrorKind::Timeout),
        };

        match outcome {
            Ok(result) if result.success => break Ok(result),
            Ok(result) => {
                let err = ErrorKind::Internal(result.error.clone().unwrap_or_default());
                if should_retry(kind, &err, attempt) {
                    tokio::time::sleep(backoff_delay(&policy, attempt)).await;
                    attempt += 1;
                    continue;
                }
                break Ok(result);
            }
            Err(err) => {
                if should_retry(kind, &err, attempt) {
                    tokio::time::sleep(backoff_delay(&policy, attempt)).await;
                    attempt += 1;
                    continue;
                }
                break Err(err);
            }
        }
    };

    // Phase 5: cleanup and audit.
    let final_result = match result {
        Ok(result) => result,
        Err(err) => ActionResult::failed(kind, err.to_string(), start.elapsed()),
    };

    ctx.audit
        .emit(AuditEvent::command_executed(
            action.page_id().to_string(),
            "complete",
            final_result.duration.as_millis(),
        ))
        .await;

    if !final_result.success {
        if let Some(error) = &final_result.error {
            if looks_suspicious(error) {
                ctx.audit
                    .emit(AuditEvent::suspicious_activity(action.page_id().to_string(), error))
                    .await;
            }
        }
    }

    final_result
}

fn looks_suspicious(error: &str) -> bool {
    let lowered = error.to_lowercase();
    lowered.contains("traversal") || lowered.contains("injection") || lowered.contains("disallowed")
}
