//! End-to-end scenarios wiring `FakeDriver` + `MemorySessionStore` through
//! the full pipeline, following the teacher's `runtime/testing.rs` style: a
//! hand-built fake stack exercised directly rather than through a mocking
//! framework.

use crate::actions::{Action, ActionDispatcher, ActionKind, ActionValidator, ValidatorConfig};
use crate::audit::{AuditEvent, AuditSink};
use crate::auth::Principal;
use crate::driver::{Driver, FakeDriver, PageOptions};
use crate::error::ErrorKind;
use crate::executor::{pipeline::run_action, ActionExecutor, PipelineContext};
use crate::pages::PageManager;
use crate::pool::{BrowserPool, PoolConfig};
use crate::session::{memory::MemorySessionStore, NewSession, SessionId, SessionStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn emit(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

struct Harness {
    sessions: Arc<MemorySessionStore>,
    pages: Arc<PageManager>,
    executor: Arc<ActionExecutor>,
    audit: Arc<RecordingAuditSink>,
    driver: Arc<dyn Driver>,
}

fn principal_for(session_id: SessionId, admin: bool) -> Principal {
    Principal {
        user_id: session_id.to_string(),
        roles: if admin { vec!["admin".into()] } else { vec![] },
        scopes: vec![],
        session_id: Some(session_id),
    }
}

impl Harness {
    fn build(pool_config: PoolConfig) -> Self {
        let driver: Arc<dyn Driver> = Arc::new(FakeDriver::new());
        let pool = BrowserPool::new(driver.clone(), pool_config);
        let pages = Arc::new(PageManager::new(pool, driver.clone()));
        let audit = Arc::new(RecordingAuditSink::default());
        let ctx = PipelineContext {
            dispatcher: Arc::new(ActionDispatcher::default()),
            validator: Arc::new(ActionValidator::new(ValidatorConfig::default())),
            pages: pages.clone(),
            driver: driver.clone(),
            audit: audit.clone() as Arc<dyn AuditSink>,
        };
        Self {
            sessions: Arc::new(MemorySessionStore::new()),
            pages,
            executor: Arc::new(ActionExecutor::new(ctx)),
            audit,
            driver,
        }
    }

    async fn new_session(&self, user_id: &str) -> SessionId {
        self.sessions
            .create(NewSession {
                user_id: user_id.to_string(),
                username: user_id.to_string(),
                roles: vec![],
                metadata: serde_json::Value::Null,
                ttl: Duration::from_secs(3600),
            })
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn happy_path_navigate() {
    let harness = Harness::build(PoolConfig::default());
    let session_id = harness.new_session("demo").await;
    let principal = principal_for(session_id, false);

    let context_id = harness.pages.create_context(session_id).await;
    let page = harness
        .pages
        .create_page(session_id, Some(context_id), PageOptions::default())
        .await
        .unwrap();

    let result = harness
        .executor
        .execute(
            Action::Navigate { page_id: page.id, url: "https://example.com".into(), timeout: None },
            &principal,
        )
        .await;

    assert!(result.success);
    assert_eq!(result.action_type, ActionKind::Navigate);
    assert_eq!(result.data.unwrap()["url"], "https://example.com");

    harness.pages.close_pages_for_session(session_id).await.unwrap();
    assert!(harness.sessions.delete(session_id).await.unwrap());
    assert!(harness.pages.list_for_session(session_id).await.is_empty());
}

#[tokio::test]
async fn forbidden_cross_session_access_emits_access_denied() {
    let harness = Harness::build(PoolConfig::default());
    let s1 = harness.new_session("alice").await;
    let s2 = harness.new_session("bob").await;
    let p1 = principal_for(s1, false);
    let p2 = principal_for(s2, false);

    let page = harness.pages.create_page(s1, None, PageOptions::default()).await.unwrap();

    let result = harness
        .executor
        .execute(
            Action::Evaluate { page_id: page.id, script: "document.title".into(), timeout: None },
            &p2,
        )
        .await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.contains("forbidden") || error.contains("Forbidden"), "unexpected error: {error}");

    let events = harness.audit.events.lock();
    assert!(events
        .iter()
        .any(|e| e.kind == "ACCESS_DENIED" && e.user_id.as_deref() == Some(p2.user_id.as_str())));
    let _ = p1;
}

#[tokio::test]
async fn pool_saturation_queues_then_times_out() {
    let harness = Harness::build(PoolConfig { min_size: 0, max_size: 2, ..PoolConfig::default() });
    let s1 = harness.new_session("one").await;
    let s2 = harness.new_session("two").await;
    let s3 = harness.new_session("three").await;

    let b1 = harness.pages.pool().acquire(s1, Duration::from_secs(5)).await.unwrap();
    let b2 = harness.pages.pool().acquire(s2, Duration::from_secs(5)).await.unwrap();

    let third = harness.pages.pool().acquire(s3, Duration::from_millis(200)).await;
    assert!(matches!(third, Err(ErrorKind::Timeout)));

    drop(b1);
    drop(b2);
}

#[tokio::test]
async fn circuit_breaker_opens_after_repeated_launch_failures() {
    let driver = Arc::new(FakeDriver::new());
    driver.fail_launches.store(true, std::sync::atomic::Ordering::Relaxed);
    let pool = BrowserPool::new(
        driver.clone() as Arc<dyn Driver>,
        PoolConfig { min_size: 0, max_size: 2, ..PoolConfig::default() },
    );
    let session_id = SessionId::new();

    for _ in 0..5 {
        let _ = pool.acquire(session_id, Duration::from_millis(50)).await;
    }

    let start = std::time::Instant::now();
    let result = pool.acquire(session_id, Duration::from_secs(1)).await;
    assert!(matches!(result, Err(ErrorKind::Unavailable(_))));
    assert!(start.elapsed() < Duration::from_millis(50), "circuit should fail fast without invoking the driver");
}

#[tokio::test]
async fn validation_rejection_blocks_dispatch_before_driver_call() {
    let harness = Harness::build(PoolConfig::default());
    let session_id = harness.new_session("demo").await;
    let principal = principal_for(session_id, false);
    let page = harness.pages.create_page(session_id, None, PageOptions::default()).await.unwrap();

    let result = harness
        .executor
        .execute(Action::Type { page_id: page.id, selector: String::new(), text: "hi".into(), timeout: None }, &principal)
        .await;

    assert!(!result.success);
    let events = harness.audit.events.lock();
    assert!(events.iter().any(|e| e.kind == "VALIDATION_FAILURE"));
}

#[tokio::test]
async fn upload_path_traversal_is_blocked() {
    let harness = Harness::build(PoolConfig::default());
    let session_id = harness.new_session("demo").await;
    let principal = principal_for(session_id, false);
    let page = harness.pages.create_page(session_id, None, PageOptions::default()).await.unwrap();

    let result = harness
        .executor
        .execute(
            Action::Upload {
                page_id: page.id,
                selector: "#file".into(),
                file_paths: vec!["../../etc/passwd".into()],
                timeout: None,
            },
            &principal,
        )
        .await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("outside allowed directory"));
}

#[tokio::test]
async fn a_browser_never_has_two_concurrent_acquirers() {
    let harness = Harness::build(PoolConfig { min_size: 0, max_size: 1, ..PoolConfig::default() });
    let s1 = harness.new_session("one").await;
    let s2 = harness.new_session("two").await;

    let checkout = harness.pages.pool().acquire(s1, Duration::from_secs(5)).await.unwrap();
    let blocked = harness.pages.pool().acquire(s2, Duration::from_millis(150)).await;
    assert!(matches!(blocked, Err(ErrorKind::Timeout)));
    drop(checkout);
}

#[tokio::test]
async fn double_release_is_a_noop() {
    let harness = Harness::build(PoolConfig::default());
    let session_id = harness.new_session("demo").await;
    let checkout = harness.pages.pool().acquire(session_id, Duration::from_secs(5)).await.unwrap();
    let browser_id = checkout.browser_id().to_string();
    harness.pages.pool().release(&browser_id, session_id);
    harness.pages.pool().release(&browser_id, session_id);
}

#[tokio::test]
async fn pipeline_run_action_reaches_dispatch_directly() {
    let harness = Harness::build(PoolConfig::default());
    let session_id = harness.new_session("demo").await;
    let principal = principal_for(session_id, false);
    let page = harness.pages.create_page(session_id, None, PageOptions::default()).await.unwrap();
    let ctx = PipelineContext {
        dispatcher: Arc::new(ActionDispatcher::default()),
        validator: Arc::new(ActionValidator::new(ValidatorConfig::default())),
        pages: harness.pages.clone(),
        driver: harness.driver.clone(),
        audit: harness.audit.clone() as Arc<dyn AuditSink>,
    };
    let result = run_action(&ctx, Action::Content { page_id: page.id, timeout: None }, &principal).await;
    assert!(result.success);
}
