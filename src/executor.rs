//! ActionExecutor (component G): the five-phase pipeline plus batch
//! execution and the per-session bounded history ring.

pub mod pipeline;
pub mod retry;

pub use pipeline::PipelineContext;

use crate::actions::{Action, ActionResult};
use crate::auth::Principal;
use crate::session::SessionId;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

const HISTORY_CAPACITY: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub stop_on_error: bool,
    pub parallel: bool,
    pub max_concurrency: usize,
}

pub struct ActionExecutor {
    ctx: PipelineContext,
    history: Mutex<HashMap<SessionId, VecDeque<ActionResult>>>,
}

impl ActionExecutor {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            history: Mutex::new(HashMap::new()),
        }
    }

    pub async fn execute(&self, action: Action, principal: &Principal) -> ActionResult {
        let result = pipeline::run_action(&self.ctx, action.clone(), principal).await;
        if let Some(session_id) = principal.session_id {
            self.record_history(session_id, result.clone()).await;
        }
        result
    }

    /// `{stopOnError, parallel, maxConcurrency}`. Parallel mode fans out
    /// under a `Semaphore`; result ordering always matches the input order.
    pub async fn execute_batch(
        &self,
        actions: Vec<Action>,
        principal: &Principal,
        options: BatchOptions,
    ) -> Vec<ActionResult> {
        if !options.parallel {
            let mut results = Vec::with_capacity(actions.len());
            for action in actions {
                let result = self.execute(action, principal).await;
                let failed = !result.success;
                results.push(result);
                if failed && options.stop_on_error {
                    break;
                }
            }
            return results;
        }

        let max_concurrency = options.max_concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let mut handles = Vec::with_capacity(actions.len());
        for action in actions {
            let semaphore = semaphore.clone();
            let principal = principal.clone();
            let ctx = self.ctx.clone_handles();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                pipeline::run_action(&ctx, action, &principal).await
            }));
        }
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.unwrap_or_else(|_| {
                ActionResult::failed(
                    crate::actions::ActionKind::Navigate,
                    "action task panicked",
                    std::time::Duration::default(),
                )
            }));
        }
        if let Some(session_id) = principal.session_id {
            let mut history = self.history.lock().await;
            let ring = history.entry(session_id).or_default();
            for result in &results {
                push_bounded(ring, result.clone());
            }
        }
        results
    }

    async fn record_history(&self, session_id: SessionId, result: ActionResult) {
        let mut history = self.history.lock().await;
        push_bounded(history.entry(session_id).or_default(), result);
    }

    pub async fn history_for(&self, session_id: SessionId) -> Vec<ActionResult> {
        self.history
            .lock()
            .await
            .get(&session_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn push_bounded(ring: &mut VecDeque<ActionResult>, result: ActionResult) {
    ring.push_back(result);
    if ring.len() > HISTORY_CAPACITY {
        ring.pop_front();
    }
}

impl PipelineContext {
    fn clone_handles(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            validator: self.validator.clone(),
            pages: self.pages.clone(),
            driver: self.driver.clone(),
            audit: self.audit.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionDispatcher, ActionValidator, ValidatorConfig};
    use crate::audit::NullAuditSink;
    use crate::driver::{Driver, FakeDriver, PageOptions};
    use crate::pages::PageManager;
    use crate::pool::{BrowserPool, PoolConfig};

    async fn executor() -> (ActionExecutor, Principal) {
        let driver: Arc<dyn Driver> = Arc::new(FakeDriver::new());
        let pool = BrowserPool::new(driver.clone(), PoolConfig::default());
        let pages = Arc::new(PageManager::new(pool, driver.clone()));
        let session_id = SessionId::new();
        let principal = Principal {
            user_id: "u1".into(),
            roles: vec!["user".into()],
            scopes: vec![],
            session_id: Some(session_id),
        };
        pages.create_page(session_id, None, PageOptions::default()).await.unwrap();
        let ctx = PipelineContext {
            dispatcher: Arc::new(ActionDispatcher::default()),
            validator: Arc::new(ActionValidator::new(ValidatorConfig::default())),
            pages,
            driver,
            audit: Arc::new(NullAuditSink),
        };
        (ActionExecutor::new(ctx), principal)
    }

    #[tokio::test]
    async fn history_accumulates_and_is_bounded() {
        let (executor, principal) = executor().await;
        let page = executor
            .ctx
            .pages
            .list_for_session(principal.session_id.unwrap())
            .await
            .remove(0);
        for _ in 0..3 {
            executor
                .execute(
                    Action::Navigate {
                        page_id: page.id,
                        url: "https://example.com".into(),
                        timeout: None,
                    },
                    &principal,
                )
                .await;
        }
        let history = executor.history_for(principal.session_id.unwrap()).await;
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn batch_stop_on_error_halts_after_first_failure() {
        let (executor, principal) = executor().await;
        let page = executor
            .ctx
            .pages
            .list_for_session(principal.session_id.unwrap())
            .await
            .remove(0);
        let actions = vec![
            Action::Navigate { page_id: page.id, url: "not a url".into(), timeout: None },
            Action::Navigate { page_id: page.id, url: "https://example.com".into(), timeout: None },
        ];
        let results = executor
            .execute_batch(actions, &principal, BatchOptions { stop_on_error: true, ..Default::default() })
            .await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
    }
}
