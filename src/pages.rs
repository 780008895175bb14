//! PageManager (component D).

pub mod context;
pub mod page;
pub mod sweep;

pub use context::{ContextId, ContextInfo};
pub use page::{PageId, PageInfo, PageState};

use crate::auth::Principal;
use crate::driver::{Driver, PageOptions};
use crate::error::ErrorKind;
use crate::pool::{BrowserPool, PooledBrowser};
use crate::session::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct PageManager {
    pool: BrowserPool,
    driver: Arc<dyn Driver>,
    pages: RwLock<HashMap<PageId, PageInfo>>,
    contexts: RwLock<HashMap<ContextId, ContextInfo>>,
    /// One pool checkout per session, shared by every page that session
    /// opens — released when the last page for that browser closes.
    checkouts: RwLock<HashMap<SessionId, Arc<PooledBrowser>>>,
}

impl PageManager {
    pub fn new(pool: BrowserPool, driver: Arc<dyn Driver>) -> Self {
        Self {
            pool,
            driver,
            pages: RwLock::new(HashMap::new()),
            contexts: RwLock::new(HashMap::new()),
            checkouts: RwLock::new(HashMap::new()),
        }
    }

    /// Exposes the underlying pool so adapters can subscribe to its
    /// broadcast events (design §4.I, WebSocket event stream).
    pub fn pool(&self) -> &BrowserPool {
        &self.pool
    }

    pub async fn create_context(&self, session_id: SessionId) -> ContextId {
        let id = ContextId::new();
        self.contexts.write().await.insert(
            id,
            ContextInfo {
                id,
                session_id,
                default_page_options: PageOptions::default(),
            },
        );
        id
    }

    async fn checkout_for(&self, session_id: SessionId) -> Result<Arc<PooledBrowser>, ErrorKind> {
        if let Some(existing) = self.checkouts.read().await.get(&session_id) {
            return Ok(existing.clone());
        }
        let mut guard = self.checkouts.write().await;
        if let Some(existing) = guard.get(&session_id) {
            return Ok(existing.clone());
        }
        let checkout = self
            .pool
            .acquire(session_id, std::time::Duration::from_secs(30))
            .await?;
        let checkout = Arc::new(checkout);
        guard.insert(session_id, checkout.clone());
        Ok(checkout)
    }

    /// `CreatePage(sessionId, contextId, opts) -> PageInfo`.
    pub async fn create_page(
        &self,
        session_id: SessionId,
        context_id: Option<ContextId>,
        mut opts: PageOptions,
    ) -> Result<PageInfo, ErrorKind> {
        clamp_viewport(&mut opts);
        drop_invalid_cookies(&mut opts);

        let checkout = self.checkout_for(session_id).await?;
        let browser_id = checkout.browser_id().to_string();
        let driver_page_id = self.driver.new_page(&browser_id, &opts).await?;
        self.pool.increment_page_count(&browser_id);

        let now = chrono::Utc::now();
        let page = PageInfo {
            id: PageId::new(),
            browser_id,
            driver_page_id,
            session_id,
            context_id,
            url: "about:blank".to_string(),
            title: String::new(),
            state: PageState::Active,
            created_at: now,
            last_activity_at: now,
            navigation_history: Vec::new(),
            error_count: 0,
            options: opts,
        };
        self.pages.write().await.insert(page.id, page.clone());
        Ok(page)
    }

    /// `GetPage(pageId, principal) -> Page`. Enforces ownership (invariant
    /// 5): `Forbidden` for any non-owning, non-admin principal.
    pub async fn get_page(&self, page_id: PageId, principal: &Principal) -> Result<PageInfo, ErrorKind> {
        let page = self
            .pages
            .read()
            .await
            .get(&page_id)
            .cloned()
            .ok_or_else(|| ErrorKind::NotFound(format!("page {page_id}")))?;
        if !principal.owns_session(page.session_id) {
            return Err(ErrorKind::Forbidden(format!("page:{page_id}")));
        }
        Ok(page)
    }

    pub async fn close_page(&self, page_id: PageId, principal: &Principal) -> Result<(), ErrorKind> {
        let page = self.get_page(page_id, principal).await?;
        self.driver.close_page(&page.driver_page_id).await?;
        self.pages.write().await.remove(&page_id);
        let remaining = self.pool.decrement_page_count(&page.browser_id);
        if remaining == 0 {
            self.checkouts.write().await.remove(&page.session_id);
        }
        Ok(())
    }

    pub async fn list_for_session(&self, session_id: SessionId) -> Vec<PageInfo> {
        self.pages
            .read()
            .await
            .values()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect()
    }

    pub async fn configure(&self, page_id: PageId, principal: &Principal, mut opts: PageOptions) -> Result<(), ErrorKind> {
        clamp_viewport(&mut opts);
        drop_invalid_cookies(&mut opts);
        let page = self.get_page(page_id, principal).await?;
        self.driver.configure_page(&page.driver_page_id, &opts).await?;
        if let Some(stored) = self.pages.write().await.get_mut(&page_id) {
            stored.options = opts;
            stored.touch();
        }
        Ok(())
    }

    /// Called on session end (design §3 "Page" lifecycle).
    pub async fn close_pages_for_session(&self, session_id: SessionId) -> Result<(), ErrorKind> {
        let ids: Vec<PageId> = self
            .pages
            .read()
            .await
            .values()
            .filter(|p| p.session_id == session_id)
            .map(|p| p.id)
            .collect();
        for id in ids {
            let _ = self.driver.close_page(
                &self
                    .pages
                    .read()
                    .await
                    .get(&id)
                    .map(|p| p.driver_page_id.clone())
                    .unwrap_or_default(),
            )
            .await;
            if let Some(page) = self.pages.write().await.remove(&id) {
                self.pool.decrement_page_count(&page.browser_id);
            }
        }
        self.checkouts.write().await.remove(&session_id);
        Ok(())
    }

    /// Isolates a page into a fresh context (design glossary, `IsolatePage`
    /// operation referenced in §4.D) — reassigns the page to a new context
    /// id without touching the underlying browser/driver state.
    pub async fn isolate_page(&self, page_id: PageId, principal: &Principal) -> Result<ContextId, ErrorKind> {
        let page = self.get_page(page_id, principal).await?;
        let new_context = self.create_context(page.session_id).await;
        if let Some(stored) = self.pages.write().await.get_mut(&page_id) {
            stored.context_id = Some(new_context);
        }
        Ok(new_context)
    }
}

fn clamp_viewport(opts: &mut PageOptions) {
    if let Some(viewport) = &mut opts.viewport {
        viewport.width = viewport.width.clamp(1, 10_000);
        viewport.height = viewport.height.clamp(1, 10_000);
    }
}

fn drop_invalid_cookies(opts: &mut PageOptions) {
    opts.cookies.retain(|c| {
        let keep = !c.name.is_empty() && !c.value.is_empty();
        if !keep {
            tracing::debug!(name = %c.name, "dropped cookie with empty name or value");
        }
        keep
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;
    use crate::driver::FakeDriver;
    use crate::pool::{BrowserPool, PoolConfig};

    fn manager() -> PageManager {
        let driver: Arc<dyn Driver> = Arc::new(FakeDriver::new());
        let pool = BrowserPool::new(driver.clone(), PoolConfig::default());
        PageManager::new(pool, driver)
    }

    fn principal(session_id: SessionId) -> Principal {
        Principal {
            user_id: "u1".into(),
            roles: vec!["user".into()],
            scopes: vec![],
            session_id: Some(session_id),
        }
    }

    #[tokio::test]
    async fn create_page_clamps_viewport() {
        let manager = manager();
        let session = SessionId::new();
        let mut opts = PageOptions::default();
        opts.viewport = Some(crate::driver::ViewportOptions {
            width: 999_999,
            height: 0,
            ..Default::default()
        });
        let page = manager.create_page(session, None, opts).await.unwrap();
        let viewport = page.options.viewport.unwrap();
        assert_eq!(viewport.width, 10_000);
        assert_eq!(viewport.height, 1);
    }

    #[tokio::test]
    async fn cross_session_access_is_forbidden() {
        let manager = manager();
        let owner = SessionId::new();
        let other = SessionId::new();
        let page = manager
            .create_page(owner, None, PageOptions::default())
            .await
            .unwrap();
        let err = manager.get_page(page.id, &principal(other)).await.unwrap_err();
        assert!(matches!(err, ErrorKind::Forbidden(_)));
    }

    #[tokio::test]
    async fn admin_may_access_any_session_page() {
        let manager = manager();
        let owner = SessionId::new();
        let page = manager
            .create_page(owner, None, PageOptions::default())
            .await
            .unwrap();
        let admin = Principal {
            user_id: "root".into(),
            roles: vec!["admin".into()],
            scopes: vec![],
            session_id: None,
        };
        assert!(manager.get_page(page.id, &admin).await.is_ok());
    }

    #[tokio::test]
    async fn closing_last_page_releases_the_browser_checkout() {
        let manager = manager();
        let session = SessionId::new();
        let page = manager
            .create_page(session, None, PageOptions::default())
            .await
            .unwrap();
        manager.close_page(page.id, &principal(session)).await.unwrap();
        assert!(manager.checkouts.read().await.get(&session).is_none());
    }
}
