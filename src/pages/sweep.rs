//! Idle-page sweep: closes pages past `maxIdleTimeMs` (design §4.D), mirroring
//! the session-cleanup task shape in `crate::session::spawn_cleanup_task`.

use super::{PageId, PageManager};
use crate::auth::Principal;
use std::sync::Arc;
use std::time::Duration;

pub fn spawn_idle_sweep(
    manager: Arc<PageManager>,
    max_idle: chrono::Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tick.tick().await;
            let expired: Vec<(PageId, crate::session::SessionId)> = manager
                .pages
                .read()
                .await
                .values()
                .filter(|p| p.idle_time() > max_idle)
                .map(|p| (p.id, p.session_id))
                .collect();
            for (page_id, session_id) in expired {
                let admin = Principal {
                    user_id: "system:idle-sweep".to_string(),
                    roles: vec!["admin".to_string()],
                    scopes: vec![],
                    session_id: None,
                };
                if let Err(err) = manager.close_page(page_id, &admin).await {
                    tracing::warn!(%page_id, %session_id, %err, "idle sweep failed to close page");
                } else {
                    tracing::debug!(%page_id, %session_id, "idle sweep closed page");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Driver, FakeDriver, PageOptions};
    use crate::pool::{BrowserPool, PoolConfig};
    use crate::session::SessionId;

    #[tokio::test]
    async fn sweep_closes_pages_past_max_idle() {
        let driver: Arc<dyn Driver> = Arc::new(FakeDriver::new());
        let pool = BrowserPool::new(driver.clone(), PoolConfig::default());
        let manager = Arc::new(PageManager::new(pool, driver));
        let session = SessionId::new();
        let page = manager
            .create_page(session, None, PageOptions::default())
            .await
            .unwrap();

        let _handle = spawn_idle_sweep(
            manager.clone(),
            chrono::Duration::milliseconds(10),
            Duration::from_millis(15),
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(manager.pages.read().await.get(&page.id).is_none());
    }
}
