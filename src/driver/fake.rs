//! In-memory `Driver` test double: deterministic, no real Chrome process,
//! used to unit-test the pool/executor without the cost (or flakiness) of
//! spawning `chromiumoxide`.

use super::{CookieSpec, Driver, DriverBrowserId, DriverPageId, HealthProbe, PageOptions};
use crate::error::ErrorKind;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct State {
    browsers: HashSet<DriverBrowserId>,
    pages: HashMap<DriverPageId, DriverBrowserId>,
    page_urls: HashMap<DriverPageId, String>,
    cookies: HashMap<DriverPageId, Vec<CookieSpec>>,
}

pub struct FakeDriver {
    state: Mutex<State>,
    next_id: AtomicUsize,
    pub fail_launches: AtomicBool,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            next_id: AtomicUsize::new(0),
            fail_launches: AtomicBool::new(false),
        }
    }

    fn next(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn launch(&self) -> Result<DriverBrowserId, ErrorKind> {
        if self.fail_launches.load(Ordering::Relaxed) {
            return Err(ErrorKind::BrowserLaunchFailed("fake launch failure".into()));
        }
        let id = self.next("browser");
        self.state.lock().browsers.insert(id.clone());
        Ok(id)
    }

    async fn close(&self, browser: &DriverBrowserId) -> Result<(), ErrorKind> {
        let mut state = self.state.lock();
        state.browsers.remove(browser);
        state.pages.retain(|_, b| b != browser);
        Ok(())
    }

    async fn is_connected(&self, browser: &DriverBrowserId) -> bool {
        self.state.lock().browsers.contains(browser)
    }

    async fn health_probe(
        &self,
        browser: &DriverBrowserId,
        _timeout: Duration,
    ) -> Result<HealthProbe, ErrorKind> {
        let state = self.state.lock();
        let connected = state.browsers.contains(browser);
        let page_count = state.pages.values().filter(|b| *b == browser).count();
        Ok(HealthProbe {
            connection_healthy: connected,
            responsive: connected,
            memory_healthy: true,
            page_count_healthy: true,
            memory_mb: 50.0,
            cpu_percent: 5.0,
            page_count,
            score: if connected { 1.0 } else { 0.0 },
        })
    }

    async fn new_page(
        &self,
        browser: &DriverBrowserId,
        _opts: &PageOptions,
    ) -> Result<DriverPageId, ErrorKind> {
        let mut state = self.state.lock();
        if !state.browsers.contains(browser) {
            return Err(ErrorKind::BrowserCrashed("instance not found".into()));
        }
        let page_id = self.next("page");
        state.pages.insert(page_id.clone(), browser.clone());
        state.page_urls.insert(page_id.clone(), "about:blank".into());
        Ok(page_id)
    }

    async fn close_page(&self, page: &DriverPageId) -> Result<(), ErrorKind> {
        let mut state = self.state.lock();
        state.pages.remove(page);
        state.page_urls.remove(page);
        state.cookies.remove(page);
        Ok(())
    }

    async fn configure_page(&self, _page: &DriverPageId, _opts: &PageOptions) -> Result<(), ErrorKind> {
        Ok(())
    }

    async fn navigate(&self, page: &DriverPageId, url: &str) -> Result<(), ErrorKind> {
        let mut state = self.state.lock();
        if !state.pages.contains_key(page) {
            return Err(ErrorKind::PageClosed);
        }
        state.page_urls.insert(page.clone(), url.to_string());
        Ok(())
    }

    async fn click(&self, page: &DriverPageId, _selector: &str) -> Result<(), ErrorKind> {
        self.assert_open(page)
    }
    async fn type_text(&self, page: &DriverPageId, _selector: &str, _text: &str) -> Result<(), ErrorKind> {
        self.assert_open(page)
    }
    async fn select(&self, page: &DriverPageId, _selector: &str, _value: &str) -> Result<(), ErrorKind> {
        self.assert_open(page)
    }
    async fn keyboard(&self, page: &DriverPageId, _key: &str) -> Result<(), ErrorKind> {
        self.assert_open(page)
    }
    async fn mouse(&self, page: &DriverPageId, _x: f64, _y: f64) -> Result<(), ErrorKind> {
        self.assert_open(page)
    }

    async fn screenshot(&self, page: &DriverPageId) -> Result<Vec<u8>, ErrorKind> {
        self.assert_open(page)?;
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn pdf(&self, page: &DriverPageId) -> Result<Vec<u8>, ErrorKind> {
        self.assert_open(page)?;
        Ok(b"%PDF-1.4".to_vec())
    }

    async fn content(&self, page: &DriverPageId) -> Result<String, ErrorKind> {
        self.assert_open(page)?;
        Ok("<html></html>".to_string())
    }

    async fn wait(&self, page: &DriverPageId, _selector: &str, _timeout: Duration) -> Result<(), ErrorKind> {
        self.assert_open(page)
    }

    async fn scroll(&self, page: &DriverPageId, _x: f64, _y: f64) -> Result<(), ErrorKind> {
        self.assert_open(page)
    }

    async fn evaluate(&self, page: &DriverPageId, script: &str) -> Result<Value, ErrorKind> {
        self.assert_open(page)?;
        if script.trim() == "1+1" {
            return Ok(serde_json::json!(2));
        }
        Ok(Value::Null)
    }

    async fn upload(&self, page: &DriverPageId, _selector: &str, _paths: &[String]) -> Result<(), ErrorKind> {
        self.assert_open(page)
    }

    async fn cookies_get(&self, page: &DriverPageId) -> Result<Vec<CookieSpec>, ErrorKind> {
        self.assert_open(page)?;
        Ok(self.state.lock().cookies.get(page).cloned().unwrap_or_default())
    }

    async fn cookies_set(&self, page: &DriverPageId, cookies: &[CookieSpec]) -> Result<(), ErrorKind> {
        self.assert_open(page)?;
        let mut state = self.state.lock();
        let existing = state.cookies.entry(page.clone()).or_default();
        existing.extend_from_slice(cookies);
        Ok(())
    }
}

impl FakeDriver {
    fn assert_open(&self, page: &DriverPageId) -> Result<(), ErrorKind> {
        if self.state.lock().pages.contains_key(page) {
            Ok(())
        } else {
            Err(ErrorKind::PageClosed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn navigate_then_evaluate_round_trips() {
        let driver = FakeDriver::new();
        let browser = driver.launch().await.unwrap();
        let page = driver.new_page(&browser, &PageOptions::default()).await.unwrap();
        driver.navigate(&page, "https://example.com").await.unwrap();
        assert_eq!(driver.evaluate(&page, "1+1").await.unwrap(), serde_json::json!(2));
    }

    #[tokio::test]
    async fn closed_page_rejects_further_actions() {
        let driver = FakeDriver::new();
        let browser = driver.launch().await.unwrap();
        let page = driver.new_page(&browser, &PageOptions::default()).await.unwrap();
        driver.close_page(&page).await.unwrap();
        assert!(matches!(
            driver.click(&page, "button").await,
            Err(ErrorKind::PageClosed)
        ));
    }

    #[tokio::test]
    async fn launch_failure_is_injectable_for_circuit_breaker_tests() {
        let driver = FakeDriver::new();
        driver.fail_launches.store(true, Ordering::Relaxed);
        assert!(matches!(
            driver.launch().await,
            Err(ErrorKind::BrowserLaunchFailed(_))
        ));
    }

    #[tokio::test]
    async fn set_then_get_cookies_is_a_superset() {
        let driver = FakeDriver::new();
        let browser = driver.launch().await.unwrap();
        let page = driver.new_page(&browser, &PageOptions::default()).await.unwrap();
        let cookie = CookieSpec {
            name: "a".into(),
            value: "b".into(),
            ..Default::default()
        };
        driver.cookies_set(&page, std::slice::from_ref(&cookie)).await.unwrap();
        let got = driver.cookies_get(&page).await.unwrap();
        assert!(got.iter().any(|c| c.name == "a" && c.value == "b"));
    }
}
