//! BrowserDriver capability (component B) — out of scope per the spec
//! ("the actual browser driver, treated as a `Driver` capability"). Only the
//! contract lives here; `chromium.rs` is the one real implementation,
//! grounded directly in the teacher's `tools/browser/session.rs`.

pub mod chromium;
pub mod fake;

use crate::error::ErrorKind;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub use chromium::ChromiumoxideDriver;
pub use fake::FakeDriver;

#[derive(Debug, Clone, Default)]
pub struct ViewportOptions {
    pub width: u32,
    pub height: u32,
    pub scale: f64,
    pub mobile: bool,
    pub touch: bool,
    pub landscape: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<i64>,
    pub same_site: Option<String>,
    pub secure: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    pub viewport: Option<ViewportOptions>,
    pub user_agent: Option<String>,
    pub extra_headers: Vec<(String, String)>,
    pub js_enabled: bool,
    pub offline: bool,
    pub cache_enabled: bool,
    pub cookies: Vec<CookieSpec>,
}

#[derive(Debug, Clone, Default)]
pub struct HealthProbe {
    pub connection_healthy: bool,
    pub responsive: bool,
    pub memory_healthy: bool,
    pub page_count_healthy: bool,
    pub memory_mb: f64,
    pub cpu_percent: f64,
    pub page_count: usize,
    pub score: f64,
}

/// An opaque handle a `Driver` hands back for a launched browser process.
pub type DriverBrowserId = String;
/// An opaque handle a `Driver` hands back for an opened page.
pub type DriverPageId = String;

/// Injected capability: "launch/close a browser process; open/close pages;
/// per-page primitives" (design §2, component B).
#[async_trait]
pub trait Driver: Send + Sync {
    async fn launch(&self) -> Result<DriverBrowserId, ErrorKind>;
    async fn close(&self, browser: &DriverBrowserId) -> Result<(), ErrorKind>;
    async fn is_connected(&self, browser: &DriverBrowserId) -> bool;
    async fn health_probe(
        &self,
        browser: &DriverBrowserId,
        timeout: Duration,
    ) -> Result<HealthProbe, ErrorKind>;

    async fn new_page(
        &self,
        browser: &DriverBrowserId,
        opts: &PageOptions,
    ) -> Result<DriverPageId, ErrorKind>;
    async fn close_page(&self, page: &DriverPageId) -> Result<(), ErrorKind>;
    async fn configure_page(&self, page: &DriverPageId, opts: &PageOptions) -> Result<(), ErrorKind>;

    async fn navigate(&self, page: &DriverPageId, url: &str) -> Result<(), ErrorKind>;
    async fn click(&self, page: &DriverPageId, selector: &str) -> Result<(), ErrorKind>;
    async fn type_text(&self, page: &DriverPageId, selector: &str, text: &str) -> Result<(), ErrorKind>;
    async fn select(&self, page: &DriverPageId, selector: &str, value: &str) -> Result<(), ErrorKind>;
    async fn keyboard(&self, page: &DriverPageId, key: &str) -> Result<(), ErrorKind>;
    async fn mouse(&self, page: &DriverPageId, x: f64, y: f64) -> Result<(), ErrorKind>;
    async fn screenshot(&self, page: &DriverPageId) -> Result<Vec<u8>, ErrorKind>;
    async fn pdf(&self, page: &DriverPageId) -> Result<Vec<u8>, ErrorKind>;
    async fn content(&self, page: &DriverPageId) -> Result<String, ErrorKind>;
    async fn wait(&self, page: &DriverPageId, selector: &str, timeout: Duration) -> Result<(), ErrorKind>;
    async fn scroll(&self, page: &DriverPageId, x: f64, y: f64) -> Result<(), ErrorKind>;
    async fn evaluate(&self, page: &DriverPageId, script: &str) -> Result<Value, ErrorKind>;
    async fn upload(&self, page: &DriverPageId, selector: &str, paths: &[String]) -> Result<(), ErrorKind>;
    async fn cookies_get(&self, page: &DriverPageId) -> Result<Vec<CookieSpec>, ErrorKind>;
    async fn cookies_set(&self, page: &DriverPageId, cookies: &[CookieSpec]) -> Result<(), ErrorKind>;
}
