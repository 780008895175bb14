//! ActionDispatcher (component F). Generalizes the teacher's `ToolRegistry`
//! (`tools/mod.rs`): a type-indexed map from action kind to handler, rather
//! than a name-indexed list, since dispatch here is driven by a closed enum.

use super::types::{Action, ActionKind, ActionResult};
use crate::driver::{Driver, DriverPageId};
use crate::error::ErrorKind;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(
        &self,
        action: &Action,
        page: &DriverPageId,
        driver: &dyn Driver,
    ) -> Result<ActionResult, ErrorKind>;
}

macro_rules! timed_handler {
    ($name:ident, $kind:ident, $body:expr) => {
        struct $name;
        #[async_trait]
        impl ActionHandler for $name {
            async fn handle(
                &self,
                action: &Action,
                page: &DriverPageId,
                driver: &dyn Driver,
            ) -> Result<ActionResult, ErrorKind> {
                let start = Instant::now();
                let outcome: Result<serde_json::Value, ErrorKind> = $body(action, page, driver).await;
                let duration = start.elapsed();
                match outcome {
                    Ok(data) => Ok(ActionResult::ok(
                        ActionKind::$kind,
                        Some(data),
                        duration,
                        HashMap::new(),
                    )),
                    Err(err) => Ok(ActionResult::failed(ActionKind::$kind, err.to_string(), duration)),
                }
            }
        }
    };
}

timed_handler!(NavigateHandler, Navigate, |action: &Action, page: &DriverPageId, driver: &dyn Driver| async move {
    let Action::Navigate { url, .. } = action else { unreachable!() };
    driver.navigate(page, url).await?;
    Ok(serde_json::json!({ "url": url }))
});

timed_handler!(ClickHandler, Click, |action: &Action, page: &DriverPageId, driver: &dyn Driver| async move {
    let Action::Click { selector, .. } = action else { unreachable!() };
    driver.click(page, selector).await?;
    Ok(serde_json::json!({ "selector": selector }))
});

timed_handler!(TypeHandler, Type, |action: &Action, page: &DriverPageId, driver: &dyn Driver| async move {
    let Action::Type { selector, text, .. } = action else { unreachable!() };
    driver.type_text(page, selector, text).await?;
    Ok(serde_json::json!({ "selector": selector }))
});

timed_handler!(SelectHandler, Select, |action: &Action, page: &DriverPageId, driver: &dyn Driver| async move {
    let Action::Select { selector, value, .. } = action else { unreachable!() };
    driver.select(page, selector, value).await?;
    Ok(serde_json::json!({ "selector": selector, "value": value }))
});

timed_handler!(KeyboardHandler, Keyboard, |action: &Action, page: &DriverPageId, driver: &dyn Driver| async move {
    let Action::Keyboard { key, .. } = action else { unreachable!() };
    driver.keyboard(page, key).await?;
    Ok(serde_json::json!({ "key": key }))
});

timed_handler!(MouseHandler, Mouse, |action: &Action, page: &DriverPageId, driver: &dyn Driver| async move {
    let Action::Mouse { x, y, .. } = action else { unreachable!() };
    driver.mouse(page, *x, *y).await?;
    Ok(serde_json::json!({ "x": x, "y": y }))
});

timed_handler!(ScreenshotHandler, Screenshot, |_action: &Action, page: &DriverPageId, driver: &dyn Driver| async move {
    let bytes = driver.screenshot(page).await?;
    Ok(serde_json::json!({ "bytes": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes) }))
});

timed_handler!(PdfHandler, Pdf, |_action: &Action, page: &DriverPageId, driver: &dyn Driver| async move {
    let bytes = driver.pdf(page).await?;
    Ok(serde_json::json!({ "bytes": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes) }))
});

timed_handler!(ContentHandler, Content, |_action: &Action, page: &DriverPageId, driver: &dyn Driver| async move {
    let html = driver.content(page).await?;
    Ok(serde_json::json!({ "html": html }))
});

timed_handler!(WaitHandler, Wait, |action: &Action, page: &DriverPageId, driver: &dyn Driver| async move {
    let Action::Wait { selector, timeout, .. } = action else { unreachable!() };
    driver.wait(page, selector, timeout.unwrap_or(Duration::from_secs(30))).await?;
    Ok(serde_json::json!({ "selector": selector }))
});

timed_handler!(ScrollHandler, Scroll, |action: &Action, page: &DriverPageId, driver: &dyn Driver| async move {
    let Action::Scroll { x, y, .. } = action else { unreachable!() };
    driver.scroll(page, *x, *y).await?;
    Ok(serde_json::json!({ "x": x, "y": y }))
});

timed_handler!(EvaluateHandler, Evaluate, |action: &Action, page: &DriverPageId, driver: &dyn Driver| async move {
    let Action::Evaluate { script, .. } = action else { unreachable!() };
    driver.evaluate(page, script).await
});

timed_handler!(UploadHandler, Upload, |action: &Action, page: &DriverPageId, driver: &dyn Driver| async move {
    let Action::Upload { selector, file_paths, .. } = action else { unreachable!() };
    driver.upload(page, selector, file_paths).await?;
    Ok(serde_json::json!({ "selector": selector, "fileCount": file_paths.len() }))
});

timed_handler!(CookieHandler, Cookie, |action: &Action, page: &DriverPageId, driver: &dyn Driver| async move {
    let Action::Cookie { set, get, .. } = action else { unreachable!() };
    if !set.is_empty() {
        driver.cookies_set(page, set).await?;
    }
    if *get {
        let cookies = driver.cookies_get(page).await?;
        return Ok(serde_json::to_value(cookies).unwrap_or_default());
    }
    Ok(serde_json::Value::Null)
});

/// `HashMap<ActionKind, Arc<dyn ActionHandler>>` registry, generalizing the
/// teacher's `ToolRegistry`.
pub struct ActionDispatcher {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl Default for ActionDispatcher {
    fn default() -> Self {
        let mut handlers: HashMap<ActionKind, Arc<dyn ActionHandler>> = HashMap::new();
        handlers.insert(ActionKind::Navigate, Arc::new(NavigateHandler));
        handlers.insert(ActionKind::Click, Arc::new(ClickHandler));
        handlers.insert(ActionKind::Type, Arc::new(TypeHandler));
        handlers.insert(ActionKind::Select, Arc::new(SelectHandler));
        handlers.insert(ActionKind::Keyboard, Arc::new(KeyboardHandler));
        handlers.insert(ActionKind::Mouse, Arc::new(MouseHandler));
        handlers.insert(ActionKind::Screenshot, Arc::new(ScreenshotHandler));
        handlers.insert(ActionKind::Pdf, Arc::new(PdfHandler));
        handlers.insert(ActionKind::Content, Arc::new(ContentHandler));
        handlers.insert(ActionKind::Wait, Arc::new(WaitHandler));
        handlers.insert(ActionKind::Scroll, Arc::new(ScrollHandler));
        handlers.insert(ActionKind::Evaluate, Arc::new(EvaluateHandler));
        handlers.insert(ActionKind::Upload, Arc::new(UploadHandler));
        handlers.insert(ActionKind::Cookie, Arc::new(CookieHandler));
        Self { handlers }
    }
}

impl ActionDispatcher {
    pub fn is_action_supported(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registers (or overrides) a handler for `kind` — custom handlers may
    /// be installed at startup, per the design.
    pub fn register(&mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub async fn dispatch(
        &self,
        action: &Action,
        page: &DriverPageId,
        driver: &dyn Driver,
    ) -> Result<ActionResult, ErrorKind> {
        let handler = self
            .handlers
            .get(&action.kind())
            .ok_or_else(|| ErrorKind::Unsupported(action.kind().to_string()))?;
        handler.handle(action, page, driver).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::FakeDriver;
    use crate::pages::PageId;

    #[tokio::test]
    async fn navigate_dispatches_to_driver() {
        let dispatcher = ActionDispatcher::default();
        let driver = FakeDriver::new();
        let browser = driver.launch().await.unwrap();
        let page = driver.new_page(&browser, &Default::default()).await.unwrap();
        let action = Action::Navigate {
            page_id: PageId::new(),
            url: "https://example.com".into(),
            timeout: None,
        };
        let result = dispatcher.dispatch(&action, &page, &driver).await.unwrap();
        assert!(result.success);
    }

    #[test]
    fn unsupported_kind_detection_works_before_dispatch() {
        let mut dispatcher = ActionDispatcher::default();
        dispatcher.handlers.remove(&ActionKind::Cookie);
        assert!(!dispatcher.is_action_supported(ActionKind::Cookie));
    }
}
