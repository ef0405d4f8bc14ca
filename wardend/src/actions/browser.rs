// ABOUTME: coordinator over an external headless-browser driver; owns the console-log
// ABOUTME: ring and the lifecycle state, so nothing else touches browser internals.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use warden_common::{
    ClickRequest, ConsoleEntry, ConsoleLogsOutcome, ConsoleLogsRequest, ContentFormat,
    EvaluateOutcome, EvaluateRequest, NavigateOutcome, NavigateRequest, PageContentOutcome,
    PageContentRequest, ScreenshotMode, ScreenshotOutcome, ScreenshotRequest, TypeTextRequest,
    WaitForOutcome, WaitForRequest, WaitState,
};

use crate::error::OpError;

const CONSOLE_RING_CAPACITY: usize = 1000;
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Remote-workspace preview hosts are rewritten to localhost before
/// navigation so the browser hits the dev server directly.
static REMOTE_PREVIEW_HOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://[\w-]+-(\d+)\.(?:app\.github\.dev|preview\.app\.github\.dev|githubpreview\.dev)(/.*)?$")
        .expect("preview host pattern")
});

/// The capability boundary to the concrete headless browser. The daemon
/// never links a browser engine; a driver is supplied at startup.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn init(&self) -> Result<(), String>;
    async fn navigate(&self, url: &str) -> Result<Option<String>, String>;
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, String>;
    async fn screenshot(
        &self,
        mode: ScreenshotMode,
        selector: Option<&str>,
    ) -> Result<Vec<u8>, String>;
    async fn click(&self, selector: &str) -> Result<(), String>;
    async fn type_text(&self, selector: &str, text: &str) -> Result<(), String>;
    async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), String>;
    async fn content(&self, format: ContentFormat) -> Result<String, String>;
    /// Console, page-error, and request-failed messages observed since the
    /// previous call.
    async fn take_console_events(&self) -> Vec<ConsoleEntry>;
    async fn close(&self) -> Result<(), String>;
}

/// Stands in when no real driver is configured; every operation reports
/// the browser capability as unavailable.
pub struct DisconnectedDriver;

#[async_trait]
impl BrowserDriver for DisconnectedDriver {
    async fn init(&self) -> Result<(), String> {
        Err("no browser driver configured".to_string())
    }
    async fn navigate(&self, _url: &str) -> Result<Option<String>, String> {
        Err("no browser driver configured".to_string())
    }
    async fn evaluate(&self, _expression: &str) -> Result<serde_json::Value, String> {
        Err("no browser driver configured".to_string())
    }
    async fn screenshot(
        &self,
        _mode: ScreenshotMode,
        _selector: Option<&str>,
    ) -> Result<Vec<u8>, String> {
        Err("no browser driver configured".to_string())
    }
    async fn click(&self, _selector: &str) -> Result<(), String> {
        Err("no browser driver configured".to_string())
    }
    async fn type_text(&self, _selector: &str, _text: &str) -> Result<(), String> {
        Err("no browser driver configured".to_string())
    }
    async fn wait_for(
        &self,
        _selector: &str,
        _state: WaitState,
        _timeout: Duration,
    ) -> Result<(), String> {
        Err("no browser driver configured".to_string())
    }
    async fn content(&self, _format: ContentFormat) -> Result<String, String> {
        Err("no browser driver configured".to_string())
    }
    async fn take_console_events(&self) -> Vec<ConsoleEntry> {
        Vec::new()
    }
    async fn close(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrowserState {
    Uninitialized,
    Ready,
    Closed,
}

struct ConsoleRing {
    entries: VecDeque<ConsoleEntry>,
}

impl ConsoleRing {
    fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    fn push(&mut self, entry: ConsoleEntry) {
        if self.entries.len() == CONSOLE_RING_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

pub struct Browser {
    driver: Arc<dyn BrowserDriver>,
    state: tokio::sync::Mutex<BrowserState>,
    ring: std::sync::Mutex<ConsoleRing>,
}

impl Browser {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            driver,
            state: tokio::sync::Mutex::new(BrowserState::Uninitialized),
            ring: std::sync::Mutex::new(ConsoleRing::new()),
        }
    }

    /// Navigation resets the console ring before the page loads.
    pub async fn navigate(&self, req: &NavigateRequest) -> Result<NavigateOutcome, OpError> {
        self.ensure_ready().await?;
        let url = self.normalize_url(&req.url);
        self.ring.lock().expect("console ring").clear();

        let title = self
            .driver
            .navigate(&url)
            .await
            .map_err(OpError::Browser)?;
        self.collect_console().await;
        tracing::info!("🌐 navigated to {url}");
        Ok(NavigateOutcome { url, title })
    }

    pub async fn screenshot(&self, req: &ScreenshotRequest) -> Result<ScreenshotOutcome, OpError> {
        self.ensure_ready().await?;
        if req.mode == ScreenshotMode::Selector && req.selector.is_none() {
            return Err(OpError::InvalidRequest(
                "selector screenshots need a selector".to_string(),
            ));
        }
        let bytes = self
            .driver
            .screenshot(req.mode, req.selector.as_deref())
            .await
            .map_err(OpError::Browser)?;
        self.collect_console().await;
        Ok(ScreenshotOutcome {
            mode: req.mode,
            data_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    }

    pub async fn evaluate(&self, req: &EvaluateRequest) -> Result<EvaluateOutcome, OpError> {
        self.ensure_ready().await?;
        let value = self
            .driver
            .evaluate(&req.expression)
            .await
            .map_err(OpError::Browser)?;
        self.collect_console().await;
        Ok(EvaluateOutcome { value })
    }

    pub async fn click(&self, req: &ClickRequest) -> Result<(), OpError> {
        self.ensure_ready().await?;
        self.driver
            .click(&req.selector)
            .await
            .map_err(OpError::Browser)?;
        self.collect_console().await;
        Ok(())
    }

    pub async fn type_text(&self, req: &TypeTextRequest) -> Result<(), OpError> {
        self.ensure_ready().await?;
        self.driver
            .type_text(&req.selector, &req.text)
            .await
            .map_err(OpError::Browser)?;
        self.collect_console().await;
        Ok(())
    }

    pub async fn wait_for(&self, req: &WaitForRequest) -> Result<WaitForOutcome, OpError> {
        self.ensure_ready().await?;
        let timeout = Duration::from_millis(req.timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS));
        let started = std::time::Instant::now();
        self.driver
            .wait_for(&req.selector, req.state, timeout)
            .await
            .map_err(OpError::Browser)?;
        self.collect_console().await;
        Ok(WaitForOutcome {
            selector: req.selector.clone(),
            state: req.state,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    pub async fn page_content(
        &self,
        req: &PageContentRequest,
    ) -> Result<PageContentOutcome, OpError> {
        self.ensure_ready().await?;
        let content = self
            .driver
            .content(req.format)
            .await
            .map_err(OpError::Browser)?;
        self.collect_console().await;
        Ok(PageContentOutcome {
            format: req.format,
            content,
        })
    }

    pub async fn console_logs(
        &self,
        req: &ConsoleLogsRequest,
    ) -> Result<ConsoleLogsOutcome, OpError> {
        self.collect_console().await;
        let mut ring = self.ring.lock().expect("console ring");

        let entries: Vec<ConsoleEntry> = ring
            .entries
            .iter()
            .filter(|e| req.filter.as_deref().map_or(true, |f| e.level == f))
            .cloned()
            .collect();
        if req.drain {
            if req.filter.is_none() {
                ring.clear();
            } else {
                ring.entries
                    .retain(|e| req.filter.as_deref() != Some(e.level.as_str()));
            }
        }

        Ok(ConsoleLogsOutcome {
            total: entries.len(),
            entries,
        })
    }

    pub async fn close(&self) -> Result<(), OpError> {
        let mut state = self.state.lock().await;
        if *state == BrowserState::Ready {
            self.driver.close().await.map_err(OpError::Browser)?;
        }
        *state = BrowserState::Closed;
        tracing::info!("🌐 browser closed");
        Ok(())
    }

    /// Uninitialized implicitly becomes Ready on first use; a closed
    /// browser reopens the same way.
    async fn ensure_ready(&self) -> Result<(), OpError> {
        let mut state = self.state.lock().await;
        if *state == BrowserState::Ready {
            return Ok(());
        }
        self.driver.init().await.map_err(OpError::Browser)?;
        *state = BrowserState::Ready;
        Ok(())
    }

    async fn collect_console(&self) {
        let events = self.driver.take_console_events().await;
        if events.is_empty() {
            return;
        }
        let mut ring = self.ring.lock().expect("console ring");
        for event in events {
            ring.push(event);
        }
    }

    /// The forwarded-port host embeds the dev-server port; strip the remote
    /// host and hit that port on localhost directly.
    fn normalize_url(&self, url: &str) -> String {
        if let Some(captures) = REMOTE_PREVIEW_HOST.captures(url) {
            let port = captures.get(1).map(|m| m.as_str()).unwrap_or("3000");
            let path = captures.get(2).map(|m| m.as_str()).unwrap_or("");
            return format!("http://localhost:{port}{path}");
        }
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Scripted driver: canned answers, records calls, queues console events.
    struct ScriptedDriver {
        console_queue: Mutex<Vec<ConsoleEntry>>,
        navigations: Mutex<Vec<String>>,
        closed: Mutex<bool>,
    }

    impl ScriptedDriver {
        fn new() -> Self {
            Self {
                console_queue: Mutex::new(Vec::new()),
                navigations: Mutex::new(Vec::new()),
                closed: Mutex::new(false),
            }
        }

        fn queue_console(&self, level: &str, text: &str) {
            self.console_queue.lock().unwrap().push(ConsoleEntry {
                level: level.to_string(),
                text: text.to_string(),
                timestamp: Utc::now(),
                location: None,
                stack: None,
            });
        }
    }

    #[async_trait]
    impl BrowserDriver for ScriptedDriver {
        async fn init(&self) -> Result<(), String> {
            Ok(())
        }
        async fn navigate(&self, url: &str) -> Result<Option<String>, String> {
            self.navigations.lock().unwrap().push(url.to_string());
            Ok(Some("Test Page".to_string()))
        }
        async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, String> {
            Ok(serde_json::json!({ "expression": expression }))
        }
        async fn screenshot(
            &self,
            _mode: ScreenshotMode,
            _selector: Option<&str>,
        ) -> Result<Vec<u8>, String> {
            Ok(vec![0x89, 0x50, 0x4e, 0x47])
        }
        async fn click(&self, _selector: &str) -> Result<(), String> {
            Ok(())
        }
        async fn type_text(&self, _selector: &str, _text: &str) -> Result<(), String> {
            Ok(())
        }
        async fn wait_for(
            &self,
            _selector: &str,
            _state: WaitState,
            _timeout: Duration,
        ) -> Result<(), String> {
            Ok(())
        }
        async fn content(&self, _format: ContentFormat) -> Result<String, String> {
            Ok("<html></html>".to_string())
        }
        async fn take_console_events(&self) -> Vec<ConsoleEntry> {
            std::mem::take(&mut *self.console_queue.lock().unwrap())
        }
        async fn close(&self) -> Result<(), String> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn browser() -> (Arc<ScriptedDriver>, Browser) {
        let driver = Arc::new(ScriptedDriver::new());
        let browser = Browser::new(driver.clone());
        (driver, browser)
    }

    #[tokio::test]
    async fn navigate_normalizes_remote_preview_hosts() {
        let (driver, browser) = browser();
        let outcome = browser
            .navigate(&NavigateRequest {
                url: "https://my-space-3000.app.github.dev/dashboard".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.url, "http://localhost:3000/dashboard");
        assert_eq!(
            driver.navigations.lock().unwrap().as_slice(),
            ["http://localhost:3000/dashboard"]
        );
    }

    #[tokio::test]
    async fn normalization_uses_the_port_embedded_in_the_host() {
        let (_driver, browser) = browser();
        let outcome = browser
            .navigate(&NavigateRequest {
                url: "https://my-space-5173.app.github.dev".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.url, "http://localhost:5173");
    }

    #[tokio::test]
    async fn ordinary_urls_pass_through_unchanged() {
        let (_driver, browser) = browser();
        let outcome = browser
            .navigate(&NavigateRequest {
                url: "http://localhost:5173".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.url, "http://localhost:5173");
        assert_eq!(outcome.title.as_deref(), Some("Test Page"));
    }

    #[tokio::test]
    async fn navigation_resets_the_console_ring() {
        let (driver, browser) = browser();
        driver.queue_console("error", "stale message");
        browser
            .console_logs(&ConsoleLogsRequest {
                filter: None,
                drain: false,
            })
            .await
            .unwrap();

        browser
            .navigate(&NavigateRequest {
                url: "http://localhost:3000".to_string(),
            })
            .await
            .unwrap();
        driver.queue_console("log", "fresh message");

        let logs = browser
            .console_logs(&ConsoleLogsRequest {
                filter: None,
                drain: false,
            })
            .await
            .unwrap();
        assert_eq!(logs.total, 1);
        assert_eq!(logs.entries[0].text, "fresh message");
    }

    #[tokio::test]
    async fn console_logs_filter_and_drain() {
        let (driver, browser) = browser();
        driver.queue_console("error", "boom");
        driver.queue_console("log", "fine");

        let errors = browser
            .console_logs(&ConsoleLogsRequest {
                filter: Some("error".to_string()),
                drain: true,
            })
            .await
            .unwrap();
        assert_eq!(errors.total, 1);
        assert_eq!(errors.entries[0].level, "error");

        let rest = browser
            .console_logs(&ConsoleLogsRequest {
                filter: None,
                drain: false,
            })
            .await
            .unwrap();
        assert_eq!(rest.total, 1);
        assert_eq!(rest.entries[0].level, "log");
    }

    #[tokio::test]
    async fn selector_screenshots_require_a_selector() {
        let (_driver, browser) = browser();
        let err = browser
            .screenshot(&ScreenshotRequest {
                mode: ScreenshotMode::Selector,
                selector: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OpError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn screenshot_returns_base64_bytes() {
        let (_driver, browser) = browser();
        let outcome = browser
            .screenshot(&ScreenshotRequest {
                mode: ScreenshotMode::Viewport,
                selector: None,
            })
            .await
            .unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(outcome.data_base64)
            .unwrap();
        assert_eq!(bytes, vec![0x89, 0x50, 0x4e, 0x47]);
    }

    #[tokio::test]
    async fn close_then_reuse_reinitializes() {
        let (driver, browser) = browser();
        browser
            .navigate(&NavigateRequest {
                url: "http://localhost:3000".to_string(),
            })
            .await
            .unwrap();
        browser.close().await.unwrap();
        assert!(*driver.closed.lock().unwrap());

        let outcome = browser
            .evaluate(&EvaluateRequest {
                expression: "1 + 1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.value["expression"], "1 + 1");
    }

    #[tokio::test]
    async fn disconnected_driver_reports_browser_unavailable() {
        let browser = Browser::new(Arc::new(DisconnectedDriver));
        let err = browser
            .navigate(&NavigateRequest {
                url: "http://localhost:3000".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OpError::Browser(_)));
    }

    #[tokio::test]
    async fn console_ring_is_bounded() {
        let (driver, browser) = browser();
        for i in 0..(CONSOLE_RING_CAPACITY + 5) {
            driver.queue_console("log", &format!("line {i}"));
        }
        let logs = browser
            .console_logs(&ConsoleLogsRequest {
                filter: None,
                drain: false,
            })
            .await
            .unwrap();
        assert_eq!(logs.total, CONSOLE_RING_CAPACITY);
        assert_eq!(logs.entries[0].text, "line 5");
    }
}
