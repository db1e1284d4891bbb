//! Mock engine implementation for testing
//!
//! Provides an in-process fake browser with a small fixed DOM so session
//! and protocol logic can be exercised without a real Chromium process.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::engine::traits::*;
use crate::Error;

/// Selector → (tag, text) entries the mock page "contains" once navigated
const MOCK_DOM: &[(&str, &str, &str)] = &[
    ("a", "a", "More information..."),
    ("h1", "h1", "Example Domain"),
    ("body", "body", "Example Domain"),
    ("#click-me", "button", "Click Me"),
    ("#text-input", "input", ""),
];

/// Polling interval used by waiting operations
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Mock engine launcher
#[derive(Debug, Default)]
pub struct MockLauncher;

impl MockLauncher {
    /// Create a new mock launcher
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EngineLauncher for MockLauncher {
    async fn launch(
        &self,
        _options: &EngineLaunchOptions,
    ) -> Result<Arc<dyn EngineBrowser>, Error> {
        Ok(Arc::new(MockBrowser::new()))
    }
}

/// Mock browser process
#[derive(Debug)]
pub struct MockBrowser {
    is_active: Arc<AtomicBool>,
}

impl MockBrowser {
    /// Create a new mock browser
    pub fn new() -> Self {
        Self {
            is_active: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineBrowser for MockBrowser {
    async fn new_context(&self) -> Result<Arc<dyn EngineContext>, Error> {
        if !self.is_active.load(Ordering::Relaxed) {
            return Err(Error::engine("Browser is closed"));
        }
        Ok(Arc::new(MockContext {
            is_active: Arc::new(AtomicBool::new(true)),
        }))
    }

    async fn close(&self) -> Result<(), Error> {
        self.is_active.store(false, Ordering::Relaxed);
        Ok(())
    }
}

/// Mock browsing context
#[derive(Debug)]
pub struct MockContext {
    is_active: Arc<AtomicBool>,
}

#[async_trait]
impl EngineContext for MockContext {
    async fn new_page(&self, _viewport: Viewport) -> Result<Arc<dyn EnginePage>, Error> {
        if !self.is_active.load(Ordering::Relaxed) {
            return Err(Error::engine("Context is closed"));
        }
        Ok(Arc::new(MockPage::new()))
    }

    async fn close(&self) -> Result<(), Error> {
        self.is_active.store(false, Ordering::Relaxed);
        Ok(())
    }
}

/// Mock page with a fixed DOM
#[derive(Debug)]
pub struct MockPage {
    url: Mutex<Option<String>>,
    typed: Mutex<HashMap<String, String>>,
    is_active: AtomicBool,
}

impl MockPage {
    /// Create a new mock page
    pub fn new() -> Self {
        Self {
            url: Mutex::new(None),
            typed: Mutex::new(HashMap::new()),
            is_active: AtomicBool::new(true),
        }
    }

    /// Text typed into a selector so far (test hook)
    pub async fn typed_text(&self, selector: &str) -> Option<String> {
        self.typed.lock().await.get(selector).cloned()
    }

    fn check_active(&self) -> Result<(), Error> {
        if !self.is_active.load(Ordering::Relaxed) {
            return Err(Error::engine("Page is closed"));
        }
        Ok(())
    }

    async fn lookup(&self, selector: &str) -> Option<(&'static str, &'static str)> {
        if self.url.lock().await.is_none() {
            return None;
        }
        MOCK_DOM
            .iter()
            .find(|(sel, _, _)| *sel == selector)
            .map(|(_, tag, text)| (*tag, *text))
    }
}

impl Default for MockPage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnginePage for MockPage {
    fn set_default_timeout(&self, _timeout_ms: u64) {}

    async fn goto(&self, url: &str) -> Result<(), Error> {
        self.check_active()?;
        if !(url.starts_with("http://") || url.starts_with("https://") || url.starts_with("data:"))
        {
            return Err(Error::navigation_failed(format!("Invalid URL: {}", url)));
        }
        *self.url.lock().await = Some(url.to_string());
        Ok(())
    }

    async fn title(&self) -> Result<String, Error> {
        self.check_active()?;
        Ok(match self.url.lock().await.as_deref() {
            Some(_) => "Example Domain".to_string(),
            None => String::new(),
        })
    }

    async fn url(&self) -> Result<String, Error> {
        self.check_active()?;
        Ok(self
            .url
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn query_count(&self, selector: &str) -> Result<usize, Error> {
        self.check_active()?;
        Ok(usize::from(self.lookup(selector).await.is_some()))
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<(), Error> {
        self.check_active()?;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.lookup(selector).await.is_some() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::timeout(format!(
                    "Selector not visible within {}ms: {}",
                    timeout_ms, selector
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn element_snapshot(
        &self,
        selector: &str,
        timeout_ms: u64,
    ) -> Result<Option<ElementSnapshot>, Error> {
        self.check_active()?;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Some((tag, text)) = self.lookup(selector).await {
                return Ok(Some(ElementSnapshot {
                    tag: tag.to_string(),
                    text: text.to_string(),
                    bounding_box: Some(BoundingBox {
                        x: 8.0,
                        y: 8.0,
                        width: 120.0,
                        height: 24.0,
                    }),
                }));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&self, selector: &str, timeout_ms: u64) -> Result<(), Error> {
        self.check_active()?;
        self.wait_for_selector(selector, timeout_ms).await
    }

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        clear: bool,
        timeout_ms: u64,
    ) -> Result<(), Error> {
        self.check_active()?;
        self.wait_for_selector(selector, timeout_ms).await?;

        let mut typed = self.typed.lock().await;
        let entry = typed.entry(selector.to_string()).or_default();
        if clear {
            entry.clear();
        }
        entry.push_str(text);
        Ok(())
    }

    async fn screenshot(&self, _full_page: bool) -> Result<Vec<u8>, Error> {
        self.check_active()?;
        // Minimal PNG header, enough for consumers that sniff magic bytes
        Ok(vec![
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
            0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00,
            0x00, 0x90, 0x77, 0x53, 0xDE,
        ])
    }

    async fn close(&self) -> Result<(), Error> {
        self.is_active.store(false, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dom_empty_before_navigation() {
        let page = MockPage::new();
        assert_eq!(page.query_count("a").await.unwrap(), 0);

        page.goto("https://example.com").await.unwrap();
        assert_eq!(page.query_count("a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_not_found_is_none() {
        let page = MockPage::new();
        page.goto("https://example.com").await.unwrap();

        let snapshot = page.element_snapshot("#missing", 50).await.unwrap();
        assert!(snapshot.is_none());

        let snapshot = page.element_snapshot("a", 50).await.unwrap().unwrap();
        assert_eq!(snapshot.tag, "a");
        assert!(snapshot.bounding_box.is_some());
    }

    #[tokio::test]
    async fn test_click_unknown_selector_times_out() {
        let page = MockPage::new();
        page.goto("https://example.com").await.unwrap();

        let result = page.click("#missing", 50).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_type_clear_semantics() {
        let page = MockPage::new();
        page.goto("https://example.com").await.unwrap();

        page.type_text("#text-input", "abc", false, 100).await.unwrap();
        page.type_text("#text-input", "def", false, 100).await.unwrap();
        assert_eq!(page.typed_text("#text-input").await.unwrap(), "abcdef");

        page.type_text("#text-input", "xyz", true, 100).await.unwrap();
        assert_eq!(page.typed_text("#text-input").await.unwrap(), "xyz");
    }

    #[tokio::test]
    async fn test_page_rejects_ops_after_close() {
        let page = MockPage::new();
        page.close().await.unwrap();
        assert!(page.goto("https://example.com").await.is_err());
    }
}
