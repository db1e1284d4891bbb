//! Chromium engine implementation
//!
//! Drives a real Chromium process over the DevTools protocol via
//! chromiumoxide. Element-targeting operations gate on an actionability
//! poll (attached, visible, enabled) evaluated in the page, mirroring the
//! engine-side waiting the session layer relies on.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::traits::*;
use crate::Error;

/// Polling interval for actionability and readiness checks
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Escape a string for safe single-quoted embedding in JavaScript
fn escape_js_str(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('"', r#"\""#)
}

/// Chromium engine launcher
#[derive(Debug, Default)]
pub struct ChromiumLauncher;

impl ChromiumLauncher {
    /// Create a new Chromium launcher
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EngineLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        options: &EngineLaunchOptions,
    ) -> Result<Arc<dyn EngineBrowser>, Error> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .window_size(1280, 720);

        if !options.headless {
            builder = builder.with_head();
        }

        if let Some(path) = &options.executable_path {
            builder = builder.chrome_executable(path);
        }

        let config = builder
            .build()
            .map_err(|e| Error::engine(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::engine(format!("Failed to launch browser: {}", e)))?;

        // The handler task pumps DevTools messages; it ends when the
        // browser process goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("Engine event loop ended");
                    break;
                }
            }
        });

        debug!("Chromium launched (headless={})", options.headless);

        Ok(Arc::new(ChromiumBrowser {
            browser: Arc::new(Mutex::new(browser)),
            handler_task: Mutex::new(Some(handler_task)),
            slow_mo_ms: options.slow_mo_ms,
        }))
    }
}

/// Running Chromium process
pub struct ChromiumBrowser {
    browser: Arc<Mutex<Browser>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    slow_mo_ms: u64,
}

impl std::fmt::Debug for ChromiumBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumBrowser")
            .field("slow_mo_ms", &self.slow_mo_ms)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EngineBrowser for ChromiumBrowser {
    async fn new_context(&self) -> Result<Arc<dyn EngineContext>, Error> {
        // Isolation is per-launch: every engine launch runs with a fresh
        // user data directory, so the default browsing context carries no
        // state from previous sessions.
        Ok(Arc::new(ChromiumContext {
            browser: self.browser.clone(),
            slow_mo_ms: self.slow_mo_ms,
        }))
    }

    async fn close(&self) -> Result<(), Error> {
        let result = match self.browser.lock().await.close().await {
            Ok(_) => Ok(()),
            Err(e) => Err(Error::engine(format!("Failed to close browser: {}", e))),
        };

        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }

        result
    }
}

/// Isolated browsing context
pub struct ChromiumContext {
    browser: Arc<Mutex<Browser>>,
    slow_mo_ms: u64,
}

impl std::fmt::Debug for ChromiumContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumContext").finish_non_exhaustive()
    }
}

#[async_trait]
impl EngineContext for ChromiumContext {
    async fn new_page(&self, viewport: Viewport) -> Result<Arc<dyn EnginePage>, Error> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| Error::engine(format!("Failed to create page: {}", e)))?;

        let page = ChromiumPage {
            page,
            slow_mo_ms: self.slow_mo_ms,
            default_timeout_ms: AtomicU64::new(30000),
        };
        page.apply_viewport(viewport).await?;

        Ok(Arc::new(page))
    }

    async fn close(&self) -> Result<(), Error> {
        // The single context lives and dies with the browser process.
        Ok(())
    }
}

/// The single active document view
pub struct ChromiumPage {
    page: chromiumoxide::Page,
    slow_mo_ms: u64,
    default_timeout_ms: AtomicU64,
}

impl std::fmt::Debug for ChromiumPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumPage")
            .field("slow_mo_ms", &self.slow_mo_ms)
            .finish_non_exhaustive()
    }
}

impl ChromiumPage {
    async fn apply_viewport(&self, viewport: Viewport) -> Result<(), Error> {
        use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;

        let params = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(Error::engine)?;

        self.page
            .execute(params)
            .await
            .map_err(|e| Error::engine(format!("Failed to set viewport: {}", e)))?;
        Ok(())
    }

    async fn pace(&self) {
        if self.slow_mo_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.slow_mo_ms)).await;
        }
    }

    fn default_timeout(&self) -> u64 {
        self.default_timeout_ms.load(Ordering::Relaxed)
    }

    async fn eval_string(&self, script: &str) -> Result<Option<String>, Error> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| Error::engine(format!("Evaluation failed: {}", e)))?;
        Ok(result.into_value::<Option<String>>().unwrap_or(None))
    }

    /// Poll until the first match is attached, visible and enabled.
    async fn wait_actionable(&self, selector: &str, timeout_ms: u64) -> Result<(), Error> {
        let script = format!(
            r#"
            (() => {{
                const el = document.querySelector('{}');
                if (!el) return 'missing';
                const style = window.getComputedStyle(el);
                const rect = el.getBoundingClientRect();
                const visible = style.visibility !== 'hidden'
                    && style.display !== 'none'
                    && rect.width > 0 && rect.height > 0;
                const enabled = !el.disabled;
                return visible && enabled ? 'ready' : 'pending';
            }})()
            "#,
            escape_js_str(selector)
        );

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Some(state) = self.eval_string(&script).await? {
                if state == "ready" {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::timeout(format!(
                    "Selector not actionable within {}ms: {}",
                    timeout_ms, selector
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl EnginePage for ChromiumPage {
    fn set_default_timeout(&self, timeout_ms: u64) {
        self.default_timeout_ms.store(timeout_ms, Ordering::Relaxed);
    }

    async fn goto(&self, url: &str) -> Result<(), Error> {
        self.pace().await;
        self.page
            .goto(url)
            .await
            .map_err(|e| Error::navigation_failed(format!("{}: {}", url, e)))?;

        // Wait for the DOM to be parsed, not for subresources: readyState
        // leaves "loading" at DOMContentLoaded.
        let deadline = Instant::now() + Duration::from_millis(self.default_timeout());
        loop {
            let state = self
                .eval_string("document.readyState")
                .await?
                .unwrap_or_default();
            if state == "interactive" || state == "complete" {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::timeout(format!(
                    "Document not parsed within {}ms: {}",
                    self.default_timeout(),
                    url
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn title(&self) -> Result<String, Error> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(|e| Error::engine(format!("Failed to read title: {}", e)))?
            .unwrap_or_default())
    }

    async fn url(&self) -> Result<String, Error> {
        Ok(self
            .page
            .url()
            .await
            .map_err(|e| Error::engine(format!("Failed to read URL: {}", e)))?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn query_count(&self, selector: &str) -> Result<usize, Error> {
        let script = format!(
            "document.querySelectorAll('{}').length",
            escape_js_str(selector)
        );
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| Error::engine(format!("Evaluation failed: {}", e)))?;
        let count: u64 = result
            .into_value()
            .map_err(|e| Error::internal(format!("Invalid query count: {}", e)))?;
        Ok(count as usize)
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<(), Error> {
        self.wait_actionable(selector, timeout_ms).await
    }

    async fn element_snapshot(
        &self,
        selector: &str,
        timeout_ms: u64,
    ) -> Result<Option<ElementSnapshot>, Error> {
        // Attached is enough here; visibility is not required.
        let script = format!(
            r#"
            (() => {{
                const el = document.querySelector('{}');
                if (!el) return null;
                const rect = el.getBoundingClientRect();
                const hasBox = rect.width > 0 || rect.height > 0;
                return JSON.stringify({{
                    tag: el.tagName.toLowerCase(),
                    text: el.textContent || '',
                    box: hasBox
                        ? {{ x: rect.x, y: rect.y, width: rect.width, height: rect.height }}
                        : null
                }});
            }})()
            "#,
            escape_js_str(selector)
        );

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Some(json) = self.eval_string(&script).await? {
                #[derive(serde::Deserialize)]
                struct RawBox {
                    x: f64,
                    y: f64,
                    width: f64,
                    height: f64,
                }
                #[derive(serde::Deserialize)]
                struct RawSnapshot {
                    tag: String,
                    text: String,
                    #[serde(rename = "box")]
                    bounding_box: Option<RawBox>,
                }

                let raw: RawSnapshot = serde_json::from_str(&json)
                    .map_err(|e| Error::internal(format!("Invalid element snapshot: {}", e)))?;
                return Ok(Some(ElementSnapshot {
                    tag: raw.tag,
                    text: raw.text,
                    bounding_box: raw.bounding_box.map(|b| BoundingBox {
                        x: b.x,
                        y: b.y,
                        width: b.width,
                        height: b.height,
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
        self.pace().await;
        self.wait_actionable(selector, timeout_ms).await?;

        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| Error::engine(format!("Element lookup failed for {}: {}", selector, e)))?;
        element
            .click()
            .await
            .map_err(|e| Error::engine(format!("Click failed for {}: {}", selector, e)))?;
        Ok(())
    }

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        clear: bool,
        timeout_ms: u64,
    ) -> Result<(), Error> {
        self.pace().await;
        self.wait_actionable(selector, timeout_ms).await?;

        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| Error::engine(format!("Element lookup failed for {}: {}", selector, e)))?;

        // Focus via click before typing
        element
            .click()
            .await
            .map_err(|e| Error::engine(format!("Focus failed for {}: {}", selector, e)))?;

        if clear {
            let script = format!(
                r#"
                (() => {{
                    const el = document.querySelector('{}');
                    if (el) {{
                        el.value = '';
                        el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    }}
                }})()
                "#,
                escape_js_str(selector)
            );
            self.page
                .evaluate(script)
                .await
                .map_err(|e| Error::engine(format!("Clear failed for {}: {}", selector, e)))?;
        }

        element
            .type_str(text)
            .await
            .map_err(|e| Error::engine(format!("Type failed for {}: {}", selector, e)))?;
        Ok(())
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, Error> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(full_page)
                    .build(),
            )
            .await
            .map_err(|e| Error::engine(format!("Screenshot failed: {}", e)))
    }

    async fn close(&self) -> Result<(), Error> {
        if let Err(e) = self.page.clone().close().await {
            warn!("Page close reported an error: {}", e);
        }
        Ok(())
    }
}
