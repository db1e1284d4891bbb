//! Session manager implementation
//!
//! Single point of control for one browser session. All mutating
//! operations are serialized through one async mutex so concurrent tool
//! invocations can never interleave against the session handles.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::{
    EngineBrowser, EngineContext, EngineLaunchOptions, EngineLauncher, EnginePage, MockLauncher,
    Viewport,
};
use crate::fsutil;
use crate::session::options::{
    ClickOptions, ElementInfo, LaunchOptions, Screenshot, ScreenshotData, ScreenshotOptions,
    TypeOptions,
};
use crate::{Error, Result};

/// The live session triple plus teardown bookkeeping
///
/// Invariant: `page` is Some if and only if `engine` is Some. A launch
/// that fails midway unwinds whatever it had opened and leaves all three
/// handles empty.
#[derive(Debug, Default)]
struct SessionState {
    engine: Option<Arc<dyn EngineBrowser>>,
    context: Option<Arc<dyn EngineContext>>,
    page: Option<Arc<dyn EnginePage>>,
    shutting_down: bool,
}

/// A lazy handle to the elements currently matching a selector
///
/// Construction performs no engine traffic and no validation; absence is
/// observed only when the handle is queried.
#[derive(Debug, Clone)]
pub struct Locator {
    selector: String,
    page: Arc<dyn EnginePage>,
}

impl Locator {
    /// The selector this handle was built from
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Number of elements currently matching
    pub async fn count(&self) -> Result<usize> {
        self.page.query_count(&self.selector).await
    }

    /// Whether at least one element currently matches
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.count().await? > 0)
    }
}

/// Session manager
pub struct SessionManager {
    config: Config,
    launcher: Arc<dyn EngineLauncher>,
    state: Mutex<SessionState>,
}

impl SessionManager {
    /// Create a new session manager over an engine launcher
    pub fn new(config: Config, launcher: Arc<dyn EngineLauncher>) -> Self {
        Self {
            config,
            launcher,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Create a session manager backed by the mock engine
    pub fn mock(config: Config) -> Self {
        Self::new(config, Arc::new(MockLauncher::new()))
    }

    /// Process-wide configuration this manager was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a session is currently active
    pub async fn is_launched(&self) -> bool {
        self.state.lock().await.page.is_some()
    }

    /// Launch the browser session
    ///
    /// Fails with [`Error::AlreadyLaunched`] if a session is active. The
    /// engine instance, isolated context and single page come up as an
    /// atomic unit; a failure at any stage unwinds the earlier stages.
    pub async fn launch(&self, options: LaunchOptions) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.page.is_some() {
            return Err(Error::AlreadyLaunched);
        }

        fsutil::ensure_dir(Path::new(&self.config.screenshot_dir)).await?;

        let engine_options = EngineLaunchOptions {
            headless: options.headless.unwrap_or(self.config.headless),
            slow_mo_ms: options.slow_mo_ms.unwrap_or(self.config.slow_mo_ms),
            executable_path: self.config.chrome_path.clone(),
        };

        info!(
            "Launching browser session (headless={}, slow_mo={}ms)",
            engine_options.headless, engine_options.slow_mo_ms
        );

        let engine = self.launcher.launch(&engine_options).await?;

        let context = match engine.new_context().await {
            Ok(context) => context,
            Err(e) => {
                let _ = engine.close().await;
                return Err(e);
            }
        };

        let page = match context.new_page(Viewport::default()).await {
            Ok(page) => page,
            Err(e) => {
                let _ = context.close().await;
                let _ = engine.close().await;
                return Err(e);
            }
        };

        page.set_default_timeout(self.config.default_timeout_ms);

        state.engine = Some(engine);
        state.context = Some(context);
        state.page = Some(page);

        info!("Browser session launched");
        Ok(())
    }

    /// Navigate the page, returning once the DOM is parsed
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let state = self.state.lock().await;
        let page = Self::require_page(&state)?;

        let step = format!("navigate {}", url);
        self.run_step(&step, &page, page.goto(url)).await
    }

    /// Current document title
    pub async fn title(&self) -> Result<String> {
        let page = {
            let state = self.state.lock().await;
            Self::require_page(&state)?
        };
        page.title().await
    }

    /// Current URL
    pub async fn current_url(&self) -> Result<String> {
        let page = {
            let state = self.state.lock().await;
            Self::require_page(&state)?
        };
        page.url().await
    }

    /// Lazy handle to all current matches of a selector
    pub async fn find(&self, selector: &str) -> Result<Locator> {
        let page = {
            let state = self.state.lock().await;
            Self::require_page(&state)?
        };
        Ok(Locator {
            selector: selector.to_string(),
            page,
        })
    }

    /// Wait until the first match of a selector becomes visible
    pub async fn wait_for_selector(&self, selector: &str, options: ClickOptions) -> Result<()> {
        let state = self.state.lock().await;
        let page = Self::require_page(&state)?;
        let timeout_ms = options.timeout_ms.unwrap_or(self.config.default_timeout_ms);

        let step = format!("wait {}", selector);
        self.run_step(
            &step,
            &page,
            Self::wrap_action(page.wait_for_selector(selector, timeout_ms), selector, timeout_ms),
        )
        .await
    }

    /// Click the first match of a selector once it is actionable
    pub async fn click(&self, selector: &str, options: ClickOptions) -> Result<()> {
        let state = self.state.lock().await;
        let page = Self::require_page(&state)?;
        let timeout_ms = options.timeout_ms.unwrap_or(self.config.default_timeout_ms);

        let step = format!("click {}", selector);
        self.run_step(
            &step,
            &page,
            Self::wrap_action(page.click(selector, timeout_ms), selector, timeout_ms),
        )
        .await
    }

    /// Type text into the first match of a selector once it is actionable
    pub async fn type_text(&self, selector: &str, text: &str, options: TypeOptions) -> Result<()> {
        let state = self.state.lock().await;
        let page = Self::require_page(&state)?;
        let timeout_ms = options.timeout_ms.unwrap_or(self.config.default_timeout_ms);

        let step = format!("type {}", selector);
        self.run_step(
            &step,
            &page,
            Self::wrap_action(
                page.type_text(selector, text, options.clear, timeout_ms),
                selector,
                timeout_ms,
            ),
        )
        .await
    }

    /// Inspect the first match of a selector, waiting only for "attached"
    ///
    /// Absence within the timeout is a normal `found: false` result.
    pub async fn element_info(&self, selector: &str, options: ClickOptions) -> Result<ElementInfo> {
        let state = self.state.lock().await;
        let page = Self::require_page(&state)?;
        let timeout_ms = options.timeout_ms.unwrap_or(self.config.default_timeout_ms);

        match page.element_snapshot(selector, timeout_ms).await? {
            Some(snapshot) => Ok(ElementInfo::found(selector, snapshot)),
            None => Ok(ElementInfo::not_found(selector)),
        }
    }

    /// Capture a raster image of the current page
    pub async fn screenshot(&self, options: ScreenshotOptions) -> Result<Screenshot> {
        let state = self.state.lock().await;
        let page = Self::require_page(&state)?;

        let step = match &options.path {
            Some(path) => format!("screenshot {}", path.display()),
            None => "screenshot".to_string(),
        };

        self.run_step(&step, &page, async {
            let bytes = page.screenshot(options.full_page).await?;

            let path = match &options.path {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        if !parent.as_os_str().is_empty() {
                            fsutil::ensure_dir(parent).await?;
                        }
                    }
                    tokio::fs::write(path, &bytes).await?;
                    debug!("Screenshot written: {}", path.display());
                    Some(path.clone())
                }
                None => None,
            };

            let data = if options.return_base64 {
                use base64::Engine as _;
                ScreenshotData::Base64(base64::engine::general_purpose::STANDARD.encode(&bytes))
            } else {
                ScreenshotData::Bytes(bytes)
            };

            Ok(Screenshot { path, data })
        })
        .await
    }

    /// Close page, context and engine in that order
    ///
    /// All three handles are cleared even if an intermediate close fails;
    /// the first failure is re-raised after cleanup completes.
    pub async fn quit(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.page.is_none() {
            return Err(Error::NotLaunched);
        }

        let page = state.page.take();
        let context = state.context.take();
        let engine = state.engine.take();

        let mut first_err: Option<Error> = None;

        if let Some(page) = page {
            if let Err(e) = page.close().await {
                first_err.get_or_insert(e);
            }
        }
        if let Some(context) = context {
            if let Err(e) = context.close().await {
                first_err.get_or_insert(e);
            }
        }
        if let Some(engine) = engine {
            if let Err(e) = engine.close().await {
                first_err.get_or_insert(e);
            }
        }

        info!("Browser session closed");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Best-effort idempotent teardown for signal and error paths
    ///
    /// Never returns an error: inner close failures are logged and
    /// swallowed. A re-entrancy flag keeps concurrent invocations from
    /// double-closing; without a session this is a no-op. Unlike
    /// [`SessionManager::quit`] this also clears partial states where only
    /// some handles exist.
    pub async fn shutdown(&self) {
        let (page, context, engine) = {
            let mut state = self.state.lock().await;
            if state.shutting_down {
                debug!("Shutdown already in progress");
                return;
            }
            state.shutting_down = true;
            (state.page.take(), state.context.take(), state.engine.take())
        };

        if page.is_none() && context.is_none() && engine.is_none() {
            self.state.lock().await.shutting_down = false;
            return;
        }

        if let Some(page) = page {
            if let Err(e) = page.close().await {
                warn!("Page close failed during shutdown: {}", e);
            }
        }
        if let Some(context) = context {
            if let Err(e) = context.close().await {
                warn!("Context close failed during shutdown: {}", e);
            }
        }
        if let Some(engine) = engine {
            if let Err(e) = engine.close().await {
                warn!("Engine close failed during shutdown: {}", e);
            }
        }

        self.state.lock().await.shutting_down = false;
        info!("Session shut down");
    }

    /// Delete screenshots matching a simple glob pattern
    ///
    /// Returns the number of files deleted; a missing directory yields 0.
    pub async fn clean_screenshots(&self, pattern: Option<&str>) -> Result<usize> {
        let pattern = pattern.unwrap_or("*.png");
        fsutil::remove_matching(Path::new(&self.config.screenshot_dir), pattern).await
    }

    /// Absolute-or-relative path of the screenshot directory
    pub fn screenshot_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.screenshot_dir)
    }

    fn require_page(state: &SessionState) -> Result<Arc<dyn EnginePage>> {
        state.page.clone().ok_or(Error::NotLaunched)
    }

    /// Translate engine timeouts into action-timeout errors carrying the
    /// selector and deadline, preserving the engine error as the cause.
    async fn wrap_action<F>(op: F, selector: &str, timeout_ms: u64) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        op.await.map_err(|e| match e {
            Error::Timeout(_) => Error::action_timeout(selector, timeout_ms, Some(e)),
            other => other,
        })
    }

    /// Run one page operation with timing, logging and failure capture.
    ///
    /// On failure a full-page screenshot is attempted before the original
    /// error is re-raised; the capture itself is best effort and its own
    /// failures are only logged.
    async fn run_step<T, F>(&self, step: &str, page: &Arc<dyn EnginePage>, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        debug!("Step started: {}", step);

        match op.await {
            Ok(value) => {
                debug!(
                    "Step succeeded: {} ({}ms)",
                    step,
                    started.elapsed().as_millis()
                );
                Ok(value)
            }
            Err(e) => {
                warn!("Step failed: {}: {}", step, e);
                self.capture_failure_artifact(step, page).await;
                Err(e)
            }
        }
    }

    async fn capture_failure_artifact(&self, step: &str, page: &Arc<dyn EnginePage>) {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S");
        let file_name = format!("error-{}-{}.png", timestamp, sanitize_step(step));
        let path = Path::new(&self.config.screenshot_dir).join(file_name);

        let capture = async {
            fsutil::ensure_dir(Path::new(&self.config.screenshot_dir)).await?;
            let bytes = page.screenshot(true).await?;
            tokio::fs::write(&path, &bytes).await?;
            Ok::<(), Error>(())
        };

        match capture.await {
            Ok(()) => info!("Failure screenshot saved: {}", path.display()),
            Err(e) => warn!("Failed to capture failure screenshot: {}", e),
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Replace filename-hostile characters in a step name
fn sanitize_step(step: &str) -> String {
    step.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}
