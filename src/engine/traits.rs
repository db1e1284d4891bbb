//! Engine layer traits
//!
//! Abstract interfaces over the browser-control engine. The session layer
//! only ever talks to these traits; the real Chromium backend and the mock
//! backend both implement them.

use async_trait::async_trait;
use std::sync::Arc;

/// Options applied when launching an engine instance
#[derive(Debug, Clone)]
pub struct EngineLaunchOptions {
    /// Headless mode (no GUI)
    pub headless: bool,
    /// Artificial delay between actions in milliseconds
    pub slow_mo_ms: u64,
    /// Browser executable path override
    pub executable_path: Option<String>,
}

impl Default for EngineLaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            slow_mo_ms: 0,
            executable_path: None,
        }
    }
}

/// Fixed viewport applied to every new page
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// A DOM snapshot of the first element matching a selector
#[derive(Debug, Clone)]
pub struct ElementSnapshot {
    /// Lower-cased tag name
    pub tag: String,
    /// Raw text content (untruncated)
    pub text: String,
    /// Layout box, absent for detached/invisible elements
    pub bounding_box: Option<BoundingBox>,
}

/// Element bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Engine launcher trait
///
/// Produces engine instances. The session manager holds one of these so
/// tests can swap in the mock backend.
#[async_trait]
pub trait EngineLauncher: Send + Sync + std::fmt::Debug {
    /// Launch a browser process
    async fn launch(
        &self,
        options: &EngineLaunchOptions,
    ) -> Result<Arc<dyn EngineBrowser>, crate::Error>;
}

/// Engine browser trait
///
/// Represents a running browser process.
#[async_trait]
pub trait EngineBrowser: Send + Sync + std::fmt::Debug {
    /// Create a fresh isolated browsing context
    async fn new_context(&self) -> Result<Arc<dyn EngineContext>, crate::Error>;

    /// Close the browser process
    async fn close(&self) -> Result<(), crate::Error>;
}

/// Engine context trait
///
/// Represents an isolated storage/cookie universe inside the browser.
#[async_trait]
pub trait EngineContext: Send + Sync + std::fmt::Debug {
    /// Open a page with the given viewport
    async fn new_page(&self, viewport: Viewport) -> Result<Arc<dyn EnginePage>, crate::Error>;

    /// Close the context and any pages it owns
    async fn close(&self) -> Result<(), crate::Error>;
}

/// Engine page trait
///
/// Represents the single active document view. Element-targeting operations
/// block internally until the target is actionable or the timeout elapses.
#[async_trait]
pub trait EnginePage: Send + Sync + std::fmt::Debug {
    /// Install the default timeout applied to operations without an
    /// explicit one (navigation waits included)
    fn set_default_timeout(&self, timeout_ms: u64);

    /// Navigate and wait until the DOM is parsed (not full load)
    async fn goto(&self, url: &str) -> Result<(), crate::Error>;

    /// Current document title
    async fn title(&self) -> Result<String, crate::Error>;

    /// Current URL
    async fn url(&self) -> Result<String, crate::Error>;

    /// Number of elements currently matching a selector; no waiting
    async fn query_count(&self, selector: &str) -> Result<usize, crate::Error>;

    /// Wait until the first match becomes visible
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64)
        -> Result<(), crate::Error>;

    /// Snapshot the first matching element, waiting only for "attached".
    ///
    /// `Ok(None)` means no element matched within the timeout.
    async fn element_snapshot(
        &self,
        selector: &str,
        timeout_ms: u64,
    ) -> Result<Option<ElementSnapshot>, crate::Error>;

    /// Click the first match once it is actionable
    async fn click(&self, selector: &str, timeout_ms: u64) -> Result<(), crate::Error>;

    /// Type text into the first match once it is actionable
    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        clear: bool,
        timeout_ms: u64,
    ) -> Result<(), crate::Error>;

    /// Capture a raster image of the page
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, crate::Error>;

    /// Close the page
    async fn close(&self) -> Result<(), crate::Error>;
}
