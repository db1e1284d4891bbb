//! Session option and result value types

use crate::engine::{BoundingBox, ElementSnapshot};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options for launching the browser session
///
/// Unset fields fall back to process-wide configuration. Consumed once at
/// launch, never persisted.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Headless mode override
    pub headless: Option<bool>,
    /// Slow-motion pacing override in milliseconds
    pub slow_mo_ms: Option<u64>,
}

/// Per-call options for click and wait operations
#[derive(Debug, Clone, Default)]
pub struct ClickOptions {
    /// Timeout override in milliseconds
    pub timeout_ms: Option<u64>,
}

/// Per-call options for the type operation
#[derive(Debug, Clone, Default)]
pub struct TypeOptions {
    /// Timeout override in milliseconds
    pub timeout_ms: Option<u64>,
    /// Clear the target's current value before typing
    pub clear: bool,
}

/// Per-call options for the screenshot operation
#[derive(Debug, Clone, Default)]
pub struct ScreenshotOptions {
    /// File path to write the image to; parent directories are created
    pub path: Option<PathBuf>,
    /// Capture the full scrollable height instead of the viewport
    pub full_page: bool,
    /// Return the image as a base64 string instead of raw bytes
    pub return_base64: bool,
}

/// Screenshot payload, raw or base64-encoded
#[derive(Debug, Clone)]
pub enum ScreenshotData {
    Bytes(Vec<u8>),
    Base64(String),
}

/// Result of a screenshot operation
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Where the image was written, if a path was requested
    pub path: Option<PathBuf>,
    /// The captured image
    pub data: ScreenshotData,
}

/// Maximum characters of element text carried in an [`ElementInfo`],
/// ellipsis included
const TEXT_LIMIT: usize = 200;

/// Result of the inspect operation
///
/// Absence of a match is a normal value (`found: false`), never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    pub selector: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<ElementBox>,
}

/// Serialized layout box
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<BoundingBox> for ElementBox {
    fn from(b: BoundingBox) -> Self {
        Self {
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
        }
    }
}

impl ElementInfo {
    /// Build a found result from an engine snapshot, truncating text
    pub fn found(selector: &str, snapshot: ElementSnapshot) -> Self {
        let text = truncate_text(snapshot.text.trim());
        Self {
            selector: selector.to_string(),
            found: true,
            tag: Some(snapshot.tag),
            text: if text.is_empty() { None } else { Some(text) },
            bounding_box: snapshot.bounding_box.map(ElementBox::from),
        }
    }

    /// Build a not-found result
    pub fn not_found(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            found: false,
            tag: None,
            text: None,
            bounding_box: None,
        }
    }
}

/// Cap text at [`TEXT_LIMIT`] characters, replacing the tail with `...`
fn truncate_text(text: &str) -> String {
    let count = text.chars().count();
    if count <= TEXT_LIMIT {
        return text.to_string();
    }
    let mut out: String = text.chars().take(TEXT_LIMIT - 3).collect();
    out.push_str("...");
    out
}
