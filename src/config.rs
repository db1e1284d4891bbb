//! Configuration management for PagePilot

use crate::{Error, Result};
use serde::Deserialize;
use std::env;

/// Which engine backend drives the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Real Chromium engine over the DevTools protocol
    Chromium,
    /// In-process mock engine for hermetic tests
    Mock,
}

/// Process-wide configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run the browser without a visible window
    pub headless: bool,

    /// Artificial delay between engine actions in milliseconds
    pub slow_mo_ms: u64,

    /// Default timeout for page operations in milliseconds
    pub default_timeout_ms: u64,

    /// Directory where screenshots (including failure artifacts) are written
    pub screenshot_dir: String,

    /// Log level
    pub log_level: String,

    /// Chrome executable path
    pub chrome_path: Option<String>,

    /// Engine backend selection
    pub engine: EngineKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            headless: false,
            slow_mo_ms: 0,
            default_timeout_ms: 30000,
            screenshot_dir: "./screenshots".to_string(),
            log_level: "info".to_string(),
            chrome_path: None,
            engine: EngineKind::Chromium,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(headless) = env::var("PAGEPILOT_HEADLESS") {
            config.headless = headless
                .parse()
                .map_err(|_| Error::configuration("Invalid PAGEPILOT_HEADLESS"))?;
        }

        if let Ok(slow_mo) = env::var("PAGEPILOT_SLOW_MO") {
            config.slow_mo_ms = slow_mo
                .parse()
                .map_err(|_| Error::configuration("Invalid PAGEPILOT_SLOW_MO"))?;
        }

        if let Ok(timeout) = env::var("PAGEPILOT_DEFAULT_TIMEOUT") {
            config.default_timeout_ms = timeout
                .parse()
                .map_err(|_| Error::configuration("Invalid PAGEPILOT_DEFAULT_TIMEOUT"))?;
        }

        if let Ok(dir) = env::var("PAGEPILOT_SCREENSHOT_DIR") {
            config.screenshot_dir = dir;
        }

        if let Ok(log_level) = env::var("PAGEPILOT_LOG_LEVEL") {
            config.log_level = log_level;
        }

        if let Ok(chrome_path) = env::var("PAGEPILOT_CHROME_PATH") {
            config.chrome_path = Some(chrome_path);
        }

        if let Ok(engine) = env::var("PAGEPILOT_ENGINE") {
            config.engine = match engine.to_lowercase().as_str() {
                "chromium" => EngineKind::Chromium,
                "mock" => EngineKind::Mock,
                _ => return Err(Error::configuration("Invalid PAGEPILOT_ENGINE")),
            };
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }
}
