//! Common test utilities
//!
//! Shared fixtures for the integration tests: mock-engine session
//! managers with isolated screenshot directories and data-URL test pages.

use pagepilot::config::{Config, EngineKind};
use pagepilot::session::{LaunchOptions, SessionManager};
use std::sync::Arc;

/// Config wired to the mock engine and a short default timeout
pub fn test_config(screenshot_dir: &std::path::Path) -> Config {
    Config {
        headless: true,
        default_timeout_ms: 1000,
        screenshot_dir: screenshot_dir.to_string_lossy().to_string(),
        engine: EngineKind::Mock,
        ..Default::default()
    }
}

/// Session manager over the mock engine; the TempDir must stay alive for
/// the duration of the test
pub fn setup_manager() -> (Arc<SessionManager>, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let manager = Arc::new(SessionManager::mock(test_config(tmp.path())));
    (manager, tmp)
}

/// Launch a session with default options
pub async fn launch(manager: &Arc<SessionManager>) {
    manager
        .launch(LaunchOptions::default())
        .await
        .expect("Failed to launch session");
}

/// Get test HTML content
pub fn get_test_html() -> String {
    r#"
<!DOCTYPE html>
<html>
<head>
    <title>Test Page</title>
</head>
<body>
    <h1 id="title">Hello World</h1>
    <button id="click-me">Click Me</button>
    <input id="text-input" type="text" />
</body>
</html>
    "#
    .to_string()
}

/// Create a simple test page URL
pub fn get_test_url() -> String {
    "data:text/html;charset=utf-8,".to_string() + &urlencoding::encode(&get_test_html())
}
