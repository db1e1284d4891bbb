//! Integration tests for session management
//!
//! Lifecycle preconditions, idempotent teardown, failure artifacts and
//! screenshot housekeeping, all against the mock engine.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::config::{Config, EngineKind};
use crate::engine::mock::MockBrowser;
use crate::engine::{EngineBrowser, EngineContext, EngineLaunchOptions, EngineLauncher};
use crate::session::manager::SessionManager;
use crate::session::options::{
    ClickOptions, LaunchOptions, ScreenshotData, ScreenshotOptions, TypeOptions,
};
use crate::Error;

/// Manager wired to the mock engine and a temp screenshot directory.
/// The TempDir must outlive the manager.
fn create_test_manager() -> (SessionManager, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let config = Config {
        headless: true,
        default_timeout_ms: 500,
        screenshot_dir: tmp.path().to_string_lossy().to_string(),
        engine: EngineKind::Mock,
        ..Default::default()
    };
    (SessionManager::mock(config), tmp)
}

async fn launched_manager() -> (SessionManager, tempfile::TempDir) {
    let (manager, tmp) = create_test_manager();
    manager
        .launch(LaunchOptions::default())
        .await
        .expect("Failed to launch");
    (manager, tmp)
}

fn list_files(dir: &std::path::Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_launch_and_quit_lifecycle() {
    let (manager, _tmp) = create_test_manager();
    assert!(!manager.is_launched().await);

    manager.launch(LaunchOptions::default()).await.unwrap();
    assert!(manager.is_launched().await);

    manager.quit().await.unwrap();
    assert!(!manager.is_launched().await);
}

#[tokio::test]
async fn test_second_launch_rejected_and_session_untouched() {
    let (manager, _tmp) = launched_manager().await;
    manager.navigate("https://example.com").await.unwrap();

    let result = manager.launch(LaunchOptions::default()).await;
    assert!(matches!(result, Err(Error::AlreadyLaunched)));

    // Original session still serves operations
    assert!(manager.is_launched().await);
    assert_eq!(manager.current_url().await.unwrap(), "https://example.com");
}

#[tokio::test]
async fn test_operations_require_launch() {
    let (manager, _tmp) = create_test_manager();

    assert!(matches!(
        manager.navigate("https://example.com").await,
        Err(Error::NotLaunched)
    ));
    assert!(matches!(manager.title().await, Err(Error::NotLaunched)));
    assert!(matches!(
        manager.current_url().await,
        Err(Error::NotLaunched)
    ));
    assert!(matches!(
        manager.find("a").await,
        Err(Error::NotLaunched)
    ));
    assert!(matches!(
        manager.click("a", ClickOptions::default()).await,
        Err(Error::NotLaunched)
    ));
    assert!(matches!(
        manager.screenshot(ScreenshotOptions::default()).await,
        Err(Error::NotLaunched)
    ));
    assert!(matches!(manager.quit().await, Err(Error::NotLaunched)));
}

#[tokio::test]
async fn test_operations_rejected_after_quit() {
    let (manager, _tmp) = launched_manager().await;
    manager.quit().await.unwrap();

    assert!(matches!(
        manager.navigate("https://example.com").await,
        Err(Error::NotLaunched)
    ));
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let (manager, _tmp) = launched_manager().await;

    manager.shutdown().await;
    assert!(!manager.is_launched().await);

    // Sequential repeat is a no-op
    manager.shutdown().await;

    // Concurrent invocations never panic or double-close
    let manager = Arc::new(manager);
    manager.launch(LaunchOptions::default()).await.unwrap();
    let a = {
        let m = manager.clone();
        tokio::spawn(async move { m.shutdown().await })
    };
    let b = {
        let m = manager.clone();
        tokio::spawn(async move { m.shutdown().await })
    };
    a.await.unwrap();
    b.await.unwrap();
    assert!(!manager.is_launched().await);
}

#[tokio::test]
async fn test_shutdown_without_session_is_noop() {
    let (manager, _tmp) = create_test_manager();
    manager.shutdown().await;
    assert!(!manager.is_launched().await);
}

#[tokio::test]
async fn test_relaunch_after_shutdown() {
    let (manager, _tmp) = launched_manager().await;
    manager.shutdown().await;

    manager.launch(LaunchOptions::default()).await.unwrap();
    assert!(manager.is_launched().await);
}

#[tokio::test]
async fn test_navigate_and_reads() {
    let (manager, _tmp) = launched_manager().await;

    manager.navigate("https://example.com").await.unwrap();
    assert_eq!(manager.title().await.unwrap(), "Example Domain");
    assert_eq!(manager.current_url().await.unwrap(), "https://example.com");
}

#[tokio::test]
async fn test_find_is_lazy() {
    let (manager, _tmp) = launched_manager().await;

    // No navigation yet: the locator builds fine, and only counting
    // observes the empty document.
    let locator = manager.find("#missing-forever").await.unwrap();
    assert_eq!(locator.selector(), "#missing-forever");
    assert_eq!(locator.count().await.unwrap(), 0);
    assert!(!locator.exists().await.unwrap());

    manager.navigate("https://example.com").await.unwrap();
    let locator = manager.find("a").await.unwrap();
    assert!(locator.exists().await.unwrap());
}

#[tokio::test]
async fn test_element_info_found() {
    let (manager, _tmp) = launched_manager().await;
    manager.navigate("https://example.com").await.unwrap();

    let info = manager
        .element_info("a", ClickOptions::default())
        .await
        .unwrap();
    assert!(info.found);
    assert_eq!(info.tag.as_deref(), Some("a"));
    assert!(info.bounding_box.is_some());
}

#[tokio::test]
async fn test_element_info_absence_is_not_an_error() {
    let (manager, _tmp) = launched_manager().await;
    manager.navigate("https://example.com").await.unwrap();

    let started = Instant::now();
    let info = manager
        .element_info(
            "#missing",
            ClickOptions {
                timeout_ms: Some(200),
            },
        )
        .await
        .unwrap();

    assert!(!info.found);
    assert!(info.tag.is_none());
    // Bounded by the requested timeout, with scheduling slack
    assert!(started.elapsed().as_millis() < 2000);
}

#[tokio::test]
async fn test_wait_for_selector() {
    let (manager, _tmp) = launched_manager().await;
    manager.navigate("https://example.com").await.unwrap();

    manager
        .wait_for_selector("h1", ClickOptions::default())
        .await
        .unwrap();

    let result = manager
        .wait_for_selector(
            "#never-appears",
            ClickOptions {
                timeout_ms: Some(100),
            },
        )
        .await;
    assert!(matches!(result, Err(Error::ActionTimeout { .. })));
}

#[tokio::test]
async fn test_click_and_type() {
    let (manager, _tmp) = launched_manager().await;
    manager.navigate("https://example.com").await.unwrap();

    manager
        .click("#click-me", ClickOptions::default())
        .await
        .unwrap();
    manager
        .type_text(
            "#text-input",
            "hello",
            TypeOptions {
                timeout_ms: None,
                clear: true,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failed_click_wraps_timeout_with_context() {
    let (manager, _tmp) = launched_manager().await;
    manager.navigate("https://example.com").await.unwrap();

    let result = manager
        .click(
            "#missing",
            ClickOptions {
                timeout_ms: Some(100),
            },
        )
        .await;

    match result {
        Err(Error::ActionTimeout {
            selector,
            timeout_ms,
            source,
        }) => {
            assert_eq!(selector, "#missing");
            assert_eq!(timeout_ms, 100);
            assert!(source.is_some());
        }
        other => panic!("Expected ActionTimeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_step_captures_exactly_one_artifact() {
    let (manager, tmp) = launched_manager().await;
    manager.navigate("https://example.com").await.unwrap();

    let result = manager
        .click(
            "#missing",
            ClickOptions {
                timeout_ms: Some(100),
            },
        )
        .await;
    assert!(result.is_err());

    let artifacts: Vec<String> = list_files(tmp.path())
        .into_iter()
        .filter(|name| name.starts_with("error-") && name.ends_with(".png"))
        .collect();
    assert_eq!(artifacts.len(), 1);
    assert!(artifacts[0].contains("click"));
}

#[tokio::test]
async fn test_screenshot_to_file_and_base64() {
    let (manager, tmp) = launched_manager().await;
    manager.navigate("https://example.com").await.unwrap();

    let target = tmp.path().join("nested").join("smoke.png");
    let shot = manager
        .screenshot(ScreenshotOptions {
            path: Some(target.clone()),
            full_page: false,
            return_base64: false,
        })
        .await
        .unwrap();

    assert_eq!(shot.path.as_deref(), Some(target.as_path()));
    assert!(target.exists());
    assert!(matches!(shot.data, ScreenshotData::Bytes(ref b) if !b.is_empty()));

    let shot = manager
        .screenshot(ScreenshotOptions {
            path: None,
            full_page: true,
            return_base64: true,
        })
        .await
        .unwrap();
    assert!(shot.path.is_none());
    assert!(matches!(shot.data, ScreenshotData::Base64(ref s) if !s.is_empty()));
}

#[tokio::test]
async fn test_clean_screenshots_round_trip() {
    let (manager, tmp) = launched_manager().await;

    for name in ["one.png", "two.png", "three.png"] {
        std::fs::write(tmp.path().join(name), b"png").unwrap();
    }
    for name in ["notes.txt", "keep.jpg"] {
        std::fs::write(tmp.path().join(name), b"other").unwrap();
    }

    let deleted = manager.clean_screenshots(None).await.unwrap();
    assert_eq!(deleted, 3);

    let remaining = list_files(tmp.path());
    assert!(remaining.contains(&"notes.txt".to_string()));
    assert!(remaining.contains(&"keep.jpg".to_string()));
}

#[tokio::test]
async fn test_clean_screenshots_missing_dir() {
    let config = Config {
        screenshot_dir: "/nonexistent/pagepilot-shots".to_string(),
        engine: EngineKind::Mock,
        ..Default::default()
    };
    let manager = SessionManager::mock(config);

    let deleted = manager.clean_screenshots(None).await.unwrap();
    assert_eq!(deleted, 0);
}

/// Launcher whose browser cannot create a context, for unwind coverage
#[derive(Debug)]
struct BadContextLauncher;

#[derive(Debug)]
struct BadContextBrowser {
    inner: MockBrowser,
}

#[async_trait]
impl EngineLauncher for BadContextLauncher {
    async fn launch(
        &self,
        _options: &EngineLaunchOptions,
    ) -> Result<Arc<dyn EngineBrowser>, Error> {
        Ok(Arc::new(BadContextBrowser {
            inner: MockBrowser::new(),
        }))
    }
}

#[async_trait]
impl EngineBrowser for BadContextBrowser {
    async fn new_context(&self) -> Result<Arc<dyn EngineContext>, Error> {
        Err(Error::engine("Context creation refused"))
    }

    async fn close(&self) -> Result<(), Error> {
        self.inner.close().await
    }
}

#[tokio::test]
async fn test_failed_launch_leaves_no_partial_session() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        screenshot_dir: tmp.path().to_string_lossy().to_string(),
        ..Default::default()
    };
    let manager = SessionManager::new(config, Arc::new(BadContextLauncher));

    let result = manager.launch(LaunchOptions::default()).await;
    assert!(matches!(result, Err(Error::Engine(_))));
    assert!(!manager.is_launched().await);

    // The failed attempt does not poison the precondition check
    assert!(matches!(
        manager.navigate("https://example.com").await,
        Err(Error::NotLaunched)
    ));
}
