//! # PagePilot 服务入口
//!
//! 行分隔 JSON-RPC 工具服务器的入口点，通过标准输入/输出与调用方通信，
//! 向 AI 代理暴露浏览器自动化工具。
//!
//! ## 主要功能
//! - 初始化配置与日志（日志只写入标准错误流，协议独占标准输出）
//! - 按配置选择 Chromium 或 Mock 引擎后端
//! - 将操作系统信号接入关闭协调器，保证会话清理后按约定退出码退出
//!
//! ## 架构
//! 服务由以下核心组件构成：
//! - **引擎层**: 对浏览器控制引擎的抽象（Chromium / Mock）
//! - **会话管理**: 单一浏览器会话的生命周期与页面操作
//! - **协议服务**: JSON-RPC 请求的并发分发与串行输出
//! - **关闭协调器**: 幂等的进程级清理与限时强制退出
//!
//! ## 环境变量
//! - `PAGEPILOT_HEADLESS`: 无头模式（默认: false）
//! - `PAGEPILOT_DEFAULT_TIMEOUT`: 默认操作超时毫秒数（默认: 30000）
//! - `PAGEPILOT_SCREENSHOT_DIR`: 截图目录（默认: ./screenshots）
//! - `PAGEPILOT_ENGINE`: 引擎后端 chromium|mock（默认: chromium）
//! - `PAGEPILOT_CONFIG`: TOML 配置文件路径（可选）

use std::sync::Arc;

use anyhow::Context;
use pagepilot::config::{Config, EngineKind};
use pagepilot::engine::{ChromiumLauncher, EngineLauncher, MockLauncher};
use pagepilot::server::ProtocolServer;
use pagepilot::session::SessionManager;
use pagepilot::shutdown::{ShutdownCoordinator, ShutdownReason};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    // Load configuration before logging so the log level can come from it
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return 1;
        }
    };

    // Diagnostics go to stderr only; stdout is reserved for protocol
    // responses.
    let log_level = config
        .log_level
        .parse::<Level>()
        .unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to install log subscriber");
    }

    info!("PagePilot Server v{}", pagepilot::VERSION);

    let launcher: Arc<dyn EngineLauncher> = match config.engine {
        EngineKind::Chromium => Arc::new(ChromiumLauncher::new()),
        EngineKind::Mock => Arc::new(MockLauncher::new()),
    };
    let session = Arc::new(SessionManager::new(config, launcher));
    let coordinator = Arc::new(ShutdownCoordinator::default());
    info!("Session manager initialized");

    // Wire OS signal delivery to the coordinator
    {
        let session = session.clone();
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let reason = wait_for_signal().await;
            let cleanup = async {
                session.shutdown().await;
                Ok(())
            };
            if let Some(code) = coordinator.trigger(reason, cleanup).await {
                std::process::exit(code);
            }
        });
    }

    let server = Arc::new(ProtocolServer::new(session.clone()));
    info!("Serving line-delimited JSON-RPC on stdio");

    let outcome = server.run(tokio::io::stdin(), tokio::io::stdout()).await;

    let reason = match outcome {
        Ok(()) => {
            info!("Input stream closed, shutting down");
            ShutdownReason::Completed
        }
        Err(e) => {
            error!("Protocol server failed: {}", e);
            ShutdownReason::Fault
        }
    };

    let cleanup = async {
        session.shutdown().await;
        Ok(())
    };
    match coordinator.trigger(reason, cleanup).await {
        Some(code) => code,
        None => {
            // A signal-triggered shutdown already owns the exit; park
            // until it terminates the process.
            std::future::pending::<()>().await;
            unreachable!()
        }
    }
}

fn load_config() -> anyhow::Result<Config> {
    match std::env::var("PAGEPILOT_CONFIG") {
        Ok(path) => {
            Config::from_file(&path).with_context(|| format!("Failed to load config from {}", path))
        }
        Err(_) => Config::from_env().context("Failed to read PAGEPILOT_* environment"),
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> ShutdownReason {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM signal");
            ShutdownReason::Terminate
        }
        _ = sigint.recv() => {
            info!("Received SIGINT signal");
            ShutdownReason::Interrupt
        }
    }
}

#[cfg(windows)]
async fn wait_for_signal() -> ShutdownReason {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl+C signal");
    ShutdownReason::Interrupt
}
