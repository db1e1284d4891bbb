//! # 会话管理层
//!
//! 管理单个浏览器会话的完整生命周期，所有调用方（脚本与协议服务器）共享
//! 同一个会话对象。
//!
//! ## 主要功能
//! - **生命周期**: launch / quit / shutdown，严格的状态转换
//! - **页面操作**: 导航、查找、点击、输入、截图、等待
//! - **失败工件**: 操作失败时自动捕获全页截图，便于排查
//! - **并发安全**: 所有修改会话状态的操作通过单个异步互斥锁串行执行
//!
//! ## 核心概念
//! - **SessionState**: 引擎、上下文、页面三元组，作为原子单元创建和销毁
//! - **Locator**: 惰性元素句柄，构造时不访问引擎
//!
//! ## 模块结构
//! - `manager`: 会话管理器实现
//! - `options`: 操作选项与结果值类型

pub mod manager;
pub mod options;

#[cfg(test)]
pub mod tests;

pub use manager::{Locator, SessionManager};
pub use options::{
    ClickOptions, ElementBox, ElementInfo, LaunchOptions, Screenshot, ScreenshotData,
    ScreenshotOptions, TypeOptions,
};
