//! PagePilot: single-session browser automation core
//!
//! This library exposes browser-automation primitives (launch, navigate,
//! find, click, type, screenshot, quit) through one shared session object
//! to two consumers: test scripts using [`session::SessionManager`]
//! directly, and agents speaking line-delimited JSON-RPC against
//! [`server::ProtocolServer`].

pub mod config;
pub mod error;
pub mod fsutil;

pub mod client;
pub mod engine;
pub mod server;
pub mod session;
pub mod shutdown;

// Re-exports
pub use error::{Error, Result};

/// PagePilot library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
