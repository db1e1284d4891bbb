//! Unified error types for PagePilot

use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for PagePilot
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation required a launched session
    #[error("Browser session not launched")]
    NotLaunched,

    /// `launch` was called while a session is already active
    #[error("Browser session already launched")]
    AlreadyLaunched,

    /// An element-targeting operation ran out of time waiting for its
    /// target to become actionable
    #[error("Timed out after {timeout_ms}ms waiting for selector \"{selector}\"")]
    ActionTimeout {
        selector: String,
        timeout_ms: u64,
        #[source]
        source: Option<Box<Error>>,
    },

    /// Generic timeout
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Navigation failed
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// Browser engine errors
    #[error("Engine error: {0}")]
    Engine(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Protocol-level error (malformed traffic from the wire)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new engine error
    pub fn engine<S: Into<String>>(msg: S) -> Self {
        Error::Engine(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a new navigation failed error
    pub fn navigation_failed<S: Into<String>>(msg: S) -> Self {
        Error::NavigationFailed(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Wrap an engine failure with the selector and timeout it was
    /// operating under, preserving the original error as the cause.
    pub fn action_timeout(selector: &str, timeout_ms: u64, source: Option<Error>) -> Self {
        Error::ActionTimeout {
            selector: selector.to_string(),
            timeout_ms,
            source: source.map(Box::new),
        }
    }

    /// Whether this error means the session was never launched.
    ///
    /// The protocol layer uses this to emit launch-first guidance instead
    /// of a generic internal error. Classification is by variant, never by
    /// message inspection.
    pub fn is_not_launched(&self) -> bool {
        matches!(self, Error::NotLaunched)
    }
}
