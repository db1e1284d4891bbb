//! Process-wide shutdown coordination
//!
//! A small explicit state machine (Running → ShuttingDown → Terminated)
//! driven by abstract termination reasons. The binary entry point wires OS
//! signal delivery to [`ShutdownCoordinator::trigger`]; the coordinator
//! itself never touches real signals, so every path is testable in-process.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info};

/// Grace period the cleanup callback gets before the process is forced out
pub const DEFAULT_GRACE: Duration = Duration::from_millis(5000);

/// Why the process is going down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Interrupt signal (Ctrl+C)
    Interrupt,
    /// Termination signal
    Terminate,
    /// Uncaught fault or rejection outside request handling
    Fault,
    /// Normal completion (input stream exhausted)
    Completed,
}

impl ShutdownReason {
    /// Exit code this reason maps to when cleanup succeeds
    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownReason::Interrupt => 130,
            ShutdownReason::Terminate => 0,
            ShutdownReason::Fault => 1,
            ShutdownReason::Completed => 0,
        }
    }
}

/// Coordinator lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownState {
    Running,
    ShuttingDown,
    Terminated,
}

/// Process-wide shutdown coordinator
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: Mutex<ShutdownState>,
    grace: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE)
    }
}

impl ShutdownCoordinator {
    /// Create a coordinator with the given force-exit grace period
    pub fn new(grace: Duration) -> Self {
        Self {
            state: Mutex::new(ShutdownState::Running),
            grace,
        }
    }

    /// Whether teardown has begun
    pub fn is_shutdown_in_progress(&self) -> bool {
        *self.state.lock().unwrap() != ShutdownState::Running
    }

    /// Handle a termination request.
    ///
    /// Returns `None` if a shutdown is already in progress (duplicate and
    /// overlapping triggers are ignored), otherwise the exit code the
    /// process should terminate with: the reason's own code on clean
    /// teardown or when the grace period forces the issue, `1` when the
    /// cleanup callback fails.
    pub async fn trigger<F>(&self, reason: ShutdownReason, cleanup: F) -> Option<i32>
    where
        F: Future<Output = crate::Result<()>>,
    {
        {
            let mut state = self.state.lock().unwrap();
            if *state != ShutdownState::Running {
                return None;
            }
            *state = ShutdownState::ShuttingDown;
        }

        info!("Shutdown triggered: {:?}", reason);

        let code = tokio::select! {
            result = cleanup => match result {
                Ok(()) => reason.exit_code(),
                Err(e) => {
                    error!("Cleanup failed during shutdown: {}", e);
                    1
                }
            },
            _ = tokio::time::sleep(self.grace) => {
                error!(
                    "Cleanup exceeded {}ms grace period, forcing exit",
                    self.grace.as_millis()
                );
                reason.exit_code()
            }
        };

        *self.state.lock().unwrap() = ShutdownState::Terminated;
        info!("Shutdown complete, exit code {}", code);
        Some(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_exit_code_table() {
        assert_eq!(ShutdownReason::Interrupt.exit_code(), 130);
        assert_eq!(ShutdownReason::Terminate.exit_code(), 0);
        assert_eq!(ShutdownReason::Fault.exit_code(), 1);
        assert_eq!(ShutdownReason::Completed.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_clean_shutdown_uses_reason_code() {
        let coordinator = ShutdownCoordinator::default();
        assert!(!coordinator.is_shutdown_in_progress());

        let code = coordinator
            .trigger(ShutdownReason::Interrupt, async { Ok(()) })
            .await;
        assert_eq!(code, Some(130));
        assert!(coordinator.is_shutdown_in_progress());
    }

    #[tokio::test]
    async fn test_cleanup_failure_exits_one() {
        let coordinator = ShutdownCoordinator::default();
        let code = coordinator
            .trigger(ShutdownReason::Terminate, async {
                Err(Error::internal("teardown broke"))
            })
            .await;
        assert_eq!(code, Some(1));
    }

    #[tokio::test]
    async fn test_duplicate_trigger_ignored() {
        let coordinator = Arc::new(ShutdownCoordinator::default());
        let runs = Arc::new(AtomicUsize::new(0));

        let first = {
            let runs = runs.clone();
            coordinator.trigger(ShutdownReason::Terminate, async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
        .await;
        assert_eq!(first, Some(0));

        let second = {
            let runs = runs.clone();
            coordinator.trigger(ShutdownReason::Interrupt, async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
        .await;
        assert_eq!(second, None);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hung_cleanup_is_forced_out() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let code = coordinator
            .trigger(ShutdownReason::Terminate, async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        assert_eq!(code, Some(0));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_overlapping_triggers_resolve_once() {
        let coordinator = Arc::new(ShutdownCoordinator::default());

        let a = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.trigger(ShutdownReason::Terminate, async { Ok(()) }).await })
        };
        let b = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.trigger(ShutdownReason::Interrupt, async { Ok(()) }).await })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        // Exactly one trigger wins; the other is ignored
        assert!(a.is_some() ^ b.is_some());
    }
}
