//! Runtime abstraction
//!
//! TigerStyle: Explicit runtime seam for timers and task spawning.
//!
//! The cluster never calls `tokio::spawn` or `tokio::time::sleep` directly on
//! its lifecycle paths; it goes through a [`Runtime`] so the membership watcher
//! and the shutdown drain can be driven by a different executor.
//!
//! ```text
//! Cluster<RT> ---> Runtime (trait) <--- TokioRuntime (wall clock)
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Longest sleep any runtime will honour (1 hour)
pub const RUNTIME_SLEEP_MS_MAX: u64 = 60 * 60 * 1000;

/// JoinHandle for spawned tasks
pub type JoinHandle<T> = Pin<Box<dyn Future<Output = Result<T, JoinError>> + Send>>;

/// Error from joining a task
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("task panicked")]
    Panicked,
    #[error("task cancelled")]
    Cancelled,
}

/// Runtime abstraction trait
///
/// Not dyn-safe because of `spawn`'s generic parameter; components are
/// generic over `RT: Runtime` instead.
#[async_trait::async_trait]
pub trait Runtime: Send + Sync + Clone + 'static {
    /// Sleep for a duration
    ///
    /// Preconditions:
    /// - duration must be <= `RUNTIME_SLEEP_MS_MAX`
    async fn sleep(&self, duration: Duration);

    /// Spawn a task that runs concurrently with the caller
    fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static;
}

// =============================================================================
// TokioRuntime
// =============================================================================

/// Production runtime backed by tokio
#[derive(Debug, Clone, Default)]
pub struct TokioRuntime;

#[async_trait::async_trait]
impl Runtime for TokioRuntime {
    async fn sleep(&self, duration: Duration) {
        assert!(
            duration <= Duration::from_millis(RUNTIME_SLEEP_MS_MAX),
            "sleep duration too long (>1 hour)"
        );
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = tokio::spawn(future);
        Box::pin(async move {
            handle.await.map_err(|e| {
                if e.is_panic() {
                    JoinError::Panicked
                } else {
                    JoinError::Cancelled
                }
            })
        })
    }
}
