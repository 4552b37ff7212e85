//! Unbounded retry with fixed backoff
//!
//! The loop never gives up on a lookup or a delivery: transient failures
//! (network loss, an unreachable relay) only delay progress. [`RetryRunner`]
//! turns that policy into a capability that can be tested without real
//! delays by injecting a [`Sleeper`].

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::Result;

/// Source of timed waits
///
/// Production code uses [`TokioSleeper`]; tests substitute a sleeper that
/// records the requested durations and returns immediately.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs an operation until it succeeds
#[derive(Clone)]
pub struct RetryRunner {
    backoff: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryRunner {
    /// Create a runner that waits `backoff` between attempts
    pub fn new(backoff: Duration) -> Self {
        Self::with_sleeper(backoff, Arc::new(TokioSleeper))
    }

    /// Create a runner with a custom sleeper
    pub fn with_sleeper(backoff: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { backoff, sleeper }
    }

    /// The configured backoff
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Call `operation` until it returns `Ok`
    ///
    /// Every failure is logged at `warn` with the attempt number, followed by
    /// a wait of the configured backoff. There is no attempt limit, so this
    /// only ever returns a success.
    ///
    /// # Parameters
    ///
    /// - `operation_name`: Name used in log fields (e.g. "resolve")
    /// - `operation`: Produces a fresh future for each attempt
    pub async fn run_until_success<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> T
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut attempt: u64 = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            operation = operation_name,
                            attempts = attempt,
                            "Operation succeeded after retrying"
                        );
                    }
                    return value;
                }
                Err(e) => {
                    warn!(
                        operation = operation_name,
                        component = e.component(),
                        attempt,
                        error = %e,
                        "Operation failed, retrying in {:?}",
                        self.backoff
                    );
                    self.sleeper.sleep(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for RetryRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryRunner")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingSleeper {
        waits: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
        }
    }

    #[tokio::test]
    async fn test_returns_first_success_without_waiting() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let runner = RetryRunner::with_sleeper(Duration::from_secs(60), sleeper.clone());

        let value = runner.run_until_success("op", || async { Ok(7) }).await;

        assert_eq!(value, 7);
        assert!(sleeper.waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retries_until_success_with_backoff() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let runner = RetryRunner::with_sleeper(Duration::from_secs(60), sleeper.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let value = runner
            .run_until_success("op", || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 5 {
                        Err(Error::lookup("network unreachable"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(
            *sleeper.waits.lock().unwrap(),
            vec![Duration::from_secs(60); 5]
        );
    }
}
