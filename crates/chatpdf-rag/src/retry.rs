//! Injectable sleeping for bounded retry loops
//!
//! Retry loops (generation backoff, index lock acquisition, embedding rate
//! limiting) never call `tokio::time::sleep` directly; they go through a
//! [`Sleeper`] so tests can observe the schedule without waiting.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Suspends the current task for a duration
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer. Only the calling task is suspended.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Records requested delays and returns immediately
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }

    /// Sum of all requested delays
    pub fn total(&self) -> Duration {
        self.delays.lock().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}

/// Shared default sleeper
pub fn tokio_sleeper() -> Arc<dyn Sleeper> {
    Arc::new(TokioSleeper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sleeper_keeps_order() {
        let sleeper = RecordingSleeper::new();
        tokio_test::block_on(async {
            sleeper.sleep(Duration::from_millis(300)).await;
            sleeper.sleep(Duration::from_secs(2)).await;
        });

        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(300), Duration::from_secs(2)]
        );
        assert_eq!(sleeper.total(), Duration::from_millis(2300));
    }

    #[tokio::test]
    async fn test_tokio_sleeper_skips_zero() {
        let start = std::time::Instant::now();
        TokioSleeper.sleep(Duration::ZERO).await;
        TokioSleeper.sleep(Duration::from_millis(5)).await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
