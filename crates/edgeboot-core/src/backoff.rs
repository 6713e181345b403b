// Bounded exponential polling: start small, double each step up to a cap,
// give up at an overall deadline. Uses tokio's clock so paused-time tests
// run instantly.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max_step: Duration,
    pub deadline: Duration,
}

impl Backoff {
    pub const fn new(initial: Duration, max_step: Duration, deadline: Duration) -> Self {
        Self {
            initial,
            max_step,
            deadline,
        }
    }

    /// Run `probe` until it yields `Some` or the deadline passes.
    ///
    /// The probe always runs at least once, and once more at the deadline.
    pub async fn poll<T, F, Fut>(&self, mut probe: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let start = Instant::now();
        let mut step = self.initial;
        loop {
            if let Some(value) = probe().await {
                return Some(value);
            }
            let elapsed = start.elapsed();
            if elapsed >= self.deadline {
                return None;
            }
            tokio::time::sleep(step.min(self.deadline - elapsed)).await;
            step = step.saturating_mul(2).min(self.max_step);
        }
    }
}
