use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Elapsed run time and the only suspension point outside remote calls.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time since the run started.
    fn elapsed(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
