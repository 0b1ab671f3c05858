//! Time source + sleep, so waits can be driven by a virtual clock in tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant in KST.
    fn now(&self) -> DateTime<FixedOffset>;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock + tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        classbook_core::now_kst()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` returns at once and moves time forward.
#[cfg(test)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<FixedOffset>>,
    sleeps: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn at(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
            sleeps: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[cfg(test)]
#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        let step = chrono::Duration::from_std(duration).unwrap();
        *self.now.lock().unwrap() += step;
    }
}
