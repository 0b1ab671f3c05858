//! Precise waiter — holds the run until the opening time-of-day.
//!
//! Coarse 60 s sleeps while more than two minutes remain, two 30 s sleeps
//! down to the last minute, then 2 s / 1 s / 200 ms steps. Remaining time is
//! re-derived from the clock after every sleep, so drift never accumulates.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime};
use serde::Serialize;

use classbook_core::calendar::remaining_until;

use crate::clock::Clock;

const COARSE_STEP: Duration = Duration::from_secs(60);
const COARSE_FLOOR: Duration = Duration::from_secs(120);
const MEDIUM_STEP: Duration = Duration::from_secs(30);
const MEDIUM_SLEEPS: usize = 2;
const FINE_FLOOR: Duration = Duration::from_secs(60);

/// Why the wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitKind {
    /// Immediate mode: no wait at all.
    Immediate,
    /// Target time already passed; go now.
    AlreadyPassed,
    /// Target further away than the wait budget; go now.
    BeyondBudget,
    /// Slept until the target instant.
    Reached,
    /// Budget ran out mid-wait (clock jump); go now.
    BudgetExhausted,
}

impl WaitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitKind::Immediate => "immediate",
            WaitKind::AlreadyPassed => "already_passed",
            WaitKind::BeyondBudget => "beyond_budget",
            WaitKind::Reached => "reached",
            WaitKind::BudgetExhausted => "budget_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitReport {
    pub kind: WaitKind,
    pub started_at: DateTime<FixedOffset>,
    /// When the wait released the caller.
    pub actual_start: DateTime<FixedOffset>,
    pub waited: Duration,
}

impl WaitReport {
    fn finish<C: Clock + ?Sized>(clock: &C, kind: WaitKind, started_at: DateTime<FixedOffset>) -> Self {
        let actual_start = clock.now();
        let waited = (actual_start - started_at).to_std().unwrap_or_default();
        Self {
            kind,
            started_at,
            actual_start,
            waited,
        }
    }

    pub fn waited_ms(&self) -> u64 {
        u64::try_from(self.waited.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Block until `target` (KST time-of-day), never longer than `max_wait`.
pub async fn wait_until<C: Clock + ?Sized>(
    clock: &C,
    target: NaiveTime,
    max_wait: Duration,
    immediate: bool,
) -> WaitReport {
    let started_at = clock.now();
    if immediate {
        tracing::info!("⚡ Immediate mode: skipping wait");
        return WaitReport::finish(clock, WaitKind::Immediate, started_at);
    }

    let remaining = remaining_until(started_at, target);
    let Ok(remaining) = remaining.to_std() else {
        tracing::info!("⏰ Target {target} already passed; starting now");
        return WaitReport::finish(clock, WaitKind::AlreadyPassed, started_at);
    };
    if remaining.is_zero() {
        return WaitReport::finish(clock, WaitKind::AlreadyPassed, started_at);
    }
    if remaining > max_wait {
        tracing::info!(
            "⏰ Target {target} is {}s away, beyond the {}s budget; starting now",
            remaining.as_secs(),
            max_wait.as_secs()
        );
        return WaitReport::finish(clock, WaitKind::BeyondBudget, started_at);
    }

    tracing::info!("⏳ Waiting {:.1}s for {target}", remaining.as_secs_f64());
    let left = |clock: &C| remaining_until(clock.now(), target).to_std().unwrap_or_default();
    let over_budget = |clock: &C| (clock.now() - started_at).to_std().unwrap_or_default() > max_wait;

    // Coarse
    loop {
        let remaining = left(clock);
        if remaining <= COARSE_FLOOR {
            break;
        }
        clock.sleep(COARSE_STEP.min(remaining - COARSE_FLOOR)).await;
        if over_budget(clock) {
            return WaitReport::finish(clock, WaitKind::BudgetExhausted, started_at);
        }
        tracing::debug!("⏳ {}s to go", left(clock).as_secs());
    }

    // Medium
    for _ in 0..MEDIUM_SLEEPS {
        let remaining = left(clock);
        if remaining <= FINE_FLOOR {
            break;
        }
        clock.sleep(MEDIUM_STEP.min(remaining - FINE_FLOOR)).await;
    }

    // Fine
    loop {
        let remaining = left(clock);
        if remaining.is_zero() {
            break;
        }
        let step = if remaining > Duration::from_secs(30) {
            Duration::from_secs(2)
        } else if remaining > Duration::from_secs(10) {
            Duration::from_secs(1)
        } else {
            Duration::from_millis(200)
        };
        clock.sleep(step.min(remaining)).await;
        if over_budget(clock) {
            return WaitReport::finish(clock, WaitKind::BudgetExhausted, started_at);
        }
    }

    let report = WaitReport::finish(clock, WaitKind::Reached, started_at);
    tracing::info!("🚀 Target {target} reached at {}", report.actual_start.format("%H:%M:%S%.3f"));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use classbook_core::kst_offset;

    fn at(d: u32, h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
        kst_offset().with_ymd_and_hms(2026, 10, d, h, m, s).unwrap()
    }

    fn midnight() -> NaiveTime {
        NaiveTime::from_hms_opt(0, 0, 0).unwrap()
    }

    const BUDGET: Duration = Duration::from_secs(10 * 60);

    #[tokio::test]
    async fn test_immediate_returns_without_wait() {
        let clock = ManualClock::at(at(19, 23, 55, 0));
        let report = wait_until(&clock, midnight(), BUDGET, true).await;
        assert_eq!(report.kind, WaitKind::Immediate);
        assert_eq!(report.waited, Duration::ZERO);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_beyond_budget_returns_without_sleeping() {
        let clock = ManualClock::at(at(19, 23, 30, 0));
        let report = wait_until(&clock, midnight(), BUDGET, false).await;
        assert_eq!(report.kind, WaitKind::BeyondBudget);
        assert_eq!(report.waited, Duration::ZERO);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_passed_target_proceeds_now() {
        let clock = ManualClock::at(at(20, 0, 5, 0));
        let report = wait_until(&clock, midnight(), BUDGET, false).await;
        assert_eq!(report.kind, WaitKind::AlreadyPassed);
        assert!(clock.sleeps().is_empty());

        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let clock = ManualClock::at(at(20, 9, 0, 0));
        assert_eq!(wait_until(&clock, nine, BUDGET, false).await.kind, WaitKind::AlreadyPassed);
    }

    #[tokio::test]
    async fn test_tiered_wait_across_midnight() {
        let clock = ManualClock::at(at(19, 23, 55, 0));
        let report = wait_until(&clock, midnight(), BUDGET, false).await;

        assert_eq!(report.kind, WaitKind::Reached);
        assert_eq!(report.actual_start, at(20, 0, 0, 0));
        assert_eq!(report.waited, Duration::from_secs(300));
        assert_eq!(clock.total_slept(), Duration::from_secs(300));

        let sleeps = clock.sleeps();
        let secs = |n: u64| Duration::from_secs(n);
        assert_eq!(&sleeps[..5], &[secs(60), secs(60), secs(60), secs(30), secs(30)]);
        // 15 × 2s down to 30s, 20 × 1s down to 10s, 50 × 200ms to zero.
        assert_eq!(sleeps.len(), 5 + 15 + 20 + 50);
        assert!(sleeps[5..20].iter().all(|d| *d == secs(2)));
        assert!(sleeps[20..40].iter().all(|d| *d == secs(1)));
        assert!(sleeps[40..].iter().all(|d| *d == Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn test_short_wait_uses_fine_steps_only() {
        let clock = ManualClock::at(at(19, 23, 59, 45));
        let report = wait_until(&clock, midnight(), BUDGET, false).await;
        assert_eq!(report.kind, WaitKind::Reached);
        assert_eq!(report.waited, Duration::from_secs(15));
        assert!(clock.sleeps().iter().all(|d| *d <= Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_never_sleeps_past_budget() {
        let clock = ManualClock::at(at(19, 21, 57, 0));
        let target = NaiveTime::from_hms_opt(22, 0, 0).unwrap();
        let report = wait_until(&clock, target, Duration::from_secs(180), false).await;
        assert_eq!(report.kind, WaitKind::Reached);
        assert!(report.waited <= Duration::from_secs(180));
        assert_eq!(&clock.sleeps()[..3], &[
            Duration::from_secs(60),
            Duration::from_secs(30),
            Duration::from_secs(30),
        ]);
    }
}
