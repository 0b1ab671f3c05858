//! Retry controller — bounded attempt loop with outcome-dependent backoff.
//!
//! Each attempt gets its own browser session, closed before the next one
//! opens. Conflicts back off by a random delay so clients racing for the same
//! slot fall out of step.

use std::time::Duration;

use rand::Rng;

use classbook_browser::{AttemptEnd, BookingAttempt, SessionFactory};
use classbook_core::calendar::TargetDate;
use classbook_core::config::RetryConfig;
use classbook_core::{BookingOutcome, Credentials, ExecutionContext, RunResult};

use crate::clock::Clock;

/// Backoff between attempts. The attempt budget is the context's
/// `max_retries`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub conflict_jitter_min: Duration,
    pub conflict_jitter_max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            conflict_jitter_min: Duration::from_millis(config.conflict_jitter_min_ms),
            conflict_jitter_max: Duration::from_millis(config.conflict_jitter_max_ms),
        }
    }

    /// Delay before retrying after `outcome`.
    pub fn delay_for(&self, outcome: &BookingOutcome) -> Duration {
        match outcome {
            BookingOutcome::ConflictDetected => {
                let min = millis(self.conflict_jitter_min);
                let max = millis(self.conflict_jitter_max).max(min);
                Duration::from_millis(rand::thread_rng().gen_range(min..=max))
            }
            _ => self.base_delay,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Runs booking attempts until one settles or the budget is spent.
pub struct RetryController<'a> {
    factory: &'a dyn SessionFactory,
    attempt: &'a BookingAttempt,
    clock: &'a dyn Clock,
    policy: RetryPolicy,
}

impl<'a> RetryController<'a> {
    pub fn new(
        factory: &'a dyn SessionFactory,
        attempt: &'a BookingAttempt,
        clock: &'a dyn Clock,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            factory,
            attempt,
            clock,
            policy,
        }
    }

    pub async fn run(
        &self,
        ctx: &ExecutionContext,
        credentials: &Credentials,
        target: &TargetDate,
    ) -> RunResult {
        let max = ctx.max_retries.max(1);
        let dry_run = ctx.mode.is_dry_run();
        let mut retry_count = 0;
        let mut attempts = 0;
        let mut last = BookingOutcome::Failed {
            reason: "no attempt made".into(),
        };

        while retry_count < max {
            attempts += 1;
            tracing::info!("🎯 Attempt {attempts}/{max} for {} {}", target.iso(), ctx.slot_label);

            match self.attempt_once(credentials, target, dry_run).await {
                Ok((AttemptEnd::Observed(slot), _)) => {
                    tracing::info!("🧪 Test run observed: {}", slot.describe());
                    return RunResult::test_observation(
                        ctx,
                        self.clock.now(),
                        target,
                        &slot.describe(),
                        retry_count,
                        attempts,
                    );
                }
                Ok((AttemptEnd::Settled(outcome), verification)) if outcome.is_terminal() => {
                    tracing::info!("✅ {outcome} after {attempts} attempt(s)");
                    return RunResult::from_outcome(ctx, self.clock.now(), target, &outcome, retry_count, attempts)
                        .with_verification(verification.to_string());
                }
                Ok((AttemptEnd::Settled(outcome), _)) => last = outcome,
                Err(outcome) => last = outcome,
            }

            retry_count += 1;
            if retry_count >= max {
                break;
            }
            let delay = self.policy.delay_for(&last);
            tracing::warn!(
                "🔁 {last}; retry {retry_count}/{} in {}ms",
                max - 1,
                delay.as_millis()
            );
            self.clock.sleep(delay).await;
        }

        tracing::error!("❌ Giving up after {attempts} attempt(s): {last}");
        let failed = BookingOutcome::Failed {
            reason: format!("gave up after {attempts} attempt(s), last: {last}"),
        };
        RunResult::from_outcome(ctx, self.clock.now(), target, &failed, retry_count, attempts)
    }

    /// One attempt in its own session. The session is closed on every path.
    async fn attempt_once(
        &self,
        credentials: &Credentials,
        target: &TargetDate,
        dry_run: bool,
    ) -> Result<(AttemptEnd, classbook_browser::Verification), BookingOutcome> {
        let mut driver = self.factory.open().await.map_err(|e| {
            tracing::warn!("⚠️ Could not open browser session: {e}");
            BookingOutcome::Failed {
                reason: format!("session: {e}"),
            }
        })?;

        let result = self
            .attempt
            .run(driver.as_mut(), credentials, target, dry_run)
            .await;

        if let Err(e) = driver.close().await {
            tracing::debug!("Session close failed: {e}");
        }

        result
            .map(|report| (report.end, report.verification))
            .map_err(|e| e.outcome())
    }
}
