//! Booking engine — one process start, one recorded result.
//! Day gate → precise wait → retry loop → result file.

use std::sync::Arc;

use classbook_browser::{BookingAttempt, SessionFactory};
use classbook_core::{Credentials, ExecutionContext, RunResult};

use crate::clock::Clock;
use crate::retry::{RetryController, RetryPolicy};
use crate::store::ResultStore;
use crate::waiter::wait_until;

/// Owns everything a run needs; [`BookingEngine::run`] consumes nothing and
/// can only be meaningfully called once per process.
pub struct BookingEngine {
    ctx: ExecutionContext,
    credentials: Credentials,
    factory: Arc<dyn SessionFactory>,
    clock: Arc<dyn Clock>,
    attempt: BookingAttempt,
    policy: RetryPolicy,
    store: ResultStore,
}

impl BookingEngine {
    pub fn new(
        ctx: ExecutionContext,
        credentials: Credentials,
        factory: Arc<dyn SessionFactory>,
        clock: Arc<dyn Clock>,
        attempt: BookingAttempt,
        policy: RetryPolicy,
        store: ResultStore,
    ) -> Self {
        Self {
            ctx,
            credentials,
            factory,
            clock,
            attempt,
            policy,
            store,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Run the whole flow and persist the result.
    pub async fn run(&self) -> RunResult {
        let ctx = &self.ctx;
        tracing::info!(
            "📅 Run started {} ({}), mode={}, slot {}",
            ctx.now.format("%Y-%m-%d %H:%M:%S"),
            ctx.current_weekday(),
            ctx.mode,
            ctx.slot_label
        );

        if !ctx.should_run() {
            let target = ctx.projected_target();
            tracing::info!("🏖️ {} run would book {target}; skipping", ctx.current_weekday());
            let result = RunResult::weekend_skip(ctx, &target);
            self.record(&result);
            return result;
        }

        let wait = wait_until(self.clock.as_ref(), ctx.target_time, ctx.max_wait(), ctx.skip_wait).await;
        let target = ctx.target_date_at(wait.actual_start);
        tracing::info!("🏋️ Booking the {} class on {target}", ctx.slot_label);

        let result = RetryController::new(
            self.factory.as_ref(),
            &self.attempt,
            self.clock.as_ref(),
            self.policy.clone(),
        )
        .run(ctx, &self.credentials, &target)
        .await
        .with_wait(wait.kind.as_str(), wait.waited_ms());

        self.record(&result);
        result
    }

    fn record(&self, result: &RunResult) {
        match self.store.save(result) {
            Ok(path) => tracing::info!("💾 {} → {}", result.status, path.display()),
            Err(e) => tracing::warn!("⚠️ Failed to save result: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{DateTime, FixedOffset, TimeZone};
    use classbook_browser::AttemptConfig;
    use classbook_browser::scripted::{Script, ScriptedFactory};
    use classbook_core::config::SnapshotPolicy;
    use classbook_core::{AppConfig, ExecutionMode, RunStatus, kst_offset};
    use std::time::Duration;

    struct Harness {
        engine: BookingEngine,
        factory: Arc<ScriptedFactory>,
        clock: Arc<ManualClock>,
        _dir: tempfile::TempDir,
    }

    fn kst(d: u32, h: u32, m: u32) -> DateTime<FixedOffset> {
        kst_offset().with_ymd_and_hms(2026, 10, d, h, m, 0).unwrap()
    }

    fn harness(now: DateTime<FixedOffset>, mode: ExecutionMode, scripts: Vec<Script>) -> Harness {
        let mut config = AppConfig::default();
        config.mode = mode;
        let ctx = ExecutionContext::new(now, &config).unwrap();

        let mut attempt = AttemptConfig::from_app(&config);
        attempt.login_url = "https://gym.example/login".into();
        attempt.booking_url = "https://gym.example/reserve".into();
        attempt.dialog_wait = Duration::from_millis(1);
        attempt.followup_dialog_wait = Duration::from_millis(1);
        attempt.snapshot_policy = SnapshotPolicy::Off;

        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path(), config.results.file_for(mode));
        let factory = Arc::new(ScriptedFactory::new(scripts));
        let clock = Arc::new(ManualClock::at(now));
        let engine = BookingEngine::new(
            ctx,
            Credentials {
                username: "member01".into(),
                password: "pw".into(),
            },
            factory.clone(),
            clock.clone(),
            BookingAttempt::new(attempt),
            RetryPolicy::from_config(&config.retry),
            store,
        );
        Harness {
            engine,
            factory,
            clock,
            _dir: dir,
        }
    }

    fn booked() -> Script {
        Script::slot("Book now").after_submit(&["Booking complete"])
    }

    #[tokio::test]
    async fn test_friday_and_saturday_skip_without_browser() {
        // 2026-10-23 is a Friday, 2026-10-24 a Saturday.
        for day in [23, 24] {
            let h = harness(kst(day, 23, 55), ExecutionMode::Normal, vec![booked()]);
            let result = h.engine.run().await;
            assert_eq!(result.status, RunStatus::WeekendSkip);
            assert_eq!(result.exit_code(), 0);
            assert_eq!(h.factory.sessions_opened(), 0);
            assert!(h.factory.calls().is_empty());
            assert!(h.clock.sleeps().is_empty());

            let saved = h.engine.store.load().unwrap().unwrap();
            assert_eq!(saved.status, RunStatus::WeekendSkip);
        }
    }

    #[tokio::test]
    async fn test_forced_friday_books() {
        let h = harness(kst(23, 23, 58), ExecutionMode::Forced, vec![booked()]);
        let result = h.engine.run().await;
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(h.factory.sessions_opened(), 1);
    }

    #[tokio::test]
    async fn test_sunday_night_waits_then_books_next_monday_class() {
        let h = harness(kst(18, 23, 58), ExecutionMode::Normal, vec![booked()]);
        let result = h.engine.run().await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.date, "2026-10-26");
        assert_eq!(result.target_weekday, "Monday");
        assert_eq!(result.wait_kind.as_deref(), Some("reached"));
        assert_eq!(result.waited_ms, 120_000);
        assert_eq!(h.clock.total_slept(), Duration::from_secs(120));

        let saved = h.engine.store.load().unwrap().unwrap();
        assert_eq!(saved, result);
    }

    #[tokio::test]
    async fn test_immediate_mode_skips_wait() {
        let h = harness(kst(20, 14, 0), ExecutionMode::Immediate, vec![booked()]);
        let result = h.engine.run().await;
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.wait_kind.as_deref(), Some("immediate"));
        assert_eq!(result.waited_ms, 0);
        assert_eq!(result.date, "2026-10-27");
    }

    #[tokio::test]
    async fn test_test_mode_writes_test_file() {
        let h = harness(kst(24, 23, 59), ExecutionMode::Test, vec![Script::slot("Join waitlist")]);
        let result = h.engine.run().await;
        assert_eq!(result.status, RunStatus::Test);
        assert!(h.engine.store.path().ends_with("test-booking-result.json"));
        assert_eq!(h.engine.store.load().unwrap().unwrap().status, RunStatus::Test);
    }

    #[tokio::test]
    async fn test_failed_run_is_recorded() {
        let conflict = Script::slot("Book now").after_submit(&["Simultaneous request"]);
        let h = harness(kst(20, 10, 0), ExecutionMode::Immediate, vec![conflict]);
        let result = h.engine.run().await;
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.exit_code(), 1);
        assert_eq!(result.retry_count, 3);
        assert_eq!(h.engine.store.load().unwrap().unwrap().status, RunStatus::Failed);
    }
}
