//! Booking outcomes and the persisted run record.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::calendar::TargetDate;
use crate::context::{ExecutionContext, ExecutionMode};

/// What one booking attempt ended in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BookingOutcome {
    Booked,
    Waitlisted,
    AlreadyBooked { was_waiting: bool },
    Unavailable,
    ConflictDetected,
    TimeoutDetected,
    NotFound,
    Failed { reason: String },
}

impl BookingOutcome {
    /// Confirmed states that end the retry loop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Booked | Self::Waitlisted | Self::AlreadyBooked { .. } | Self::Unavailable
        )
    }

    /// Persisted status for a run that ended in this outcome.
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Booked => RunStatus::Success,
            Self::Waitlisted => RunStatus::Waiting,
            Self::AlreadyBooked { was_waiting: false } => RunStatus::AlreadyBooked,
            Self::AlreadyBooked { was_waiting: true } => RunStatus::AlreadyWaiting,
            Self::Unavailable => RunStatus::Unavailable,
            _ => RunStatus::Failed,
        }
    }
}

impl std::fmt::Display for BookingOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Booked => write!(f, "booking completed"),
            Self::Waitlisted => write!(f, "joined the waitlist"),
            Self::AlreadyBooked { was_waiting: false } => write!(f, "slot already reserved"),
            Self::AlreadyBooked { was_waiting: true } => write!(f, "already on the waitlist"),
            Self::Unavailable => write!(f, "slot full, no waitlist offered"),
            Self::ConflictDetected => write!(f, "simultaneous request conflict"),
            Self::TimeoutDetected => write!(f, "site reported a timeout"),
            Self::NotFound => write!(f, "slot not found"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Persisted status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Waiting,
    AlreadyBooked,
    AlreadyWaiting,
    Unavailable,
    WeekendSkip,
    Failed,
    Test,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Waiting => "WAITING",
            Self::AlreadyBooked => "ALREADY_BOOKED",
            Self::AlreadyWaiting => "ALREADY_WAITING",
            Self::Unavailable => "UNAVAILABLE",
            Self::WeekendSkip => "WEEKEND_SKIP",
            Self::Failed => "FAILED",
            Self::Test => "TEST",
        }
    }

    /// Process exit code for a run that ended here.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Failed => 1,
            _ => 0,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final record of one run. Built once, written once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub timestamp: DateTime<FixedOffset>,
    /// Target class date, `YYYY-MM-DD`.
    pub date: String,
    pub target_weekday: String,
    #[serde(rename = "class")]
    pub class_time: String,
    pub status: RunStatus,
    pub message: String,
    pub retry_count: u32,
    pub booking_success: bool,
    pub is_waiting_reservation: bool,
    pub mode: ExecutionMode,
    pub target_time: String,
    pub attempts: u32,
    #[serde(default)]
    pub waited_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
}

impl RunResult {
    fn base(
        ctx: &ExecutionContext,
        timestamp: DateTime<FixedOffset>,
        target: &TargetDate,
        status: RunStatus,
        message: String,
    ) -> Self {
        Self {
            timestamp,
            date: target.iso(),
            target_weekday: target.weekday_name().to_string(),
            class_time: ctx.slot_label.clone(),
            status,
            message,
            retry_count: 0,
            booking_success: false,
            is_waiting_reservation: false,
            mode: ctx.mode,
            target_time: ctx.target_time.format("%H:%M:%S").to_string(),
            attempts: 0,
            waited_ms: 0,
            wait_kind: None,
            verification: None,
        }
    }

    /// Friday/Saturday short-circuit.
    pub fn weekend_skip(ctx: &ExecutionContext, target: &TargetDate) -> Self {
        let message = format!(
            "Skipped: run started on {} would book a weekend class ({})",
            ctx.current_weekday(),
            target
        );
        Self::base(ctx, ctx.now, target, RunStatus::WeekendSkip, message)
    }

    /// A run whose retry loop ended in `outcome`.
    pub fn from_outcome(
        ctx: &ExecutionContext,
        timestamp: DateTime<FixedOffset>,
        target: &TargetDate,
        outcome: &BookingOutcome,
        retry_count: u32,
        attempts: u32,
    ) -> Self {
        let status = outcome.status();
        let mut result = Self::base(ctx, timestamp, target, status, outcome.to_string());
        result.retry_count = retry_count;
        result.attempts = attempts;
        result.booking_success = matches!(
            status,
            RunStatus::Success | RunStatus::Waiting | RunStatus::AlreadyBooked | RunStatus::AlreadyWaiting
        );
        result.is_waiting_reservation = matches!(status, RunStatus::Waiting | RunStatus::AlreadyWaiting);
        result
    }

    /// Dry-run record: what was observed, nothing clicked.
    pub fn test_observation(
        ctx: &ExecutionContext,
        timestamp: DateTime<FixedOffset>,
        target: &TargetDate,
        observed: &str,
        retry_count: u32,
        attempts: u32,
    ) -> Self {
        let mut result = Self::base(
            ctx,
            timestamp,
            target,
            RunStatus::Test,
            format!("Test run, no booking made. Observed: {observed}"),
        );
        result.retry_count = retry_count;
        result.attempts = attempts;
        result
    }

    pub fn with_wait(mut self, kind: impl Into<String>, waited_ms: u64) -> Self {
        self.wait_kind = Some(kind.into());
        self.waited_ms = waited_ms;
        self
    }

    pub fn with_verification(mut self, verification: impl Into<String>) -> Self {
        self.verification = Some(verification.into());
        self
    }

    pub fn exit_code(&self) -> u8 {
        self.status.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{kst_offset, target_date};
    use crate::config::AppConfig;
    use chrono::TimeZone;

    fn ctx() -> ExecutionContext {
        let now = kst_offset().with_ymd_and_hms(2026, 10, 19, 23, 58, 0).unwrap();
        ExecutionContext::new(now, &AppConfig::default()).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(BookingOutcome::Booked.status(), RunStatus::Success);
        assert_eq!(BookingOutcome::Waitlisted.status(), RunStatus::Waiting);
        assert_eq!(
            BookingOutcome::AlreadyBooked { was_waiting: true }.status(),
            RunStatus::AlreadyWaiting
        );
        assert_eq!(BookingOutcome::Unavailable.status(), RunStatus::Unavailable);
        assert_eq!(BookingOutcome::ConflictDetected.status(), RunStatus::Failed);
        assert_eq!(RunStatus::Failed.exit_code(), 1);
        assert_eq!(RunStatus::WeekendSkip.exit_code(), 0);
    }

    #[test]
    fn test_terminal_outcomes() {
        assert!(BookingOutcome::Unavailable.is_terminal());
        assert!(BookingOutcome::AlreadyBooked { was_waiting: false }.is_terminal());
        assert!(!BookingOutcome::ConflictDetected.is_terminal());
        assert!(!BookingOutcome::NotFound.is_terminal());
    }

    #[test]
    fn test_json_shape() {
        let ctx = ctx();
        let target = target_date(ctx.now);
        let result = RunResult::from_outcome(&ctx, ctx.now, &target, &BookingOutcome::Waitlisted, 1, 2);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "WAITING");
        assert_eq!(json["class"], "09:30");
        assert_eq!(json["retryCount"], 1);
        assert_eq!(json["bookingSuccess"], true);
        assert_eq!(json["isWaitingReservation"], true);
        assert_eq!(json["date"], "2026-10-26");
        assert!(json.get("verification").is_none());
    }

    #[test]
    fn test_json_round_trip_preserves_fields() {
        let ctx = ctx();
        let target = target_date(ctx.now);
        let original = RunResult::weekend_skip(&ctx, &target)
            .with_wait("immediate", 0)
            .with_verification("skipped");
        let json = serde_json::to_string_pretty(&original).unwrap();
        let parsed: RunResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.status, RunStatus::WeekendSkip);
        assert!(json.contains("\"WEEKEND_SKIP\""));
    }

    #[test]
    fn test_outcome_tagging() {
        let json = serde_json::to_string(&BookingOutcome::AlreadyBooked { was_waiting: true }).unwrap();
        assert_eq!(json, r#"{"kind":"already_booked","was_waiting":true}"#);
    }
}
