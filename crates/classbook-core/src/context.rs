//! Execution context — everything a run needs to know, fixed at startup.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::calendar::{self, TargetDate};
use crate::config::AppConfig;
use crate::error::{ClassbookError, Result};

/// How a run treats the day gate, the wait, and the booking click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Gate on weekday, wait for the opening, book.
    #[default]
    Normal,
    /// Ignore the weekday gate.
    Forced,
    /// Ignore the gate and never click: observe the slot and record `TEST`.
    Test,
    /// Gate on weekday but skip the wait.
    Immediate,
}

impl ExecutionMode {
    pub fn bypasses_day_gate(&self) -> bool {
        matches!(self, Self::Forced | Self::Test)
    }

    pub fn skips_wait(&self) -> bool {
        matches!(self, Self::Immediate)
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::Test)
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Forced => write!(f, "forced"),
            Self::Test => write!(f, "test"),
            Self::Immediate => write!(f, "immediate"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = ClassbookError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "normal" => Ok(Self::Normal),
            "forced" | "force" => Ok(Self::Forced),
            "test" => Ok(Self::Test),
            "immediate" | "now" => Ok(Self::Immediate),
            other => Err(ClassbookError::Config(format!("Unknown execution mode: '{other}'"))),
        }
    }
}

/// Immutable per-run context, built once from configuration.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Process start, in KST.
    pub now: DateTime<FixedOffset>,
    pub mode: ExecutionMode,
    /// Skip the precise wait (immediate mode or the immediate toggle).
    pub skip_wait: bool,
    pub debug: bool,
    pub target_day_offset: i64,
    pub target_time: NaiveTime,
    pub max_wait_minutes: u64,
    pub max_retries: u32,
    /// Time label of the class row, e.g. `09:30`.
    pub slot_label: String,
}

impl ExecutionContext {
    pub fn new(now: DateTime<FixedOffset>, config: &AppConfig) -> Result<Self> {
        Ok(Self {
            now,
            mode: config.mode,
            skip_wait: config.immediate || config.mode.skips_wait(),
            debug: config.debug,
            target_day_offset: config.schedule.day_offset,
            target_time: config.schedule.target_time()?,
            max_wait_minutes: config.schedule.max_wait_minutes,
            max_retries: config.retry.max_retries,
            slot_label: config.schedule.slot_label.clone(),
        })
    }

    pub fn current_weekday(&self) -> Weekday {
        self.now.weekday()
    }

    /// Day gate decision for this run.
    pub fn should_run(&self) -> bool {
        calendar::should_run(self.current_weekday(), self.mode)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_minutes * 60)
    }

    /// Target class date for a booking that starts at `instant`.
    pub fn target_date_at(&self, instant: DateTime<FixedOffset>) -> TargetDate {
        TargetDate::from_now(instant, self.target_day_offset)
    }

    /// Target date assuming the run acts at the next opening.
    pub fn projected_target(&self) -> TargetDate {
        let opening = if self.skip_wait {
            self.now
        } else {
            calendar::opening_instant(self.now, self.target_time)
        };
        self.target_date_at(opening)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("".parse::<ExecutionMode>().unwrap(), ExecutionMode::Normal);
        assert_eq!("FORCED".parse::<ExecutionMode>().unwrap(), ExecutionMode::Forced);
        assert_eq!("test".parse::<ExecutionMode>().unwrap(), ExecutionMode::Test);
        assert_eq!(" immediate ".parse::<ExecutionMode>().unwrap(), ExecutionMode::Immediate);
        assert!("weekly".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn test_context_from_defaults() {
        let now = calendar::kst_offset()
            .with_ymd_and_hms(2026, 10, 20, 23, 57, 0)
            .unwrap();
        let ctx = ExecutionContext::new(now, &AppConfig::default()).unwrap();
        assert_eq!(ctx.mode, ExecutionMode::Normal);
        assert!(!ctx.skip_wait);
        assert_eq!(ctx.slot_label, "09:30");
        assert_eq!(ctx.target_day_offset, 7);
        assert!(ctx.should_run());
        // Tuesday 23:57 opens Wednesday 00:00, one week later is 2026-10-28.
        assert_eq!(ctx.projected_target().iso(), "2026-10-28");
    }

    #[test]
    fn test_immediate_toggle_skips_wait() {
        let mut config = AppConfig::default();
        config.immediate = true;
        let now = calendar::kst_offset()
            .with_ymd_and_hms(2026, 10, 20, 14, 0, 0)
            .unwrap();
        let ctx = ExecutionContext::new(now, &config).unwrap();
        assert!(ctx.skip_wait);
        assert_eq!(ctx.projected_target().iso(), "2026-10-27");
    }
}
