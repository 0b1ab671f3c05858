//! KST calendar — fixed UTC+9 clock, +7 day target date, weekend day gate.
//!
//! Every scheduling decision is made against a fixed offset computed from the
//! system UTC clock, so the host's local timezone setting never leaks in.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::context::ExecutionMode;

/// Seconds east of UTC for Korea Standard Time.
pub const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Bookings open this many days ahead of the class.
pub const TARGET_DAY_OFFSET: i64 = 7;

const KST: FixedOffset = match FixedOffset::east_opt(KST_OFFSET_SECS) {
    Some(offset) => offset,
    None => panic!("KST offset out of range"),
};

/// The fixed UTC+9 offset.
pub fn kst_offset() -> FixedOffset {
    KST
}

/// Normalize any UTC instant to KST.
pub fn to_kst(instant: DateTime<Utc>) -> DateTime<FixedOffset> {
    instant.with_timezone(&KST)
}

/// Current instant in KST.
pub fn now_kst() -> DateTime<FixedOffset> {
    to_kst(Utc::now())
}

/// The class date a run is booking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// 0 = Sunday .. 6 = Saturday.
    pub weekday: u8,
}

impl TargetDate {
    /// Build from a calendar date. The weekday is always derived from the date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            weekday: date.weekday().num_days_from_sunday() as u8,
        }
    }

    /// `now + offset_days`, in the clock's own offset.
    pub fn from_now(now: DateTime<FixedOffset>, offset_days: i64) -> Self {
        Self::from_date((now + Duration::days(offset_days)).date_naive())
    }

    /// `YYYY-MM-DD`.
    pub fn iso(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    pub fn is_weekend(&self) -> bool {
        self.weekday == 0 || self.weekday == 6
    }

    pub fn weekday_name(&self) -> &'static str {
        match self.weekday {
            0 => "Sunday",
            1 => "Monday",
            2 => "Tuesday",
            3 => "Wednesday",
            4 => "Thursday",
            5 => "Friday",
            _ => "Saturday",
        }
    }
}

impl std::fmt::Display for TargetDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.iso(), self.weekday_name())
    }
}

/// Target date for a run started at `now`: seven days ahead.
pub fn target_date(now: DateTime<FixedOffset>) -> TargetDate {
    TargetDate::from_now(now, TARGET_DAY_OFFSET)
}

/// Signed time left until `target` on a 24h clock.
///
/// A late-evening clock (hour >= 23) paired with a morning target (hour < 12)
/// means the target is tomorrow. Anything else is measured against today, so a
/// target that already went by comes back negative.
pub fn remaining_until(now: DateTime<FixedOffset>, target: NaiveTime) -> Duration {
    let mut remaining = target.signed_duration_since(now.time());
    if now.hour() >= 23 && target.hour() < 12 {
        remaining += Duration::days(1);
    }
    remaining
}

/// The instant a run started at `now` actually acts: the next `target`
/// time-of-day, or `now` itself when the target has already passed.
pub fn opening_instant(now: DateTime<FixedOffset>, target: NaiveTime) -> DateTime<FixedOffset> {
    let remaining = remaining_until(now, target);
    if remaining > Duration::zero() {
        now + remaining
    } else {
        now
    }
}

/// Day gate: should a run started on `current` proceed?
///
/// Checks the *current* weekday. Friday and Saturday runs would target a
/// Saturday or Sunday class a week out, so they are skipped unless the mode
/// bypasses the gate.
pub fn should_run(current: Weekday, mode: ExecutionMode) -> bool {
    if mode.bypasses_day_gate() {
        return true;
    }
    !matches!(current, Weekday::Fri | Weekday::Sat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kst(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        kst_offset().with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_utc_instant_normalized_to_kst() {
        // 15:30 UTC Friday is already 00:30 Saturday in Seoul.
        let utc = Utc.with_ymd_and_hms(2026, 10, 16, 15, 30, 0).unwrap();
        let local = to_kst(utc);
        assert_eq!(local.hour(), 0);
        assert_eq!(local.minute(), 30);
        assert_eq!(local.weekday(), Weekday::Sat);
        assert_eq!(local.offset().local_minus_utc(), KST_OFFSET_SECS);
    }

    #[test]
    fn test_target_date_is_seven_days_ahead() {
        // Monday 2026-10-19
        let target = target_date(kst(2026, 10, 19, 23, 59));
        assert_eq!(target.iso(), "2026-10-26");
        assert_eq!(target.weekday, 1);
        assert_eq!(target.weekday_name(), "Monday");
    }

    #[test]
    fn test_target_date_rolls_over_month_and_year() {
        let target = target_date(kst(2026, 12, 28, 0, 0));
        assert_eq!((target.year, target.month, target.day), (2027, 1, 4));
        assert_eq!(target.weekday, 1);

        let leap = target_date(kst(2028, 2, 25, 12, 0));
        assert_eq!((leap.month, leap.day), (3, 3));
    }

    #[test]
    fn test_weekday_is_recomputed() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let target = TargetDate::from_date(date);
        assert_eq!(target.weekday, 0);
        assert!(target.is_weekend());
    }

    #[test]
    fn test_gate_skips_friday_and_saturday() {
        assert!(!should_run(Weekday::Fri, ExecutionMode::Normal));
        assert!(!should_run(Weekday::Sat, ExecutionMode::Normal));
        assert!(!should_run(Weekday::Sat, ExecutionMode::Immediate));
    }

    #[test]
    fn test_gate_runs_sunday_through_thursday() {
        for day in [Weekday::Sun, Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu] {
            assert!(should_run(day, ExecutionMode::Normal), "{day:?} should run");
        }
    }

    #[test]
    fn test_gate_bypassed_by_forced_and_test() {
        for day in [
            Weekday::Sun, Weekday::Mon, Weekday::Tue, Weekday::Wed,
            Weekday::Thu, Weekday::Fri, Weekday::Sat,
        ] {
            assert!(should_run(day, ExecutionMode::Forced));
            assert!(should_run(day, ExecutionMode::Test));
        }
    }

    #[test]
    fn test_remaining_wraps_past_midnight() {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        let remaining = remaining_until(kst(2026, 10, 18, 23, 58), midnight);
        assert_eq!(remaining, Duration::minutes(2));
    }

    #[test]
    fn test_remaining_negative_once_passed() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let remaining = remaining_until(kst(2026, 10, 18, 9, 5), nine);
        assert_eq!(remaining, Duration::minutes(-5));
        assert_eq!(opening_instant(kst(2026, 10, 18, 9, 5), nine), kst(2026, 10, 18, 9, 5));
    }

    #[test]
    fn test_current_day_gate_matches_target_weekend() {
        // Runs launch just before the midnight opening; 2026-10-18 is a Sunday.
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        for offset in 0..7 {
            let now = kst(2026, 10, 18 + offset, 23, 58);
            let target = target_date(opening_instant(now, midnight));
            assert_eq!(
                should_run(now.weekday(), ExecutionMode::Normal),
                !target.is_weekend(),
                "mismatch for {}",
                now.date_naive()
            );
        }
    }

    #[test]
    fn test_sunday_run_is_not_skipped() {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        let now = kst(2026, 10, 18, 23, 55);
        assert_eq!(now.weekday(), Weekday::Sun);
        assert!(should_run(now.weekday(), ExecutionMode::Normal));
        let target = target_date(opening_instant(now, midnight));
        assert_eq!(target.weekday_name(), "Monday");
        assert_eq!(target.iso(), "2026-10-26");
    }
}
