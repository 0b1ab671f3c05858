//! Outcome classifier — maps dialog text and slot cell text to outcomes.
//!
//! All matching is case-insensitive substring matching against the keyword
//! tables in [`PhraseConfig`].

use classbook_core::BookingOutcome;
use classbook_core::config::PhraseConfig;

/// Something the page showed us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSignal {
    /// Modal / alert text.
    Dialog(String),
    /// Text of the target slot's action cell.
    ActionCell(String),
    /// The target slot row does not exist.
    NoSlotRow,
}

/// Result of classifying one dialog. Every dialog is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogVerdict {
    Classified(BookingOutcome),
    /// No rule matched; accept and move on.
    Informational,
}

/// State of the slot's action cell before anything is clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    AlreadyBooked { was_waiting: bool },
    /// Click, then submit the booking form.
    BookNow,
    /// Click; accepting the dialog finishes it.
    JoinWaitlist,
    Unavailable,
    Unrecognized(String),
}

impl SlotState {
    pub fn describe(&self) -> String {
        match self {
            SlotState::AlreadyBooked { was_waiting: false } => "already reserved".into(),
            SlotState::AlreadyBooked { was_waiting: true } => "already waitlisted".into(),
            SlotState::BookNow => "open for booking".into(),
            SlotState::JoinWaitlist => "full, waitlist open".into(),
            SlotState::Unavailable => "full, no waitlist".into(),
            SlotState::Unrecognized(text) => format!("unrecognized cell '{text}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    phrases: PhraseConfig,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(PhraseConfig::default())
    }
}

impl Classifier {
    pub fn new(phrases: PhraseConfig) -> Self {
        Self { phrases }
    }

    /// Classify any page signal. `None` means "actionable, outcome pending".
    pub fn classify(&self, signal: &PageSignal) -> Option<BookingOutcome> {
        match signal {
            PageSignal::Dialog(text) => match self.classify_dialog(text) {
                DialogVerdict::Classified(outcome) => Some(outcome),
                DialogVerdict::Informational => None,
            },
            PageSignal::ActionCell(text) => match self.classify_cell(text) {
                SlotState::AlreadyBooked { was_waiting } => {
                    Some(BookingOutcome::AlreadyBooked { was_waiting })
                }
                SlotState::Unavailable => Some(BookingOutcome::Unavailable),
                SlotState::BookNow | SlotState::JoinWaitlist => None,
                SlotState::Unrecognized(_) => Some(BookingOutcome::NotFound),
            },
            PageSignal::NoSlotRow => Some(BookingOutcome::NotFound),
        }
    }

    /// Dialog rules, first match wins.
    pub fn classify_dialog(&self, text: &str) -> DialogVerdict {
        let lower = text.to_lowercase();
        let p = &self.phrases;

        let outcome = if any(&lower, &p.capacity_exceeded) && any(&lower, &p.waitlist) {
            BookingOutcome::Waitlisted
        } else if any(&lower, &p.weekly_limit) {
            // Weekly quota already used: nothing left to do, count as booked.
            BookingOutcome::Booked
        } else if any(&lower, &p.conflict) {
            BookingOutcome::ConflictDetected
        } else if any(&lower, &p.timeout) {
            BookingOutcome::TimeoutDetected
        } else if any(&lower, &p.booking) && any(&lower, &p.booking_done) {
            BookingOutcome::Booked
        } else {
            return DialogVerdict::Informational;
        };
        DialogVerdict::Classified(outcome)
    }

    /// Action cell rules. The already-booked check runs first: it is what
    /// keeps a retry from booking the same slot twice.
    pub fn classify_cell(&self, text: &str) -> SlotState {
        let lower = text.to_lowercase();
        let p = &self.phrases;

        if any(&lower, &p.cell_already_booked) {
            SlotState::AlreadyBooked {
                was_waiting: any(&lower, &p.waitlist),
            }
        } else if any(&lower, &p.cell_book_now) {
            SlotState::BookNow
        } else if any(&lower, &p.cell_join_waitlist) {
            SlotState::JoinWaitlist
        } else if any(&lower, &p.cell_unavailable) {
            SlotState::Unavailable
        } else {
            SlotState::Unrecognized(text.trim().to_string())
        }
    }

    /// Whether `text` shows the booking for day-of-month `day`: an asterisk
    /// right after the day number, or a success phrase on a line that names
    /// that day.
    pub fn shows_booking_marker(&self, text: &str, day: u32) -> bool {
        has_day_marker(text, day)
            || text.lines().any(|line| {
                mentions_day(line, day) && any(&line.to_lowercase(), &self.phrases.verify_success)
            })
    }
}

fn any(haystack: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .any(|needle| !needle.is_empty() && haystack.contains(&needle.to_lowercase()))
}

/// A standalone number equal to `day`. Digits touching a `:` belong to a
/// clock time and never count.
fn mentions_day(line: &str, day: u32) -> bool {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let in_time = (start > 0 && bytes[start - 1] == b':') || bytes.get(i) == Some(&b':');
        if !in_time && line[start..i].parse::<u32>().is_ok_and(|n| n == day) {
            return true;
        }
    }
    false
}

/// `"{day}*"` (or `"{day} *"`) not preceded by another digit.
fn has_day_marker(text: &str, day: u32) -> bool {
    let day = day.to_string();
    let mut rest = text;
    let mut offset = 0;
    while let Some(pos) = rest.find(&day) {
        let start = offset + pos;
        let end = start + day.len();
        let preceded_by_digit = text[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit());
        let after = text[end..].trim_start_matches(' ');
        if !preceded_by_digit && after.starts_with('*') {
            return true;
        }
        offset = end;
        rest = &text[end..];
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::default()
    }

    #[test]
    fn test_waitlist_dialog() {
        assert_eq!(
            classifier().classify_dialog("Capacity exceeded, join the waitlist?"),
            DialogVerdict::Classified(BookingOutcome::Waitlisted)
        );
    }

    #[test]
    fn test_conflict_dialog() {
        assert_eq!(
            classifier().classify_dialog("Simultaneous request, try again shortly"),
            DialogVerdict::Classified(BookingOutcome::ConflictDetected)
        );
        assert_eq!(
            classifier().classify_dialog("Server busy. Please try again shortly."),
            DialogVerdict::Classified(BookingOutcome::ConflictDetected)
        );
    }

    #[test]
    fn test_weekly_limit_counts_as_booked() {
        assert_eq!(
            classifier().classify_dialog("Weekly booking count already completed"),
            DialogVerdict::Classified(BookingOutcome::Booked)
        );
    }

    #[test]
    fn test_timeout_dialog() {
        assert_eq!(
            classifier().classify_dialog("Session time out, please log in again"),
            DialogVerdict::Classified(BookingOutcome::TimeoutDetected)
        );
    }

    #[test]
    fn test_booking_complete_dialog() {
        assert_eq!(
            classifier().classify_dialog("Booking complete!"),
            DialogVerdict::Classified(BookingOutcome::Booked)
        );
        assert_eq!(
            classifier().classify_dialog("Your booking was a success"),
            DialogVerdict::Classified(BookingOutcome::Booked)
        );
    }

    #[test]
    fn test_priority_order() {
        // Capacity + waitlist beats the generic booking rule.
        assert_eq!(
            classifier().classify_dialog("Booking failed: capacity exceeded. Add to waitlist?"),
            DialogVerdict::Classified(BookingOutcome::Waitlisted)
        );
        // Conflict beats timeout.
        assert_eq!(
            classifier().classify_dialog("Simultaneous request after timeout"),
            DialogVerdict::Classified(BookingOutcome::ConflictDetected)
        );
    }

    #[test]
    fn test_unmatched_dialog_is_informational() {
        assert_eq!(
            classifier().classify_dialog("Do you want to book this class?"),
            DialogVerdict::Informational
        );
        assert_eq!(classifier().classify(&PageSignal::Dialog("Notice".into())), None);
    }

    #[test]
    fn test_cell_states() {
        let c = classifier();
        assert_eq!(
            c.classify_cell("Reservation complete"),
            SlotState::AlreadyBooked { was_waiting: false }
        );
        assert_eq!(
            c.classify_cell("Waitlist complete"),
            SlotState::AlreadyBooked { was_waiting: true }
        );
        assert_eq!(
            c.classify_cell("Cancel available"),
            SlotState::AlreadyBooked { was_waiting: false }
        );
        assert_eq!(c.classify_cell(" Book now "), SlotState::BookNow);
        assert_eq!(c.classify_cell("Join waitlist"), SlotState::JoinWaitlist);
        assert_eq!(c.classify_cell("Unavailable"), SlotState::Unavailable);
        assert_eq!(c.classify_cell("???"), SlotState::Unrecognized("???".into()));
    }

    #[test]
    fn test_cell_signals() {
        let c = classifier();
        assert_eq!(
            c.classify(&PageSignal::ActionCell("reservation complete".into())),
            Some(BookingOutcome::AlreadyBooked { was_waiting: false })
        );
        assert_eq!(c.classify(&PageSignal::ActionCell("book now".into())), None);
        assert_eq!(
            c.classify(&PageSignal::ActionCell("unavailable".into())),
            Some(BookingOutcome::Unavailable)
        );
        assert_eq!(c.classify(&PageSignal::NoSlotRow), Some(BookingOutcome::NotFound));
    }

    #[test]
    fn test_custom_phrases() {
        let mut phrases = PhraseConfig::default();
        phrases.cell_book_now.push("예약하기".into());
        let c = Classifier::new(phrases);
        assert_eq!(c.classify_cell("예약하기"), SlotState::BookNow);
    }

    #[test]
    fn test_day_marker() {
        let c = classifier();
        assert!(c.shows_booking_marker("Mon 26* 09:30", 26));
        assert!(c.shows_booking_marker("26 *", 26));
        assert!(!c.shows_booking_marker("126* 09:30", 26));
        assert!(!c.shows_booking_marker("26 27 28*", 26));
    }

    #[test]
    fn test_success_phrase_must_name_the_day() {
        let c = classifier();
        assert!(!c.shows_booking_marker("Reservation complete", 3));
        assert!(!c.shows_booking_marker("Oct 19 09:30 Pilates - Reservation complete", 26));
        assert!(c.shows_booking_marker("Oct 26 09:30 Pilates - Reservation complete", 26));
        assert!(c.shows_booking_marker("Mon 05 - Waitlist complete", 5));
        // 09:30 is a time, not the 9th.
        assert!(!c.shows_booking_marker("Oct 19 09:30 Reservation complete", 9));
        assert!(!c.shows_booking_marker(
            "Oct 19 09:30 Reservation complete\nOct 26 09:30 Book now",
            26
        ));
    }
}
