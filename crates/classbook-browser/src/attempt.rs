//! Booking attempt — one login → navigate → locate → act → confirm cycle.
//!
//! An attempt owns its [`AttemptState`] from start to finish; nothing carries
//! over between attempts. Conflict and timeout dialogs come back as
//! [`AttemptError`]s so the retry loop treats them as retryable.

use std::time::Duration;

use classbook_core::calendar::TargetDate;
use classbook_core::config::{AppConfig, PhraseConfig, SnapshotPolicy};
use classbook_core::{BookingOutcome, Credentials};

use crate::classify::{Classifier, DialogVerdict, SlotState};
use crate::driver::{DriverError, PageDriver, TextScope};

/// Attempt-level failure. Every variant is retryable.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Slot {0} not found on the booking view")]
    SlotNotFound(String),

    #[error("Unrecognized slot state: {0}")]
    UnrecognizedSlot(String),

    #[error("Submit control not found")]
    SubmitNotFound,

    #[error("Gave up after {0} consecutive dialogs")]
    TooManyDialogs(u32),

    #[error("Conflict reported: {0}")]
    Conflict(String),

    #[error("Timeout reported: {0}")]
    Timeout(String),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl AttemptError {
    /// Outcome recorded for an attempt that ended in this error.
    pub fn outcome(&self) -> BookingOutcome {
        match self {
            AttemptError::Conflict(_) => BookingOutcome::ConflictDetected,
            AttemptError::Timeout(_) => BookingOutcome::TimeoutDetected,
            AttemptError::SlotNotFound(_) => BookingOutcome::NotFound,
            other => BookingOutcome::Failed {
                reason: other.to_string(),
            },
        }
    }
}

/// Dialogs handled per wait before the page is considered stuck.
const MAX_DIALOGS: u32 = 10;

/// Flags for one attempt. Fresh for every attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptState {
    pub booking_success: bool,
    pub is_waiting_reservation: bool,
    pub has_conflict_error: bool,
    pub has_timeout_error: bool,
    /// Outcome taken from the first classifying dialog.
    pub dialog_outcome: Option<BookingOutcome>,
    /// Raw text of that dialog.
    pub dialog_text: Option<String>,
    pub dialogs_seen: u32,
}

impl AttemptState {
    fn record_dialog(&mut self, outcome: BookingOutcome, text: &str) {
        match outcome {
            BookingOutcome::Booked => self.booking_success = true,
            BookingOutcome::Waitlisted => {
                self.booking_success = true;
                self.is_waiting_reservation = true;
            }
            BookingOutcome::ConflictDetected => self.has_conflict_error = true,
            BookingOutcome::TimeoutDetected => self.has_timeout_error = true,
            _ => {}
        }
        self.dialog_outcome = Some(outcome);
        self.dialog_text = Some(text.to_string());
    }
}

/// Post-booking confirmation check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Confirmed,
    /// Marker not found; the booking still counts.
    Unverified,
    Skipped,
}

impl std::fmt::Display for Verification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verification::Confirmed => write!(f, "confirmed"),
            Verification::Unverified => write!(f, "unverified"),
            Verification::Skipped => write!(f, "skipped"),
        }
    }
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptEnd {
    Settled(BookingOutcome),
    /// Dry run: the slot was read and left untouched.
    Observed(SlotState),
}

#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub end: AttemptEnd,
    pub state: AttemptState,
    pub verification: Verification,
}

/// Diagnostic capture points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Checkpoint {
    PreLogin,
    PostLogin,
    PreAction,
    PostSubmit,
    OnError,
}

impl Checkpoint {
    fn label(&self) -> &'static str {
        match self {
            Checkpoint::PreLogin => "pre-login",
            Checkpoint::PostLogin => "post-login",
            Checkpoint::PreAction => "pre-action",
            Checkpoint::PostSubmit => "post-submit",
            Checkpoint::OnError => "on-error",
        }
    }
}

/// Everything that used to differ between environments, as data.
#[derive(Debug, Clone)]
pub struct AttemptConfig {
    pub login_url: String,
    pub booking_url: String,
    pub booking_view_marker: String,
    pub slot_label: String,
    /// Wait for the first dialog after an action.
    pub dialog_wait: Duration,
    /// Wait for follow-up dialogs once one has been handled.
    pub followup_dialog_wait: Duration,
    pub snapshot_policy: SnapshotPolicy,
    pub verify: bool,
    pub phrases: PhraseConfig,
}

impl AttemptConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        let dialog_wait = Duration::from_millis(config.browser.dialog_wait_ms);
        Self {
            login_url: config.site.login_url.clone(),
            booking_url: config.site.booking_url.clone(),
            booking_view_marker: config.site.booking_view_marker.clone(),
            slot_label: config.schedule.slot_label.clone(),
            dialog_wait,
            followup_dialog_wait: dialog_wait.min(Duration::from_millis(500)),
            snapshot_policy: config.snapshots.policy,
            verify: true,
            phrases: config.phrases.clone(),
        }
    }
}

/// Drives one booking attempt against a page driver.
#[derive(Debug, Clone)]
pub struct BookingAttempt {
    config: AttemptConfig,
    classifier: Classifier,
}

impl BookingAttempt {
    pub fn new(config: AttemptConfig) -> Self {
        let classifier = Classifier::new(config.phrases.clone());
        Self { config, classifier }
    }

    pub fn config(&self) -> &AttemptConfig {
        &self.config
    }

    /// Run one attempt. With `dry_run` the slot is classified but never clicked.
    pub async fn run(
        &self,
        driver: &mut dyn PageDriver,
        credentials: &Credentials,
        target: &TargetDate,
        dry_run: bool,
    ) -> Result<AttemptReport, AttemptError> {
        let mut state = AttemptState::default();
        let result = self.drive(driver, credentials, target, dry_run, &mut state).await;
        match result {
            Ok((end, verification)) => Ok(AttemptReport {
                end,
                state,
                verification,
            }),
            Err(e) => {
                tracing::warn!("⚠️ Attempt failed: {e}");
                self.checkpoint(driver, Checkpoint::OnError).await;
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        driver: &mut dyn PageDriver,
        credentials: &Credentials,
        target: &TargetDate,
        dry_run: bool,
        state: &mut AttemptState,
    ) -> Result<(AttemptEnd, Verification), AttemptError> {
        self.authenticate(driver, credentials).await?;

        let label = &self.config.slot_label;
        let action = driver
            .find_slot_action(label)
            .await?
            .ok_or_else(|| AttemptError::SlotNotFound(label.clone()))?;
        let slot = self.classifier.classify_cell(&action.text);
        tracing::info!("🔎 Slot {label}: '{}' → {}", action.text.trim(), slot.describe());

        if dry_run {
            tracing::info!("🧪 Test mode: leaving slot {label} untouched");
            return Ok((AttemptEnd::Observed(slot), Verification::Skipped));
        }

        let outcome = match slot {
            SlotState::AlreadyBooked { was_waiting } => {
                // Existing booking: do not touch the page again.
                state.booking_success = true;
                state.is_waiting_reservation = was_waiting;
                return Ok((
                    AttemptEnd::Settled(BookingOutcome::AlreadyBooked { was_waiting }),
                    Verification::Skipped,
                ));
            }
            SlotState::Unavailable => {
                return Ok((AttemptEnd::Settled(BookingOutcome::Unavailable), Verification::Skipped));
            }
            SlotState::Unrecognized(text) => return Err(AttemptError::UnrecognizedSlot(text)),
            SlotState::JoinWaitlist => {
                self.checkpoint(driver, Checkpoint::PreAction).await;
                driver.invoke_action(&action.handle).await?;
                self.handle_dialogs(driver, state).await?;
                match state.dialog_outcome.clone() {
                    // Joining a waitlist never yields a confirmed seat.
                    Some(BookingOutcome::Booked) | None => {
                        state.booking_success = true;
                        state.is_waiting_reservation = true;
                        BookingOutcome::Waitlisted
                    }
                    Some(outcome) => outcome,
                }
            }
            SlotState::BookNow => {
                self.checkpoint(driver, Checkpoint::PreAction).await;
                driver.invoke_action(&action.handle).await?;
                self.handle_dialogs(driver, state).await?;
                if state.dialog_outcome.is_none() {
                    if !driver.invoke_submit().await? {
                        return Err(AttemptError::SubmitNotFound);
                    }
                    self.handle_dialogs(driver, state).await?;
                    self.checkpoint(driver, Checkpoint::PostSubmit).await;
                }
                match state.dialog_outcome.clone() {
                    Some(outcome) => outcome,
                    None => {
                        tracing::info!("📝 Submitted without a confirmation dialog");
                        state.booking_success = true;
                        BookingOutcome::Booked
                    }
                }
            }
        };

        let verification = if self.config.verify {
            self.verify(driver, target).await
        } else {
            Verification::Skipped
        };
        Ok((AttemptEnd::Settled(outcome), verification))
    }

    async fn authenticate(
        &self,
        driver: &mut dyn PageDriver,
        credentials: &Credentials,
    ) -> Result<(), AttemptError> {
        self.checkpoint(driver, Checkpoint::PreLogin).await;
        driver.navigate(&self.config.login_url).await?;
        driver
            .sign_in(credentials)
            .await
            .map_err(|e| AttemptError::Authentication(e.to_string()))?;

        // Login notices are not booking dialogs; clear them unclassified.
        let mut seen = 0;
        while let Some(text) = driver.next_dialog(self.config.followup_dialog_wait).await? {
            seen += 1;
            if seen > MAX_DIALOGS {
                return Err(AttemptError::TooManyDialogs(MAX_DIALOGS));
            }
            tracing::debug!("💬 Login dialog: {text}");
            driver.resolve_dialog(true).await?;
        }
        self.checkpoint(driver, Checkpoint::PostLogin).await;

        driver.navigate(&self.config.booking_url).await?;
        let url = driver.current_url().await?;
        if !url.contains(&self.config.booking_view_marker) {
            return Err(AttemptError::Authentication(format!(
                "booking view not reached, landed on {url}"
            )));
        }
        tracing::info!("🔐 Signed in as {}", credentials.username);
        Ok(())
    }

    /// Accept every pending dialog. Only the first one that matches a rule is
    /// classified; the rest are accepted as-is.
    async fn handle_dialogs(
        &self,
        driver: &mut dyn PageDriver,
        state: &mut AttemptState,
    ) -> Result<(), AttemptError> {
        let mut wait = self.config.dialog_wait;
        let mut seen = 0;
        while let Some(text) = driver.next_dialog(wait).await? {
            seen += 1;
            if seen > MAX_DIALOGS {
                return Err(AttemptError::TooManyDialogs(MAX_DIALOGS));
            }
            state.dialogs_seen += 1;
            if state.dialog_outcome.is_none() {
                match self.classifier.classify_dialog(&text) {
                    DialogVerdict::Classified(outcome) => {
                        tracing::info!("💬 Dialog '{}' → {outcome}", text.trim());
                        state.record_dialog(outcome, &text);
                    }
                    DialogVerdict::Informational => {
                        tracing::debug!("💬 Informational dialog: {}", text.trim());
                    }
                }
            } else {
                tracing::debug!("💬 Extra dialog accepted: {}", text.trim());
            }
            driver.resolve_dialog(true).await?;
            wait = self.config.followup_dialog_wait;
        }

        let text = state.dialog_text.clone().unwrap_or_default();
        if state.has_conflict_error {
            return Err(AttemptError::Conflict(text));
        }
        if state.has_timeout_error {
            return Err(AttemptError::Timeout(text));
        }
        Ok(())
    }

    /// Look for the booking marker on the page, the reservation list, then
    /// the calendar. Read errors just mean "not confirmed here".
    async fn verify(&self, driver: &mut dyn PageDriver, target: &TargetDate) -> Verification {
        for scope in [TextScope::Page, TextScope::ReservationList, TextScope::Calendar] {
            match driver.read_text(scope).await {
                Ok(text) if self.classifier.shows_booking_marker(&text, target.day) => {
                    tracing::info!("✅ Booking for {} confirmed in {scope}", target.iso());
                    return Verification::Confirmed;
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Verification read of {scope} failed: {e}"),
            }
        }
        tracing::warn!("⚠️ Could not confirm booking for {}; keeping result", target.iso());
        Verification::Unverified
    }

    async fn checkpoint(&self, driver: &mut dyn PageDriver, checkpoint: Checkpoint) {
        let wanted = match self.config.snapshot_policy {
            SnapshotPolicy::Off => false,
            SnapshotPolicy::ErrorsOnly => checkpoint == Checkpoint::OnError,
            SnapshotPolicy::Checkpoints => true,
        };
        if !wanted {
            return;
        }
        if let Err(e) = driver.snapshot(checkpoint.label()).await {
            tracing::debug!("📸 Snapshot '{}' failed: {e}", checkpoint.label());
        }
    }
}
