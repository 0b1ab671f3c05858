//! Classbook configuration system.
//!
//! Layering: built-in defaults → `~/.classbook/config.toml` (or `--config`)
//! → `CLASSBOOK_*` environment overrides. Credentials only ever come from the
//! environment.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::context::ExecutionMode;
use crate::error::{ClassbookError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub immediate: bool,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
    #[serde(default)]
    pub phrases: PhraseConfig,
    #[serde(default)]
    pub results: ResultsConfig,
}

impl AppConfig {
    /// Load config from the default path (~/.classbook/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClassbookError::Config(format!("Failed to read config: {e}")))?;
        tracing::debug!("📄 Loaded config from {}", path.display());
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ClassbookError::Config(format!("Failed to parse config: {e}")))
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Classbook home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".classbook")
    }

    /// Apply `CLASSBOOK_*` overrides from `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("CLASSBOOK_MODE") {
            self.mode = mode.parse()?;
        }
        if lookup("CLASSBOOK_FORCE").is_some_and(|v| truthy(&v)) {
            self.mode = ExecutionMode::Forced;
        }
        // Test wins over forced: a dry run must never click.
        if lookup("CLASSBOOK_TEST_MODE").is_some_and(|v| truthy(&v)) {
            self.mode = ExecutionMode::Test;
        }
        if let Some(v) = lookup("CLASSBOOK_IMMEDIATE") {
            self.immediate = truthy(&v);
        }
        if let Some(v) = lookup("CLASSBOOK_DEBUG") {
            self.debug = truthy(&v);
        }
        if let Some(v) = lookup("CLASSBOOK_TARGET_TIME") {
            self.schedule.target_time = v.trim().to_string();
        }
        if let Some(v) = lookup("CLASSBOOK_MAX_WAIT_MINUTES") {
            self.schedule.max_wait_minutes = parse_number("CLASSBOOK_MAX_WAIT_MINUTES", &v)?;
        }
        if let Some(v) = lookup("CLASSBOOK_MAX_RETRIES") {
            self.retry.max_retries = parse_number("CLASSBOOK_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("CLASSBOOK_WEBDRIVER_URL") {
            self.browser.webdriver_url = v.trim().to_string();
        }
        if self.debug {
            self.snapshots.policy = SnapshotPolicy::Checkpoints;
        }
        Ok(())
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        self.schedule.target_time()?;
        if self.retry.max_retries == 0 {
            return Err(ClassbookError::Config("retry.max_retries must be at least 1".into()));
        }
        if self.retry.conflict_jitter_min_ms > self.retry.conflict_jitter_max_ms {
            return Err(ClassbookError::Config(
                "retry.conflict_jitter_min_ms must not exceed conflict_jitter_max_ms".into(),
            ));
        }
        Ok(())
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ClassbookError::Config(format!("{name} is not a number: '{value}'")))
}

/// Site login credentials.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Read `CLASSBOOK_USERNAME` / `CLASSBOOK_PASSWORD`. Missing or blank is fatal.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = lookup("CLASSBOOK_USERNAME").filter(|v| !v.trim().is_empty());
        let password = lookup("CLASSBOOK_PASSWORD").filter(|v| !v.is_empty());
        match (username, password) {
            (Some(username), Some(password)) => Ok(Self { username, password }),
            _ => Err(ClassbookError::Config(
                "CLASSBOOK_USERNAME and CLASSBOOK_PASSWORD must both be set".into(),
            )),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// When and what to book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Opening time-of-day in KST, `HH:MM` or `HH:MM:SS`.
    #[serde(default = "default_target_time")]
    pub target_time: String,
    #[serde(default = "default_max_wait_minutes")]
    pub max_wait_minutes: u64,
    #[serde(default = "default_slot_label")]
    pub slot_label: String,
    #[serde(default = "default_day_offset")]
    pub day_offset: i64,
}

fn default_target_time() -> String { "00:00:00".into() }
fn default_max_wait_minutes() -> u64 { 10 }
fn default_slot_label() -> String { "09:30".into() }
fn default_day_offset() -> i64 { crate::calendar::TARGET_DAY_OFFSET }

impl ScheduleConfig {
    pub fn target_time(&self) -> Result<NaiveTime> {
        let raw = self.target_time.trim();
        NaiveTime::parse_from_str(raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
            .map_err(|_| ClassbookError::Config(format!("Invalid target time: '{raw}'")))
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            target_time: default_target_time(),
            max_wait_minutes: default_max_wait_minutes(),
            slot_label: default_slot_label(),
            day_offset: default_day_offset(),
        }
    }
}

/// Retry loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_jitter_min_ms")]
    pub conflict_jitter_min_ms: u64,
    #[serde(default = "default_jitter_max_ms")]
    pub conflict_jitter_max_ms: u64,
}

fn default_max_retries() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 2_000 }
fn default_jitter_min_ms() -> u64 { 1_000 }
fn default_jitter_max_ms() -> u64 { 5_000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            conflict_jitter_min_ms: default_jitter_min_ms(),
            conflict_jitter_max_ms: default_jitter_max_ms(),
        }
    }
}

/// Where things live on the reservation site.
///
/// `slot_row_xpath` may contain `{time}`, replaced with the slot label.
/// `action_cell_xpath` is evaluated relative to the slot row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub login_url: String,
    #[serde(default)]
    pub booking_url: String,
    /// Substring of the booking view URL that proves we arrived.
    #[serde(default = "default_booking_view_marker")]
    pub booking_view_marker: String,
    #[serde(default = "default_username_selector")]
    pub username_selector: String,
    #[serde(default = "default_password_selector")]
    pub password_selector: String,
    #[serde(default = "default_login_submit_selector")]
    pub login_submit_selector: String,
    #[serde(default = "default_slot_row_xpath")]
    pub slot_row_xpath: String,
    #[serde(default = "default_action_cell_xpath")]
    pub action_cell_xpath: String,
    #[serde(default = "default_submit_selector")]
    pub submit_selector: String,
    #[serde(default = "default_reservation_list_selector")]
    pub reservation_list_selector: String,
    #[serde(default = "default_calendar_selector")]
    pub calendar_selector: String,
}

fn default_booking_view_marker() -> String { "reserve".into() }
fn default_username_selector() -> String { "input[name='id']".into() }
fn default_password_selector() -> String { "input[name='pw']".into() }
fn default_login_submit_selector() -> String { "button[type='submit']".into() }
fn default_slot_row_xpath() -> String { "//tr[td[contains(normalize-space(.), '{time}')]]".into() }
fn default_action_cell_xpath() -> String { "./td[last()]".into() }
fn default_submit_selector() -> String { "button[type='submit'], input[type='submit']".into() }
fn default_reservation_list_selector() -> String { "#reservation-list".into() }
fn default_calendar_selector() -> String { ".calendar".into() }

impl SiteConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("site.login_url", &self.login_url), ("site.booking_url", &self.booking_url)] {
            if value.trim().is_empty() {
                return Err(ClassbookError::Config(format!("{name} is not configured")));
            }
        }
        Ok(())
    }

    /// Slot row XPath for one time label.
    pub fn slot_row_xpath_for(&self, label: &str) -> String {
        self.slot_row_xpath.replace("{time}", label)
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            login_url: String::new(),
            booking_url: String::new(),
            booking_view_marker: default_booking_view_marker(),
            username_selector: default_username_selector(),
            password_selector: default_password_selector(),
            login_submit_selector: default_login_submit_selector(),
            slot_row_xpath: default_slot_row_xpath(),
            action_cell_xpath: default_action_cell_xpath(),
            submit_selector: default_submit_selector(),
            reservation_list_selector: default_reservation_list_selector(),
            calendar_selector: default_calendar_selector(),
        }
    }
}

/// WebDriver session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_browser_name")]
    pub browser_name: String,
    #[serde(default = "bool_true")]
    pub headless: bool,
    /// Skip image loading to cut page weight at the opening rush.
    #[serde(default = "bool_true")]
    pub block_images: bool,
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,
    /// How long to wait for a dialog after an action.
    #[serde(default = "default_dialog_wait_ms")]
    pub dialog_wait_ms: u64,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn bool_true() -> bool { true }
fn default_webdriver_url() -> String { "http://localhost:9515".into() }
fn default_browser_name() -> String { "chrome".into() }
fn default_page_timeout_secs() -> u64 { 30 }
fn default_dialog_wait_ms() -> u64 { 3_000 }

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            browser_name: default_browser_name(),
            headless: true,
            block_images: true,
            page_timeout_secs: default_page_timeout_secs(),
            dialog_wait_ms: default_dialog_wait_ms(),
            extra_args: Vec::new(),
        }
    }
}

/// Which diagnostic checkpoints produce a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPolicy {
    Off,
    #[default]
    ErrorsOnly,
    Checkpoints,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default)]
    pub policy: SnapshotPolicy,
    #[serde(default = "default_snapshot_dir")]
    pub dir: String,
}

fn default_snapshot_dir() -> String { "~/.classbook/snapshots".into() }

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            policy: SnapshotPolicy::default(),
            dir: default_snapshot_dir(),
        }
    }
}

/// Keyword tables for the outcome classifier. Matching is case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhraseConfig {
    #[serde(default = "default_capacity")]
    pub capacity_exceeded: Vec<String>,
    #[serde(default = "default_waitlist")]
    pub waitlist: Vec<String>,
    #[serde(default = "default_weekly_limit")]
    pub weekly_limit: Vec<String>,
    #[serde(default = "default_conflict")]
    pub conflict: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout: Vec<String>,
    #[serde(default = "default_booking")]
    pub booking: Vec<String>,
    #[serde(default = "default_booking_done")]
    pub booking_done: Vec<String>,
    #[serde(default = "default_cell_already")]
    pub cell_already_booked: Vec<String>,
    #[serde(default = "default_cell_book")]
    pub cell_book_now: Vec<String>,
    #[serde(default = "default_cell_join")]
    pub cell_join_waitlist: Vec<String>,
    #[serde(default = "default_cell_unavailable")]
    pub cell_unavailable: Vec<String>,
    #[serde(default = "default_verify_success")]
    pub verify_success: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_capacity() -> Vec<String> { strings(&["capacity exceeded"]) }
fn default_waitlist() -> Vec<String> { strings(&["waitlist"]) }
fn default_weekly_limit() -> Vec<String> { strings(&["weekly booking count already completed"]) }
fn default_conflict() -> Vec<String> { strings(&["simultaneous request", "try again shortly"]) }
fn default_timeout() -> Vec<String> { strings(&["timeout", "time out"]) }
fn default_booking() -> Vec<String> { strings(&["booking"]) }
fn default_booking_done() -> Vec<String> { strings(&["complete", "success"]) }
fn default_cell_already() -> Vec<String> {
    strings(&["reservation complete", "waitlist complete", "cancel available"])
}
fn default_cell_book() -> Vec<String> { strings(&["book now"]) }
fn default_cell_join() -> Vec<String> { strings(&["join waitlist"]) }
fn default_cell_unavailable() -> Vec<String> { strings(&["unavailable"]) }
fn default_verify_success() -> Vec<String> {
    strings(&["reservation complete", "booking complete", "waitlist complete"])
}

impl Default for PhraseConfig {
    fn default() -> Self {
        Self {
            capacity_exceeded: default_capacity(),
            waitlist: default_waitlist(),
            weekly_limit: default_weekly_limit(),
            conflict: default_conflict(),
            timeout: default_timeout(),
            booking: default_booking(),
            booking_done: default_booking_done(),
            cell_already_booked: default_cell_already(),
            cell_book_now: default_cell_book(),
            cell_join_waitlist: default_cell_join(),
            cell_unavailable: default_cell_unavailable(),
            verify_success: default_verify_success(),
        }
    }
}

/// Where run results are written; the file name depends on the mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsConfig {
    #[serde(default = "default_results_dir")]
    pub dir: String,
    #[serde(default = "default_live_file")]
    pub live_file: String,
    #[serde(default = "default_test_file")]
    pub test_file: String,
}

fn default_results_dir() -> String { "~/.classbook/results".into() }
fn default_live_file() -> String { "booking-result.json".into() }
fn default_test_file() -> String { "test-booking-result.json".into() }

impl ResultsConfig {
    pub fn file_for(&self, mode: ExecutionMode) -> &str {
        if mode.is_dry_run() {
            &self.test_file
        } else {
            &self.live_file
        }
    }
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            dir: default_results_dir(),
            live_file: default_live_file(),
            test_file: default_test_file(),
        }
    }
}
