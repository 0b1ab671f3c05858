//! Page driver capability — the only way the core touches the site.

use std::time::Duration;

use async_trait::async_trait;
use classbook_core::Credentials;

/// Driver-level failure.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver error '{error}': {message}")]
    Protocol { error: String, message: String },

    #[error("No such element: {0}")]
    NoSuchElement(String),

    #[error("No dialog is open")]
    NoSuchAlert,

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(String),
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Opaque handle to a clickable element on the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef(pub String);

/// The action cell of the target slot row, read before any click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAction {
    pub handle: ActionRef,
    pub text: String,
}

/// Region of the page to read text from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextScope {
    Page,
    ReservationList,
    Calendar,
}

impl std::fmt::Display for TextScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextScope::Page => write!(f, "page"),
            TextScope::ReservationList => write!(f, "reservation-list"),
            TextScope::Calendar => write!(f, "calendar"),
        }
    }
}

/// Browser session capability.
///
/// Dialogs are pulled, not pushed: after an action the caller asks for the
/// next dialog, classifies it, and resolves it.
#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str) -> DriverResult<()>;

    async fn current_url(&mut self) -> DriverResult<String>;

    /// Fill and submit the login form.
    async fn sign_in(&mut self, credentials: &Credentials) -> DriverResult<()>;

    /// Locate the row for `time_label` and read its action cell.
    /// `Ok(None)` when there is no such row.
    async fn find_slot_action(&mut self, time_label: &str) -> DriverResult<Option<SlotAction>>;

    async fn invoke_action(&mut self, action: &ActionRef) -> DriverResult<()>;

    /// Click the form submit control. `Ok(false)` when there is none.
    async fn invoke_submit(&mut self) -> DriverResult<bool>;

    async fn read_text(&mut self, scope: TextScope) -> DriverResult<String>;

    /// Best-effort diagnostic capture.
    async fn snapshot(&mut self, label: &str) -> DriverResult<()>;

    /// Text of the open dialog, waiting up to `wait` for one to appear.
    async fn next_dialog(&mut self, wait: Duration) -> DriverResult<Option<String>>;

    /// Accept or dismiss the open dialog.
    async fn resolve_dialog(&mut self, accept: bool) -> DriverResult<()>;

    /// Tear the session down. Safe to call more than once.
    async fn close(&mut self) -> DriverResult<()>;
}

/// Hands out a fresh, isolated session for every attempt.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> DriverResult<Box<dyn PageDriver>>;
}
