//! # Classbook Browser
//!
//! Everything that touches the reservation site goes through [`PageDriver`].
//! The booking attempt only ever sees driver calls and dialog text; which
//! backend sits behind it (W3C WebDriver, scripted test driver) is swappable.
//!
//! ```text
//! SessionFactory::open() → Box<dyn PageDriver>      (one per attempt)
//!   BookingAttempt::run
//!     ├── navigate(login) → sign_in → navigate(booking)
//!     ├── find_slot_action("09:30") → Classifier::classify_cell
//!     ├── invoke_action / invoke_submit
//!     ├── next_dialog → Classifier::classify_dialog → resolve_dialog
//!     └── read_text(scope) → verification marker
//! PageDriver::close()
//! ```

pub mod attempt;
pub mod classify;
pub mod driver;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;
pub mod webdriver;

pub use attempt::{AttemptConfig, AttemptEnd, AttemptError, AttemptReport, AttemptState, BookingAttempt, Verification};
pub use classify::{Classifier, DialogVerdict, PageSignal, SlotState};
pub use driver::{ActionRef, DriverError, DriverResult, PageDriver, SessionFactory, SlotAction, TextScope};
pub use webdriver::{WebDriverFactory, WebDriverSession};
