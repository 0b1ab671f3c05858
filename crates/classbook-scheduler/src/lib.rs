//! # Classbook Scheduler
//!
//! Turns one process start into one recorded booking result.
//!
//! ## Architecture
//! ```text
//! BookingEngine::run
//!   ├── day gate (Fri/Sat → WEEKEND_SKIP, no browser)
//!   ├── wait_until(target time)   coarse 60s → medium 30s → fine 2s/1s/200ms
//!   ├── RetryController           fresh session per attempt, jittered backoff on conflict
//!   │     └── BookingAttempt (classbook-browser)
//!   └── ResultStore               one JSON file per mode, written once
//! ```

pub mod clock;
pub mod engine;
pub mod retry;
pub mod store;
pub mod waiter;

pub use clock::{Clock, SystemClock};
pub use engine::BookingEngine;
pub use retry::{RetryController, RetryPolicy};
pub use store::ResultStore;
pub use waiter::{WaitKind, WaitReport, wait_until};
