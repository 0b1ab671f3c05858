//! # Classbook Core
//!
//! Shared building blocks for the weekly class booker:
//! - KST calendar + weekend day gate
//! - Immutable per-run execution context
//! - Booking outcome / run result model
//! - TOML + environment configuration
//!
//! ```text
//! AppConfig (config.toml + CLASSBOOK_* env)
//!   └── ExecutionContext::new(now_kst, config)
//!         ├── TargetDate = now + 7 days
//!         ├── should_run(current weekday, mode)
//!         └── RunResult ← BookingOutcome + metadata
//! ```

pub mod calendar;
pub mod config;
pub mod context;
pub mod error;
pub mod outcome;

pub use calendar::{TargetDate, kst_offset, now_kst, should_run, target_date};
pub use config::{AppConfig, Credentials};
pub use context::{ExecutionContext, ExecutionMode};
pub use error::{ClassbookError, Result};
pub use outcome::{BookingOutcome, RunResult, RunStatus};
