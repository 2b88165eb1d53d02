//! deferred-drop-check: guard against dropping columns that are still loaded
//!
//! Scans Alembic migrations for dropped columns and fails when a dropped
//! column was not marked `deferred()` in its SQLAlchemy model at the upstream
//! reference point. Running code that still selects a column breaks as soon as
//! the migration removes it; deferring it first and dropping it in a later
//! deploy avoids that.

pub mod check;
pub mod config;
pub mod error;
pub mod history;
pub mod migration;
pub mod model;
pub mod python;

pub use check::{print_report, run_check, write_report, Diagnostic, Severity, Verdict};
pub use config::CheckOptions;
pub use error::CheckError;
pub use history::{GitHistory, HistoryProvider};
