//! SQLAlchemy model lookup and inspection

mod deferral;
mod locator;

pub use deferral::{check_column_state, inspect_model, ColumnDeferralState, ModelInspection};
pub use locator::{ModelLocator, DEFAULT_EXCLUDED_DIRS};

/// Class attribute naming the table a declarative model maps
const TABLENAME_ATTRIBUTE: &str = "__tablename__";
