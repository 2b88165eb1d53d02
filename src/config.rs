//! Check configuration

use std::path::{Path, PathBuf};

/// Reference point treated as already deployed
pub const DEFAULT_REFERENCE: &str = "origin/master";

/// Extension of migration and model sources
pub const SOURCE_EXTENSION: &str = "py";

/// Options for a deferred column check
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Changed files, as passed by the caller
    pub filenames: Vec<PathBuf>,
    /// Root of the tree searched for model definitions
    pub models_path: PathBuf,
    /// Substring a path must contain to count as a migration
    pub migrations_path: String,
    /// History reference models are compared against
    pub reference: String,
    /// Directory names pruned from the model search, on top of the defaults
    pub extra_excluded_dirs: Vec<String>,
    /// Fail when a dropped column's model cannot be found
    pub strict_missing_models: bool,
    /// Report skipped dynamic SQL and log at debug level
    pub verbose: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            filenames: Vec::new(),
            models_path: PathBuf::from("."),
            migrations_path: ".".to_string(),
            reference: DEFAULT_REFERENCE.to_string(),
            extra_excluded_dirs: Vec::new(),
            strict_missing_models: false,
            verbose: false,
        }
    }
}

impl CheckOptions {
    /// Whether `path` is a migration source under the configured migrations path
    pub fn is_migration_file(&self, path: &Path) -> bool {
        let normalized = path.to_string_lossy().replace('\\', "/");
        let migrations_path = self.migrations_path.replace('\\', "/");
        normalized.contains(migrations_path.as_str())
            && normalized.ends_with(&format!(".{}", SOURCE_EXTENSION))
    }

    /// The candidate files that are migrations, in input order
    pub fn migration_files(&self) -> Vec<&Path> {
        self.filenames
            .iter()
            .map(PathBuf::as_path)
            .filter(|path| self.is_migration_file(path))
            .collect()
    }
}
