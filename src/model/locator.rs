//! Locate the model file that declares a table
//!
//! The search runs over the working tree, because the model may have moved
//! since the reference point. A located file is only a candidate: the
//! historical content is inspected structurally afterwards.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::{DirEntry, WalkDir};

use super::deferral::find_table_class;
use crate::python::PythonModule;

/// Directory names never searched for models: dependency trees, virtual
/// environments, tool caches and migration script directories
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    "site-packages",
    ".venv",
    "venv",
    "node_modules",
    "__pycache__",
    ".git",
    ".tox",
    ".mypy_cache",
    "alembic",
    "migrations",
];

/// Searches a directory tree for SQLAlchemy models
#[derive(Debug, Clone)]
pub struct ModelLocator {
    root: PathBuf,
    excluded_dirs: HashSet<String>,
    /// Slash-separated directory paths pruned wherever they occur, e.g. `db/versions`
    excluded_paths: Vec<String>,
    extension: String,
}

impl ModelLocator {
    /// Locator over `root` with the default exclusions and `.py` sources
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|d| d.to_string()).collect(),
            excluded_paths: Vec::new(),
            extension: "py".to_string(),
        }
    }

    /// Also prune directories with these names
    pub fn with_excluded_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Also prune directories whose path ends with `path` (`db/versions`,
    /// `./db/versions/` and `db\\versions` are equivalent). A path naming the
    /// current directory prunes nothing.
    pub fn with_excluded_path(mut self, path: &str) -> Self {
        let normalized = path.replace('\\', "/");
        let normalized = normalized
            .trim_start_matches("./")
            .trim_matches('/')
            .to_string();
        if !normalized.is_empty() && normalized != "." {
            self.excluded_paths.push(normalized);
        }
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// First file declaring `table`, in file-name order
    pub fn find_model_file(&self, table: &str) -> Option<PathBuf> {
        self.find_model_candidates(table).into_iter().next()
    }

    /// Every file declaring `table`, in file-name order
    pub fn find_model_candidates(&self, table: &str) -> Vec<PathBuf> {
        let pattern = match tablename_pattern(table) {
            Ok(pattern) => pattern,
            Err(e) => {
                tracing::warn!(table, error = %e, "cannot build table name pattern");
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry));

        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file() || !self.has_source_extension(path) {
                continue;
            }

            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            // Cheap textual check before paying for a parse
            if !pattern.is_match(&content) {
                continue;
            }

            if declares_table(&content, path, table) {
                tracing::debug!(table, path = %path.display(), "model candidate");
                candidates.push(path.to_path_buf());
            }
        }
        candidates
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        let excluded_name = entry
            .file_name()
            .to_str()
            .is_some_and(|name| self.excluded_dirs.contains(name));
        excluded_name || self.is_excluded_path(entry.path())
    }

    fn is_excluded_path(&self, dir: &Path) -> bool {
        if self.excluded_paths.is_empty() {
            return false;
        }
        let dir = format!("/{}", dir.to_string_lossy().replace('\\', "/"));
        self.excluded_paths
            .iter()
            .any(|excluded| dir.ends_with(&format!("/{}", excluded)))
    }

    fn has_source_extension(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(self.extension.as_str()))
    }
}

/// `__tablename__ = "table"`, optionally annotated, with either quote style
fn tablename_pattern(table: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r#"__tablename__\s*(?::[^=\n]*)?=\s*['"]{}['"]"#,
        regex::escape(table)
    ))
}

/// Structural confirmation of a textual match.
///
/// A file that does not parse keeps its textual match: the candidate is only
/// a hint and dropping it would skip the check entirely.
fn declares_table(content: &str, path: &Path, table: &str) -> bool {
    match PythonModule::parse(content, path) {
        Ok(module) => find_table_class(&module, table).is_some(),
        Err(e) => {
            tracing::debug!(error = %e, "keeping unparseable model candidate");
            true
        }
    }
}
