//! Historical file content
//!
//! The check needs a single capability from version control: the content of a
//! path at a reference point. [`HistoryProvider`] is that seam; [`GitHistory`]
//! implements it with `git show`.

use std::path::{Component, Path, PathBuf};
use std::process::Command;

use crate::error::CheckError;

/// Source of file content at a point in history
pub trait HistoryProvider {
    /// Content of `path` (forward slashes, relative to the working directory)
    /// at `reference`.
    ///
    /// Returns `Ok(None)` when the path or the reference does not exist, and
    /// `Err` when the lookup itself failed.
    fn fetch(&self, path: &str, reference: &str) -> Result<Option<String>, CheckError>;
}

/// Outcome of a history lookup after failures have been folded in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryLookup {
    Found(String),
    /// The file did not exist at the reference point
    NotFound,
    /// The lookup failed; carries the reason
    Failed(String),
}

/// Fetch `path` at `reference`. Never fails: errors become [`HistoryLookup::Failed`].
pub fn resolve_history(
    provider: &dyn HistoryProvider,
    path: &Path,
    reference: &str,
) -> HistoryLookup {
    let normalized = normalize_history_path(path);
    match provider.fetch(&normalized, reference) {
        Ok(Some(content)) => HistoryLookup::Found(content),
        Ok(None) => {
            tracing::debug!(path = %normalized, reference, "not present in history");
            HistoryLookup::NotFound
        }
        Err(e) => {
            tracing::warn!(path = %normalized, reference, error = %e, "history lookup failed");
            HistoryLookup::Failed(e.to_string())
        }
    }
}

/// Lexically normalize a path and render it with forward slashes.
///
/// `./app/../app/models.py` and `app\models.py` both become `app/models.py`.
pub fn normalize_history_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut absolute = false;

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => {
                parts.push(prefix.as_os_str().to_string_lossy().into_owned());
            }
            Component::RootDir => absolute = true,
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push("..".to_string()),
            },
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }

    let joined = parts.join("/").replace('\\', "/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// History from the git repository containing the working directory
#[derive(Debug, Clone, Default)]
pub struct GitHistory {
    /// Directory git runs in; the process working directory when `None`
    repo_dir: Option<PathBuf>,
}

impl GitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run git in `dir` instead of the process working directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: Some(dir.into()),
        }
    }

    /// `<reference>:./<path>`, resolved relative to the directory git runs in
    fn object_name(&self, path: &str, reference: &str) -> String {
        let base = match &self.repo_dir {
            Some(dir) => Some(dir.clone()),
            None => std::env::current_dir().ok(),
        };
        let relative = base
            .filter(|_| Path::new(path).is_absolute())
            .and_then(|base| Path::new(path).strip_prefix(base).ok().map(normalize_history_path))
            .unwrap_or_else(|| path.to_string());

        if Path::new(&relative).is_absolute() {
            format!("{}:{}", reference, relative)
        } else {
            format!("{}:./{}", reference, relative)
        }
    }
}

impl HistoryProvider for GitHistory {
    fn fetch(&self, path: &str, reference: &str) -> Result<Option<String>, CheckError> {
        let object = self.object_name(path, reference);

        let mut command = Command::new("git");
        command.arg("show").arg(&object);
        if let Some(dir) = &self.repo_dir {
            command.current_dir(dir);
        }

        tracing::debug!(object = %object, "git show");
        let output = command
            .output()
            .map_err(|source| CheckError::GitSpawnError { source })?;

        if output.status.success() {
            return String::from_utf8(output.stdout)
                .map(Some)
                .map_err(|_| CheckError::GitOutputError { object });
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_missing_object(&stderr) {
            Ok(None)
        } else {
            Err(CheckError::GitShowError { object, stderr })
        }
    }
}

/// Whether git's error output means the path or reference does not exist
fn is_missing_object(stderr: &str) -> bool {
    const MISSING_MARKERS: &[&str] = &[
        "does not exist in",
        "exists on disk, but not in",
        "invalid object name",
        "unknown revision",
        "bad revision",
    ];
    let stderr = stderr.to_ascii_lowercase();
    MISSING_MARKERS.iter().any(|marker| stderr.contains(marker))
}
