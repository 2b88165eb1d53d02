//! Deferred column check
//!
//! Sequences the pipeline over every changed migration: scan for dropped
//! columns, locate each table's model, fetch the model at the reference point
//! and require the column to be deferred there. Every problem in every file is
//! collected before the verdict is returned.

pub mod report;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::{CheckOptions, SOURCE_EXTENSION};
use crate::error::CheckError;
use crate::history::{resolve_history, HistoryLookup, HistoryProvider};
use crate::migration::{scan_migration_file, DroppedColumn};
use crate::model::{inspect_model, ColumnDeferralState, ModelInspection, ModelLocator};

pub use report::{print_report, write_report};

/// How serious a diagnostic is. Any `Error` fails the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One finding of a check run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A migration drops a column
    DropFound { drop: DroppedColumn },
    /// An `execute` call with SQL built at runtime was not inspected
    DynamicSqlSkipped { file: PathBuf, line: usize },
    /// A migration could not be read or parsed
    ParseFailure { file: PathBuf, message: String },
    /// No model declares the table
    ModelNotFound { drop: DroppedColumn, fatal: bool },
    /// Several files declare the table; the first is used
    AmbiguousModel {
        table: String,
        candidates: Vec<PathBuf>,
    },
    /// The model file does not exist at the reference point
    ModelIsNew {
        drop: DroppedColumn,
        model_path: PathBuf,
    },
    /// The model file could not be fetched from history
    HistoryUnavailable {
        drop: DroppedColumn,
        model_path: PathBuf,
        reason: String,
    },
    /// The model file at the reference point is not valid Python
    HistoricalModelUnparseable {
        drop: DroppedColumn,
        model_path: PathBuf,
        message: String,
    },
    /// The column was not deferred at the reference point
    NotDeferred {
        drop: DroppedColumn,
        model_path: PathBuf,
        inspection: ModelInspection,
    },
    /// The column was deferred at the reference point
    Verified {
        drop: DroppedColumn,
        model_path: PathBuf,
    },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::DropFound { .. }
            | Diagnostic::DynamicSqlSkipped { .. }
            | Diagnostic::Verified { .. } => Severity::Info,
            Diagnostic::ParseFailure { .. } | Diagnostic::AmbiguousModel { .. } => {
                Severity::Warning
            }
            Diagnostic::ModelNotFound { fatal, .. } => {
                if *fatal {
                    Severity::Error
                } else {
                    Severity::Warning
                }
            }
            Diagnostic::ModelIsNew { .. }
            | Diagnostic::HistoryUnavailable { .. }
            | Diagnostic::HistoricalModelUnparseable { .. }
            | Diagnostic::NotDeferred { .. } => Severity::Error,
        }
    }
}

/// Outcome of a check run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    /// Findings in the order they were made
    pub diagnostics: Vec<Diagnostic>,
    /// Reference point the models were compared against
    pub reference: String,
    /// Number of migration files inspected
    pub files_checked: usize,
    /// Number of dropped columns found
    pub drops_found: usize,
}

impl Verdict {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity() == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity() == Severity::Warning)
    }
}

/// Run the check over the migration files among `options.filenames`
pub fn run_check(options: &CheckOptions, history: &dyn HistoryProvider) -> Result<Verdict> {
    let migration_files = options.migration_files();
    if migration_files.is_empty() {
        return Ok(Verdict {
            reference: options.reference.clone(),
            ..Verdict::default()
        });
    }

    if !options.models_path.is_dir() {
        return Err(CheckError::InvalidModelsPath {
            path: options.models_path.clone(),
        }
        .into());
    }

    let mut checker = Checker::new(options, history);
    for file in migration_files {
        checker.check_file(file);
    }
    Ok(checker.finish())
}

/// State of one check run: the verdict so far plus per-run lookup caches
pub struct Checker<'a> {
    options: &'a CheckOptions,
    history: &'a dyn HistoryProvider,
    locator: ModelLocator,
    /// Model candidates per table
    model_cache: HashMap<String, Vec<PathBuf>>,
    /// Historical content per model file
    history_cache: HashMap<PathBuf, HistoryLookup>,
    verdict: Verdict,
}

impl<'a> Checker<'a> {
    pub fn new(options: &'a CheckOptions, history: &'a dyn HistoryProvider) -> Self {
        let locator = ModelLocator::new(&options.models_path)
            .with_excluded_dirs(options.extra_excluded_dirs.iter().cloned())
            .with_excluded_path(&options.migrations_path)
            .with_extension(SOURCE_EXTENSION);

        Self {
            options,
            history,
            locator,
            model_cache: HashMap::new(),
            history_cache: HashMap::new(),
            verdict: Verdict {
                reference: options.reference.clone(),
                ..Verdict::default()
            },
        }
    }

    /// Check every column dropped by one migration file
    pub fn check_file(&mut self, path: &Path) {
        self.verdict.files_checked += 1;

        let scan = match scan_migration_file(path) {
            Ok(scan) => scan,
            Err(e) => {
                self.push(Diagnostic::ParseFailure {
                    file: path.to_path_buf(),
                    message: e.to_string(),
                });
                return;
            }
        };

        for line in scan.dynamic_sql_lines {
            self.push(Diagnostic::DynamicSqlSkipped {
                file: path.to_path_buf(),
                line,
            });
        }
        for drop in scan.dropped {
            self.check_drop(drop);
        }
    }

    fn check_drop(&mut self, drop: DroppedColumn) {
        self.verdict.drops_found += 1;
        self.push(Diagnostic::DropFound { drop: drop.clone() });

        // Assumes the model file was not renamed in the same change
        let Some(model_path) = self.model_for(&drop.table_name) else {
            self.push(Diagnostic::ModelNotFound {
                drop,
                fatal: self.options.strict_missing_models,
            });
            return;
        };

        let content = match self.history_for(&model_path) {
            HistoryLookup::Found(content) => content,
            HistoryLookup::NotFound => {
                self.push(Diagnostic::ModelIsNew { drop, model_path });
                return;
            }
            HistoryLookup::Failed(reason) => {
                self.push(Diagnostic::HistoryUnavailable {
                    drop,
                    model_path,
                    reason,
                });
                return;
            }
        };

        let diagnostic =
            match inspect_model(&content, &model_path, &drop.table_name, &drop.column_name) {
                Ok(inspection) if inspection.state == ColumnDeferralState::Deferred => {
                    Diagnostic::Verified { drop, model_path }
                }
                Ok(inspection) => Diagnostic::NotDeferred {
                    drop,
                    model_path,
                    inspection,
                },
                Err(e) => Diagnostic::HistoricalModelUnparseable {
                    drop,
                    model_path,
                    message: e.to_string(),
                },
            };
        self.push(diagnostic);
    }

    /// Model file for `table`, searching the tree once per table
    fn model_for(&mut self, table: &str) -> Option<PathBuf> {
        if !self.model_cache.contains_key(table) {
            let candidates = self.locator.find_model_candidates(table);
            if candidates.len() > 1 {
                self.push(Diagnostic::AmbiguousModel {
                    table: table.to_string(),
                    candidates: candidates.clone(),
                });
            }
            self.model_cache.insert(table.to_string(), candidates);
        }
        self.model_cache
            .get(table)
            .and_then(|candidates| candidates.first().cloned())
    }

    /// Historical content of `model_path`, fetched once per file
    fn history_for(&mut self, model_path: &Path) -> HistoryLookup {
        if let Some(lookup) = self.history_cache.get(model_path) {
            return lookup.clone();
        }
        let lookup = resolve_history(self.history, model_path, &self.options.reference);
        self.history_cache
            .insert(model_path.to_path_buf(), lookup.clone());
        lookup
    }

    fn push(&mut self, diagnostic: Diagnostic) {
        self.verdict.diagnostics.push(diagnostic);
    }

    pub fn finish(self) -> Verdict {
        self.verdict
    }
}
