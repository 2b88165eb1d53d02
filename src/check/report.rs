//! Human-readable check report printer

use std::io::{self, Write};

use super::{Diagnostic, Verdict};
use crate::migration::{DropOrigin, DroppedColumn};
use crate::model::{ColumnDeferralState, ModelInspection};

const RULE_WIDTH: usize = 70;

/// Print the report: info lines to stdout, warnings and errors to stderr.
pub fn print_report(verdict: &Verdict, verbose: bool) -> io::Result<()> {
    let stdout = io::stdout();
    let stderr = io::stderr();
    write_report(verdict, verbose, &mut stdout.lock(), &mut stderr.lock())
}

/// Render the report into `out` (info) and `err` (warnings and errors).
///
/// Nothing is written when no migration file was checked.
pub fn write_report(
    verdict: &Verdict,
    verbose: bool,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> io::Result<()> {
    if verdict.files_checked == 0 {
        return Ok(());
    }

    writeln!(out, "Running deferred column check...")?;

    for diagnostic in &verdict.diagnostics {
        match diagnostic {
            Diagnostic::DropFound { drop } => match drop.origin {
                DropOrigin::DropColumnCall => writeln!(
                    out,
                    "  - Found drop_column for '{}.{}' in {}",
                    drop.table_name,
                    drop.column_name,
                    drop.migration_file.display()
                )?,
                DropOrigin::ExecuteSql => writeln!(
                    out,
                    "  - Found DROP COLUMN in op.execute for '{}.{}' in {}",
                    drop.table_name,
                    drop.column_name,
                    drop.migration_file.display()
                )?,
            },
            Diagnostic::DynamicSqlSkipped { file, line } => {
                if verbose {
                    writeln!(
                        out,
                        "  - Skipped op.execute with SQL built at runtime in {} (line {}). Please check manually.",
                        file.display(),
                        line
                    )?;
                }
            }
            Diagnostic::Verified { drop, model_path } => {
                if verbose {
                    writeln!(
                        out,
                        "    OK: '{}' is deferred in {} at {}",
                        drop.column_name,
                        model_path.display(),
                        verdict.reference
                    )?;
                }
            }
            Diagnostic::ParseFailure { file, message } => {
                writeln!(err, "Error parsing {}: {}", file.display(), message)?
            }
            Diagnostic::ModelNotFound { drop, fatal } => {
                if *fatal {
                    writeln!(
                        err,
                        "    ERROR: Could not find a model file for table '{}'. Missing models are fatal with --strict-missing-models.",
                        drop.table_name
                    )?
                } else {
                    writeln!(
                        err,
                        "    WARNING: Could not find a model file for table '{}'. Please check manually.",
                        drop.table_name
                    )?
                }
            }
            Diagnostic::AmbiguousModel { table, candidates } => {
                let listed: Vec<String> = candidates
                    .iter()
                    .map(|c| c.display().to_string())
                    .collect();
                writeln!(
                    err,
                    "    WARNING: Table '{}' is declared in more than one file, using the first: {}",
                    table,
                    listed.join(", ")
                )?
            }
            Diagnostic::ModelIsNew { model_path, .. } => writeln!(
                err,
                "    ERROR: Model file '{}' seems to be new. You cannot drop a column from a newly created model.",
                model_path.display()
            )?,
            Diagnostic::HistoryUnavailable {
                drop,
                model_path,
                reason,
            } => writeln!(
                err,
                "    ERROR: Could not read '{}' at {} ({}). Cannot verify that '{}.{}' was deferred.",
                model_path.display(),
                verdict.reference,
                reason,
                drop.table_name,
                drop.column_name
            )?,
            Diagnostic::HistoricalModelUnparseable {
                drop,
                model_path,
                message,
            } => writeln!(
                err,
                "    ERROR: '{}' at {} could not be parsed ({}). Cannot verify that '{}.{}' was deferred.",
                model_path.display(),
                verdict.reference,
                message,
                drop.table_name,
                drop.column_name
            )?,
            Diagnostic::NotDeferred {
                drop,
                model_path,
                inspection,
            } => write_not_deferred(err, drop, model_path, inspection, &verdict.reference)?,
        }
    }

    if verdict.has_errors() {
        writeln!(out)?;
        writeln!(
            out,
            "Check failed. Please fix your models/migrations and try committing again."
        )?;
    } else {
        writeln!(out, "Check passed.")?;
    }
    Ok(())
}

fn write_not_deferred(
    err: &mut dyn Write,
    drop: &DroppedColumn,
    model_path: &std::path::Path,
    inspection: &ModelInspection,
    reference: &str,
) -> io::Result<()> {
    let rule = "-".repeat(RULE_WIDTH);
    writeln!(err, "{}", rule)?;
    writeln!(err, "ERROR: Dropping a column that was not deferred")?;
    writeln!(err, "  Table:     {}", drop.table_name)?;
    writeln!(err, "  Column:    {}", drop.column_name)?;
    writeln!(
        err,
        "  Migration: {} (line {})",
        drop.migration_file.display(),
        drop.line_no
    )?;
    writeln!(err, "  Model:     {} at {}", model_path.display(), reference)?;
    writeln!(err, "  Found:     {}", describe_inspection(inspection, drop))?;
    writeln!(err)?;
    writeln!(err, "  Columns must be removed in two steps:")?;
    writeln!(
        err,
        "    1. Mark the column `deferred()` in the model and deploy that change."
    )?;
    writeln!(
        err,
        "    2. Only after it is deployed, remove the column and generate this migration in a later change."
    )?;
    writeln!(err, "{}", rule)
}

fn describe_inspection(inspection: &ModelInspection, drop: &DroppedColumn) -> String {
    let class = inspection.class_name.as_deref().unwrap_or("?");
    match (inspection.state, inspection.line) {
        (ColumnDeferralState::NotDeferred, Some(line)) => {
            format!("{}.{} (line {}) is not deferred", class, drop.column_name, line)
        }
        (ColumnDeferralState::Absent, _) if inspection.class_name.is_none() => {
            format!("no class declares __tablename__ = '{}'", drop.table_name)
        }
        (state, _) => format!("{}.{} is {}", class, drop.column_name, state),
    }
}
