//! Alembic migration analysis
//!
//! Finds the columns a migration drops when it is applied. Only the
//! `upgrade()` function is inspected: `downgrade()` is never run forward.

mod sql_drop;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tree_sitter::Node;

use crate::error::CheckError;
use crate::python::{descendants, line_of, PythonModule};

pub use sql_drop::{parse_drop_columns, SqlColumnDrop};

/// Name of the forward migration entry point
const UPGRADE_FUNCTION: &str = "upgrade";

/// Module-level name Alembic binds its operations proxy to
const OPERATIONS_NAME: &str = "op";

/// SQLAlchemy's textual SQL construct
const TEXT_CONSTRUCT: &str = "text";

/// Names SQLAlchemy is conventionally imported as
const SQLALCHEMY_MODULE_NAMES: &[&str] = &["sa", "sqlalchemy"];

/// How a dropped column was expressed in the migration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOrigin {
    /// `op.drop_column(...)` or `batch_op.drop_column(...)`
    DropColumnCall,
    /// `ALTER TABLE ... DROP COLUMN ...` inside `op.execute(...)`
    ExecuteSql,
}

/// A column dropped by a migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedColumn {
    pub table_name: String,
    pub column_name: String,
    pub migration_file: PathBuf,
    /// 1-based line of the call that drops the column
    pub line_no: usize,
    pub origin: DropOrigin,
}

/// Everything learned from one migration file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationScan {
    pub dropped: Vec<DroppedColumn>,
    /// Lines of `execute` calls whose SQL is built at runtime and was not inspected
    pub dynamic_sql_lines: Vec<usize>,
}

/// Read and scan a migration file
pub fn scan_migration_file(path: &Path) -> Result<MigrationScan, CheckError> {
    let content = std::fs::read_to_string(path).map_err(|source| CheckError::FileReadError {
        path: path.to_path_buf(),
        source,
    })?;
    scan_migration_source(&content, path)
}

/// Scan migration source text. `path` is recorded on every dropped column.
pub fn scan_migration_source(source: &str, path: &Path) -> Result<MigrationScan, CheckError> {
    let module = PythonModule::parse(source, path)?;
    let mut scanner = Scanner {
        module: &module,
        path,
        scan: MigrationScan::default(),
        visited: HashSet::new(),
    };

    for node in descendants(module.root()) {
        if is_upgrade_function(&module, node) {
            scanner.scan_function(node);
        }
    }

    tracing::debug!(
        file = %path.display(),
        drops = scanner.scan.dropped.len(),
        dynamic_sql = scanner.scan.dynamic_sql_lines.len(),
        "scanned migration"
    );
    Ok(scanner.scan)
}

/// `with_item` nodes of a `with` statement, looking through its `with_clause`
fn with_items(with_statement: Node<'_>) -> Vec<Node<'_>> {
    let mut items = Vec::new();
    let mut cursor = with_statement.walk();
    for child in with_statement.named_children(&mut cursor) {
        match child.kind() {
            "with_item" => items.push(child),
            "with_clause" => {
                let mut clause_cursor = child.walk();
                items.extend(
                    child
                        .named_children(&mut clause_cursor)
                        .filter(|n| n.kind() == "with_item"),
                );
            }
            _ => {}
        }
    }
    items
}

fn is_upgrade_function(module: &PythonModule<'_>, node: Node<'_>) -> bool {
    node.kind() == "function_definition"
        && node
            .child_by_field_name("name")
            .is_some_and(|name| module.text(name) == UPGRADE_FUNCTION)
}

struct Scanner<'m, 's> {
    module: &'m PythonModule<'s>,
    path: &'m Path,
    scan: MigrationScan,
    /// Calls already handled, so an `upgrade` nested in another is not counted twice
    visited: HashSet<usize>,
}

impl Scanner<'_, '_> {
    fn scan_function(&mut self, function: Node<'_>) {
        let Some(body) = function.child_by_field_name("body") else {
            return;
        };
        for node in descendants(body) {
            if node.kind() == "call" && self.visited.insert(node.id()) {
                self.scan_call(node);
            }
        }
    }

    fn scan_call(&mut self, call: Node<'_>) {
        let Some((receiver, method)) = self.module.method_call(call) else {
            return;
        };

        if receiver == OPERATIONS_NAME {
            match method {
                "drop_column" => self.drop_column_call(call),
                "execute" => self.execute_call(call),
                _ => {}
            }
            return;
        }

        // Batch mode: `with op.batch_alter_table("t") as batch_op: batch_op.drop_column("c")`
        match method {
            "drop_column" => {
                if let Some(table) = self.batch_table(receiver, call) {
                    self.batch_drop_column_call(call, table);
                }
            }
            "execute" => {
                if self.batch_table(receiver, call).is_some() {
                    self.execute_call(call);
                }
            }
            _ => {}
        }
    }

    /// `op.drop_column(table_name, column_name, ...)`
    fn drop_column_call(&mut self, call: Node<'_>) {
        let args = self.module.call_arguments(call);
        let mut table_name = args
            .positional
            .first()
            .and_then(|node| self.module.string_literal(*node));
        let mut column_name = args
            .positional
            .get(1)
            .and_then(|node| self.module.string_literal(*node));

        if let Some(value) = args
            .keyword("table_name")
            .and_then(|node| self.module.string_literal(node))
        {
            table_name = Some(value);
        }
        if let Some(value) = args
            .keyword("column_name")
            .and_then(|node| self.module.string_literal(node))
        {
            column_name = Some(value);
        }

        match (table_name, column_name) {
            (Some(table), Some(column)) if !table.is_empty() && !column.is_empty() => {
                self.push(table, column, call, DropOrigin::DropColumnCall)
            }
            _ => tracing::debug!(
                file = %self.path.display(),
                line = line_of(call),
                "drop_column without literal table and column"
            ),
        }
    }

    /// `batch_op.drop_column(column_name, ...)`
    fn batch_drop_column_call(&mut self, call: Node<'_>, table: String) {
        let args = self.module.call_arguments(call);
        let column_name = args
            .keyword("column_name")
            .and_then(|node| self.module.string_literal(node))
            .or_else(|| {
                args.positional
                    .first()
                    .and_then(|node| self.module.string_literal(*node))
            });

        if let Some(column) = column_name.filter(|c| !c.is_empty()) {
            self.push(table, column, call, DropOrigin::DropColumnCall);
        }
    }

    /// `op.execute(sql)`: inspect literal SQL, record anything else as skipped
    fn execute_call(&mut self, call: Node<'_>) {
        let args = self.module.call_arguments(call);
        let statement = args
            .positional
            .first()
            .copied()
            .or_else(|| args.keyword("sqltext"));

        let Some(sql) = statement.and_then(|node| self.literal_sql(node)) else {
            tracing::debug!(
                file = %self.path.display(),
                line = line_of(call),
                "skipping execute with non-literal SQL"
            );
            self.scan.dynamic_sql_lines.push(line_of(call));
            return;
        };

        for drop in parse_drop_columns(&sql) {
            self.push(drop.table, drop.column, call, DropOrigin::ExecuteSql);
        }
    }

    /// SQL text of a literal string or of `text("...")` / `sa.text("...")`
    fn literal_sql(&self, node: Node<'_>) -> Option<String> {
        if let Some(sql) = self.module.string_literal(node) {
            return Some(sql);
        }
        if node.kind() == "call" && self.is_text_construct(node) {
            let args = self.module.call_arguments(node);
            return args
                .positional
                .first()
                .and_then(|inner| self.module.string_literal(*inner));
        }
        None
    }

    /// `text(...)`, `sa.text(...)` or `sqlalchemy.text(...)`
    fn is_text_construct(&self, call: Node<'_>) -> bool {
        let Some(function) = call.child_by_field_name("function") else {
            return false;
        };
        match function.kind() {
            "identifier" => self.module.text(function) == TEXT_CONSTRUCT,
            "attribute" => self
                .module
                .method_call(call)
                .is_some_and(|(receiver, name)| {
                    name == TEXT_CONSTRUCT && SQLALCHEMY_MODULE_NAMES.contains(&receiver)
                }),
            _ => false,
        }
    }

    /// Table of the innermost enclosing `op.batch_alter_table(...) as <receiver>`
    fn batch_table(&self, receiver: &str, call: Node<'_>) -> Option<String> {
        let mut current = call.parent();
        while let Some(node) = current {
            if node.kind() == "function_definition" {
                return None;
            }
            if node.kind() == "with_statement" {
                if let Some(table) = self.batch_alias_table(node, receiver) {
                    return Some(table);
                }
            }
            current = node.parent();
        }
        None
    }

    fn batch_alias_table(&self, with_statement: Node<'_>, receiver: &str) -> Option<String> {
        for item in with_items(with_statement) {
            let Some(value) = item.child_by_field_name("value") else {
                continue;
            };
            // `with x as y` is either an `as_pattern` value or a value/alias pair
            let (target, alias) = if value.kind() == "as_pattern" {
                (value.named_child(0), value.child_by_field_name("alias"))
            } else {
                (Some(value), item.child_by_field_name("alias"))
            };
            if alias.map(|a| self.module.text(a).trim()) != Some(receiver) {
                continue;
            }
            let Some(target) = target.filter(|n| n.kind() == "call") else {
                continue;
            };
            if self.module.method_call(target) != Some((OPERATIONS_NAME, "batch_alter_table")) {
                continue;
            }

            let args = self.module.call_arguments(target);
            return args
                .keyword("table_name")
                .and_then(|node| self.module.string_literal(node))
                .or_else(|| {
                    args.positional
                        .first()
                        .and_then(|node| self.module.string_literal(*node))
                });
        }
        None
    }

    fn push(&mut self, table_name: String, column_name: String, call: Node<'_>, origin: DropOrigin) {
        self.scan.dropped.push(DroppedColumn {
            table_name,
            column_name,
            migration_file: self.path.to_path_buf(),
            line_no: line_of(call),
            origin,
        });
    }
}
