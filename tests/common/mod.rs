//! Common test utilities for deferred-drop-check tests

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use deferred_drop_check::{run_check, CheckError, CheckOptions, HistoryProvider, Verdict};
use tempfile::TempDir;

/// Migrations live under this directory in every test tree
pub const MIGRATIONS_DIR: &str = "alembic/versions";

/// History served from memory, keyed by path relative to the test tree
pub struct UpstreamHistory {
    root: PathBuf,
    files: RefCell<HashMap<String, String>>,
    fetches: Cell<usize>,
    failure: RefCell<Option<String>>,
}

impl UpstreamHistory {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            files: RefCell::new(HashMap::new()),
            fetches: Cell::new(0),
            failure: RefCell::new(None),
        }
    }

    fn relative(&self, path: &str) -> String {
        Path::new(path)
            .strip_prefix(&self.root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| path.to_string())
    }
}

impl HistoryProvider for UpstreamHistory {
    fn fetch(&self, path: &str, reference: &str) -> Result<Option<String>, CheckError> {
        self.fetches.set(self.fetches.get() + 1);
        if let Some(stderr) = self.failure.borrow().as_ref() {
            return Err(CheckError::GitShowError {
                object: format!("{}:{}", reference, path),
                stderr: stderr.clone(),
            });
        }
        Ok(self.files.borrow().get(&self.relative(path)).cloned())
    }
}

/// Test context with a temporary working tree and an in-memory upstream
pub struct TestContext {
    /// Kept to prevent temp directory cleanup until TestContext is dropped
    _temp_dir: TempDir,
    pub root: PathBuf,
    pub history: UpstreamHistory,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().to_path_buf();
        Self {
            history: UpstreamHistory::new(root.clone()),
            _temp_dir: temp_dir,
            root,
        }
    }

    /// Write a file into the working tree
    pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Write a migration under [`MIGRATIONS_DIR`]
    pub fn write_migration(&self, name: &str, content: &str) -> PathBuf {
        self.write_file(&format!("{}/{}", MIGRATIONS_DIR, name), content)
    }

    /// Record `content` as the upstream version of `relative`
    pub fn publish(&self, relative: &str, content: &str) {
        self.history
            .files
            .borrow_mut()
            .insert(relative.to_string(), content.to_string());
    }

    /// Write a file into the working tree and record the same content upstream
    pub fn write_published(&self, relative: &str, content: &str) -> PathBuf {
        self.publish(relative, content);
        self.write_file(relative, content)
    }

    /// Make every history lookup fail with `stderr`
    pub fn break_history(&self, stderr: &str) {
        *self.history.failure.borrow_mut() = Some(stderr.to_string());
    }

    pub fn history_fetches(&self) -> usize {
        self.history.fetches.get()
    }

    pub fn options(&self, files: &[PathBuf]) -> CheckOptions {
        CheckOptions {
            filenames: files.to_vec(),
            models_path: self.root.clone(),
            migrations_path: MIGRATIONS_DIR.to_string(),
            ..CheckOptions::default()
        }
    }

    /// Run the check over `files`, panicking on an internal error
    pub fn check(&self, files: &[PathBuf]) -> Verdict {
        self.check_with(self.options(files))
    }

    pub fn check_with(&self, options: CheckOptions) -> Verdict {
        run_check(&options, &self.history).expect("Check failed to run")
    }
}

/// Migration whose upgrade drops `table.column` with `op.drop_column`
pub fn drop_column_migration(table: &str, column: &str) -> String {
    format!(
        r#""""drop {column}"""
from alembic import op
import sqlalchemy as sa

revision = "0002"
down_revision = "0001"


def upgrade():
    op.drop_column("{table}", "{column}")


def downgrade():
    op.add_column("{table}", sa.Column("{column}", sa.Boolean(), nullable=True))
"#
    )
}

/// Migration whose upgrade runs `sql` through `op.execute`
pub fn execute_migration(sql: &str) -> String {
    format!(
        r#"from alembic import op

revision = "0003"
down_revision = "0002"


def upgrade():
    op.execute("{sql}")


def downgrade():
    pass
"#
    )
}

/// `users` model with `legacy_flag` declared as `declaration`
pub fn users_model(declaration: &str) -> String {
    format!(
        r#"from sqlalchemy import Boolean, Column, Integer, String
from sqlalchemy.orm import deferred

from app.db import Base


class User(Base):
    __tablename__ = "users"

    id = Column(Integer, primary_key=True)
    email = Column(String(255), nullable=False)
    legacy_flag = {declaration}
"#
    )
}

/// `orders` model with a plain `total` column
pub const ORDERS_MODEL: &str = r#"from sqlalchemy import Column, Integer, Numeric

from app.db import Base


class Order(Base):
    __tablename__ = "orders"

    id = Column(Integer, primary_key=True)
    total = Column(Numeric(10, 2))
"#;
