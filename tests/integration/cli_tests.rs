//! Tests driving the deferred-drop-check binary

use std::path::Path;
use std::process::{Command, Output};

use crate::common::{drop_column_migration, execute_migration, users_model, TestContext};

fn run_cli(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_deferred-drop-check"))
        .args(args)
        .current_dir(dir)
        .env_remove("DEFERRED_CHECK_MODELS_PATH")
        .env_remove("DEFERRED_CHECK_MIGRATIONS_PATH")
        .env_remove("DEFERRED_CHECK_REFERENCE")
        .env_remove("DEFERRED_CHECK_LOG")
        .output()
        .expect("Failed to run deferred-drop-check")
}

fn git(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_no_files_passes_silently() {
    let ctx = TestContext::new();
    let output = run_cli(&ctx.root, &[]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).is_empty());
}

#[test]
fn test_missing_model_is_only_a_warning() {
    let ctx = TestContext::new();
    ctx.write_migration("0003.py", &execute_migration("ALTER TABLE orders DROP COLUMN total"));

    let output = run_cli(
        &ctx.root,
        &["--db-migrations-path", "alembic/versions", "alembic/versions/0003.py"],
    );
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(stdout(&output).contains("Running deferred column check..."));
    assert!(stdout(&output)
        .contains("Found DROP COLUMN in op.execute for 'orders.total' in alembic/versions/0003.py"));
    assert!(stderr(&output)
        .contains("WARNING: Could not find a model file for table 'orders'. Please check manually."));
    assert!(stdout(&output).contains("Check passed."));
}

#[test]
fn test_strict_flag_fails_on_missing_model() {
    let ctx = TestContext::new();
    ctx.write_migration("0003.py", &execute_migration("ALTER TABLE orders DROP COLUMN total"));

    let output = run_cli(
        &ctx.root,
        &["--strict-missing-models", "alembic/versions/0003.py"],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Check failed."));
}

#[test]
fn test_models_path_must_exist() {
    let ctx = TestContext::new();
    ctx.write_migration("0002.py", &drop_column_migration("users", "legacy_flag"));

    let output = run_cli(
        &ctx.root,
        &["--models-path", "no/such/dir", "alembic/versions/0002.py"],
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Models path is not a directory"));
}

#[test]
fn test_against_git_history() {
    let ctx = TestContext::new();
    if !git(&ctx.root, &["init", "--quiet"]) {
        eprintln!("Warning: git not available, skipping");
        return;
    }
    ctx.write_file("app/models/user.py", &users_model("Column(Boolean)"));
    assert!(git(&ctx.root, &["add", "."]));
    assert!(git(&ctx.root, &["commit", "--quiet", "-m", "eager"]));
    assert!(git(&ctx.root, &["tag", "eager"]));

    ctx.write_file(
        "app/models/user.py",
        &users_model("deferred(Column(Boolean))"),
    );
    assert!(git(&ctx.root, &["commit", "--quiet", "-am", "defer"]));
    ctx.write_migration("0002.py", &drop_column_migration("users", "legacy_flag"));

    let passing = run_cli(
        &ctx.root,
        &["--reference", "HEAD", "alembic/versions/0002.py"],
    );
    assert_eq!(passing.status.code(), Some(0), "{}", stderr(&passing));

    let failing = run_cli(
        &ctx.root,
        &["--reference", "eager", "alembic/versions/0002.py"],
    );
    assert_eq!(failing.status.code(), Some(1));
    let err = stderr(&failing);
    assert!(err.contains(&"-".repeat(70)));
    assert!(err.contains("  Table:     users"));
    assert!(err.contains("  Column:    legacy_flag"));
    assert!(err.contains("at eager"));
}

#[test]
fn test_new_model_in_git_fails() {
    let ctx = TestContext::new();
    if !git(&ctx.root, &["init", "--quiet"]) {
        eprintln!("Warning: git not available, skipping");
        return;
    }
    ctx.write_file("README.md", "app\n");
    assert!(git(&ctx.root, &["add", "."]));
    assert!(git(&ctx.root, &["commit", "--quiet", "-m", "init"]));

    ctx.write_file("app/models/user.py", &users_model("Column(Boolean)"));
    ctx.write_migration("0002.py", &drop_column_migration("users", "legacy_flag"));

    let output = run_cli(
        &ctx.root,
        &["--reference", "HEAD", "alembic/versions/0002.py"],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("seems to be new"));
}
