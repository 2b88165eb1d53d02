use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use deferred_drop_check::config::DEFAULT_REFERENCE;
use deferred_drop_check::{print_report, run_check, CheckOptions, GitHistory};

/// Environment variable holding the log filter
const LOG_ENV: &str = "DEFERRED_CHECK_LOG";

#[derive(Parser)]
#[command(name = "deferred-drop-check")]
#[command(
    author,
    version,
    about = "Block Alembic migrations that drop columns not yet deferred in the model"
)]
struct Cli {
    /// Changed files; only migrations are inspected
    filenames: Vec<PathBuf>,

    /// Root of the tree searched for model definitions
    #[arg(long, env = "DEFERRED_CHECK_MODELS_PATH", default_value = ".")]
    models_path: PathBuf,

    /// Only files whose path contains this are treated as migrations
    #[arg(long, env = "DEFERRED_CHECK_MIGRATIONS_PATH", default_value = ".")]
    db_migrations_path: String,

    /// Git reference holding the deployed models
    #[arg(long, env = "DEFERRED_CHECK_REFERENCE", default_value = DEFAULT_REFERENCE)]
    reference: String,

    /// Extra directory name to skip when searching for models (repeatable)
    #[arg(long = "exclude-dir", value_name = "NAME")]
    exclude_dirs: Vec<String>,

    /// Fail when no model file declares a dropped column's table
    #[arg(long)]
    strict_missing_models: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<bool> {
    let options = CheckOptions {
        filenames: cli.filenames,
        models_path: cli.models_path,
        migrations_path: cli.db_migrations_path,
        reference: cli.reference,
        extra_excluded_dirs: cli.exclude_dirs,
        strict_missing_models: cli.strict_missing_models,
        verbose: cli.verbose,
    };

    let verdict = run_check(&options, &GitHistory::new())?;
    print_report(&verdict, options.verbose)?;
    Ok(!verdict.has_errors())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
