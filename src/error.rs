//! Error types for deferred-drop-check

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while analysing migrations and models
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Models path is not a directory: {path}")]
    InvalidModelsPath { path: PathBuf },

    #[error("Python syntax error in {path} at line {line}")]
    PythonSyntaxError { path: PathBuf, line: usize },

    #[error("Failed to load Python grammar: {message}")]
    GrammarError { message: String },

    #[error("Failed to run git")]
    GitSpawnError {
        #[source]
        source: std::io::Error,
    },

    #[error("git show {object} failed: {stderr}")]
    GitShowError { object: String, stderr: String },

    #[error("git show {object} returned non UTF-8 content")]
    GitOutputError { object: String },
}
