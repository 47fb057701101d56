// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Per-worker problems never show up here: they are collected by the
//! reconciliation engine as [`crate::reconcile::WorkerFailure`] records and
//! written to `bad.list`. Everything in this module is fatal to the current
//! action.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridstageError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Cycle detected in stage graph: {0}")]
    StageCycle(String),

    #[error("Stage not found: {0}")]
    StageNotFound(String),

    #[error("Usage error: {0}")]
    Usage(String),

    /// An expected directory or bookkeeping file is absent.
    #[error("Structural error at {path:?}: {reason}")]
    Structural { path: PathBuf, reason: String },

    /// Refused to delete a directory owned by somebody else.
    #[error("Owner mismatch, delete {path:?} manually (owner uid {owner}, caller uid {uid}, euid {euid})")]
    Ownership {
        path: PathBuf,
        owner: u32,
        uid: u32,
        euid: u32,
    },

    /// Recorded bookkeeping disagrees with what was recomputed.
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Submission already running for stage '{stage}' (marker {marker:?})")]
    SubmissionRunning { stage: String, marker: PathBuf },

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures of the external submission service.
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("command `{command}` exited with status {exit_code}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    Failed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("command `{command}` timed out after {timeout_secs}s and was killed\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    TimedOut {
        command: String,
        timeout_secs: u64,
        stdout: String,
        stderr: String,
    },

    #[error("command `{command}` succeeded but printed no JobsubJobId\nstdout:\n{stdout}")]
    MissingJobId { command: String, stdout: String },
}

/// Failures of the dataset/metadata catalog.
///
/// The not-found variants are expected signals used to decide between
/// create and reuse; `Service` is always fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Dataset definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("File not found in catalog: {0}")]
    FileNotFound(String),

    #[error("Catalog service failure in `{operation}`: {message}")]
    Service { operation: String, message: String },
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::DefinitionNotFound(_) | CatalogError::FileNotFound(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, GridstageError>;
