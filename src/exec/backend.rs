// src/exec/backend.rs

//! Pluggable command backend.
//!
//! Every external collaborator (submission client, catalog client, `tar`,
//! the merge program) is invoked through a `CommandBackend`. Production
//! code uses [`ProcessBackend`](super::process::ProcessBackend); tests swap
//! in a fake that records command lines and returns scripted output.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::Result;

use super::command::CommandLine;

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit status; `-1` when the process was killed or had no status.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// The deadline expired and the process was killed.
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<ProcessOutput>> + Send + 'a>>;

pub trait CommandBackend: Send + Sync + Debug {
    /// Run `command` to completion or until `timeout` expires.
    ///
    /// Only failing to start the process is an `Err`; a nonzero exit or a
    /// timeout is reported through [`ProcessOutput`].
    fn invoke(&self, command: CommandLine, timeout: Duration) -> BackendFuture<'_>;
}
