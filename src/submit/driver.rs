// src/submit/driver.rs

//! Supervision of the submission subprocess.

use std::time::Duration;

use tracing::{error, info};

use crate::config::ConfigSection;
use crate::errors::{Result, SubmissionError};
use crate::exec::{CommandBackend, CommandLine};

/// How long one submission may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub base_secs: u64,
    pub per_job_secs: u64,
    pub min_secs: u64,
}

impl TimeoutPolicy {
    pub fn from_config(cfg: &ConfigSection) -> Self {
        Self {
            base_secs: cfg.submit_timeout_secs,
            per_job_secs: cfg.submit_timeout_per_job_secs,
            min_secs: cfg.min_submit_timeout_secs,
        }
    }

    /// `max(base + per_job * jobs, min)`, raised to the stage's own
    /// timeout when that is longer.
    pub fn timeout(&self, jobs: u32, stage_secs: Option<u64>) -> Duration {
        let computed = self
            .base_secs
            .saturating_add(self.per_job_secs.saturating_mul(u64::from(jobs)))
            .max(self.min_secs);
        Duration::from_secs(stage_secs.map_or(computed, |s| s.max(computed)))
    }
}

/// Job id from the submission output: last word of the line mentioning
/// `JobsubJobId`.
pub fn parse_job_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .filter(|l| l.contains("JobsubJobId"))
        .next_back()
        .and_then(|l| l.split_whitespace().next_back())
        .map(str::to_string)
}

/// Runs a submission command and maps its outcome to a job id or a typed
/// failure.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionDriver<'a> {
    backend: &'a dyn CommandBackend,
    policy: TimeoutPolicy,
}

impl<'a> SubmissionDriver<'a> {
    pub fn new(backend: &'a dyn CommandBackend, policy: TimeoutPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> TimeoutPolicy {
        self.policy
    }

    pub async fn submit(
        &self,
        command: CommandLine,
        jobs: u32,
        stage_timeout_secs: Option<u64>,
    ) -> Result<String> {
        let timeout = self.policy.timeout(jobs, stage_timeout_secs);
        let rendered = command.to_string();
        println!("Invoke jobsub_submit");
        info!(command = %rendered, timeout_secs = timeout.as_secs(), "submitting");

        let out = self.backend.invoke(command, timeout).await?;

        if out.timed_out {
            error!(command = %rendered, "submission timed out");
            return Err(SubmissionError::TimedOut {
                command: rendered,
                timeout_secs: timeout.as_secs(),
                stdout: out.stdout,
                stderr: out.stderr,
            }
            .into());
        }
        if !out.success() {
            error!(command = %rendered, exit_code = out.exit_code, "submission failed");
            return Err(SubmissionError::Failed {
                command: rendered,
                exit_code: out.exit_code,
                stdout: out.stdout,
                stderr: out.stderr,
            }
            .into());
        }
        match parse_job_id(&out.stdout) {
            Some(job_id) => {
                info!(job_id = %job_id, "submitted");
                Ok(job_id)
            }
            None => Err(SubmissionError::MissingJobId {
                command: rendered,
                stdout: out.stdout,
            }
            .into()),
        }
    }
}
