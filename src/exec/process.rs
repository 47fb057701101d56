// src/exec/process.rs

//! Real subprocess backend.
//!
//! Each command runs in its own process group so a timeout can take down
//! anything it forked. Output readers get a short grace period after the
//! child is gone; a descendant that still holds the pipes open only costs
//! the output it has not written yet.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{BackendFuture, CommandBackend, ProcessOutput};
use super::command::CommandLine;

/// How long to wait for stdout/stderr to reach EOF once the child exited.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Runs commands with `tokio::process`, killing their process group when
/// the deadline expires.
#[derive(Debug, Clone, Default)]
pub struct ProcessBackend;

impl CommandBackend for ProcessBackend {
    fn invoke(&self, command: CommandLine, timeout: Duration) -> BackendFuture<'_> {
        Box::pin(run_process(command, timeout))
    }
}

async fn run_process(command: CommandLine, timeout: Duration) -> Result<ProcessOutput> {
    let rendered = command.to_string();
    info!(cmd = %rendered, timeout_secs = timeout.as_secs(), "starting process");

    let mut cmd = Command::new(command.program());
    cmd.args(command.arguments())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);
    if let Some(dir) = command.cwd() {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning `{rendered}`"))?;
    let group = child.id().map(|id| Pid::from_raw(id as i32));

    let stdout = child.stdout.take().map(|s| Capture::spawn(s, "stdout"));
    let stderr = child.stderr.take().map(|s| Capture::spawn(s, "stderr"));

    let (exit_code, timed_out) = tokio::select! {
        status_res = child.wait() => {
            let status = status_res.with_context(|| format!("waiting for `{rendered}`"))?;
            let code = status.code().unwrap_or(-1);
            info!(cmd = %rendered, exit_code = code, "process exited");
            (code, false)
        }
        _ = tokio::time::sleep(timeout) => {
            warn!(cmd = %rendered, timeout_secs = timeout.as_secs(), "deadline expired; killing process group");
            if let Some(pgid) = group {
                if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                    warn!(cmd = %rendered, error = %e, "failed to kill process group");
                }
            }
            if let Err(e) = child.kill().await {
                warn!(cmd = %rendered, error = %e, "failed to kill process");
            }
            (-1, true)
        }
    };

    Ok(ProcessOutput {
        exit_code,
        stdout: Capture::finish(stdout, &rendered).await,
        stderr: Capture::finish(stderr, &rendered).await,
        timed_out,
    })
}

/// A pipe reader accumulating lines into a buffer shared with the caller.
struct Capture {
    buf: Arc<Mutex<String>>,
    task: JoinHandle<()>,
}

impl Capture {
    fn spawn<R>(reader: R, stream: &'static str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&buf);
        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(stream, "{}", line);
                if let Ok(mut out) = sink.lock() {
                    out.push_str(&line);
                    out.push('\n');
                }
            }
        });
        Self { buf, task }
    }

    async fn finish(capture: Option<Self>, rendered: &str) -> String {
        let Some(Self { buf, mut task }) = capture else {
            return String::new();
        };
        if tokio::time::timeout(READER_GRACE, &mut task).await.is_err() {
            debug!(cmd = %rendered, "pipe still held open; keeping partial output");
            task.abort();
        }
        buf.lock().map(|out| out.clone()).unwrap_or_default()
    }
}
