use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gridstage::exec::{BackendFuture, CommandBackend, CommandLine, ProcessOutput};

/// A fake command backend that:
/// - records every command line and timeout it was asked to run
/// - replies with scripted outputs per program, in order
/// - replies with an empty success once a program's script runs out.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    calls: Arc<Mutex<Vec<(CommandLine, Duration)>>>,
    scripted: Arc<Mutex<HashMap<String, VecDeque<ProcessOutput>>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, program: &str, output: ProcessOutput) -> &Self {
        self.scripted
            .lock()
            .unwrap()
            .entry(program.to_string())
            .or_default()
            .push_back(output);
        self
    }

    pub fn respond_ok(&self, program: &str, stdout: &str) -> &Self {
        self.respond(
            program,
            ProcessOutput {
                exit_code: 0,
                stdout: stdout.to_string(),
                ..ProcessOutput::default()
            },
        )
    }

    pub fn respond_err(&self, program: &str, exit_code: i32, stderr: &str) -> &Self {
        self.respond(
            program,
            ProcessOutput {
                exit_code,
                stderr: stderr.to_string(),
                ..ProcessOutput::default()
            },
        )
    }

    pub fn respond_timeout(&self, program: &str) -> &Self {
        self.respond(
            program,
            ProcessOutput {
                exit_code: -1,
                timed_out: true,
                ..ProcessOutput::default()
            },
        )
    }

    /// A submission reply carrying `job_id`.
    pub fn respond_job_id(&self, program: &str, job_id: &str) -> &Self {
        self.respond_ok(
            program,
            &format!("Submitting job(s).\nUse job id {job_id} to retrieve output\nJobsubJobId of first job: {job_id}\n"),
        )
    }

    pub fn calls(&self) -> Vec<CommandLine> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn calls_to(&self, program: &str) -> Vec<CommandLine> {
        self.calls()
            .into_iter()
            .filter(|c| c.program() == program)
            .collect()
    }

    pub fn timeouts_for(&self, program: &str) -> Vec<Duration> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c.program() == program)
            .map(|(_, t)| *t)
            .collect()
    }
}

impl CommandBackend for FakeBackend {
    fn invoke(&self, command: CommandLine, timeout: Duration) -> BackendFuture<'_> {
        let calls = Arc::clone(&self.calls);
        let scripted = Arc::clone(&self.scripted);

        Box::pin(async move {
            let output = scripted
                .lock()
                .unwrap()
                .get_mut(command.program())
                .and_then(VecDeque::pop_front)
                .unwrap_or_default();
            calls.lock().unwrap().push((command, timeout));
            Ok(output)
        })
    }
}
