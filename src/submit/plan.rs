// src/submit/plan.rs

//! Submission shape and DAG rendering.

use std::fmt::Write as _;

use crate::exec::CommandLine;
use crate::project::StageInput;

/// File name of the rendered DAG in the work directory.
pub const DAG_FILE: &str = "submit.dag";

/// Program name used for every node inside a DAG.
const DAG_NODE_PROGRAM: &str = "jobsub";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionShape {
    /// One job-array submission.
    Single,
    /// Start sessions, run the worker replicas, stop sessions.
    Dag,
}

/// More than one job, any dataset input or a forced DAG gives a DAG.
pub fn decide_shape(input: &StageInput, job_count: u32, force_dag: bool) -> SubmissionShape {
    if job_count > 1 || input.is_dataset() || force_dag {
        SubmissionShape::Dag
    } else {
        SubmissionShape::Single
    }
}

/// The three phases of a DAG submission.
#[derive(Debug, Clone, PartialEq)]
pub struct DagPlan {
    /// Session start jobs, empty when nothing has to be started.
    pub start: Vec<CommandLine>,
    /// Worker template; one node per entry of `processes`.
    pub worker: CommandLine,
    pub processes: Vec<u32>,
    pub stop: Vec<CommandLine>,
}

impl DagPlan {
    /// Worker node for one process: job-count, role and server flags are
    /// dropped and `--process <i>` appended.
    pub fn worker_node(&self, process: u32) -> CommandLine {
        let mut node = CommandLine::new(DAG_NODE_PROGRAM);
        node.args(self.worker.arguments().iter().cloned());
        node.remove_opt("-N")
            .remove_prefixed("--role=")
            .remove_prefixed("--jobsub-server=")
            .opt("--process", process);
        node
    }

    /// Text of the DAG description file.
    pub fn render(&self) -> String {
        let mut out = String::from("<serial>\n");
        if !self.start.is_empty() {
            write_section(&mut out, self.start.iter().map(node_line));
        }
        write_section(
            &mut out,
            self.processes
                .iter()
                .map(|&p| dollar_escape(&node_line(&self.worker_node(p)))),
        );
        if !self.stop.is_empty() {
            write_section(&mut out, self.stop.iter().map(node_line));
        }
        out.push_str("\n</serial>\n");
        out
    }
}

fn write_section(out: &mut String, lines: impl Iterator<Item = String>) {
    out.push_str("\n<parallel>\n\n");
    for line in lines {
        let _ = writeln!(out, "{line}\n");
    }
    out.push_str("</parallel>\n");
}

/// `jobsub -n <args>`: nodes are never submitted individually.
fn node_line(cmd: &CommandLine) -> String {
    let args = cmd.render_args();
    if args.is_empty() {
        format!("{DAG_NODE_PROGRAM} -n")
    } else {
        format!("{DAG_NODE_PROGRAM} -n {args}")
    }
}

fn dollar_escape(line: &str) -> String {
    line.replace('$', r"\$")
}

