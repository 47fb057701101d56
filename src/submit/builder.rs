// src/submit/builder.rs

//! Assembly of submission requests.
//!
//! The builder is pure apart from reading the stage's input list: it
//! returns the command to run plus the files that must be staged in the
//! work directory before running it.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::plan::{DAG_FILE, DagPlan, SubmissionShape, decide_shape};
use super::wrapper::{WRAPPER_FCL, render_wrapper};
use crate::catalog::{current_user, project_name};
use crate::errors::Result;
use crate::exec::CommandLine;
use crate::fs::FileSystem;
use crate::makeup::{MakeupPlan, MakeupWork};
use crate::project::{Project, Stage, StageInput};

pub const PROCMAP_FILE: &str = "procmap.txt";

/// A file written into the work directory before submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub contents: String,
}

/// Streaming dataset session used by the workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSession {
    pub defname: String,
    pub project: String,
}

/// Per-invocation choices that are not part of the stage description.
#[derive(Debug, Clone, Default)]
pub struct SubmissionOptions<'a> {
    pub makeup: Option<&'a MakeupPlan>,
    pub recur: bool,
    /// Recursive definition replacing the configured input definition.
    pub input_def: Option<String>,
    /// Catalog project name for dataset input.
    pub sam_project: Option<String>,
    /// The session was already started outside the batch system.
    pub prestarted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRequest {
    pub shape: SubmissionShape,
    pub job_count: u32,
    /// Command handed to the submission driver.
    pub command: CommandLine,
    pub dag: Option<DagPlan>,
    pub staged: Vec<StagedFile>,
    pub session: Option<DatasetSession>,
}

impl SubmissionRequest {
    pub fn dag_text(&self) -> Option<String> {
        self.dag.as_ref().map(DagPlan::render)
    }

    /// Write every staged file, the DAG included.
    pub fn stage_files(&self, fs: &dyn FileSystem) -> Result<()> {
        for file in &self.staged {
            if let Some(parent) = file.path.parent() {
                fs.create_dir_all(parent)?;
            }
            fs.write(&file.path, file.contents.as_bytes())?;
        }
        Ok(())
    }
}

pub struct SubmissionBuilder<'a> {
    fs: &'a dyn FileSystem,
    project: &'a Project,
    stage: &'a Stage,
}

impl<'a> SubmissionBuilder<'a> {
    pub fn new(fs: &'a dyn FileSystem, project: &'a Project, stage: &'a Stage) -> Self {
        Self { fs, project, stage }
    }

    fn work_file(&self, name: &str) -> PathBuf {
        self.stage.layout.workdir.join(name)
    }

    pub fn job_count(&self, opts: &SubmissionOptions<'_>) -> u32 {
        opts.makeup
            .map(|m| m.job_count)
            .unwrap_or(self.stage.num_jobs)
    }

    /// Dataset definition the workers will stream, if any.
    pub fn input_defname(&self, opts: &SubmissionOptions<'_>) -> Option<String> {
        if let Some(def) = opts.makeup.and_then(MakeupPlan::defname) {
            return Some(def.to_string());
        }
        opts.input_def
            .clone()
            .or_else(|| self.stage.input.defname().map(str::to_string))
    }

    pub fn build(&self, opts: &SubmissionOptions<'_>) -> Result<SubmissionRequest> {
        let stage = self.stage;
        let job_count = self.job_count(opts);
        let session = self.input_defname(opts).map(|defname| DatasetSession {
            project: opts
                .sam_project
                .clone()
                .unwrap_or_else(|| project_name(&current_user(), &defname)),
            defname,
        });

        let mut staged = vec![StagedFile {
            path: self.work_file(WRAPPER_FCL),
            contents: render_wrapper(self.project, stage),
        }];
        let input_args = self.input_args(opts, session.as_ref(), &mut staged)?;
        let procmap = match opts.makeup.map(|m| &m.work) {
            Some(MakeupWork::ProcessMap { processes }) => {
                staged.push(StagedFile {
                    path: self.work_file(PROCMAP_FILE),
                    contents: lines(processes),
                });
                true
            }
            _ => false,
        };

        let dataset_input = session.is_some();
        let shape = decide_shape(&stage.input, job_count, self.project.force_dag);

        let mut worker = CommandLine::new("jobsub_submit");
        self.submission_flags(&mut worker, true);
        if !(stage.pubs_output() && dataset_input) {
            worker.opt("-N", job_count);
        }
        worker.args(stage.jobsub_extra.iter().cloned());
        for file in &staged {
            worker.opt("-f", file.path.display());
        }
        worker.arg(format!("file://{}", stage.scripts.worker));
        if stage.max_files_per_job != 0 {
            worker.opt("--nfile", stage.max_files_per_job);
        }
        worker
            .opt("--group", &self.project.experiment)
            .arg("-g")
            .opt("-c", WRAPPER_FCL);
        if !self.project.release_tag.is_empty() {
            worker.opt("-r", &self.project.release_tag);
        }
        worker
            .opt("--workdir", stage.layout.workdir.display())
            .opt("--outdir", stage.layout.outdir.display())
            .opt("--logdir", stage.layout.logdir.display());
        if shape == SubmissionShape::Single {
            worker.opt_if("--process", stage.pubs_process_offset());
        }
        if stage.dynamic {
            worker.arg("--single");
        }
        worker.args(input_args);
        if opts.recur {
            worker.arg("--recur");
        }
        worker.opt("-n", stage.num_events);
        if !dataset_input {
            worker.opt("--njobs", job_count);
        }
        for file_type in &stage.data_file_types {
            worker.opt("--data_file_type", file_type);
        }
        if procmap {
            worker.opt("--procmap", PROCMAP_FILE);
        }
        worker
            .opt_if("--init-script", stage.scripts.init_script.as_deref())
            .opt_if("--init-source", stage.scripts.init_source.as_deref())
            .opt_if("--end-script", stage.scripts.end_script.as_deref());
        if stage.validate_on_worker {
            worker.arg("--validate").arg("--declare");
            if stage.fcl.len() > 1 {
                worker.arg("--maintain_parentage");
            }
        }

        let (command, dag) = match shape {
            SubmissionShape::Single => (worker, None),
            SubmissionShape::Dag => {
                let dag = DagPlan {
                    start: session
                        .iter()
                        .filter(|_| !opts.prestarted || stage.prestage_fraction > 0.0)
                        .map(|s| self.start_command(s, opts.recur, job_count))
                        .collect(),
                    processes: (0..job_count).collect(),
                    stop: session.iter().map(|s| self.stop_command(s)).collect(),
                    worker,
                };
                let dag_path = self.work_file(DAG_FILE);
                staged.push(StagedFile {
                    path: dag_path.clone(),
                    contents: dag.render(),
                });
                let mut submit = CommandLine::new("jobsub_submit_dag");
                submit.opt_eq("--group", &self.project.group);
                if let Some(server) = self.project.jobsub_server() {
                    submit.opt_eq("--jobsub-server", server);
                }
                submit
                    .opt_eq("--role", &self.project.role)
                    .arg(format!("file://{}", dag_path.display()));
                (submit, Some(dag))
            }
        };

        debug!(
            stage = %stage.name,
            shape = ?shape,
            jobs = job_count,
            staged = staged.len(),
            "submission assembled"
        );
        Ok(SubmissionRequest {
            shape,
            job_count,
            command,
            dag,
            staged,
            session,
        })
    }

    /// Group, role, server and resource flags shared by every command.
    fn submission_flags(&self, cmd: &mut CommandLine, worker: bool) {
        let project = self.project;
        let res = &self.stage.resources;
        cmd.opt_eq("--group", &project.group);
        if worker {
            cmd.opt_eq("--role", &project.role);
            if let Some(server) = project.jobsub_server() {
                cmd.opt_eq("--jobsub-server", server);
            }
        }
        let resource = if res.resource.is_empty() {
            project.resource.as_str()
        } else {
            res.resource.as_str()
        };
        if !resource.is_empty() {
            cmd.opt_eq("--resource-provides", format!("usage_model={resource}"));
        }
        if let Some(lines) = res.lines.as_deref().or(project.lines.as_deref()) {
            cmd.opt_eq("--lines", lines);
        }
        if let Some(site) = &res.site {
            cmd.opt_eq("--site", site);
        }
        if let Some(blacklist) = &res.blacklist {
            cmd.opt_eq("--blacklist", blacklist);
        }
        if worker {
            if let Some(cpu) = res.cpu {
                cmd.opt_eq("--cpu", cpu);
            }
            if let Some(disk) = &res.disk {
                cmd.opt_eq("--disk", disk);
            }
            if let Some(memory) = res.memory {
                cmd.opt_eq("--memory", memory);
            }
        }
        if let Some(os) = &project.os {
            cmd.opt_eq("--OS", os);
        }
    }

    fn input_args(
        &self,
        opts: &SubmissionOptions<'_>,
        session: Option<&DatasetSession>,
        staged: &mut Vec<StagedFile>,
    ) -> Result<Vec<String>> {
        if let Some(session) = session {
            return Ok(vec![
                "--sam_defname".to_string(),
                session.defname.clone(),
                "--sam_project".to_string(),
                session.project.clone(),
            ]);
        }
        let makeup_files = match opts.makeup.map(|m| &m.work) {
            Some(MakeupWork::InputList { files }) => Some(files),
            _ => None,
        };
        match (&self.stage.input, makeup_files) {
            (StageInput::File(path), None) => {
                Ok(vec!["-s".to_string(), path.display().to_string()])
            }
            (StageInput::File(path) | StageInput::List(path), Some(files)) => {
                let name = list_name(path);
                staged.push(StagedFile {
                    path: self.work_file(&name),
                    contents: lines(files),
                });
                Ok(vec!["-S".to_string(), name])
            }
            (StageInput::List(path), None) => {
                let name = list_name(path);
                let contents = self.fs.read_to_string(path)?;
                staged.push(StagedFile {
                    path: self.work_file(&name),
                    contents,
                });
                Ok(vec!["-S".to_string(), name])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn start_command(&self, session: &DatasetSession, recur: bool, job_count: u32) -> CommandLine {
        let stage = self.stage;
        let experiment = &self.project.experiment;
        let mut cmd = CommandLine::new("jobsub");
        self.submission_flags(&mut cmd, false);
        cmd.args(stage.jobsub_start_extra.iter().cloned())
            .arg(format!("file://{}", stage.scripts.start))
            .opt("--sam_station", experiment)
            .opt("--sam_group", experiment)
            .opt("--sam_defname", &session.defname)
            .opt("--sam_project", &session.project)
            .arg("-g");
        if recur {
            cmd.arg("--recur");
        }
        if job_count > 0 && stage.max_files_per_job > 0 {
            cmd.opt("--max_files", job_count * stage.max_files_per_job);
        }
        if stage.prestage_fraction > 0.0 {
            cmd.opt("--prestage_fraction", format!("{:.6}", stage.prestage_fraction));
        }
        cmd.opt("--logdir", stage.layout.logdir.display());
        cmd
    }

    fn stop_command(&self, session: &DatasetSession) -> CommandLine {
        let stage = self.stage;
        let mut cmd = CommandLine::new("jobsub");
        self.submission_flags(&mut cmd, false);
        cmd.args(stage.jobsub_start_extra.iter().cloned())
            .arg(format!("file://{}", stage.scripts.stop))
            .opt("--sam_station", &self.project.experiment)
            .opt("--sam_project", &session.project)
            .arg("-g")
            .opt("--logdir", stage.layout.logdir.display());
        cmd
    }
}

fn list_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input.list".to_string())
}

fn lines<T: std::fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| format!("{i}\n")).collect()
}
