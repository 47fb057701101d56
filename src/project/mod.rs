// src/project/mod.rs

//! Resolved, immutable view of the configured projects.
//!
//! `ProjectModel::from_config` applies single-level base inheritance and
//! project defaults to every stage and resolves each stage's input. The
//! dispatcher then selects one (project, stage) pair and may apply
//! command-line overrides to its own copy of the stage.

pub mod model;
pub mod pubs;

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::debug;

use crate::config::model::{ConfigFile, ConfigSection, ProjectConfig, StageConfig};
use crate::errors::{GridstageError, Result};
use crate::layout::StageDirectoryLayout;

pub use model::{
    Project, PubsState, RecursionPolicy, ResourceRequest, Stage, StageInput, StageScripts,
};
pub use pubs::{PubsDefinition, PubsSpec, parse_subruns};

const DEFAULT_WORKER_SCRIPT: &str = "condor_lar.sh";
const DEFAULT_START_SCRIPT: &str = "condor_start_project.sh";
const DEFAULT_STOP_SCRIPT: &str = "condor_stop_project.sh";
const DEFAULT_DATA_TIER: &str = "reconstructed";
const DEFAULT_ANA_DATA_TIER: &str = "root-tuple";
const DEFAULT_MERGE: &str = "hadd -T";
const DEFAULT_MAX_FLUX_FILE_MB: u32 = 500;

#[derive(Debug, Clone)]
pub struct ProjectModel {
    pub config: ConfigSection,
    pub projects: Vec<Project>,
}

impl ProjectModel {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let projects = cfg
            .project
            .iter()
            .map(|p| resolve_project(&cfg.config, p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            config: cfg.config.clone(),
            projects,
        })
    }

    /// Named project, or the first one when no name is given.
    pub fn project(&self, name: Option<&str>) -> Result<&Project> {
        match name {
            Some(name) => self
                .projects
                .iter()
                .find(|p| p.name == name)
                .ok_or_else(|| GridstageError::Usage(format!("no project named '{name}'"))),
            None => self
                .projects
                .first()
                .ok_or_else(|| GridstageError::Usage("no projects configured".to_string())),
        }
    }

    /// Resolve a (project, stage) pair. Without a stage name the last stage
    /// of the project is selected.
    pub fn select(&self, project: Option<&str>, stage: Option<&str>) -> Result<(&Project, &Stage)> {
        let proj = self.project(project)?;
        let found = match stage {
            Some(name) => proj.stage(name),
            None => proj.stages.last(),
        };
        let stage = found.ok_or_else(|| {
            GridstageError::StageNotFound(format!(
                "{} in project '{}'",
                stage.unwrap_or("<last>"),
                proj.name
            ))
        })?;
        Ok((proj, stage))
    }
}

/// Command-line overrides applied to a selected stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOverrides {
    pub lines: Option<String>,
    pub site: Option<String>,
    pub cpu: Option<u32>,
    pub disk: Option<String>,
    pub memory: Option<u32>,
    pub inputdef: Option<String>,
    pub recur: bool,
}

impl StageOverrides {
    pub fn is_empty(&self) -> bool {
        *self == StageOverrides::default()
    }

    pub fn apply(&self, stage: &mut Stage) {
        if let Some(lines) = &self.lines {
            stage.resources.lines = Some(lines.clone());
        }
        if let Some(site) = &self.site {
            stage.resources.site = Some(site.clone());
        }
        if let Some(cpu) = self.cpu {
            stage.resources.cpu = Some(cpu);
        }
        if let Some(disk) = &self.disk {
            stage.resources.disk = Some(disk.clone());
        }
        if let Some(memory) = self.memory {
            stage.resources.memory = Some(memory);
        }
        if let Some(def) = &self.inputdef {
            stage.input = StageInput::Dataset(def.clone());
        }
        if self.recur {
            stage.recursion.enabled = true;
        }
    }
}

fn resolve_project(global: &ConfigSection, cfg: &ProjectConfig) -> Result<Project> {
    let by_name: BTreeMap<&str, &StageConfig> =
        cfg.stage.iter().map(|s| (s.name.as_str(), s)).collect();

    let merged: Vec<StageConfig> = cfg
        .stage
        .iter()
        .map(|s| {
            let base = s.base.as_deref().and_then(|b| by_name.get(b).copied());
            inherit(s, base)
        })
        .collect();

    let layouts = merged
        .iter()
        .map(|s| resolve_layout(s))
        .collect::<Result<Vec<_>>>()?;

    let mut stages = Vec::with_capacity(merged.len());
    for (index, stage_cfg) in merged.iter().enumerate() {
        let input = resolve_input(&cfg.stage[index], stage_cfg, index, &merged, &layouts);
        stages.push(resolve_stage(cfg, stage_cfg, layouts[index].clone(), input));
    }

    Ok(Project {
        name: cfg.name.clone(),
        version: cfg.version.clone(),
        release_tag: cfg.release_tag.clone(),
        file_type: cfg.file_type.clone().filter(|s| !s.is_empty()),
        run_type: cfg.run_type.clone().filter(|s| !s.is_empty()),
        experiment: global.experiment.clone(),
        group: cfg.group.clone().unwrap_or_else(|| global.experiment.clone()),
        server: cfg.server.clone(),
        role: cfg.role.clone(),
        resource: cfg.resource.clone(),
        lines: cfg.lines.clone().filter(|s| !s.is_empty()),
        os: cfg.os.clone().filter(|s| !s.is_empty()),
        force_dag: cfg.force_dag || global.force_dag,
        metadata: cfg.metadata.clone(),
        stages,
    })
}

/// Fill every unset field of `stage` from `base`.
fn inherit(stage: &StageConfig, base: Option<&StageConfig>) -> StageConfig {
    let Some(base) = base else {
        return stage.clone();
    };
    let mut out = stage.clone();

    macro_rules! fill {
        ($($field:ident),* $(,)?) => {
            $(
                if out.$field.is_none() {
                    out.$field = base.$field.clone();
                }
            )*
        };
    }

    fill!(
        fcl, outdir, logdir, workdir, bookdir, num_jobs, num_events, max_files_per_job,
        input_stream, cpu, disk, memory, site, blacklist, lines, resource, script,
        start_script, stop_script, init_script, init_source, end_script, defname,
        ana_defname, data_tier, ana_data_tier, data_stream, ana_data_stream,
        data_file_types, recur, recur_type, recur_limit, base_def, active_base, prestart,
        prestage_fraction, analysis, validate_on_worker, dynamic, merge,
        jobsub_timeout_secs, max_flux_file_mb, output_run, jobsub, jobsub_start,
    );

    // Inputs are inherited only as a whole.
    let has_input = out.input_file.is_some()
        || out.input_list.is_some()
        || out.input_def.is_some()
        || out.input_stage.is_some()
        || out.generator == Some(true);
    if !has_input {
        out.input_file = base.input_file.clone();
        out.input_list = base.input_list.clone();
        out.input_def = base.input_def.clone();
        out.input_stage = base.input_stage.clone();
        out.generator = base.generator;
    }
    out
}

fn resolve_layout(stage: &StageConfig) -> Result<StageDirectoryLayout> {
    let required = |dir: &Option<PathBuf>, what: &str| {
        dir.clone().ok_or_else(|| {
            GridstageError::ConfigError(format!("stage '{}' has no {what}", stage.name))
        })
    };
    let outdir = required(&stage.outdir, "outdir")?;
    let logdir = required(&stage.logdir, "logdir")?;
    let workdir = required(&stage.workdir, "workdir")?;
    let bookdir = stage.bookdir.clone().unwrap_or_else(|| logdir.clone());
    Ok(StageDirectoryLayout::new(outdir, logdir, workdir, bookdir))
}

fn stream_list_name(stream: Option<&str>) -> String {
    match stream {
        Some(stream) if !stream.is_empty() => format!("files_{stream}.list"),
        _ => "files.list".to_string(),
    }
}

fn resolve_input(
    declared: &StageConfig,
    stage: &StageConfig,
    index: usize,
    all: &[StageConfig],
    layouts: &[StageDirectoryLayout],
) -> StageInput {
    if let Some(file) = &stage.input_file {
        return StageInput::File(file.clone());
    }
    if let Some(list) = &stage.input_list {
        return StageInput::List(list.clone());
    }
    if let Some(def) = &stage.input_def {
        return StageInput::Dataset(def.clone());
    }
    let list_name = stream_list_name(stage.input_stream.as_deref());
    if let Some(upstream) = &stage.input_stage {
        if let Some(pos) = all.iter().position(|s| &s.name == upstream) {
            return StageInput::List(layouts[pos].bookdir.join(list_name));
        }
    }
    if stage.generator == Some(true) || index == 0 {
        return StageInput::Generator;
    }
    debug!(
        stage = %declared.name,
        upstream = %all[index - 1].name,
        "chaining input to previous stage"
    );
    StageInput::List(layouts[index - 1].bookdir.join(list_name))
}

fn words(text: Option<&String>) -> Vec<String> {
    text.map(|t| t.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn resolve_stage(
    project: &ProjectConfig,
    stage: &StageConfig,
    layout: StageDirectoryLayout,
    input: StageInput,
) -> Stage {
    Stage {
        name: stage.name.clone(),
        fcl: stage.fcl.clone().unwrap_or_default(),
        layout,
        num_jobs: stage.num_jobs.or(project.num_jobs).unwrap_or(1),
        num_events: stage.num_events.or(project.num_events).unwrap_or(0),
        max_files_per_job: stage.max_files_per_job.unwrap_or(0),
        input,
        resources: ResourceRequest {
            cpu: stage.cpu,
            disk: stage.disk.clone(),
            memory: stage.memory,
            site: stage.site.clone(),
            blacklist: stage.blacklist.clone(),
            lines: stage.lines.clone().or_else(|| project.lines.clone()),
            resource: stage
                .resource
                .clone()
                .unwrap_or_else(|| project.resource.clone()),
        },
        scripts: StageScripts {
            worker: stage
                .script
                .clone()
                .unwrap_or_else(|| DEFAULT_WORKER_SCRIPT.to_string()),
            start: stage
                .start_script
                .clone()
                .unwrap_or_else(|| DEFAULT_START_SCRIPT.to_string()),
            stop: stage
                .stop_script
                .clone()
                .unwrap_or_else(|| DEFAULT_STOP_SCRIPT.to_string()),
            init_script: stage.init_script.clone(),
            init_source: stage.init_source.clone(),
            end_script: stage.end_script.clone(),
        },
        defname: stage.defname.clone().filter(|s| !s.is_empty()),
        ana_defname: stage.ana_defname.clone().filter(|s| !s.is_empty()),
        data_tier: stage
            .data_tier
            .clone()
            .unwrap_or_else(|| DEFAULT_DATA_TIER.to_string()),
        ana_data_tier: stage
            .ana_data_tier
            .clone()
            .unwrap_or_else(|| DEFAULT_ANA_DATA_TIER.to_string()),
        data_streams: stage.data_stream.clone().unwrap_or_default(),
        ana_data_streams: stage.ana_data_stream.clone().unwrap_or_default(),
        data_file_types: stage
            .data_file_types
            .clone()
            .unwrap_or_else(|| vec!["root".to_string()]),
        recursion: RecursionPolicy {
            enabled: stage.recur.unwrap_or(false),
            recur_type: stage.recur_type.unwrap_or_default(),
            limit: stage.recur_limit.filter(|n| *n > 0),
            base_def: stage.base_def.clone().filter(|s| !s.is_empty()),
            active_base: stage.active_base.clone().filter(|s| !s.is_empty()),
        },
        prestart: stage.prestart.unwrap_or(false),
        prestage_fraction: stage.prestage_fraction.unwrap_or(0.0),
        analysis: stage.analysis.unwrap_or(false),
        validate_on_worker: stage.validate_on_worker.unwrap_or(false),
        dynamic: stage.dynamic.unwrap_or(false),
        merge: stage
            .merge
            .clone()
            .unwrap_or_else(|| DEFAULT_MERGE.to_string()),
        jobsub_timeout_secs: stage.jobsub_timeout_secs,
        max_flux_file_mb: stage.max_flux_file_mb.unwrap_or(DEFAULT_MAX_FLUX_FILE_MB),
        output_run: stage.output_run,
        jobsub_extra: words(stage.jobsub.as_ref()),
        jobsub_start_extra: words(stage.jobsub_start.as_ref()),
        pubs: None,
    }
}
