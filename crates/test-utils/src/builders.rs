#![allow(dead_code)]

use std::path::{Path, PathBuf};

use gridstage::config::{ConfigFile, ConfigSection, ProjectConfig, RawConfigFile, StageConfig};
use gridstage::layout::StageDirectoryLayout;
use gridstage::types::RecurType;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                project: Vec::new(),
            },
        }
    }

    pub fn with_project(mut self, project: ProjectConfig) -> Self {
        self.config.project.push(project);
        self
    }

    pub fn lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.config.lock_dir = dir.into();
        self
    }

    pub fn force_dag(mut self, val: bool) -> Self {
        self.config.config.force_dag = val;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ProjectConfig`.
pub struct ProjectConfigBuilder {
    project: ProjectConfig,
}

impl ProjectConfigBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            project: ProjectConfig {
                name: name.to_string(),
                version: "v1".to_string(),
                role: "Analysis".to_string(),
                resource: "DEDICATED,OPPORTUNISTIC".to_string(),
                ..ProjectConfig::default()
            },
        }
    }

    pub fn release_tag(mut self, tag: &str) -> Self {
        self.project.release_tag = tag.to_string();
        self
    }

    /// Turns catalog metadata handling on.
    pub fn file_type(mut self, file_type: &str) -> Self {
        self.project.file_type = Some(file_type.to_string());
        self
    }

    pub fn run_type(mut self, run_type: &str) -> Self {
        self.project.run_type = Some(run_type.to_string());
        self
    }

    pub fn server(mut self, server: &str) -> Self {
        self.project.server = Some(server.to_string());
        self
    }

    pub fn metadata(mut self, key: &str, value: &str) -> Self {
        self.project
            .metadata
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn stage(mut self, stage: StageConfig) -> Self {
        self.project.stage.push(stage);
        self
    }

    pub fn build(self) -> ProjectConfig {
        self.project
    }
}

/// Builder for `StageConfig`. Directories default to
/// `<root>/{out,log,work}/<name>`.
pub struct StageConfigBuilder {
    stage: StageConfig,
}

impl StageConfigBuilder {
    pub fn new(name: &str, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            stage: StageConfig {
                name: name.to_string(),
                fcl: Some(vec![format!("{name}.fcl")]),
                outdir: Some(root.join("out").join(name)),
                logdir: Some(root.join("log").join(name)),
                workdir: Some(root.join("work").join(name)),
                num_jobs: Some(1),
                ..StageConfig::default()
            },
        }
    }

    pub fn base(mut self, base: &str) -> Self {
        self.stage.base = Some(base.to_string());
        self
    }

    pub fn num_jobs(mut self, n: u32) -> Self {
        self.stage.num_jobs = Some(n);
        self
    }

    pub fn num_events(mut self, n: u64) -> Self {
        self.stage.num_events = Some(n);
        self
    }

    pub fn max_files_per_job(mut self, n: u32) -> Self {
        self.stage.max_files_per_job = Some(n);
        self
    }

    pub fn fcl(mut self, fcl: &[&str]) -> Self {
        self.stage.fcl = Some(fcl.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn bookdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.stage.bookdir = Some(dir.into());
        self
    }

    pub fn generator(mut self) -> Self {
        self.stage.generator = Some(true);
        self
    }

    pub fn input_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stage.input_file = Some(path.into());
        self
    }

    pub fn input_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.stage.input_list = Some(path.into());
        self
    }

    pub fn input_def(mut self, def: &str) -> Self {
        self.stage.input_def = Some(def.to_string());
        self
    }

    pub fn input_stage(mut self, stage: &str) -> Self {
        self.stage.input_stage = Some(stage.to_string());
        self
    }

    pub fn defname(mut self, def: &str) -> Self {
        self.stage.defname = Some(def.to_string());
        self
    }

    pub fn ana_defname(mut self, def: &str) -> Self {
        self.stage.ana_defname = Some(def.to_string());
        self
    }

    pub fn data_tier(mut self, tier: &str) -> Self {
        self.stage.data_tier = Some(tier.to_string());
        self
    }

    pub fn data_streams(mut self, streams: &[&str]) -> Self {
        self.stage.data_stream = Some(streams.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn recursive(mut self, recur_type: RecurType, base_def: &str) -> Self {
        self.stage.recur = Some(true);
        self.stage.recur_type = Some(recur_type);
        self.stage.base_def = Some(base_def.to_string());
        self
    }

    pub fn active_base(mut self, active: &str) -> Self {
        self.stage.active_base = Some(active.to_string());
        self
    }

    pub fn recur_limit(mut self, limit: u32) -> Self {
        self.stage.recur_limit = Some(limit);
        self
    }

    pub fn prestart(mut self, val: bool) -> Self {
        self.stage.prestart = Some(val);
        self
    }

    pub fn prestage_fraction(mut self, fraction: f64) -> Self {
        self.stage.prestage_fraction = Some(fraction);
        self
    }

    pub fn validate_on_worker(mut self, val: bool) -> Self {
        self.stage.validate_on_worker = Some(val);
        self
    }

    pub fn dynamic(mut self, val: bool) -> Self {
        self.stage.dynamic = Some(val);
        self
    }

    pub fn merge(mut self, merge: &str) -> Self {
        self.stage.merge = Some(merge.to_string());
        self
    }

    pub fn max_flux_file_mb(mut self, mb: u32) -> Self {
        self.stage.max_flux_file_mb = Some(mb);
        self
    }

    pub fn output_run(mut self, run: u32) -> Self {
        self.stage.output_run = Some(run);
        self
    }

    pub fn jobsub(mut self, extra: &str) -> Self {
        self.stage.jobsub = Some(extra.to_string());
        self
    }

    pub fn jobsub_timeout_secs(mut self, secs: u64) -> Self {
        self.stage.jobsub_timeout_secs = Some(secs);
        self
    }

    pub fn build(self) -> StageConfig {
        self.stage
    }
}

/// Layout a `StageConfigBuilder::new(name, root)` stage resolves to.
pub fn layout_for(name: &str, root: impl AsRef<Path>) -> StageDirectoryLayout {
    let root = root.as_ref();
    let logdir = root.join("log").join(name);
    StageDirectoryLayout::new(
        root.join("out").join(name),
        logdir.clone(),
        root.join("work").join(name),
        logdir,
    )
}
