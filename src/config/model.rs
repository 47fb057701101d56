// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::RecurType;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// experiment = "uboone"
///
/// [[project]]
/// name = "dt"
/// version = "v1"
/// file_type = "mc"
///
/// [[project.stage]]
/// name = "gen"
/// fcl = ["prodgenie.fcl"]
/// num_jobs = 10
/// outdir = "/pnfs/dt/out/gen"
/// logdir = "/pnfs/dt/log/gen"
/// workdir = "/pnfs/dt/work/gen"
/// ```
///
/// This is the raw, unvalidated form. Use [`ConfigFile`] (via `TryFrom`) for
/// anything beyond deserialization.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// All projects from `[[project]]`, in file order.
    #[serde(default)]
    pub project: Vec<ProjectConfig>,
}

/// Validated configuration. Construct with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub project: Vec<ProjectConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(config: ConfigSection, project: Vec<ProjectConfig>) -> Self {
        Self { config, project }
    }
}

/// `[config]` section: site-wide policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Experiment name; used as the submission group and the catalog
    /// station, and as the prefix of project metadata fields.
    #[serde(default = "default_experiment")]
    pub experiment: String,

    /// Base timeout for one submission command.
    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,

    /// Extra allowance added per submitted job.
    #[serde(default = "default_submit_timeout_per_job_secs")]
    pub submit_timeout_per_job_secs: u64,

    /// Floor for the computed timeout.
    #[serde(default = "default_min_submit_timeout_secs")]
    pub min_submit_timeout_secs: u64,

    /// Directory holding running-submission markers.
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    /// Always submit as a DAG, even for a single generator job.
    #[serde(default)]
    pub force_dag: bool,

    /// Node prefix for disk locations outside `/pnfs/`.
    #[serde(default)]
    pub disk_server: String,

    /// Node prefix for disk locations under `/pnfs/`.
    #[serde(default)]
    pub dcache_server: String,

    /// Dropbox directory used by the `upload` actions.
    #[serde(default)]
    pub dropbox_dir: Option<PathBuf>,
}

fn default_experiment() -> String {
    "uboone".to_string()
}

fn default_submit_timeout_secs() -> u64 {
    3600
}

fn default_submit_timeout_per_job_secs() -> u64 {
    1
}

fn default_min_submit_timeout_secs() -> u64 {
    600
}

fn default_lock_dir() -> PathBuf {
    std::env::temp_dir()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            experiment: default_experiment(),
            submit_timeout_secs: default_submit_timeout_secs(),
            submit_timeout_per_job_secs: default_submit_timeout_per_job_secs(),
            min_submit_timeout_secs: default_min_submit_timeout_secs(),
            lock_dir: default_lock_dir(),
            force_dag: false,
            disk_server: String::new(),
            dcache_server: String::new(),
            dropbox_dir: None,
        }
    }
}

/// `[[project]]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProjectConfig {
    pub name: String,

    #[serde(default)]
    pub version: String,

    /// Application version recorded in catalog metadata.
    #[serde(default)]
    pub release_tag: String,

    /// Catalog metadata policy. Metadata handling (duplicate and long
    /// filename checks, wrapper overrides) is enabled when either is set.
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub run_type: Option<String>,

    /// Submission server; empty or `-` means the client default.
    #[serde(default)]
    pub server: Option<String>,

    #[serde(default = "default_role")]
    pub role: String,

    /// Submission group; defaults to `[config].experiment`.
    #[serde(default)]
    pub group: Option<String>,

    #[serde(default = "default_resource")]
    pub resource: String,

    #[serde(default)]
    pub lines: Option<String>,

    #[serde(default)]
    pub os: Option<String>,

    #[serde(default)]
    pub force_dag: bool,

    /// Project-level defaults for stages that set neither the value nor a
    /// base stage providing it.
    #[serde(default)]
    pub num_jobs: Option<u32>,
    #[serde(default)]
    pub num_events: Option<u64>,

    /// Extra wrapper configuration overrides, written verbatim as
    /// `key: value` after the built-in metadata overrides.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// Stages in submission order.
    #[serde(default)]
    pub stage: Vec<StageConfig>,
}

fn default_role() -> String {
    "Analysis".to_string()
}

fn default_resource() -> String {
    "DEDICATED,OPPORTUNISTIC".to_string()
}

/// `[[project.stage]]` section.
///
/// Every optional field may be inherited from the stage named in `base`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StageConfig {
    pub name: String,

    #[serde(default)]
    pub base: Option<String>,

    #[serde(default)]
    pub fcl: Option<Vec<String>>,

    #[serde(default)]
    pub outdir: Option<PathBuf>,
    #[serde(default)]
    pub logdir: Option<PathBuf>,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// Defaults to `logdir`.
    #[serde(default)]
    pub bookdir: Option<PathBuf>,

    #[serde(default)]
    pub num_jobs: Option<u32>,
    #[serde(default)]
    pub num_events: Option<u64>,
    #[serde(default)]
    pub max_files_per_job: Option<u32>,

    // Input: at most one of these.
    #[serde(default)]
    pub input_file: Option<PathBuf>,
    #[serde(default)]
    pub input_list: Option<PathBuf>,
    #[serde(default)]
    pub input_def: Option<String>,
    #[serde(default)]
    pub input_stage: Option<String>,
    /// With `input_stage` (or default chaining): read
    /// `files_<input_stream>.list` instead of `files.list`.
    #[serde(default)]
    pub input_stream: Option<String>,
    /// Opt out of chaining to the previous stage's output.
    #[serde(default)]
    pub generator: Option<bool>,

    // Resources.
    #[serde(default)]
    pub cpu: Option<u32>,
    #[serde(default)]
    pub disk: Option<String>,
    #[serde(default)]
    pub memory: Option<u32>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub blacklist: Option<String>,
    #[serde(default)]
    pub lines: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,

    // Scripts.
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub start_script: Option<String>,
    #[serde(default)]
    pub stop_script: Option<String>,
    #[serde(default)]
    pub init_script: Option<String>,
    #[serde(default)]
    pub init_source: Option<String>,
    #[serde(default)]
    pub end_script: Option<String>,

    // Catalog linkage.
    #[serde(default)]
    pub defname: Option<String>,
    #[serde(default)]
    pub ana_defname: Option<String>,
    #[serde(default)]
    pub data_tier: Option<String>,
    #[serde(default)]
    pub ana_data_tier: Option<String>,
    #[serde(default)]
    pub data_stream: Option<Vec<String>>,
    #[serde(default)]
    pub ana_data_stream: Option<Vec<String>>,
    #[serde(default)]
    pub data_file_types: Option<Vec<String>>,

    // Recursion.
    #[serde(default)]
    pub recur: Option<bool>,
    #[serde(default)]
    pub recur_type: Option<RecurType>,
    #[serde(default)]
    pub recur_limit: Option<u32>,
    #[serde(default)]
    pub base_def: Option<String>,
    #[serde(default)]
    pub active_base: Option<String>,

    // Streaming session policy.
    #[serde(default)]
    pub prestart: Option<bool>,
    #[serde(default)]
    pub prestage_fraction: Option<f64>,

    // Behaviour flags.
    #[serde(default)]
    pub analysis: Option<bool>,
    #[serde(default)]
    pub validate_on_worker: Option<bool>,
    #[serde(default)]
    pub dynamic: Option<bool>,
    #[serde(default)]
    pub merge: Option<String>,
    #[serde(default)]
    pub jobsub_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_flux_file_mb: Option<u32>,
    /// First run number written into the wrapper configuration.
    #[serde(default)]
    pub output_run: Option<u32>,

    /// Extra words appended verbatim to the worker and session commands.
    #[serde(default)]
    pub jobsub: Option<String>,
    #[serde(default)]
    pub jobsub_start: Option<String>,
}
