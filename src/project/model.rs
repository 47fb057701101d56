// src/project/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::layout::StageDirectoryLayout;
use crate::types::{OutputTier, RecurType};

/// One campaign: catalog metadata policy, submission defaults and the
/// ordered stages. Rebuilt from configuration on every invocation.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub version: String,
    pub release_tag: String,
    pub file_type: Option<String>,
    pub run_type: Option<String>,
    pub experiment: String,
    pub group: String,
    pub server: Option<String>,
    pub role: String,
    pub resource: String,
    pub lines: Option<String>,
    pub os: Option<String>,
    pub force_dag: bool,
    pub metadata: BTreeMap<String, String>,
    pub stages: Vec<Stage>,
}

impl Project {
    /// Catalog metadata is in use when a file type or run type is set.
    pub fn has_metadata(&self) -> bool {
        self.file_type.is_some() || self.run_type.is_some()
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Submission server, if one other than the client default is set.
    pub fn jobsub_server(&self) -> Option<&str> {
        self.server
            .as_deref()
            .filter(|s| !s.is_empty() && *s != "-")
    }
}

/// Where a stage's input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageInput {
    /// No input: each job generates its own events.
    Generator,
    /// A single input file.
    File(PathBuf),
    /// A newline-delimited list of input files (including another stage's
    /// `files.list`).
    List(PathBuf),
    /// A named catalog dataset definition streamed to the workers.
    Dataset(String),
}

impl StageInput {
    pub fn is_generator(&self) -> bool {
        matches!(self, StageInput::Generator)
    }

    pub fn is_dataset(&self) -> bool {
        matches!(self, StageInput::Dataset(_))
    }

    /// Input is an explicit file or file list.
    pub fn is_explicit(&self) -> bool {
        matches!(self, StageInput::File(_) | StageInput::List(_))
    }

    pub fn defname(&self) -> Option<&str> {
        match self {
            StageInput::Dataset(def) => Some(def.as_str()),
            _ => None,
        }
    }

    pub fn list_path(&self) -> Option<&Path> {
        match self {
            StageInput::List(path) => Some(path.as_path()),
            _ => None,
        }
    }
}

/// Batch resource request flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRequest {
    pub cpu: Option<u32>,
    pub disk: Option<String>,
    pub memory: Option<u32>,
    pub site: Option<String>,
    pub blacklist: Option<String>,
    pub lines: Option<String>,
    pub resource: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageScripts {
    pub worker: String,
    pub start: String,
    pub stop: String,
    pub init_script: Option<String>,
    pub init_source: Option<String>,
    pub end_script: Option<String>,
}

/// How a recursive (draining) input definition is derived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecursionPolicy {
    pub enabled: bool,
    pub recur_type: RecurType,
    pub limit: Option<u32>,
    pub base_def: Option<String>,
    pub active_base: Option<String>,
}

/// Reprocessing state applied by `--pubs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubsState {
    pub run: u32,
    pub subruns: Vec<u32>,
    pub version: Option<u32>,
    /// The input was re-targeted at this run/subrun selection.
    pub input: bool,
}

#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub fcl: Vec<String>,
    pub layout: StageDirectoryLayout,
    pub num_jobs: u32,
    pub num_events: u64,
    pub max_files_per_job: u32,
    pub input: StageInput,
    pub resources: ResourceRequest,
    pub scripts: StageScripts,
    pub defname: Option<String>,
    pub ana_defname: Option<String>,
    pub data_tier: String,
    pub ana_data_tier: String,
    pub data_streams: Vec<String>,
    pub ana_data_streams: Vec<String>,
    pub data_file_types: Vec<String>,
    pub recursion: RecursionPolicy,
    pub prestart: bool,
    pub prestage_fraction: f64,
    pub analysis: bool,
    pub validate_on_worker: bool,
    pub dynamic: bool,
    pub merge: String,
    pub jobsub_timeout_secs: Option<u64>,
    pub max_flux_file_mb: u32,
    pub output_run: Option<u32>,
    pub jobsub_extra: Vec<String>,
    pub jobsub_start_extra: Vec<String>,
    pub pubs: Option<PubsState>,
}

impl Stage {
    pub fn defname_for(&self, tier: OutputTier) -> Option<&str> {
        match tier {
            OutputTier::Primary => self.defname.as_deref(),
            OutputTier::Analysis => self.ana_defname.as_deref(),
        }
    }

    pub fn data_tier_for(&self, tier: OutputTier) -> &str {
        match tier {
            OutputTier::Primary => &self.data_tier,
            OutputTier::Analysis => &self.ana_data_tier,
        }
    }

    pub fn data_streams_for(&self, tier: OutputTier) -> &[String] {
        match tier {
            OutputTier::Primary => &self.data_streams,
            OutputTier::Analysis => &self.ana_data_streams,
        }
    }

    pub fn pubs_output(&self) -> bool {
        self.pubs.is_some()
    }

    pub fn pubs_input(&self) -> bool {
        self.pubs.as_ref().is_some_and(|p| p.input)
    }

    /// First run number forced into the wrapper configuration, if any.
    pub fn first_run_override(&self) -> Option<u32> {
        match &self.pubs {
            Some(p) if !p.input => Some(p.run),
            _ => self.output_run,
        }
    }

    /// Process index offset for the first stage of a pubs chain.
    pub fn pubs_process_offset(&self) -> Option<u32> {
        match &self.pubs {
            Some(p) if !p.input => p.subruns.first().copied().filter(|s| *s > 0).map(|s| s - 1),
            _ => None,
        }
    }
}
