// src/project/pubs.rs

//! `--pubs <run> <subruns> [version]` reprocessing mode.

use std::path::{Path, PathBuf};

use crate::errors::{GridstageError, Result};
use crate::project::model::{PubsState, Stage, StageInput};

/// Run/subrun selection requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubsSpec {
    pub run: u32,
    pub subruns: Vec<u32>,
    pub version: Option<u32>,
}

/// A dataset definition a pubsified stage needs before submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubsDefinition {
    pub name: String,
    pub dimension: String,
}

impl PubsSpec {
    /// Parse `[run, subruns, version?]` as given to `--pubs`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 2 || args.len() > 3 {
            return Err(GridstageError::Usage(
                "--pubs expects <run> <subruns> [version]".to_string(),
            ));
        }
        let run = parse_number(&args[0], "run")?;
        let subruns = parse_subruns(&args[1])?;
        let version = match args.get(2) {
            Some(v) => Some(parse_number(v, "version")?),
            None => None,
        };
        Ok(Self {
            run,
            subruns,
            version,
        })
    }

    /// `<subrun>` for a single subrun, `<first>-<last>` otherwise.
    pub fn subrun_label(&self) -> String {
        match (self.subruns.first(), self.subruns.last()) {
            (Some(first), Some(last)) if first == last => first.to_string(),
            (Some(first), Some(last)) => format!("{first}-{last}"),
            _ => String::new(),
        }
    }

    /// Re-root a directory at `<dir>/<run>/<subruns>[/v<version>]`.
    pub fn retarget(&self, dir: &Path) -> PathBuf {
        let mut out = dir.join(self.run.to_string()).join(self.subrun_label());
        if let Some(version) = self.version {
            out = out.join(format!("v{version}"));
        }
        out
    }

    /// `run_number` clause listing every selected subrun.
    pub fn run_number_clause(&self) -> String {
        let pairs: Vec<String> = self
            .subruns
            .iter()
            .map(|s| format!("{}.{}", self.run, s))
            .collect();
        format!("run_number {}", pairs.join(","))
    }
}

/// Parse a subrun selection such as `1-3,7`, returning a sorted, distinct
/// list.
pub fn parse_subruns(text: &str) -> Result<Vec<u32>> {
    let mut subruns = Vec::new();
    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo = parse_number(lo, "subrun")?;
                let hi = parse_number(hi, "subrun")?;
                if lo > hi {
                    return Err(GridstageError::Usage(format!(
                        "invalid subrun range {part}"
                    )));
                }
                subruns.extend(lo..=hi);
            }
            None => subruns.push(parse_number(part, "subrun")?),
        }
    }
    if subruns.is_empty() {
        return Err(GridstageError::Usage("empty subrun selection".to_string()));
    }
    subruns.sort_unstable();
    subruns.dedup();
    Ok(subruns)
}

fn parse_number(text: &str, what: &str) -> Result<u32> {
    text.trim()
        .parse::<u32>()
        .map_err(|_| GridstageError::Usage(format!("invalid {what} '{text}'")))
}

impl Stage {
    /// Re-target this stage at a single run/subrun selection.
    ///
    /// Directories are re-rooted, the job count becomes one job per subrun
    /// and the input follows the selection. For dataset input the returned
    /// definition must exist before submission.
    pub fn pubsify(&mut self, spec: &PubsSpec) -> Option<PubsDefinition> {
        self.layout.outdir = spec.retarget(&self.layout.outdir);
        self.layout.logdir = spec.retarget(&self.layout.logdir);
        self.layout.workdir = spec.retarget(&self.layout.workdir);
        self.layout.bookdir = spec.retarget(&self.layout.bookdir);
        self.num_jobs = spec.subruns.len().max(1) as u32;

        let mut definition = None;
        let input_retargeted = match &self.input {
            StageInput::Dataset(def) => {
                let name = format!("{def}_run{}_{}", spec.run, spec.subrun_label());
                let dimension = format!("defname: {def} and {}", spec.run_number_clause());
                definition = Some(PubsDefinition {
                    name: name.clone(),
                    dimension,
                });
                self.input = StageInput::Dataset(name);
                true
            }
            StageInput::List(path) => {
                let parent = path.parent().unwrap_or(Path::new("/"));
                let file = path.file_name().map(PathBuf::from).unwrap_or_default();
                self.input = StageInput::List(spec.retarget(parent).join(file));
                true
            }
            StageInput::File(_) | StageInput::Generator => false,
        };

        self.pubs = Some(PubsState {
            run: spec.run,
            subruns: spec.subruns.clone(),
            version: spec.version,
            input: input_retargeted,
        });
        definition
    }
}
