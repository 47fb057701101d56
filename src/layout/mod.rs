// src/layout/mod.rs

//! Per-stage directory roots, ownership-gated deletion and worker
//! directory classification.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::{GridstageError, Result};
use crate::fs::FileSystem;

/// The four parallel directory roots of one stage.
///
/// Worker `<cluster>_<process>` writes its output files under
/// `outdir/<subdir>` and its bookkeeping side-cars under
/// `bookdir/<subdir>`; raw log tarballs arrive under `logdir/<subdir>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDirectoryLayout {
    pub outdir: PathBuf,
    pub logdir: PathBuf,
    pub workdir: PathBuf,
    pub bookdir: PathBuf,
}

impl StageDirectoryLayout {
    pub fn new(outdir: PathBuf, logdir: PathBuf, workdir: PathBuf, bookdir: PathBuf) -> Self {
        Self {
            outdir,
            logdir,
            workdir,
            bookdir,
        }
    }

    /// Roots in deletion order, labelled for messages.
    pub fn roots(&self) -> [(&'static str, &Path); 4] {
        [
            ("output", self.outdir.as_path()),
            ("log", self.logdir.as_path()),
            ("work", self.workdir.as_path()),
            ("bookkeeping", self.bookdir.as_path()),
        ]
    }

    /// Path of a stage-level bookkeeping artifact.
    pub fn book_file(&self, name: &str) -> PathBuf {
        self.bookdir.join(name)
    }

    /// Create all four roots.
    pub fn make_dirs(&self, fs: &dyn FileSystem) -> Result<()> {
        for (_, dir) in self.roots() {
            fs.create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Fail with a structural error if any root is missing.
    pub fn check_dirs(&self, fs: &dyn FileSystem) -> Result<()> {
        for (label, dir) in self.roots() {
            if !fs.is_dir(dir) {
                return Err(GridstageError::Structural {
                    path: dir.to_path_buf(),
                    reason: format!("{label} directory does not exist"),
                });
            }
        }
        Ok(())
    }

    /// Return the first of the output, log and bookkeeping roots that is
    /// not empty.
    pub fn first_non_empty(&self, fs: &dyn FileSystem) -> Result<Option<PathBuf>> {
        for dir in [&self.outdir, &self.logdir, &self.bookdir] {
            if fs.is_dir(dir) && !fs.read_dir(dir)?.is_empty() {
                return Ok(Some(dir.clone()));
            }
        }
        Ok(None)
    }

    /// Delete every root, refusing any directory owned by another user.
    pub fn clean(&self, fs: &dyn FileSystem, caller: CallerIds) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for (_, dir) in self.roots() {
            if remove_owned_dir(fs, dir, caller)? {
                removed.push(dir.to_path_buf());
            }
        }
        Ok(removed)
    }
}

/// Real and effective uid of the calling process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIds {
    pub uid: u32,
    pub euid: u32,
}

impl CallerIds {
    pub fn current() -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
            euid: nix::unistd::geteuid().as_raw(),
        }
    }

    pub fn owns(&self, owner: u32) -> bool {
        owner == self.uid || owner == self.euid
    }
}

/// Remove `dir` recursively if the caller owns it.
///
/// Returns `Ok(false)` when the directory does not exist. Directories may
/// be group-writable because of the batch system, so filesystem permission
/// alone is not enough to allow deletion.
pub fn remove_owned_dir(fs: &dyn FileSystem, dir: &Path, caller: CallerIds) -> Result<bool> {
    if !fs.exists(dir) {
        debug!(dir = %dir.display(), "nothing to clean");
        return Ok(false);
    }
    let owner = fs.owner_uid(dir)?;
    if !caller.owns(owner) {
        return Err(GridstageError::Ownership {
            path: dir.to_path_buf(),
            owner,
            uid: caller.uid,
            euid: caller.euid,
        });
    }
    info!(dir = %dir.display(), "removing directory");
    println!("Clean directory {}.", dir.display());
    fs.remove_dir_all(dir)?;
    Ok(true)
}

/// Kind of a leaf directory found under a bookkeeping root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerDir {
    /// Regular worker job `<cluster>_<process>`.
    Worker { cluster: u64, process: u32 },
    /// Streaming session start job `<cluster>_start`.
    StreamStart { cluster: u64 },
    /// Streaming session stop job `<cluster>_stop`.
    StreamStop { cluster: u64 },
    /// Directory created by the fetch-log action.
    FetchedLogs,
    /// Anything else; scanned like a worker but carries no process number.
    Unknown,
}

impl WorkerDir {
    /// Classify a directory by its final path component.
    pub fn classify(name: &str) -> WorkerDir {
        if name == "log" {
            return WorkerDir::FetchedLogs;
        }
        let Some((head, tail)) = name.rsplit_once('_') else {
            return WorkerDir::Unknown;
        };
        let Ok(cluster) = head.parse::<u64>() else {
            return match tail {
                "start" => WorkerDir::StreamStart { cluster: 0 },
                "stop" => WorkerDir::StreamStop { cluster: 0 },
                _ => WorkerDir::Unknown,
            };
        };
        match tail {
            "start" => WorkerDir::StreamStart { cluster },
            "stop" => WorkerDir::StreamStop { cluster },
            other => match other.parse::<u32>() {
                Ok(process) => WorkerDir::Worker { cluster, process },
                Err(_) => WorkerDir::Unknown,
            },
        }
    }

    /// Classify the last component of `path`.
    pub fn classify_path(path: &Path) -> WorkerDir {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(WorkerDir::classify)
            .unwrap_or(WorkerDir::Unknown)
    }

    pub fn is_stream_helper(&self) -> bool {
        matches!(self, WorkerDir::StreamStart { .. } | WorkerDir::StreamStop { .. })
    }

    pub fn process(&self) -> Option<u32> {
        match self {
            WorkerDir::Worker { process, .. } => Some(*process),
            _ => None,
        }
    }
}

impl fmt::Display for WorkerDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerDir::Worker { cluster, process } => write!(f, "{cluster}_{process}"),
            WorkerDir::StreamStart { cluster } => write!(f, "{cluster}_start"),
            WorkerDir::StreamStop { cluster } => write!(f, "{cluster}_stop"),
            WorkerDir::FetchedLogs => f.write_str("log"),
            WorkerDir::Unknown => f.write_str("<unknown>"),
        }
    }
}
