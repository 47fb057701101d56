// src/makeup/mod.rs

//! Outstanding-work planning for makeup submissions.
//!
//! Makeup only runs against a checked stage. Bad workers recorded in
//! `bad.list` are deleted first, then the outstanding work is derived from
//! the bookkeeping artifacts according to the stage's input kind.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::catalog::{
    CatalogService, DatasetRegistrar, project_name, unconsumed_dimension,
};
use crate::errors::{GridstageError, Result};
use crate::fs::{FileSystem, read_lines};
use crate::layout::{CallerIds, WorkerDir, remove_owned_dir};
use crate::project::{Stage, StageInput};
use crate::reconcile::artifacts::{
    BAD_LIST, BookkeepingWriter, CHECKED, CPIDS_LIST, FILES_LIST, MISSING_LIST,
};

/// What a makeup submission has to redo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MakeupWork {
    /// Explicit input: the input list is rewritten to the missing files.
    InputList { files: Vec<String> },
    /// Generator input: process indices of the jobs without a good worker.
    ProcessMap { processes: Vec<u32> },
    /// Dataset input: a makeup definition of the unconsumed files.
    Dataset { defname: String, dimension: String },
    /// Nothing can be made up.
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeupPlan {
    pub outstanding: u64,
    pub job_count: u32,
    pub work: MakeupWork,
}

impl MakeupPlan {
    pub fn is_empty(&self) -> bool {
        self.outstanding == 0
    }

    /// Dataset definition the makeup workers read, if any.
    pub fn defname(&self) -> Option<&str> {
        match &self.work {
            MakeupWork::Dataset { defname, .. } => Some(defname.as_str()),
            _ => None,
        }
    }
}

/// Jobs to submit: never more than configured, never more than there is
/// work for.
pub fn makeup_job_count(outstanding: u64, configured: u32) -> u32 {
    outstanding.min(u64::from(configured)) as u32
}

/// Process indices in `0..num_jobs` not produced by any good output file.
///
/// Good files live in `<...>/<cluster>_<process>/<file>`. The result must
/// have exactly `outstanding` entries.
pub fn missing_process_indices(
    num_jobs: u32,
    good_files: &[String],
    outstanding: usize,
) -> Result<Vec<u32>> {
    let mut procs: BTreeSet<u32> = (0..num_jobs).collect();
    for file in good_files {
        let process = Path::new(file)
            .parent()
            .map(WorkerDir::classify_path)
            .and_then(|kind| kind.process());
        if let Some(process) = process {
            procs.remove(&process);
        }
    }
    if procs.len() != outstanding {
        return Err(GridstageError::Consistency(format!(
            "makeup process list has {} entries but {} jobs are outstanding",
            procs.len(),
            outstanding
        )));
    }
    Ok(procs.into_iter().collect())
}

pub struct MakeupPlanner<'a> {
    fs: &'a dyn FileSystem,
    caller: CallerIds,
}

impl<'a> MakeupPlanner<'a> {
    pub fn new(fs: &'a dyn FileSystem, caller: CallerIds) -> Self {
        Self { fs, caller }
    }

    /// Makeup needs the `checked` marker from a completed check.
    pub fn require_checked(&self, stage: &Stage) -> Result<()> {
        let writer = BookkeepingWriter::new(self.fs, &stage.layout.bookdir);
        if !writer.is_checked() {
            return Err(GridstageError::Structural {
                path: writer.path(CHECKED),
                reason: "wait for any running jobs to finish and run the check action".to_string(),
            });
        }
        Ok(())
    }

    /// Delete output, log and bookkeeping directories of every worker named
    /// in `bad.list`.
    pub fn delete_bad_workers(&self, stage: &Stage) -> Result<Vec<PathBuf>> {
        let layout = &stage.layout;
        let bad = layout.book_file(BAD_LIST);
        if !self.fs.exists(&bad) {
            return Ok(Vec::new());
        }
        let mut removed = Vec::new();
        for subdir in read_lines(self.fs, &bad)? {
            for root in [&layout.outdir, &layout.logdir, &layout.bookdir] {
                let dir = root.join(&subdir);
                if remove_owned_dir(self.fs, &dir, self.caller)? {
                    removed.push(dir);
                }
            }
        }
        Ok(removed)
    }

    fn read_list(&self, stage: &Stage, name: &str) -> Result<Vec<String>> {
        let path = stage.layout.book_file(name);
        if !self.fs.exists(&path) {
            return Ok(Vec::new());
        }
        Ok(read_lines(self.fs, &path)?
            .into_iter()
            .filter_map(|l| l.split_whitespace().next().map(str::to_string))
            .collect())
    }

    /// Derive the outstanding work. For dataset input the makeup definition
    /// is created in the catalog.
    pub async fn plan(
        &self,
        stage: &Stage,
        catalog: Option<&dyn CatalogService>,
        user: &str,
    ) -> Result<MakeupPlan> {
        self.require_checked(stage)?;
        let removed = self.delete_bad_workers(stage)?;
        debug!(stage = %stage.name, removed = removed.len(), "deleted bad workers");

        let (outstanding, work) = match &stage.input {
            StageInput::Dataset(def) => self.plan_dataset(stage, def, catalog, user).await?,
            StageInput::File(_) | StageInput::List(_) => {
                let files = self.read_list(stage, MISSING_LIST)?;
                println!("Makeup list contains {} files.", files.len());
                (files.len() as u64, MakeupWork::InputList { files })
            }
            StageInput::Generator => {
                let missing = self.read_list(stage, MISSING_LIST)?;
                println!("Makeup list contains {} files.", missing.len());
                let good = self.read_list(stage, FILES_LIST)?;
                let processes = missing_process_indices(stage.num_jobs, &good, missing.len())?;
                (missing.len() as u64, MakeupWork::ProcessMap { processes })
            }
        };

        let plan = MakeupPlan {
            outstanding,
            job_count: makeup_job_count(outstanding, stage.num_jobs),
            work,
        };
        info!(
            stage = %stage.name,
            outstanding = plan.outstanding,
            jobs = plan.job_count,
            "makeup planned"
        );
        Ok(plan)
    }

    async fn plan_dataset(
        &self,
        stage: &Stage,
        def: &str,
        catalog: Option<&dyn CatalogService>,
        user: &str,
    ) -> Result<(u64, MakeupWork)> {
        let cpids = self.read_list(stage, CPIDS_LIST)?;
        if cpids.is_empty() {
            return Ok((0, MakeupWork::Nothing));
        }
        let catalog = catalog.ok_or_else(|| {
            GridstageError::Usage("dataset makeup requires a catalog".to_string())
        })?;
        let defname = format!("{}_makeup", project_name(user, def));
        let dimension = unconsumed_dimension(def, &cpids);
        println!("Creating makeup sam dataset definition {defname}");
        DatasetRegistrar::new(catalog)
            .ensure_definition(&defname, &dimension)
            .await?;
        let count = catalog
            .count_files(&format!("defname: {defname}"))
            .await?;
        println!("Makeup dataset contains {count} files.");
        Ok((count, MakeupWork::Dataset { defname, dimension }))
    }
}
