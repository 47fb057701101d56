// src/reconcile/mod.rs

//! Reconciliation of worker output into stage bookkeeping.
//!
//! A full check re-derives everything from the worker directories and
//! side-cars; a quick check trusts the lists each worker validated itself.
//! Both rewrite every stage-level artifact and write `checked` last.

pub mod artifacts;
pub mod metadata;
pub mod quick;
pub mod scan;
pub mod untar;

use std::fmt;

use tracing::info;

use crate::catalog::{CatalogService, unconsumed_dimension};
use crate::errors::{GridstageError, Result};
use crate::fs::FileSystem;
use crate::project::{Project, Stage};
use crate::types::OutputTier;

use artifacts::{
    BookkeepingWriter, BAD_LIST, CPIDS_LIST, EVENTS_LIST, FILES_LIST, FILESANA_LIST,
    MISSING_LIST, SAM_PROJECTS_LIST, URIS_LIST, stream_list_name,
};
use metadata::GoodFile;
use scan::{ScanPolicy, WorkerScan, explicit_input_files, missing_inputs, placeholder_lines};

pub use quick::quick_check;
pub use scan::{BadWorker, GoodWorker};
pub use untar::untar_logs;

/// Why a worker directory was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerFailure {
    MissingOutputDir,
    ExitStatus(i32),
    BadStatusFile,
    NoValidOutput,
    NoAnalysisOutput,
    DuplicateFilename { file: String, previous: String },
    LongFilename(String),
    MissingRecord(&'static str),
    DuplicateProcess(u32),
    Unreadable(String),
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerFailure::MissingOutputDir => f.write_str("no matching output directory"),
            WorkerFailure::ExitStatus(code) => write!(f, "exit status {code}"),
            WorkerFailure::BadStatusFile => f.write_str("unreadable lar.stat"),
            WorkerFailure::NoValidOutput => f.write_str("no valid output files"),
            WorkerFailure::NoAnalysisOutput => f.write_str("no analysis files"),
            WorkerFailure::DuplicateFilename { file, previous } => {
                write!(f, "duplicate filename {file} (previous {previous})")
            }
            WorkerFailure::LongFilename(name) => write!(f, "filename too long: {name}"),
            WorkerFailure::MissingRecord(name) => write!(f, "missing {name}"),
            WorkerFailure::DuplicateProcess(p) => write!(f, "duplicate process number {p}"),
            WorkerFailure::Unreadable(msg) => write!(f, "unreadable record: {msg}"),
        }
    }
}

/// Outcome of a full check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub good_workers: Vec<GoodWorker>,
    pub bad_workers: Vec<BadWorker>,
    pub missing: Vec<String>,
    pub uris: Vec<String>,
    pub sam_projects: Vec<String>,
    pub cpids: Vec<String>,
    pub total_events: u64,
    pub unconsumed: u64,
    /// Bad workers plus unconsumed dataset files.
    pub errors: usize,
    /// The bookkeeping root was empty; nothing was written.
    pub dead: bool,
}

impl CheckReport {
    pub fn files(&self) -> impl Iterator<Item = &GoodFile> {
        self.good_workers.iter().flat_map(|w| w.files.iter())
    }

    pub fn ana_files(&self) -> impl Iterator<Item = &std::path::PathBuf> {
        self.good_workers.iter().flat_map(|w| w.auxiliary.iter())
    }

    pub fn file_count(&self) -> usize {
        self.files().count()
    }

    /// The check passed: no errors, at least one good worker and, unless
    /// checking analysis output, at least one valid file.
    pub fn success(&self, tier: OutputTier) -> bool {
        !self.dead
            && self.errors == 0
            && !self.good_workers.is_empty()
            && (tier.is_analysis() || self.file_count() > 0)
    }

    /// Contribution of this check to the process exit code.
    pub fn exit_errors(&self, tier: OutputTier) -> usize {
        if self.errors > 0 {
            self.errors
        } else if self.success(tier) {
            0
        } else {
            1
        }
    }
}

/// Drives full and quick checks over one stage.
#[derive(Debug, Clone, Copy)]
pub struct ReconciliationEngine<'a> {
    fs: &'a dyn FileSystem,
    catalog: Option<&'a dyn CatalogService>,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(fs: &'a dyn FileSystem, catalog: Option<&'a dyn CatalogService>) -> Self {
        Self { fs, catalog }
    }

    /// Full scan. Rewrites every artifact, `checked` last.
    pub async fn full_check(
        &self,
        project: &Project,
        stage: &Stage,
        tier: OutputTier,
    ) -> Result<CheckReport> {
        let layout = &stage.layout;
        for (label, dir) in [("output", &layout.outdir), ("bookkeeping", &layout.bookdir)] {
            if !self.fs.exists(dir) {
                println!("{label} directory {} does not exist.", dir.display());
                return Err(GridstageError::Structural {
                    path: dir.clone(),
                    reason: format!("{label} directory does not exist"),
                });
            }
        }
        println!("Checking directory {}", layout.bookdir.display());

        let policy = ScanPolicy {
            layout,
            input: &stage.input,
            data_file_types: &stage.data_file_types,
            has_metadata: project.has_metadata(),
            analysis: tier.is_analysis(),
        };
        let scan = scan::scan_workers(self.fs, &policy)?;

        if self.fs.read_dir(&layout.bookdir)?.is_empty() {
            println!("Directory {} may be dead.", layout.bookdir.display());
            println!("Returning error status without creating any bookkeeping files.");
            return Ok(CheckReport {
                dead: true,
                ..CheckReport::default()
            });
        }

        let mut report = self.aggregate(stage, scan);
        self.write_artifacts(stage, &report)?;

        if let (Some(def), false) = (stage.input.defname(), stage.pubs_input()) {
            report.unconsumed = self.count_unconsumed(def, &report.cpids).await?;
            report.errors += report.unconsumed as usize;
            println!("{} sam projects.", report.sam_projects.len());
            println!("{} successful consumer process ids.", report.cpids.len());
            println!("{} files not consumed.", report.unconsumed);
        }

        BookkeepingWriter::new(self.fs, &layout.bookdir).mark_checked()?;

        if tier.is_analysis() {
            println!("{} processes completed successfully.", report.good_workers.len());
        } else {
            println!("{} total good events.", report.total_events);
            println!("{} total good root files.", report.file_count());
        }
        println!("{} total good histogram files.", report.ana_files().count());
        if stage.input.is_dataset() && !stage.pubs_input() {
            println!("{} unconsumed files.", report.unconsumed);
        } else {
            println!("{} processes with errors.", report.bad_workers.len());
            println!("{} missing files.", report.missing.len());
        }
        info!(
            stage = %stage.name,
            good = report.good_workers.len(),
            bad = report.bad_workers.len(),
            missing = report.missing.len(),
            errors = report.errors,
            "full check finished"
        );
        Ok(report)
    }

    fn aggregate(&self, stage: &Stage, scan: WorkerScan) -> CheckReport {
        let missing = if stage.input.is_dataset() || stage.pubs_output() {
            Vec::new()
        } else {
            let inputs = explicit_input_files(self.fs, &stage.input);
            if inputs.is_empty() {
                placeholder_lines(stage.num_jobs, scan.good.len())
            } else {
                missing_inputs(&inputs, &scan.uris)
            }
        };
        CheckReport {
            total_events: scan.good.iter().map(|w| w.events).sum(),
            errors: scan.bad.len(),
            good_workers: scan.good,
            bad_workers: scan.bad,
            missing,
            uris: scan.uris,
            sam_projects: scan.sam_projects,
            cpids: scan.cpids,
            unconsumed: 0,
            dead: false,
        }
    }

    fn write_artifacts(&self, stage: &Stage, report: &CheckReport) -> Result<()> {
        let writer = BookkeepingWriter::new(self.fs, &stage.layout.bookdir);

        writer.write_lines(FILES_LIST, report.files().map(|f| f.path.display()))?;
        writer.write_lines(
            EVENTS_LIST,
            report
                .files()
                .map(|f| format!("{} {}", f.path.display(), f.events)),
        )?;

        let mut streams: std::collections::BTreeMap<&str, Vec<String>> = Default::default();
        for file in report.files() {
            if let Some(stream) = &file.stream {
                streams
                    .entry(stream.as_str())
                    .or_default()
                    .push(file.path.display().to_string());
            }
        }
        for (stream, files) in &streams {
            writer.write_lines(&stream_list_name(stream), files)?;
        }

        writer.write_lines_or_blank(BAD_LIST, report.bad_workers.iter().map(|b| &b.subdir))?;
        writer.write_lines_or_blank(MISSING_LIST, &report.missing)?;
        writer.write_lines(FILESANA_LIST, report.ana_files().map(|p| p.display()))?;
        writer.write_lines_or_blank(URIS_LIST, &report.uris)?;

        if stage.input.is_dataset() && !stage.pubs_input() {
            writer.write_lines(SAM_PROJECTS_LIST, &report.sam_projects)?;
            writer.write_lines(CPIDS_LIST, &report.cpids)?;
        }
        Ok(())
    }

    async fn count_unconsumed(&self, defname: &str, cpids: &[String]) -> Result<u64> {
        let Some(catalog) = self.catalog else {
            return Err(GridstageError::Usage(
                "dataset input check requires a catalog".to_string(),
            ));
        };
        let dim = unconsumed_dimension(defname, cpids);
        Ok(catalog.count_files(&dim).await?)
    }
}
