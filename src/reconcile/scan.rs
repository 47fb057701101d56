// src/reconcile/scan.rs

//! Full scan of worker bookkeeping directories.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use tracing::{debug, warn};

use super::WorkerFailure;
use super::artifacts::{CPID_TXT, DEV_NULL, LAR_STAT, SAM_PROJECT_TXT, URIS_LIST};
use super::metadata::{GoodFile, OutputScan, scan_outputs};
use crate::errors::Result;
use crate::fs::{FileSystem, leaf_dirs, read_lines};
use crate::layout::{StageDirectoryLayout, WorkerDir};
use crate::project::StageInput;

/// Filenames at least this long are rejected when catalog metadata is on.
pub const MAX_FILENAME_LEN: usize = 200;

/// What the full scan needs to know about a stage.
#[derive(Debug, Clone, Copy)]
pub struct ScanPolicy<'a> {
    pub layout: &'a StageDirectoryLayout,
    pub input: &'a StageInput,
    pub data_file_types: &'a [String],
    pub has_metadata: bool,
    pub analysis: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoodWorker {
    pub subdir: String,
    pub files: Vec<GoodFile>,
    pub auxiliary: Vec<std::path::PathBuf>,
    pub events: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadWorker {
    pub subdir: String,
    pub failure: WorkerFailure,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerScan {
    pub good: Vec<GoodWorker>,
    pub bad: Vec<BadWorker>,
    pub uris: Vec<String>,
    pub sam_projects: Vec<String>,
    pub cpids: Vec<String>,
}

#[derive(Debug, Default)]
struct WorkerRecords {
    sam_project: Option<String>,
    cpid: Option<String>,
    uris: Vec<String>,
}

/// First non-blank line of a small record file.
pub(crate) fn first_line(fs: &dyn FileSystem, path: &Path) -> Option<String> {
    fs.read_to_string(path).ok().and_then(|text| {
        text.lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
    })
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

/// `true` for paths under the fetched-log directory.
fn is_fetched_log(rel: &Path) -> bool {
    rel.components()
        .next()
        .is_some_and(|c| c.as_os_str() == "log")
}

pub fn scan_workers(fs: &dyn FileSystem, policy: &ScanPolicy<'_>) -> Result<WorkerScan> {
    let bookdir = &policy.layout.bookdir;
    let mut scan = WorkerScan::default();
    // filename -> subdir of the good worker that produced it
    let mut seen_names: BTreeMap<String, String> = BTreeMap::new();
    let mut processes: HashSet<u32> = HashSet::new();

    for dir in leaf_dirs(fs, bookdir)? {
        let Ok(rel) = dir.strip_prefix(bookdir) else {
            continue;
        };
        if is_fetched_log(rel) {
            continue;
        }
        let subdir = rel.to_string_lossy().into_owned();
        let kind = WorkerDir::classify_path(&dir);

        if kind.is_stream_helper() {
            if let Some(project) = first_line(fs, &dir.join(SAM_PROJECT_TXT)) {
                push_unique(&mut scan.sam_projects, project);
            }
            continue;
        }

        let mut outcome = check_worker(fs, policy, &dir, rel, &subdir, &seen_names);

        // Process numbers are recorded even for workers that already failed.
        if policy.input.is_generator() {
            if let Some(process) = kind.process() {
                if !processes.insert(process) && outcome.is_ok() {
                    println!("Duplicate process number {process}");
                    outcome = Err(WorkerFailure::DuplicateProcess(process));
                }
            }
        }

        match outcome {
            Ok((outputs, records)) => {
                for file in &outputs.simulation {
                    seen_names.insert(file.file_name(), subdir.clone());
                }
                if let Some(project) = records.sam_project {
                    push_unique(&mut scan.sam_projects, project);
                }
                if let Some(cpid) = records.cpid {
                    push_unique(&mut scan.cpids, cpid);
                }
                scan.uris.extend(records.uris);
                scan.good.push(GoodWorker {
                    subdir,
                    events: outputs.total_events,
                    files: outputs.simulation,
                    auxiliary: outputs.auxiliary,
                });
            }
            Err(failure) => {
                println!("Bad subdirectory {subdir}.");
                debug!(subdir = %subdir, reason = %failure, "worker rejected");
                scan.bad.push(BadWorker { subdir, failure });
            }
        }
    }
    Ok(scan)
}

fn check_worker(
    fs: &dyn FileSystem,
    policy: &ScanPolicy<'_>,
    book_subdir: &Path,
    rel: &Path,
    subdir: &str,
    seen_names: &BTreeMap<String, String>,
) -> std::result::Result<(OutputScan, WorkerRecords), WorkerFailure> {
    let out_subdir = policy.layout.outdir.join(rel);
    if !fs.is_dir(&out_subdir) {
        println!("No output directory corresponding to subdirectory {subdir}.");
        return Err(WorkerFailure::MissingOutputDir);
    }

    let stat = book_subdir.join(LAR_STAT);
    if fs.exists(&stat) {
        match first_line(fs, &stat).and_then(|l| l.parse::<i32>().ok()) {
            Some(0) => {}
            Some(code) => {
                println!("Job in subdirectory {subdir} ended with non-zero exit status {code}.");
                return Err(WorkerFailure::ExitStatus(code));
            }
            None => {
                println!("Bad file lar.stat in subdirectory {subdir}.");
                return Err(WorkerFailure::BadStatusFile);
            }
        }
    }

    let outputs = scan_outputs(fs, &out_subdir, book_subdir, policy.data_file_types)
        .map_err(|e| WorkerFailure::Unreadable(e.to_string()))?;
    if policy.analysis {
        if outputs.auxiliary.is_empty() {
            println!("Problem with analysis root file(s) in subdirectory {subdir}.");
            return Err(WorkerFailure::NoAnalysisOutput);
        }
    } else if outputs.simulation.is_empty() {
        println!("Problem with root file(s) in subdirectory {subdir}.");
        return Err(WorkerFailure::NoValidOutput);
    }

    if policy.has_metadata {
        for file in &outputs.simulation {
            let name = file.file_name();
            if let Some(previous) = seen_names.get(&name) {
                println!("Duplicate filename {name} in subdirectory {subdir}");
                println!("Previous subdirectory {previous}");
                return Err(WorkerFailure::DuplicateFilename {
                    file: name,
                    previous: previous.clone(),
                });
            }
        }
        for file in &outputs.simulation {
            let name = file.file_name();
            if name.len() >= MAX_FILENAME_LEN {
                println!(
                    "Filename {name} in subdirectory {subdir} is longer than {MAX_FILENAME_LEN} characters."
                );
                return Err(WorkerFailure::LongFilename(name));
            }
        }
    }

    let mut records = WorkerRecords::default();
    if policy.input.is_dataset() {
        for name in [SAM_PROJECT_TXT, CPID_TXT] {
            if !fs.exists(&book_subdir.join(name)) {
                println!("Could not find file {name}");
                return Err(WorkerFailure::MissingRecord(name));
            }
        }
        records.sam_project = first_line(fs, &book_subdir.join(SAM_PROJECT_TXT));
        records.cpid = first_line(fs, &book_subdir.join(CPID_TXT));
    }

    if policy.input.is_explicit() {
        let uris = book_subdir.join(URIS_LIST);
        if !fs.exists(&uris) {
            println!("Could not find file {URIS_LIST}");
            return Err(WorkerFailure::MissingRecord(URIS_LIST));
        }
        records.uris =
            read_lines(fs, &uris).map_err(|e| WorkerFailure::Unreadable(e.to_string()))?;
    }

    Ok((outputs, records))
}

/// Input files a stage was asked to process: the single file, the first
/// word of each line of the input list, or nothing for generator and
/// dataset input.
pub fn explicit_input_files(fs: &dyn FileSystem, input: &StageInput) -> Vec<String> {
    match input {
        StageInput::File(path) => vec![path.display().to_string()],
        StageInput::List(path) if fs.exists(path) => match fs.read_to_string(path) {
            Ok(text) => text
                .lines()
                .filter_map(|l| l.split_whitespace().next())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                warn!(list = %path.display(), error = %e, "cannot read input list");
                Vec::new()
            }
        },
        _ => Vec::new(),
    }
}

/// `input − transferred`, sorted and distinct.
pub fn missing_inputs(inputs: &[String], transferred: &[String]) -> Vec<String> {
    let done: HashSet<&str> = transferred.iter().map(String::as_str).collect();
    inputs
        .iter()
        .filter(|f| !done.contains(f.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// One `/dev/null` line per expected job without a good worker.
pub fn placeholder_lines(expected_jobs: u32, good_workers: usize) -> Vec<String> {
    let missing = (expected_jobs as usize).saturating_sub(good_workers);
    vec![DEV_NULL.to_string(); missing]
}
