// src/reconcile/metadata.rs

//! Output file classification from worker side-car metadata.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::fs::{FileSystem, file_names};
use crate::errors::Result;

/// What a single output file turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputClass {
    /// Simulation output with an event count and optional data stream.
    Simulation { events: u64, stream: Option<String> },
    /// Valid file without an event count (histograms, ntuples).
    Auxiliary,
    /// Side-car unparsable or the file itself is unreadable.
    Unreadable,
}

/// One simulation output file kept by a good worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoodFile {
    pub path: PathBuf,
    pub events: u64,
    pub stream: Option<String>,
}

impl GoodFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Result of scanning one worker output directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputScan {
    pub simulation: Vec<GoodFile>,
    pub auxiliary: Vec<PathBuf>,
    pub total_events: u64,
}

/// Path of the side-car for `file`, kept in the worker's bookkeeping dir.
pub fn sidecar_path(file: &Path, book_subdir: &Path) -> PathBuf {
    let name = file
        .file_name()
        .map(|n| format!("{}.json", n.to_string_lossy()))
        .unwrap_or_default();
    book_subdir.join(name)
}

/// Classify `file` using its side-car.
pub fn classify_output(fs: &dyn FileSystem, file: &Path, book_subdir: &Path) -> OutputClass {
    if !fs.is_file(file) {
        return OutputClass::Unreadable;
    }
    let sidecar = sidecar_path(file, book_subdir);
    if !fs.exists(&sidecar) {
        return OutputClass::Auxiliary;
    }
    let parsed = fs
        .read_to_string(&sidecar)
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(&text).ok());
    let Some(Value::Object(md)) = parsed else {
        return OutputClass::Unreadable;
    };
    match md.get("events") {
        None => OutputClass::Auxiliary,
        Some(events) => match event_count(events) {
            Some(events) => OutputClass::Simulation {
                events,
                stream: md
                    .get("data_stream")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            },
            None => OutputClass::Unreadable,
        },
    }
}

fn event_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn has_data_extension(name: &str, types: &[String]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| types.iter().any(|t| t == ext))
}

/// Scan the data files of one worker.
pub fn scan_outputs(
    fs: &dyn FileSystem,
    out_subdir: &Path,
    book_subdir: &Path,
    data_file_types: &[String],
) -> Result<OutputScan> {
    println!("Checking root files in directory {}.", out_subdir.display());
    let mut scan = OutputScan::default();
    for name in file_names(fs, out_subdir)? {
        if !has_data_extension(&name, data_file_types) {
            continue;
        }
        let path = out_subdir.join(&name);
        match classify_output(fs, &path, book_subdir) {
            OutputClass::Simulation { events, stream } => {
                scan.total_events += events;
                scan.simulation.push(GoodFile {
                    path,
                    events,
                    stream,
                });
            }
            OutputClass::Auxiliary => scan.auxiliary.push(path),
            OutputClass::Unreadable => {
                debug!(file = %path.display(), "unreadable output file");
                println!(
                    "Warning: File {} in directory {} is not a valid data file.",
                    name,
                    out_subdir.display()
                );
            }
        }
    }
    Ok(scan)
}
