// src/reconcile/quick.rs

//! Quick check: merge the lists each worker validated and pushed back
//! itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::artifacts::{
    BookkeepingWriter, BAD_LIST, CPID_TXT, CPIDS_LIST, EVENTS_LIST, FILES_LIST, FILESANA_LIST,
    MISSING_LIST, SAM_PROJECT_TXT, SAM_PROJECTS_LIST, URIS_LIST, stream_from_list_name,
};
use super::scan::{explicit_input_files, first_line, missing_inputs};
use crate::errors::{GridstageError, Result};
use crate::fs::{FileSystem, file_names, leaf_dirs};
use crate::layout::WorkerDir;
use crate::project::Stage;

/// Lists gathered from the worker directories.
#[derive(Debug, Default)]
struct QuickLists {
    files: Vec<String>,
    ana_files: Vec<String>,
    events: Vec<String>,
    bad: Vec<String>,
    uris: Vec<String>,
    streams: BTreeMap<String, Vec<String>>,
    sam_projects: Vec<String>,
    cpids: Vec<String>,
    good_dirs: Vec<PathBuf>,
    errors: usize,
}

/// Read a list that must exist and be non-empty.
fn required_list(fs: &dyn FileSystem, path: &Path) -> Option<Vec<String>> {
    let lines: Vec<String> = fs
        .read_to_string(path)
        .ok()?
        .lines()
        .map(|l| l.trim().to_string())
        .collect();
    if lines.is_empty() { None } else { Some(lines) }
}

/// Read a list that may be absent.
fn optional_list(fs: &dyn FileSystem, path: &Path) -> Vec<String> {
    required_list(fs, path).unwrap_or_default()
}

/// The worker's own `missing_files.list` must exist, be non-empty and
/// start with `0`.
fn worker_validated(fs: &dyn FileSystem, dir: &Path) -> bool {
    let path = dir.join(MISSING_LIST);
    match required_list(fs, &path) {
        None => {
            println!("Cannot open file or empty file: {}", path.display());
            false
        }
        Some(lines) => lines[0].parse::<i64>().is_ok_and(|n| n == 0),
    }
}

fn push_unique(list: &mut Vec<String>, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        if !list.contains(&value) {
            list.push(value);
        }
    }
}

fn gather(fs: &dyn FileSystem, stage: &Stage) -> Result<QuickLists> {
    let mut lists = QuickLists::default();
    let dataset = stage.input.is_dataset();

    for dir in leaf_dirs(fs, &stage.layout.bookdir)? {
        let kind = WorkerDir::classify_path(&dir);
        if kind.is_stream_helper() {
            push_unique(&mut lists.sam_projects, first_line(fs, &dir.join(SAM_PROJECT_TXT)));
            continue;
        }
        if kind == WorkerDir::FetchedLogs {
            continue;
        }
        println!("Doing quick check of directory {}.", dir.display());

        if !worker_validated(fs, &dir) {
            lists.errors += 1;
            continue;
        }

        if dataset {
            for (name, target) in [
                (SAM_PROJECT_TXT, &mut lists.sam_projects),
                (CPID_TXT, &mut lists.cpids),
            ] {
                let path = dir.join(name);
                if fs.exists(&path) {
                    push_unique(target, first_line(fs, &path));
                } else {
                    println!("Could not find file {name}");
                    lists.errors += 1;
                }
            }
        }

        match required_list(fs, &dir.join(FILES_LIST)) {
            Some(lines) => lists.files.extend(lines),
            None => lists.errors += 1,
        }
        lists.ana_files.extend(optional_list(fs, &dir.join(FILESANA_LIST)));
        match required_list(fs, &dir.join(EVENTS_LIST)) {
            Some(lines) => lists.events.extend(lines),
            None => lists.errors += 1,
        }
        lists.bad.extend(optional_list(fs, &dir.join(BAD_LIST)));
        lists.uris.extend(optional_list(fs, &dir.join(URIS_LIST)));

        for name in file_names(fs, &dir)? {
            if stream_from_list_name(&name).is_none() {
                continue;
            }
            match required_list(fs, &dir.join(&name)) {
                Some(lines) => lists.streams.entry(name).or_default().extend(lines),
                None => lists.errors += 1,
            }
        }

        lists.good_dirs.push(dir);
    }

    for list in [&mut lists.files, &mut lists.ana_files, &mut lists.events, &mut lists.bad, &mut lists.uris] {
        list.retain(|l| !l.is_empty());
    }
    for list in lists.streams.values_mut() {
        list.retain(|l| !l.is_empty());
    }
    Ok(lists)
}

/// Run the quick check and return the error count.
pub fn quick_check(fs: &dyn FileSystem, stage: &Stage) -> Result<usize> {
    let layout = &stage.layout;
    for (label, dir) in [("Output", &layout.outdir), ("Log", &layout.bookdir)] {
        if !fs.is_dir(dir) {
            println!("{label} directory {} does not exist.", dir.display());
            return Err(GridstageError::Structural {
                path: dir.clone(),
                reason: format!("{} directory does not exist", label.to_lowercase()),
            });
        }
    }
    println!("Checking directory {}", layout.bookdir.display());

    let lists = gather(fs, stage)?;
    let writer = BookkeepingWriter::new(fs, &layout.bookdir);
    let single = match lists.good_dirs.as_slice() {
        [only] => Some(only.clone()),
        _ => None,
    };
    debug!(good = lists.good_dirs.len(), symlink = single.is_some(), "quick check gathered");

    let merged: [(&str, &Vec<String>); 3] = [
        (FILES_LIST, &lists.files),
        (FILESANA_LIST, &lists.ana_files),
        (EVENTS_LIST, &lists.events),
    ];
    for (name, lines) in merged {
        match &single {
            Some(dir) => writer.link(name, &dir.join(name))?,
            None => {
                writer.write_lines(name, lines)?;
            }
        }
    }

    writer.write_lines_or_blank(BAD_LIST, &lists.bad)?;

    let missing = if stage.input.is_dataset() || stage.pubs_output() {
        Vec::new()
    } else {
        let inputs = explicit_input_files(fs, &stage.input);
        missing_inputs(&inputs, &lists.uris)
    };
    writer.write_lines_or_blank(MISSING_LIST, &missing)?;

    match &single {
        Some(dir) if !lists.uris.is_empty() => writer.link(URIS_LIST, &dir.join(URIS_LIST))?,
        _ => {
            writer.write_lines_or_blank(URIS_LIST, &lists.uris)?;
        }
    }

    if stage.input.is_dataset() {
        for (name, source, lines) in [
            (SAM_PROJECTS_LIST, SAM_PROJECT_TXT, &lists.sam_projects),
            (CPIDS_LIST, CPID_TXT, &lists.cpids),
        ] {
            match &single {
                Some(dir) => writer.link(name, &dir.join(source))?,
                None => {
                    writer.write_lines(name, lines)?;
                }
            }
        }
    }

    for (name, lines) in &lists.streams {
        match &single {
            Some(dir) => writer.link(name, &dir.join(name))?,
            None => {
                writer.write_lines(name, lines)?;
            }
        }
    }

    writer.mark_checked()?;
    info!(errors = lists.errors, "quick check finished");
    println!("Number of errors = {}", lists.errors);
    Ok(lists.errors)
}
