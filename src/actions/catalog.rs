// src/actions/catalog.rs

//! Catalog-facing actions: definitions, declarations, locations, tape and
//! audit.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{ActionContext, Target};
use crate::catalog::{DatasetRegistrar, FileLocation, LocationKind, output_dimension};
use crate::errors::{GridstageError, Result};
use crate::exec::CommandLine;
use crate::fs::{FileSystem, file_names, leaf_dirs, read_lines};
use crate::project::StageInput;
use crate::reconcile::artifacts::{FILES_LIST, FILESANA_LIST};
use crate::reconcile::metadata::sidecar_path;
use crate::types::OutputTier;

const COPY_TIMEOUT: Duration = Duration::from_secs(3600);

/// Written by `audit` with the inputs that have no child in the output.
pub const AUDIT_MISSING_LIST: &str = "missingfiles.list";

fn list_for(tier: OutputTier) -> &'static str {
    if tier.is_analysis() {
        FILESANA_LIST
    } else {
        FILES_LIST
    }
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// `define`/`define_ana` (with `create`) and `check_definition`.
pub async fn check_definition(
    ctx: &ActionContext,
    t: Target<'_>,
    tier: OutputTier,
    create: bool,
) -> Result<usize> {
    let Some(defname) = t.stage.defname_for(tier) else {
        return Ok(0);
    };
    let registrar = DatasetRegistrar::new(ctx.catalog.as_ref());
    if registrar.exists(defname).await? {
        println!("Definition already exists: {defname}");
        return Ok(0);
    }
    if !create {
        println!("Definition should be created: {defname}");
        return Ok(1);
    }
    let dim = output_dimension(t.project, t.stage, tier);
    registrar.ensure_definition(defname, &dim).await?;
    Ok(0)
}

pub async fn test_definition(ctx: &ActionContext, t: Target<'_>, tier: OutputTier) -> Result<usize> {
    let Some(defname) = t.stage.defname_for(tier) else {
        println!("No dataset definition name specified for stage {}.", t.stage.name);
        return Ok(1);
    };
    let summary = ctx
        .catalog
        .list_files_summary(&format!("defname: {defname}"))
        .await?;
    println!("{}", summary.trim_end());
    Ok(0)
}

pub async fn undefine(ctx: &ActionContext, t: Target<'_>) -> Result<usize> {
    let Some(defname) = t.stage.defname.as_deref() else {
        println!("No dataset definition name specified for stage {}.", t.stage.name);
        return Ok(1);
    };
    DatasetRegistrar::new(ctx.catalog.as_ref())
        .delete_definition(defname)
        .await?;
    Ok(0)
}

pub async fn test_declarations(ctx: &ActionContext, t: Target<'_>, tier: OutputTier) -> Result<usize> {
    let dim = output_dimension(t.project, t.stage, tier);
    let summary = ctx.catalog.list_files_summary(&dim).await?;
    println!("{}", summary.trim_end());
    Ok(0)
}

/// Side-car metadata for an output file, or an empty object.
fn sidecar_metadata(fs: &dyn FileSystem, file: &Path, outdir: &Path, bookdir: &Path) -> Value {
    let book_subdir = file
        .parent()
        .and_then(|dir| dir.strip_prefix(outdir).ok())
        .map(|rel| bookdir.join(rel))
        .unwrap_or_else(|| bookdir.to_path_buf());
    let path = sidecar_path(file, &book_subdir);
    fs.read_to_string(&path)
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        .filter(Value::is_object)
        .unwrap_or_else(|| json!({}))
}

/// `declare`/`declare_ana` (with `declare`) and `check_declarations`.
pub async fn declarations(
    ctx: &ActionContext,
    t: Target<'_>,
    tier: OutputTier,
    declare: bool,
) -> Result<usize> {
    let fs = ctx.fs.as_ref();
    let layout = &t.stage.layout;
    let list = layout.book_file(list_for(tier));
    if !fs.exists(&list) {
        return Err(GridstageError::Structural {
            path: list,
            reason: "no file list found, run the check action".to_string(),
        });
    }

    let mut errors = 0;
    for line in read_lines(fs, &list)? {
        let Some(path) = line.split_whitespace().next() else {
            continue;
        };
        let name = base_name(path);
        match ctx.catalog.get_metadata(&name).await {
            Ok(_) => {
                println!("Metadata OK: {name}");
                continue;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        if !declare {
            println!("Not declared: {name}");
            errors += 1;
            continue;
        }
        println!("Declaring: {name}");
        let md = sidecar_metadata(fs, Path::new(path), &layout.outdir, &layout.bookdir);
        if md.as_object().is_none_or(|m| m.is_empty()) {
            println!("No sam metadata found for {name}.");
            continue;
        }
        if let Err(e) = ctx.catalog.declare_file(&md).await {
            warn!(file = %name, error = %e, "declare failed");
            println!("SAM declare failed.");
            errors += 1;
        }
    }
    Ok(errors)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationMode {
    Check,
    Add,
    Clean,
    Remove,
    Upload,
}

impl LocationMode {
    fn banner(self) -> &'static str {
        match self {
            LocationMode::Check => "Checking disk locations.",
            LocationMode::Add => "Adding disk locations.",
            LocationMode::Clean => "Cleaning disk locations.",
            LocationMode::Remove => "Removing disk locations.",
            LocationMode::Upload => "Uploading to FTS.",
        }
    }
}

/// Node-qualified catalog location for a directory.
pub fn node_location(dir: &str, disk_server: &str, dcache_server: &str) -> String {
    let node = if dir.starts_with("/pnfs/") {
        dcache_server
    } else {
        disk_server
    };
    format!("{node}{dir}")
}

/// Leaf directories under `outdir` holding each named file.
fn disk_locations(
    fs: &dyn FileSystem,
    outdir: &Path,
    names: &BTreeSet<&str>,
) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let mut found: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    if !fs.is_dir(outdir) {
        return Ok(found);
    }
    for dir in leaf_dirs(fs, outdir)? {
        for name in file_names(fs, &dir)? {
            if names.contains(name.as_str()) {
                found.entry(name).or_default().push(dir.clone());
            }
        }
    }
    Ok(found)
}

/// The `*_locations` and `upload` actions. Only reports; never an error.
pub async fn locations(
    ctx: &ActionContext,
    t: Target<'_>,
    tier: OutputTier,
    mode: LocationMode,
) -> Result<usize> {
    println!("{}", mode.banner());
    let fs = ctx.fs.as_ref();
    let settings = &t.model.config;
    let dim = output_dimension(t.project, t.stage, tier);
    let files = ctx.catalog.list_files(&dim).await?;
    let names: BTreeSet<&str> = files.iter().map(String::as_str).collect();
    let on_disk = disk_locations(fs, &t.stage.layout.outdir, &names)?;

    for name in &files {
        let disk_dirs = on_disk.get(name).cloned().unwrap_or_default();
        let sam_locs = ctx.catalog.locate_file(name).await?;
        if sam_locs.is_empty() && mode != LocationMode::Upload {
            println!("No location: {name}");
        }
        let sam_disk: Vec<&FileLocation> = sam_locs
            .iter()
            .filter(|l| l.kind == LocationKind::Disk)
            .collect();

        let to_add: Vec<String> = disk_dirs
            .iter()
            .map(|d| d.display().to_string())
            .filter(|d| !sam_disk.iter().any(|l| l.directory() == d.as_str()))
            .collect();

        let to_remove: Vec<&str> = sam_disk
            .iter()
            .filter(|l| mode == LocationMode::Remove || !fs.exists(&Path::new(l.directory()).join(name)))
            .map(|l| l.location.as_str())
            .collect();

        for dir in &to_add {
            let loc = node_location(dir, &settings.disk_server, &settings.dcache_server);
            match mode {
                LocationMode::Add => {
                    println!("Adding location: {loc}.");
                    ctx.catalog.add_file_location(name, &loc).await?;
                }
                LocationMode::Upload => {}
                _ => println!("Can add location: {loc}."),
            }
        }
        for loc in &to_remove {
            match mode {
                LocationMode::Clean | LocationMode::Remove => {
                    println!("Removing location: {loc}.");
                    ctx.catalog.remove_file_location(name, loc).await?;
                }
                LocationMode::Upload => {}
                _ => println!("Should remove location: {loc}."),
            }
        }

        let on_tape = sam_locs.iter().any(|l| l.kind == LocationKind::Tape);
        if mode == LocationMode::Upload && !on_tape {
            if let Some(dir) = disk_dirs.first() {
                upload(ctx, t, &dir.join(name)).await?;
            }
        }
    }
    Ok(0)
}

async fn upload(ctx: &ActionContext, t: Target<'_>, file: &Path) -> Result<()> {
    let fs = ctx.fs.as_ref();
    let Some(dropbox) = t.model.config.dropbox_dir.as_deref() else {
        return Err(GridstageError::Usage(
            "upload requires [config].dropbox_dir".to_string(),
        ));
    };
    if !fs.is_dir(dropbox) {
        println!("Making dropbox directory {}.", dropbox.display());
        fs.create_dir_all(dropbox)?;
    }
    let Some(name) = file.file_name() else {
        return Ok(());
    };
    let target = dropbox.join(name);
    if fs.exists(&target) {
        println!(
            "File {} already exists in dropbox {}.",
            name.to_string_lossy(),
            dropbox.display()
        );
        return Ok(());
    }
    println!(
        "Copying {} to dropbox directory {}.",
        name.to_string_lossy(),
        dropbox.display()
    );
    let mut cmd = CommandLine::new("ifdh");
    cmd.arg("cp")
        .arg(file.display().to_string())
        .arg(target.display().to_string());
    let out = ctx.backend.invoke(cmd, COPY_TIMEOUT).await?;
    if !out.success() {
        println!("Copy failed with status {}.", out.exit_code);
        warn!(file = %file.display(), exit_code = out.exit_code, "dropbox copy failed");
    }
    Ok(())
}

/// Report files of the output dimension without a tape location.
pub async fn check_tape(ctx: &ActionContext, t: Target<'_>, tier: OutputTier) -> Result<usize> {
    let dim = output_dimension(t.project, t.stage, tier);
    let files = ctx.catalog.list_files(&dim).await?;
    let mut missing = 0;
    for name in &files {
        let locs = ctx.catalog.locate_file(name).await?;
        if locs.iter().any(|l| l.kind == LocationKind::Tape) {
            println!("On tape: {name}");
        } else {
            println!("Not on tape: {name}");
            missing += 1;
        }
    }
    println!("{} files.", files.len());
    println!("{missing} files not on tape.");
    Ok(usize::from(missing > 0))
}

/// Input file names of a stage with input, by base name.
async fn audit_inputs(ctx: &ActionContext, input: &StageInput) -> Result<Vec<String>> {
    match input {
        StageInput::Dataset(def) => Ok(ctx.catalog.list_files(&format!("defname: {def}")).await?),
        StageInput::List(path) => {
            let fs = ctx.fs.as_ref();
            if !fs.exists(path) {
                return Ok(Vec::new());
            }
            Ok(read_lines(fs, path)?.iter().map(|l| base_name(l)).collect())
        }
        StageInput::File(path) => Ok(vec![base_name(&path.display().to_string())]),
        StageInput::Generator => Err(GridstageError::Usage(
            "no auditing for generator stage".to_string(),
        )),
    }
}

/// Compare the stage's inputs with the parents of its output.
///
/// Inputs without children go to `missingfiles.list`. For every extra
/// parent only the first of its physical children that is part of the
/// output is marked bad and dropped from `files.list`.
pub async fn audit(ctx: &ActionContext, t: Target<'_>) -> Result<usize> {
    let fs = ctx.fs.as_ref();
    let stage = t.stage;
    let inputs = audit_inputs(ctx, &stage.input).await?;
    let Some(defname) = stage.defname.as_deref() else {
        return Err(GridstageError::Usage(
            "output definition not found".to_string(),
        ));
    };

    let parents = ctx
        .catalog
        .list_files(&format!(
            "isparentof: (defname: {defname}) and availability: anylocation"
        ))
        .await?;
    let outputs: BTreeSet<String> = ctx
        .catalog
        .list_files(&format!("defname: {defname}"))
        .await?
        .into_iter()
        .collect();

    let input_set: BTreeSet<&str> = inputs.iter().map(String::as_str).collect();
    let parent_set: BTreeSet<&str> = parents.iter().map(String::as_str).collect();
    let missing: Vec<&str> = input_set.difference(&parent_set).copied().collect();
    let extra: Vec<&str> = parent_set.difference(&input_set).copied().collect();

    if missing.is_empty() && extra.is_empty() {
        println!("Everything in order.");
        return Ok(0);
    }
    println!("Missing parent file(s) = {}", missing.len());
    println!("Extra parent file(s) = {}", extra.len());

    let book = &stage.layout.bookdir;
    if !missing.is_empty() {
        let text: String = missing.iter().map(|m| format!("{m}\n")).collect();
        fs.write(&book.join(AUDIT_MISSING_LIST), text.as_bytes())?;
        println!("Creating {AUDIT_MISSING_LIST} in the output directory....done!");
    }

    if !extra.is_empty() {
        let files_list = book.join(FILES_LIST);
        if !fs.exists(&files_list) {
            return Err(GridstageError::Structural {
                path: files_list,
                reason: "no files.list found, run the check action".to_string(),
            });
        }
        let mut kept = read_lines(fs, &files_list)?;
        for parent in &extra {
            let children = ctx
                .catalog
                .list_files(&format!(
                    "ischildof: (file_name={parent}) and availability: physical"
                ))
                .await?;
            let mut matching: Vec<&String> =
                children.iter().filter(|c| outputs.contains(*c)).collect();
            matching.sort();
            let Some(child) = matching.first() else {
                debug!(parent, "extra parent has no child in the output definition");
                continue;
            };
            ctx.catalog
                .modify_metadata(child, &json!({ "content_status": "bad" }))
                .await?;
            println!("\nDeclaring the status of the following file as bad: {child}");
            kept.retain(|line| base_name(line.split_whitespace().next().unwrap_or("")) != **child);
        }
        let text: String = kept.iter().map(|l| format!("{l}\n")).collect();
        fs.write(&files_list, text.as_bytes())?;
        println!(
            "For extra parent files, files.list redefined and content status declared as bad in SAM...done!"
        );
    }
    info!(stage = %stage.name, missing = missing.len(), extra = extra.len(), "audit finished");
    Ok(1)
}
