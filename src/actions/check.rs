// src/actions/check.rs

//! `check`, `checkana`, `shorten` and `status`.

use std::path::Path;

use tracing::debug;

use super::{ActionContext, Target};
use crate::errors::Result;
use crate::fs::{FileSystem, file_names, leaf_dirs, read_lines};
use crate::reconcile::artifacts::{BAD_LIST, EVENTS_LIST, FILES_LIST, FILESANA_LIST, MISSING_LIST};
use crate::reconcile::metadata::sidecar_path;
use crate::reconcile::scan::MAX_FILENAME_LEN;
use crate::reconcile::{ReconciliationEngine, quick_check, untar_logs};
use crate::types::OutputTier;

/// Characters of the original name kept by `shorten`.
const SHORTENED_PREFIX_LEN: usize = 150;

pub async fn check(ctx: &ActionContext, t: Target<'_>, tier: OutputTier) -> Result<usize> {
    let stage = t.stage;
    untar_logs(ctx.fs.as_ref(), ctx.backend.as_ref(), &stage.layout).await?;

    if stage.validate_on_worker && !tier.is_analysis() {
        println!("Doing quick check of directory {}.", stage.layout.bookdir.display());
        return quick_check(ctx.fs.as_ref(), stage);
    }

    let engine = ReconciliationEngine::new(ctx.fs.as_ref(), Some(ctx.catalog.as_ref()));
    let report = engine.full_check(t.project, stage, tier).await?;
    Ok(report.exit_errors(tier))
}

/// Rename output files whose names are too long for the catalog, together
/// with their side-cars.
pub async fn shorten(ctx: &ActionContext, t: Target<'_>) -> Result<usize> {
    let fs = ctx.fs.as_ref();
    let layout = &t.stage.layout;
    untar_logs(fs, ctx.backend.as_ref(), layout).await?;
    if !fs.is_dir(&layout.outdir) {
        return Ok(0);
    }

    for dir in leaf_dirs(fs, &layout.outdir)? {
        let Ok(rel) = dir.strip_prefix(&layout.outdir) else {
            continue;
        };
        let book_subdir = layout.bookdir.join(rel);
        for name in file_names(fs, &dir)? {
            if !name.ends_with(".root") || name.len() < MAX_FILENAME_LEN {
                continue;
            }
            let short = shortened_name(&name);
            let from = dir.join(&name);
            let to = dir.join(&short);
            println!("{}\n->{}\n", from.display(), to.display());
            fs.rename(&from, &to)?;

            let json = sidecar_path(&from, &book_subdir);
            if fs.exists(&json) {
                let short_json = sidecar_path(&to, &book_subdir);
                println!("{}\n->{}\n", json.display(), short_json.display());
                fs.rename(&json, &short_json)?;
            }
        }
    }
    Ok(0)
}

/// First characters of `name` followed by a random hex tag and `.root`.
pub fn shortened_name(name: &str) -> String {
    let prefix: String = name.chars().take(SHORTENED_PREFIX_LEN).collect();
    format!("{prefix}{}.root", uuid::Uuid::new_v4().simple())
}

/// Counts read back from a stage's bookkeeping artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageSummary {
    pub files: usize,
    pub events: u64,
    pub ana_files: usize,
    pub errors: usize,
    pub missing: usize,
}

fn list_len(fs: &dyn FileSystem, path: &Path) -> usize {
    if !fs.exists(path) {
        return 0;
    }
    read_lines(fs, path).map(|l| l.len()).unwrap_or(0)
}

pub fn stage_summary(fs: &dyn FileSystem, bookdir: &Path) -> StageSummary {
    let events = if fs.exists(&bookdir.join(EVENTS_LIST)) {
        read_lines(fs, &bookdir.join(EVENTS_LIST))
            .unwrap_or_default()
            .iter()
            .filter_map(|l| l.split_whitespace().nth(1))
            .filter_map(|n| n.parse::<u64>().ok())
            .sum()
    } else {
        0
    };
    StageSummary {
        files: list_len(fs, &bookdir.join(FILES_LIST)),
        events,
        ana_files: list_len(fs, &bookdir.join(FILESANA_LIST)),
        errors: list_len(fs, &bookdir.join(BAD_LIST)),
        missing: list_len(fs, &bookdir.join(MISSING_LIST)),
    }
}

/// Print per-stage counts for the whole project.
pub fn status(ctx: &ActionContext, t: Target<'_>) -> Result<usize> {
    let fs = ctx.fs.as_ref();
    println!("\nProject {}:", t.project.name);
    for stage in &t.project.stages {
        if !fs.is_dir(&stage.layout.outdir) {
            println!("\nStage {} output directory does not exist.", stage.name);
            continue;
        }
        let s = stage_summary(fs, &stage.layout.bookdir);
        debug!(stage = %stage.name, ?s, "stage summary");
        println!(
            "\nStage {}: {} art files, {} events, {} analysis files, {} errors, {} missing files.",
            stage.name, s.files, s.events, s.ana_files, s.errors, s.missing
        );
    }
    Ok(0)
}
