// src/actions/maintenance.rs

//! `clean`, `clean_one`, `fetchlog` and the merge actions.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{ActionContext, Target};
use crate::errors::{GridstageError, Result, SubmissionError};
use crate::exec::CommandLine;
use crate::fs::{FileSystem, leaf_dirs, read_lines};
use crate::reconcile::artifacts::FILESANA_LIST;
use crate::types::MergeTool;

const FETCHLOG_TIMEOUT: Duration = Duration::from_secs(1800);
const MERGE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Environment dump written by every worker.
pub const ENV_TXT: &str = "env.txt";
pub const HISTURLS_LIST: &str = "histurls.list";
pub const MERGED_HIST: &str = "anahist.root";

/// Clean the target stage and, with `descendants`, every later stage of
/// any project whose input list lives in a bookkeeping directory that was
/// just cleaned.
pub fn clean(ctx: &ActionContext, t: Target<'_>, descendants: bool) -> Result<usize> {
    let fs = ctx.fs.as_ref();
    let mut cleaned: BTreeSet<PathBuf> = BTreeSet::new();
    let mut done: BTreeSet<(String, String)> = BTreeSet::new();

    println!("Clean project {}, stage {}", t.project.name, t.stage.name);
    t.stage.layout.clean(fs, ctx.caller)?;
    cleaned.insert(t.stage.layout.bookdir.clone());
    done.insert((t.project.name.clone(), t.stage.name.clone()));
    if !descendants {
        return Ok(0);
    }

    loop {
        let mut progressed = false;
        for project in &t.model.projects {
            for stage in &project.stages {
                let key = (project.name.clone(), stage.name.clone());
                if done.contains(&key) {
                    continue;
                }
                let feeds_from_cleaned = stage
                    .input
                    .list_path()
                    .and_then(Path::parent)
                    .is_some_and(|dir| cleaned.contains(dir));
                if !feeds_from_cleaned {
                    continue;
                }
                println!("Clean project {}, stage {}", project.name, stage.name);
                stage.layout.clean(fs, ctx.caller)?;
                cleaned.insert(stage.layout.bookdir.clone());
                done.insert(key);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    debug!(stages = done.len(), "clean finished");
    Ok(0)
}

const JOB_ID_PATTERN: &str = r"^(JOBSUBPARENTJOBID|JOBSUBJOBID)=(\d+)(?:\.\d+)?@(\S+)$";

/// Batch job id recorded in a worker's environment dump, normalised to the
/// parent cluster `<cluster>.0@<server>`.
pub fn job_id_from_env(text: &str) -> Result<Option<String>> {
    let re = Regex::new(JOB_ID_PATTERN).context("compiling job id pattern")?;
    let mut parent = None;
    let mut own = None;
    for line in text.lines() {
        let Some(caps) = re.captures(line.trim()) else {
            continue;
        };
        let id = format!("{}.0@{}", &caps[2], &caps[3]);
        if &caps[1] == "JOBSUBPARENTJOBID" {
            parent.get_or_insert(id);
        } else {
            own.get_or_insert(id);
        }
    }
    Ok(parent.or(own))
}

/// Distinct job ids found in the `env.txt` files of a bookkeeping tree.
pub fn collect_job_ids(fs: &dyn FileSystem, bookdir: &Path) -> Result<BTreeSet<String>> {
    let mut ids = BTreeSet::new();
    if !fs.is_dir(bookdir) {
        return Ok(ids);
    }
    for dir in leaf_dirs(fs, bookdir)? {
        let env = dir.join(ENV_TXT);
        if !fs.is_file(&env) {
            continue;
        }
        if let Some(id) = job_id_from_env(&fs.read_to_string(&env)?)? {
            ids.insert(id);
        }
    }
    Ok(ids)
}

/// Fetch the batch system's own logs for every job of the stage into
/// `<bookdir>/log`.
pub async fn fetchlog(ctx: &ActionContext, t: Target<'_>) -> Result<usize> {
    let fs = ctx.fs.as_ref();
    let layout = &t.stage.layout;
    let ids = collect_job_ids(fs, &layout.bookdir)?;
    if ids.is_empty() {
        println!("Failed to fetch log files.");
        return Ok(1);
    }

    let logdir = layout.bookdir.join("log");
    if fs.exists(&logdir) {
        fs.remove_dir_all(&logdir)?;
    }
    fs.create_dir_all(&logdir)?;

    for id in &ids {
        println!("Fetching log files for id {id}");
        let mut cmd = CommandLine::new("jobsub_fetchlog");
        if let Some(server) = t.project.jobsub_server() {
            cmd.opt_eq("--jobsub-server", server);
        }
        cmd.opt_eq("--jobid", id)
            .opt_eq("--dest-dir", logdir.display());
        let out = ctx.backend.invoke(cmd, FETCHLOG_TIMEOUT).await?;
        if !out.success() {
            warn!(job_id = %id, exit_code = out.exit_code, "fetchlog failed");
            return Err(SubmissionError::Failed {
                command: "jobsub_fetchlog".to_string(),
                exit_code: out.exit_code,
                stdout: out.stdout,
                stderr: out.stderr,
            }
            .into());
        }
    }
    info!(stage = %t.stage.name, jobs = ids.len(), "fetched batch logs");
    Ok(0)
}

/// Merge program and its leading arguments.
pub fn merge_command(tool: MergeTool, configured: &str) -> Result<CommandLine> {
    let words: Vec<&str> = match tool {
        MergeTool::Histograms => vec!["hadd", "-T"],
        MergeTool::Ntuples => vec!["hadd"],
        MergeTool::Custom => configured.split_whitespace().collect(),
    };
    let Some((program, args)) = words.split_first() else {
        return Err(GridstageError::Usage("merge command is empty".to_string()));
    };
    let mut cmd = CommandLine::new(*program);
    cmd.args(args.iter().copied());
    Ok(cmd)
}

/// Merge the stage's analysis files into `<outdir>/anahist.root`.
pub async fn merge(ctx: &ActionContext, t: Target<'_>, tool: MergeTool) -> Result<usize> {
    let fs = ctx.fs.as_ref();
    let layout = &t.stage.layout;
    let list = layout.book_file(FILESANA_LIST);
    if !fs.exists(&list) {
        return Err(GridstageError::Structural {
            path: list,
            reason: "no analysis file list found, run the checkana action".to_string(),
        });
    }

    let urls = read_lines(fs, &list)?;
    let text: String = urls.iter().map(|u| format!("{u}\n")).collect();
    fs.write(&layout.book_file(HISTURLS_LIST), text.as_bytes())?;

    let target = layout.outdir.join(MERGED_HIST);
    if fs.exists(&target) {
        fs.remove_file(&target)?;
    }

    let mut cmd = merge_command(tool, &t.stage.merge)?;
    cmd.arg("-f")
        .arg("-k")
        .arg(target.display().to_string())
        .arg(format!("@{HISTURLS_LIST}"))
        .current_dir(&layout.bookdir);
    println!("Merging {} files into {}", urls.len(), target.display());
    debug!(command = %cmd, "running merge");
    let program = cmd.program().to_string();
    let out = ctx.backend.invoke(cmd, MERGE_TIMEOUT).await?;
    if !out.success() {
        println!("{program} exit status {}", out.exit_code);
        return Ok(1);
    }
    Ok(0)
}
