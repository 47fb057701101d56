// src/reconcile/artifacts.rs

//! Stage-level bookkeeping files.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::Result;
use crate::fs::FileSystem;

pub const FILES_LIST: &str = "files.list";
pub const EVENTS_LIST: &str = "events.list";
pub const BAD_LIST: &str = "bad.list";
pub const MISSING_LIST: &str = "missing_files.list";
pub const FILESANA_LIST: &str = "filesana.list";
pub const URIS_LIST: &str = "transferred_uris.list";
pub const SAM_PROJECTS_LIST: &str = "sam_projects.list";
pub const CPIDS_LIST: &str = "cpids.list";
pub const CHECKED: &str = "checked";
pub const JOBIDS_LIST: &str = "jobids.list";

// Per-worker records.
pub const LAR_STAT: &str = "lar.stat";
pub const SAM_PROJECT_TXT: &str = "sam_project.txt";
pub const CPID_TXT: &str = "cpid.txt";

/// Placeholder input used for each missing generator job.
pub const DEV_NULL: &str = "/dev/null";

pub fn stream_list_name(stream: &str) -> String {
    format!("files_{stream}.list")
}

/// `files_<stream>.list` → `<stream>`.
pub fn stream_from_list_name(name: &str) -> Option<&str> {
    name.strip_prefix("files_")
        .and_then(|rest| rest.strip_suffix(".list"))
        .filter(|s| !s.is_empty())
}

/// Writes artifacts under one bookkeeping root. Every write truncates.
#[derive(Debug, Clone, Copy)]
pub struct BookkeepingWriter<'a> {
    fs: &'a dyn FileSystem,
    bookdir: &'a Path,
}

impl<'a> BookkeepingWriter<'a> {
    pub fn new(fs: &'a dyn FileSystem, bookdir: &'a Path) -> Self {
        Self { fs, bookdir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.bookdir.join(name)
    }

    /// One line per item; an empty file when there are none.
    pub fn write_lines<I, T>(&self, name: &str, lines: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        let mut text = String::new();
        let mut count = 0;
        for line in lines {
            text.push_str(&format!("{line}\n"));
            count += 1;
        }
        debug!(file = name, lines = count, "writing bookkeeping list");
        self.fs.write(&self.path(name), text.as_bytes())?;
        Ok(count)
    }

    /// Like [`write_lines`](Self::write_lines), but an empty list is written
    /// as a single blank line.
    pub fn write_lines_or_blank<I, T>(&self, name: &str, lines: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        let count = self.write_lines(name, lines)?;
        if count == 0 {
            self.fs.write(&self.path(name), b"\n")?;
        }
        Ok(count)
    }

    /// Replace `name` by a symlink to `target`.
    pub fn link(&self, name: &str, target: &Path) -> Result<()> {
        let link = self.path(name);
        debug!(link = %link.display(), target = %target.display(), "linking bookkeeping list");
        if self.fs.exists(&link) {
            self.fs.remove_file(&link)?;
        }
        self.fs.symlink(target, &link)?;
        Ok(())
    }

    pub fn mark_checked(&self) -> Result<()> {
        self.fs.write(&self.path(CHECKED), b"\n")?;
        Ok(())
    }

    pub fn is_checked(&self) -> bool {
        self.fs.exists(&self.path(CHECKED))
    }

    pub fn clear_checked(&self) -> Result<()> {
        let path = self.path(CHECKED);
        if self.fs.exists(&path) {
            self.fs.remove_file(&path)?;
        }
        Ok(())
    }

    /// Append a submitted job id to `jobids.list`, rewriting the file.
    pub fn append_job_id(&self, job_id: &str) -> Result<()> {
        let path = self.path(JOBIDS_LIST);
        let mut ids = if self.fs.exists(&path) {
            crate::fs::read_lines(self.fs, &path)?
        } else {
            Vec::new()
        };
        ids.push(job_id.to_string());
        self.write_lines(JOBIDS_LIST, ids)?;
        Ok(())
    }
}
