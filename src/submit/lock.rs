// src/submit/lock.rs

//! Running-submission marker.
//!
//! A marker file per stage holds the pid of the process submitting it.
//! While that process is alive no other submit or makeup for the stage is
//! accepted. The marker is removed when the lock is dropped.
//!
//! Inspecting and replacing the marker happens under an exclusive `flock`
//! on a sibling guard file, and a new marker is published complete with a
//! hard link, so no reader ever sees it half written.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{FlockArg, flock};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::errors::{GridstageError, Result};
use crate::project::Stage;

#[derive(Debug)]
pub struct SubmissionLock {
    path: PathBuf,
}

/// What the marker on disk says about its holder.
enum Holder {
    Absent,
    Pid(i32),
    /// Empty or garbled; treated as held.
    Unreadable,
}

/// A process we may not signal still exists.
fn pid_alive(pid: i32) -> bool {
    pid > 0 && matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
}

fn read_holder(path: &Path) -> io::Result<Holder> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text
            .trim()
            .parse::<i32>()
            .map_or(Holder::Unreadable, Holder::Pid)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Holder::Absent),
        Err(e) => Err(e),
    }
}

/// Exclusive `flock` on `<marker>.guard`, released on drop.
struct MarkerGuard {
    _file: File,
}

impl MarkerGuard {
    fn take(marker: &Path) -> io::Result<Self> {
        let mut name = marker.as_os_str().to_owned();
        name.push(".guard");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(PathBuf::from(name))?;
        flock(file.as_raw_fd(), FlockArg::LockExclusive).map_err(io::Error::from)?;
        Ok(Self { _file: file })
    }
}

/// Write our pid to a private file and link it into place.
fn publish(marker: &Path) -> io::Result<()> {
    let mut name = marker.as_os_str().to_owned();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    let tmp = PathBuf::from(name);
    let linked = File::create(&tmp)
        .and_then(|mut file| {
            writeln!(file, "{}", std::process::id())?;
            file.sync_all()
        })
        .and_then(|()| fs::hard_link(&tmp, marker));
    if let Err(e) = fs::remove_file(&tmp) {
        debug!(tmp = %tmp.display(), error = %e, "cannot remove temporary marker");
    }
    linked
}

impl SubmissionLock {
    /// Marker path for a stage: a short hash of project, stage and
    /// bookkeeping directory.
    pub fn marker_path(lock_dir: &Path, project: &str, stage: &Stage) -> PathBuf {
        let key = format!("{project}\n{}\n{}", stage.name, stage.layout.bookdir.display());
        let hash = blake3::hash(key.as_bytes()).to_hex();
        lock_dir.join(format!("gridstage-{}.lock", &hash[..16]))
    }

    /// Take the marker, replacing a stale one left by a dead process.
    pub fn acquire(lock_dir: &Path, project: &str, stage: &Stage) -> Result<Self> {
        let path = Self::marker_path(lock_dir, project, stage);
        fs::create_dir_all(lock_dir)?;
        let _guard = MarkerGuard::take(&path)?;

        let running = || GridstageError::SubmissionRunning {
            stage: stage.name.clone(),
            marker: path.clone(),
        };
        match read_holder(&path)? {
            Holder::Absent => {}
            Holder::Pid(pid) if !pid_alive(pid) => {
                warn!(marker = %path.display(), pid, "removing stale submission marker");
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Holder::Pid(_) | Holder::Unreadable => return Err(running()),
        }

        match publish(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(running()),
            Err(e) => return Err(e.into()),
        }
        debug!(marker = %path.display(), stage = %stage.name, "submission lock taken");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SubmissionLock {
    fn drop(&mut self) {
        let _guard = match MarkerGuard::take(&self.path) {
            Ok(guard) => guard,
            Err(e) => {
                warn!(marker = %self.path.display(), error = %e, "cannot lock submission marker");
                return;
            }
        };
        let ours = i32::try_from(std::process::id()).ok();
        match read_holder(&self.path) {
            Ok(Holder::Pid(pid)) if Some(pid) == ours => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!(marker = %self.path.display(), error = %e, "cannot remove submission marker");
                }
            }
            Ok(_) => warn!(marker = %self.path.display(), "submission marker no longer ours; leaving it"),
            Err(e) => warn!(marker = %self.path.display(), error = %e, "cannot read submission marker"),
        }
    }
}
