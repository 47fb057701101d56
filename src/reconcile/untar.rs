// src/reconcile/untar.rs

use std::time::Duration;

use tracing::{info, warn};

use crate::errors::Result;
use crate::exec::{CommandBackend, CommandLine};
use crate::fs::{FileSystem, file_names, leaf_dirs};
use crate::layout::StageDirectoryLayout;

const TAR_TIMEOUT: Duration = Duration::from_secs(600);

const TAR_EXCLUDES: [&str; 7] = [
    "beam*.dat",
    "beam*.info",
    "core*",
    "*.db",
    "*.sh",
    "*.py*",
    "*.tar",
];

fn is_log_tarball(name: &str) -> bool {
    name.starts_with("log") && name.ends_with(".tar")
}

/// Extract `log*.tar` tarballs from the log tree into the matching
/// bookkeeping directories. A `<tarball>.done` flag next to the extracted
/// files prevents repeating the work. Returns the number extracted.
pub async fn untar_logs(
    fs: &dyn FileSystem,
    backend: &dyn CommandBackend,
    layout: &StageDirectoryLayout,
) -> Result<usize> {
    if !fs.is_dir(&layout.logdir) {
        return Ok(0);
    }
    let mut extracted = 0;
    for dir in leaf_dirs(fs, &layout.logdir)? {
        let Ok(rel) = dir.strip_prefix(&layout.logdir) else {
            continue;
        };
        let book_subdir = layout.bookdir.join(rel);
        for name in file_names(fs, &dir)? {
            if !is_log_tarball(&name) {
                continue;
            }
            let flag = book_subdir.join(format!("{name}.done"));
            if fs.exists(&flag) {
                continue;
            }
            fs.create_dir_all(&book_subdir)?;

            let tarball = dir.join(&name);
            println!("Extracting tarball {}", tarball.display());
            let mut cmd = CommandLine::new("tar");
            cmd.arg("-xf")
                .arg(tarball.display().to_string())
                .arg("-C")
                .arg(book_subdir.display().to_string());
            for pattern in TAR_EXCLUDES {
                cmd.opt_eq("--exclude", pattern);
            }

            let out = backend.invoke(cmd, TAR_TIMEOUT).await?;
            if !out.success() {
                println!("{}", out.stdout);
                println!("{}", out.stderr);
                println!("Failed to extract log tarball in {}", tarball.display());
                warn!(tarball = %tarball.display(), exit_code = out.exit_code, "tar failed");
                continue;
            }
            fs.write(&flag, b"\n")?;
            info!(tarball = %tarball.display(), "extracted log tarball");
            extracted += 1;
        }
    }
    Ok(extracted)
}
