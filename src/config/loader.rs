// src/config/loader.rs

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{GridstageError, Result};

/// Read and deserialise a project file without semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(GridstageError::ConfigError(format!(
                "project file {} not found",
                path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(toml::from_str(&contents)?)
}

/// Read a project file and validate it.
///
/// Rejects duplicate project and stage names, conflicting inputs, unknown
/// or multi-level `base` references, `input_stage` cycles and zero job
/// counts.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    ConfigFile::try_from(load_from_path(path)?)
}

/// `GRIDSTAGE_CONFIG` when set, otherwise `Gridstage.toml` in the current
/// directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("GRIDSTAGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Gridstage.toml"))
}
