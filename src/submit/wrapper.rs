// src/submit/wrapper.rs

//! Per-worker wrapper configuration.
//!
//! One `#---STAGE` section per configured fcl. Inside a section the layers
//! are written in a fixed order: the include, catalog metadata overrides,
//! run numbering, flux file size. The framework reads the file top to
//! bottom, so a later key wins.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::project::{Project, Stage};

pub const WRAPPER_FCL: &str = "wrapper.fcl";

/// Application version used when the project has no release tag.
const DEFAULT_APPLICATION_VERSION: &str = "test";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperSection {
    pub index: usize,
    pub include: String,
    pub overrides: Vec<(String, String)>,
}

impl WrapperSection {
    /// Overrides as the framework sees them: the last assignment of a key
    /// wins.
    pub fn effective(&self) -> BTreeMap<&str, &str> {
        self.overrides
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

fn quoted(value: &str) -> String {
    format!("\"{value}\"")
}

fn include_name(fcl: &str) -> String {
    Path::new(fcl)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| fcl.to_string())
}

fn metadata_overrides(project: &Project, stage: &Stage, fcl: &str) -> Vec<(String, String)> {
    if !project.has_metadata() {
        return Vec::new();
    }
    let version = if project.release_tag.is_empty() {
        DEFAULT_APPLICATION_VERSION
    } else {
        project.release_tag.as_str()
    };
    let mut out = vec![(
        "services.FileCatalogMetadata.applicationVersion".to_string(),
        quoted(version),
    )];
    if let Some(file_type) = &project.file_type {
        out.push(("services.FileCatalogMetadata.fileType".to_string(), quoted(file_type)));
    }
    if let Some(run_type) = &project.run_type {
        out.push(("services.FileCatalogMetadata.runType".to_string(), quoted(run_type)));
    }
    let extras = "services.FileCatalogMetadataProject";
    out.push((format!("{extras}.FCLName"), quoted(&include_name(fcl))));
    out.push((format!("{extras}.ProjectName"), quoted(&project.name)));
    out.push((format!("{extras}.ProjectStage"), quoted(&stage.name)));
    out.push((format!("{extras}.ProjectVersion"), quoted(&project.version)));
    for (key, value) in &project.metadata {
        out.push((key.clone(), value.clone()));
    }
    out
}

fn numbering_overrides(stage: &Stage) -> Vec<(String, String)> {
    stage
        .first_run_override()
        .map(|run| vec![("source.firstRun".to_string(), run.to_string())])
        .unwrap_or_default()
}

/// Flux copy settings only apply to the generator of the first section.
fn flux_overrides(stage: &Stage, index: usize) -> Vec<(String, String)> {
    if index != 0 || stage.max_flux_file_mb == 0 {
        return Vec::new();
    }
    vec![
        (
            "physics.producers.generator.FluxCopyMethod".to_string(),
            quoted("IFDH"),
        ),
        (
            "physics.producers.generator.MaxFluxFileMB".to_string(),
            stage.max_flux_file_mb.to_string(),
        ),
    ]
}

pub fn wrapper_sections(project: &Project, stage: &Stage) -> Vec<WrapperSection> {
    stage
        .fcl
        .iter()
        .enumerate()
        .map(|(index, fcl)| {
            let mut overrides = metadata_overrides(project, stage, fcl);
            overrides.extend(numbering_overrides(stage));
            overrides.extend(flux_overrides(stage, index));
            WrapperSection {
                index,
                include: include_name(fcl),
                overrides,
            }
        })
        .collect()
}

pub fn render_wrapper(project: &Project, stage: &Stage) -> String {
    let mut out = String::new();
    for section in wrapper_sections(project, stage) {
        let _ = writeln!(out, "#---STAGE {}", section.index);
        let _ = writeln!(out, "#include \"{}\"", section.include);
        out.push('\n');
        for (key, value) in &section.overrides {
            let _ = writeln!(out, "{key}: {value}");
        }
        out.push_str("#---END_STAGE\n");
    }
    out
}
