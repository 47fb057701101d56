// src/catalog/dimensions.rs

//! Catalog dimension strings derived from project metadata.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::project::{Project, Stage};
use crate::types::{OutputTier, RecurType};

/// Dimension selecting the output of `stage` on `tier`, optionally
/// restricted to one data stream.
///
/// ```text
/// file_type mc and data_tier reconstructed and uboone_project.name dt
///   and uboone_project.stage reco and uboone_project.version v1
///   and availability: anylocation and data_stream out1
/// ```
pub fn datastream_dimension(
    project: &Project,
    stage: &Stage,
    tier: OutputTier,
    stream: Option<&str>,
) -> String {
    let exp = &project.experiment;
    let mut clauses = Vec::new();
    if let Some(file_type) = &project.file_type {
        clauses.push(format!("file_type {file_type}"));
    }
    clauses.push(format!("data_tier {}", stage.data_tier_for(tier)));
    clauses.push(format!("{exp}_project.name {}", project.name));
    clauses.push(format!("{exp}_project.stage {}", stage.name));
    let version = if project.release_tag.is_empty() {
        &project.version
    } else {
        &project.release_tag
    };
    clauses.push(format!("{exp}_project.version {version}"));
    if let Some(pubs) = &stage.pubs {
        let pairs: Vec<String> = pubs
            .subruns
            .iter()
            .map(|s| format!("{}.{}", pubs.run, s))
            .collect();
        clauses.push(format!("run_number {}", pairs.join(",")));
    }
    clauses.push("availability: anylocation".to_string());
    if let Some(stream) = stream.filter(|s| !s.is_empty()) {
        clauses.push(format!("data_stream {stream}"));
    }
    clauses.join(" and ")
}

/// Dimension for the stage's whole output on `tier` (all streams).
pub fn output_dimension(project: &Project, stage: &Stage, tier: OutputTier) -> String {
    datastream_dimension(project, stage, tier, None)
}

/// Replace `availability: anylocation` by `availability: physical`, or
/// append an availability qualifier when the clause is absent.
fn physical(dimension: &str) -> String {
    if dimension.contains("anylocation") {
        dimension.replace("anylocation", "physical")
    } else {
        format!("{dimension} with availability physical")
    }
}

/// A draining input definition and the dummy definitions it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursiveDefinition {
    pub name: String,
    pub dimension: String,
    pub dummies: Vec<String>,
}

/// Derive the recursive definition for a stage, if it is recursive with a
/// dataset input and a base definition.
pub fn recursive_dimension(project: &Project, stage: &Stage, user: &str) -> Option<RecursiveDefinition> {
    let policy = &stage.recursion;
    let name = stage.input.defname()?;
    let base = policy.base_def.as_deref()?;
    if !policy.enabled {
        return None;
    }

    let wildcard = project_wildcard(user, name);
    let mut dummies = Vec::new();
    let mut dimension = match policy.recur_type {
        RecurType::None => format!("defname: {base}"),
        RecurType::Snapshot => {
            format!("defname: {base} minus snapshot_for_project_name {wildcard}")
        }
        RecurType::Consumed => format!(
            "defname: {base} minus (project_name {wildcard} and consumed_status consumed)"
        ),
        RecurType::Child | RecurType::AnaChild => {
            let tier = if policy.recur_type == RecurType::AnaChild {
                OutputTier::Analysis
            } else {
                OutputTier::Primary
            };
            let streams = stage.data_streams_for(tier);
            let stream_dims: Vec<String> = if streams.is_empty() {
                vec![physical(&datastream_dimension(project, stage, tier, None))]
            } else {
                streams
                    .iter()
                    .map(|s| physical(&datastream_dimension(project, stage, tier, Some(s))))
                    .collect()
            };
            let mut dim = if stream_dims.len() == 1 {
                format!("defname: {base} minus isparentof:( {} )", stream_dims[0])
            } else {
                stream_dims
                    .iter()
                    .map(|d| format!("(defname: {base} minus isparentof:( {d} ) )"))
                    .collect::<Vec<_>>()
                    .join(" or ")
            };
            if let Some(active) = &policy.active_base {
                let active_def = format!("{active}_active");
                let wait_def = format!("{active}_wait");
                dim.push_str(&format!(" minus defname: {active_def} minus defname: {wait_def}"));
                dummies.push(active_def);
                dummies.push(wait_def);
            }
            dim
        }
    };
    if let Some(limit) = policy.limit {
        dimension.push_str(&format!(" with limit {limit}"));
    }

    Some(RecursiveDefinition {
        name: name.to_string(),
        dimension,
        dummies,
    })
}

/// Catalog project name `<user>_<defname>_<epoch seconds>`.
pub fn project_name(user: &str, defname: &str) -> String {
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("{user}_{defname}_{epoch}")
}

/// Pattern matching every project started from `defname` by `user`.
pub fn project_wildcard(user: &str, defname: &str) -> String {
    let name = project_name(user, defname);
    let prefix = name.rsplit_once('_').map(|(head, _)| head).unwrap_or(&name);
    format!("{prefix}_%")
}

/// Dimension of the files in `defname` not yet consumed by any of the
/// recorded consumer processes.
pub fn unconsumed_dimension(defname: &str, cpids: &[String]) -> String {
    if cpids.is_empty() {
        return format!("defname: {defname}");
    }
    format!(
        "(defname: {defname}) minus (consumer_process_id {} and consumed_status consumed)",
        cpids.join(",")
    )
}

/// Login name of the calling user.
pub fn current_user() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .or_else(|| {
            nix::unistd::User::from_uid(nix::unistd::getuid())
                .ok()
                .flatten()
                .map(|u| u.name)
        })
        .unwrap_or_else(|| "gridstage".to_string())
}
