// src/config/validate.rs

use std::collections::{BTreeMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, ConfigSection, ProjectConfig, RawConfigFile, StageConfig};
use crate::errors::{GridstageError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::GridstageError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.project))
    }
}

/// Re-run validation on an already constructed config.
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    validate_global_config(&cfg.config)?;
    validate_projects(&cfg.project)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_global_config(&cfg.config)?;
    validate_projects(&cfg.project)
}

fn validate_global_config(cfg: &ConfigSection) -> Result<()> {
    if cfg.experiment.trim().is_empty() {
        return Err(GridstageError::ConfigError(
            "[config].experiment must not be empty".to_string(),
        ));
    }
    if cfg.min_submit_timeout_secs == 0 {
        return Err(GridstageError::ConfigError(
            "[config].min_submit_timeout_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_projects(projects: &[ProjectConfig]) -> Result<()> {
    if projects.is_empty() {
        return Err(GridstageError::ConfigError(
            "config must contain at least one [[project]] section".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for project in projects {
        if project.name.trim().is_empty() {
            return Err(GridstageError::ConfigError(
                "every [[project]] needs a non-empty name".to_string(),
            ));
        }
        if !seen.insert(project.name.as_str()) {
            return Err(GridstageError::ConfigError(format!(
                "duplicate project name '{}'",
                project.name
            )));
        }
        validate_project(project)?;
    }
    Ok(())
}

fn validate_project(project: &ProjectConfig) -> Result<()> {
    if project.stage.is_empty() {
        return Err(GridstageError::ConfigError(format!(
            "project '{}' must contain at least one [[project.stage]]",
            project.name
        )));
    }
    if project.num_jobs == Some(0) {
        return Err(GridstageError::ConfigError(format!(
            "project '{}': num_jobs must be >= 1 (got 0)",
            project.name
        )));
    }

    let mut stages: BTreeMap<&str, &StageConfig> = BTreeMap::new();
    for stage in &project.stage {
        if stages.insert(stage.name.as_str(), stage).is_some() {
            return Err(GridstageError::ConfigError(format!(
                "project '{}' has duplicate stage name '{}'",
                project.name, stage.name
            )));
        }
    }

    for stage in &project.stage {
        validate_stage_references(project, stage, &stages)?;
    }
    validate_stage_graph(project)?;

    for stage in &project.stage {
        let base = stage.base.as_deref().and_then(|b| stages.get(b).copied());
        validate_effective_stage(project, stage, base)?;
    }
    Ok(())
}

fn validate_stage_references(
    project: &ProjectConfig,
    stage: &StageConfig,
    stages: &BTreeMap<&str, &StageConfig>,
) -> Result<()> {
    if let Some(base) = stage.base.as_deref() {
        if base == stage.name {
            return Err(GridstageError::ConfigError(format!(
                "stage '{}' cannot be its own base",
                stage.name
            )));
        }
        let Some(base_stage) = stages.get(base) else {
            return Err(GridstageError::ConfigError(format!(
                "stage '{}' has unknown base stage '{}'",
                stage.name, base
            )));
        };
        if base_stage.base.is_some() {
            return Err(GridstageError::ConfigError(format!(
                "stage '{}' uses base '{}' which itself has a base; inheritance is single-level",
                stage.name, base
            )));
        }
    }

    if let Some(input) = stage.input_stage.as_deref() {
        if input == stage.name {
            return Err(GridstageError::ConfigError(format!(
                "stage '{}' cannot take its own output as input",
                stage.name
            )));
        }
        if !stages.contains_key(input) {
            return Err(GridstageError::ConfigError(format!(
                "stage '{}' in project '{}' has unknown input_stage '{}'",
                stage.name, project.name, input
            )));
        }
    }

    let declared = [
        stage.input_file.is_some(),
        stage.input_list.is_some(),
        stage.input_def.is_some(),
        stage.input_stage.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();
    if declared > 1 {
        return Err(GridstageError::ConfigError(format!(
            "stage '{}' declares more than one of input_file, input_list, input_def, input_stage",
            stage.name
        )));
    }
    if declared == 1 && stage.generator == Some(true) {
        return Err(GridstageError::ConfigError(format!(
            "stage '{}' is marked generator but declares an input",
            stage.name
        )));
    }
    Ok(())
}

fn validate_stage_graph(project: &ProjectConfig) -> Result<()> {
    // Edge direction: provider -> consumer.
    // Both `base` and `input_stage` are provider relations.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for stage in &project.stage {
        graph.add_node(stage.name.as_str());
    }
    for stage in &project.stage {
        if let Some(base) = stage.base.as_deref() {
            graph.add_edge(base, stage.name.as_str(), ());
        }
        if let Some(input) = stage.input_stage.as_deref() {
            graph.add_edge(input, stage.name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(GridstageError::StageCycle(format!(
                "cycle detected in project '{}' involving stage '{}'",
                project.name, node
            )))
        }
    }
}

fn validate_effective_stage(
    project: &ProjectConfig,
    stage: &StageConfig,
    base: Option<&StageConfig>,
) -> Result<()> {
    fn pick<'a, T>(
        stage: &'a StageConfig,
        base: Option<&'a StageConfig>,
        field: impl Fn(&StageConfig) -> &Option<T>,
    ) -> Option<&'a T> {
        field(stage).as_ref().or_else(|| base.and_then(|b| field(b).as_ref()))
    }

    for (name, present) in [
        ("outdir", pick(stage, base, |s| &s.outdir).is_some()),
        ("logdir", pick(stage, base, |s| &s.logdir).is_some()),
        ("workdir", pick(stage, base, |s| &s.workdir).is_some()),
    ] {
        if !present {
            return Err(GridstageError::ConfigError(format!(
                "stage '{}' in project '{}' has no {name} (set it or inherit it from a base stage)",
                stage.name, project.name
            )));
        }
    }

    if pick(stage, base, |s| &s.num_jobs) == Some(&0) {
        return Err(GridstageError::ConfigError(format!(
            "stage '{}': num_jobs must be >= 1 (got 0)",
            stage.name
        )));
    }

    if let Some(fraction) = pick(stage, base, |s| &s.prestage_fraction) {
        if !(0.0..=1.0).contains(fraction) {
            return Err(GridstageError::ConfigError(format!(
                "stage '{}': prestage_fraction must be within [0, 1] (got {fraction})",
                stage.name
            )));
        }
    }

    if pick(stage, base, |s| &s.recur) == Some(&true) {
        if pick(stage, base, |s| &s.input_def).is_none() {
            return Err(GridstageError::ConfigError(format!(
                "stage '{}' is recursive but has no input_def",
                stage.name
            )));
        }
    }

    Ok(())
}
