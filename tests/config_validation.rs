// tests/config_validation.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, ProjectConfigBuilder, StageConfigBuilder};
use crate::common::ROOT;

use std::io::Write;

use tempfile::NamedTempFile;

use gridstage::config::{ConfigFile, load_and_validate};
use gridstage::errors::GridstageError;
use gridstage::project::{ProjectModel, StageInput};
use gridstage::types::RecurType;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{text}").unwrap();
    file
}

#[test]
fn test_full_file_loads_and_resolves_chained_inputs() {
    let file = write_config(
        r#"
[config]
experiment = "uboone"
lock_dir = "/tmp"

[[project]]
name = "dt"
version = "v1"
release_tag = "v08_00_00"
file_type = "mc"

[[project.stage]]
name = "gen"
fcl = ["prodgenie.fcl"]
num_jobs = 10
num_events = 50
outdir = "/pnfs/dt/out/gen"
logdir = "/pnfs/dt/log/gen"
workdir = "/pnfs/dt/work/gen"

[[project.stage]]
name = "reco"
base = "gen"
fcl = ["reco1.fcl", "reco2.fcl"]
outdir = "/pnfs/dt/out/reco"
logdir = "/pnfs/dt/log/reco"
workdir = "/pnfs/dt/work/reco"
bookdir = "/pnfs/dt/book/reco"
"#,
    );

    let cfg = load_and_validate(file.path()).expect("config should load");
    let model = ProjectModel::from_config(&cfg).unwrap();
    let project = model.project(None).unwrap();
    assert_eq!(project.stages.len(), 2);

    let gen_stage = &project.stages[0];
    assert_eq!(gen_stage.input, StageInput::Generator);
    assert_eq!(gen_stage.num_jobs, 10);

    let reco = &project.stages[1];
    // Inherited from the base stage.
    assert_eq!(reco.num_jobs, 10);
    assert_eq!(reco.num_events, 50);
    assert_eq!(reco.fcl, vec!["reco1.fcl", "reco2.fcl"]);
    // Chained to the previous stage's bookkeeping list.
    assert_eq!(
        reco.input,
        StageInput::List("/pnfs/dt/log/gen/files.list".into())
    );
    assert_eq!(reco.layout.bookdir.to_str(), Some("/pnfs/dt/book/reco"));
}

#[test]
fn test_last_stage_is_selected_by_default() {
    let cfg = ConfigFileBuilder::new()
        .with_project(
            ProjectConfigBuilder::new("dt")
                .stage(StageConfigBuilder::new("gen", ROOT).build())
                .stage(StageConfigBuilder::new("reco", ROOT).build())
                .build(),
        )
        .build();
    let model = ProjectModel::from_config(&cfg).unwrap();
    let (_, stage) = model.select(None, None).unwrap();
    assert_eq!(stage.name, "reco");

    match model.select(None, Some("nope")) {
        Err(GridstageError::StageNotFound(msg)) => assert!(msg.contains("nope")),
        other => panic!("expected StageNotFound, got {other:?}"),
    }
}

#[test]
fn test_conflicting_inputs_are_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_project(
            ProjectConfigBuilder::new("dt")
                .stage(
                    StageConfigBuilder::new("gen", ROOT)
                        .input_def("a")
                        .input_file("/data/x.root")
                        .build(),
                )
                .build(),
        )
        .raw();
    match ConfigFile::try_from(raw) {
        Err(GridstageError::ConfigError(msg)) => assert!(msg.contains("more than one")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn test_input_stage_cycle_returns_structured_error() {
    let raw = ConfigFileBuilder::new()
        .with_project(
            ProjectConfigBuilder::new("dt")
                .stage(StageConfigBuilder::new("a", ROOT).input_stage("b").build())
                .stage(StageConfigBuilder::new("b", ROOT).input_stage("a").build())
                .build(),
        )
        .raw();
    match ConfigFile::try_from(raw) {
        Err(GridstageError::StageCycle(msg)) => assert!(msg.contains("cycle detected")),
        other => panic!("expected StageCycle, got {other:?}"),
    }
}

#[test]
fn test_unknown_base_and_multi_level_inheritance_are_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_project(
            ProjectConfigBuilder::new("dt")
                .stage(StageConfigBuilder::new("a", ROOT).base("missing").build())
                .build(),
        )
        .raw();
    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(GridstageError::ConfigError(_))
    ));

    let raw = ConfigFileBuilder::new()
        .with_project(
            ProjectConfigBuilder::new("dt")
                .stage(StageConfigBuilder::new("a", ROOT).build())
                .stage(StageConfigBuilder::new("b", ROOT).base("a").build())
                .stage(StageConfigBuilder::new("c", ROOT).base("b").build())
                .build(),
        )
        .raw();
    match ConfigFile::try_from(raw) {
        Err(GridstageError::ConfigError(msg)) => assert!(msg.contains("single-level")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn test_zero_jobs_and_missing_projects_are_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_project(
            ProjectConfigBuilder::new("dt")
                .stage(StageConfigBuilder::new("gen", ROOT).num_jobs(0).build())
                .build(),
        )
        .raw();
    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(GridstageError::ConfigError(_))
    ));

    assert!(matches!(
        ConfigFile::try_from(ConfigFileBuilder::new().raw()),
        Err(GridstageError::ConfigError(_))
    ));
}

#[test]
fn test_recur_type_parses_from_toml() {
    let file = write_config(
        r#"
[[project]]
name = "dt"

[[project.stage]]
name = "reco"
input_def = "in_def"
recur = true
recur_type = "anachild"
base_def = "base_def"
outdir = "/o"
logdir = "/l"
workdir = "/w"
"#,
    );
    let cfg = load_and_validate(file.path()).unwrap();
    let model = ProjectModel::from_config(&cfg).unwrap();
    let (_, stage) = model.select(None, None).unwrap();
    assert!(stage.recursion.enabled);
    assert_eq!(stage.recursion.recur_type, RecurType::AnaChild);
    assert_eq!(stage.recursion.base_def.as_deref(), Some("base_def"));
    assert_eq!(stage.layout.bookdir, stage.layout.logdir);
}

#[test]
fn test_malformed_toml_is_a_toml_error() {
    let file = write_config("[[project]\nname = ");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(GridstageError::TomlError(_))
    ));
}
