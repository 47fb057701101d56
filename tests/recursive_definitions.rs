// tests/recursive_definitions.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, ProjectConfigBuilder, StageConfigBuilder};
use crate::common::{FakeCatalog, ROOT, model};

use gridstage::catalog::{
    DatasetRegistrar, DeleteOutcome, EnsureOutcome, output_dimension, recursive_dimension,
};
use gridstage::project::ProjectModel;
use gridstage::types::{OutputTier, RecurType};

fn recursive_model(stage: StageConfigBuilder) -> ProjectModel {
    model(
        &ConfigFileBuilder::new()
            .with_project(
                ProjectConfigBuilder::new("dt")
                    .file_type("mc")
                    .stage(stage.input_def("reco_input").build())
                    .build(),
            )
            .build(),
    )
}

#[test]
fn test_child_recursion_excludes_processed_parents() {
    let model = recursive_model(
        StageConfigBuilder::new("reco", ROOT).recursive(RecurType::Child, "all_gen"),
    );
    let (project, stage) = model.select(None, None).unwrap();

    let def = recursive_dimension(project, stage, "tester").unwrap();
    assert_eq!(def.name, "reco_input");
    assert_eq!(
        def.dimension,
        "defname: all_gen minus isparentof:( file_type mc and data_tier reconstructed \
         and uboone_project.name dt and uboone_project.stage reco \
         and uboone_project.version v1 and availability: physical )"
    );
    assert!(def.dummies.is_empty());
}

#[test]
fn test_active_base_and_limit_are_appended() {
    let model = recursive_model(
        StageConfigBuilder::new("reco", ROOT)
            .recursive(RecurType::Child, "all_gen")
            .active_base("prod")
            .recur_limit(50),
    );
    let (project, stage) = model.select(None, None).unwrap();

    let def = recursive_dimension(project, stage, "tester").unwrap();
    assert!(
        def.dimension
            .ends_with(" minus defname: prod_active minus defname: prod_wait with limit 50")
    );
    assert_eq!(def.dummies, vec!["prod_active", "prod_wait"]);
}

#[test]
fn test_stream_children_are_ored() {
    let model = recursive_model(
        StageConfigBuilder::new("reco", ROOT)
            .recursive(RecurType::Child, "all_gen")
            .data_streams(&["out1", "out2"]),
    );
    let (project, stage) = model.select(None, None).unwrap();

    let def = recursive_dimension(project, stage, "tester").unwrap();
    assert!(def.dimension.starts_with("(defname: all_gen minus isparentof:( "));
    assert!(def.dimension.contains("data_stream out1 ) ) or (defname: all_gen"));
    assert!(def.dimension.ends_with("data_stream out2 ) )"));
}

#[test]
fn test_snapshot_and_consumed_use_project_wildcard() {
    let model = recursive_model(
        StageConfigBuilder::new("reco", ROOT).recursive(RecurType::Snapshot, "all_gen"),
    );
    let (project, stage) = model.select(None, None).unwrap();
    let def = recursive_dimension(project, stage, "tester").unwrap();
    assert_eq!(
        def.dimension,
        "defname: all_gen minus snapshot_for_project_name tester_reco_input_%"
    );

    let model = recursive_model(
        StageConfigBuilder::new("reco", ROOT).recursive(RecurType::Consumed, "all_gen"),
    );
    let (project, stage) = model.select(None, None).unwrap();
    let def = recursive_dimension(project, stage, "tester").unwrap();
    assert_eq!(
        def.dimension,
        "defname: all_gen minus (project_name tester_reco_input_% and consumed_status consumed)"
    );
}

#[test]
fn test_non_recursive_stage_has_no_definition() {
    let model = recursive_model(StageConfigBuilder::new("reco", ROOT));
    let (project, stage) = model.select(None, None).unwrap();
    assert!(recursive_dimension(project, stage, "tester").is_none());
}

#[tokio::test]
async fn test_ensure_recursive_is_idempotent_and_creates_dummies() {
    let model = recursive_model(
        StageConfigBuilder::new("reco", ROOT)
            .recursive(RecurType::Child, "all_gen")
            .active_base("prod"),
    );
    let (project, stage) = model.select(None, None).unwrap();
    let catalog = FakeCatalog::new();
    let registrar = DatasetRegistrar::new(&catalog);

    let (def, outcome) = registrar
        .ensure_recursive(project, stage, "tester")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, EnsureOutcome::Created);

    let created: Vec<String> = catalog.created().into_iter().map(|(n, _)| n).collect();
    assert_eq!(created, vec!["prod_active", "prod_wait", "reco_input"]);
    assert_eq!(
        catalog.definition("prod_active").as_deref(),
        Some("file_name dummy_prod_active")
    );
    assert_eq!(catalog.definition("reco_input"), Some(def.dimension));

    let (_, again) = registrar
        .ensure_recursive(project, stage, "tester")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again, EnsureOutcome::Exists);
    assert_eq!(catalog.created().len(), 3);
}

#[tokio::test]
async fn test_definitions_are_never_updated() {
    let catalog = FakeCatalog::new().with_definition("d", "file_name x");
    let registrar = DatasetRegistrar::new(&catalog);

    assert_eq!(
        registrar.ensure_definition("d", "file_name y").await.unwrap(),
        EnsureOutcome::Exists
    );
    assert_eq!(catalog.definition("d").as_deref(), Some("file_name x"));

    assert_eq!(registrar.delete_definition("d").await.unwrap(), DeleteOutcome::Deleted);
    assert_eq!(registrar.delete_definition("d").await.unwrap(), DeleteOutcome::Absent);
}

#[test]
fn test_output_dimension_uses_release_tag_when_set() {
    let model = model(
        &ConfigFileBuilder::new()
            .with_project(
                ProjectConfigBuilder::new("dt")
                    .release_tag("v08_00_00")
                    .stage(StageConfigBuilder::new("ana", ROOT).build())
                    .build(),
            )
            .build(),
    );
    let (project, stage) = model.select(None, None).unwrap();
    assert_eq!(
        output_dimension(project, stage, OutputTier::Analysis),
        "data_tier root-tuple and uboone_project.name dt and uboone_project.stage ana \
         and uboone_project.version v08_00_00 and availability: anylocation"
    );
}
