// tests/makeup_planner.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, ProjectConfigBuilder, StageConfigBuilder};
use crate::common::{FakeCatalog, ROOT, WorkerTree, generator_model, init_tracing, model};

use gridstage::catalog::{CatalogService, unconsumed_dimension};
use gridstage::errors::GridstageError;
use gridstage::fs::FileSystem;
use gridstage::fs::mock::MockFileSystem;
use gridstage::layout::CallerIds;
use gridstage::makeup::{MakeupPlanner, MakeupWork, makeup_job_count, missing_process_indices};
use gridstage::reconcile::ReconciliationEngine;
use gridstage::types::OutputTier;

#[tokio::test]
async fn test_generator_makeup_targets_missing_processes() {
    init_tracing();
    let model = generator_model(4);
    let (project, stage) = model.select(None, None).unwrap();
    let fs = MockFileSystem::new();
    let tree = WorkerTree::new(&fs, &stage.layout);
    tree.good(0, 10);
    tree.good(2, 10);
    tree.failed(3, 2);

    ReconciliationEngine::new(&fs, None)
        .full_check(project, stage, OutputTier::Primary)
        .await
        .unwrap();

    let plan = MakeupPlanner::new(&fs, CallerIds::current())
        .plan(stage, None, "tester")
        .await
        .unwrap();

    assert_eq!(plan.outstanding, 2);
    assert_eq!(plan.job_count, 2);
    assert_eq!(plan.work, MakeupWork::ProcessMap { processes: vec![1, 3] });

    // The bad worker is gone from every root.
    assert!(!fs.exists(&stage.layout.outdir.join("1000_3")));
    assert!(!fs.exists(&stage.layout.bookdir.join("1000_3")));
    assert!(fs.exists(&stage.layout.outdir.join("1000_0")));
}

#[tokio::test]
async fn test_makeup_requires_checked_marker() {
    let model = generator_model(2);
    let (_, stage) = model.select(None, None).unwrap();
    let fs = MockFileSystem::new();
    WorkerTree::new(&fs, &stage.layout).good(0, 1);

    let err = MakeupPlanner::new(&fs, CallerIds::current())
        .plan(stage, None, "tester")
        .await
        .unwrap_err();
    match err {
        GridstageError::Structural { path, .. } => {
            assert_eq!(path, stage.layout.bookdir.join("checked"))
        }
        other => panic!("expected Structural, got {other:?}"),
    }
}

#[tokio::test]
async fn test_explicit_input_makeup_uses_missing_list() {
    let cfg = ConfigFileBuilder::new()
        .with_project(
            ProjectConfigBuilder::new("dt")
                .stage(
                    StageConfigBuilder::new("reco", ROOT)
                        .input_list("/grid/dt/in.list")
                        .num_jobs(10)
                        .build(),
                )
                .build(),
        )
        .build();
    let model = model(&cfg);
    let (_, stage) = model.select(None, None).unwrap();
    let fs = MockFileSystem::new();
    WorkerTree::new(&fs, &stage.layout);
    let book = &stage.layout.bookdir;
    fs.add_file(book.join("missing_files.list"), "/data/b.root\n/data/d.root\n");
    fs.add_file(book.join("checked"), "\n");

    let plan = MakeupPlanner::new(&fs, CallerIds::current())
        .plan(stage, None, "tester")
        .await
        .unwrap();
    assert_eq!(plan.outstanding, 2);
    assert_eq!(plan.job_count, 2);
    assert_eq!(
        plan.work,
        MakeupWork::InputList {
            files: vec!["/data/b.root".into(), "/data/d.root".into()]
        }
    );
}

#[tokio::test]
async fn test_dataset_makeup_creates_unconsumed_definition() {
    let cfg = ConfigFileBuilder::new()
        .with_project(
            ProjectConfigBuilder::new("dt")
                .stage(
                    StageConfigBuilder::new("reco", ROOT)
                        .input_def("in_def")
                        .num_jobs(3)
                        .build(),
                )
                .build(),
        )
        .build();
    let model = model(&cfg);
    let (_, stage) = model.select(None, None).unwrap();
    let fs = MockFileSystem::new();
    WorkerTree::new(&fs, &stage.layout);
    let book = &stage.layout.bookdir;
    fs.add_file(book.join("cpids.list"), "101\n102\n");
    fs.add_file(book.join("checked"), "\n");

    let cpids = vec!["101".to_string(), "102".to_string()];
    let dimension = unconsumed_dimension("in_def", &cpids);
    let catalog = FakeCatalog::new().with_files(
        &dimension,
        &["a.root", "b.root", "c.root", "d.root", "e.root"],
    );

    let plan = MakeupPlanner::new(&fs, CallerIds::current())
        .plan(stage, Some(&catalog as &dyn CatalogService), "tester")
        .await
        .unwrap();

    assert_eq!(plan.outstanding, 5);
    // Capped at the configured job count.
    assert_eq!(plan.job_count, 3);
    let defname = plan.defname().unwrap().to_string();
    assert!(defname.starts_with("tester_in_def_"));
    assert!(defname.ends_with("_makeup"));
    assert_eq!(catalog.definition(&defname), Some(dimension));
}

#[tokio::test]
async fn test_dataset_makeup_without_consumers_is_empty() {
    let cfg = ConfigFileBuilder::new()
        .with_project(
            ProjectConfigBuilder::new("dt")
                .stage(StageConfigBuilder::new("reco", ROOT).input_def("in_def").build())
                .build(),
        )
        .build();
    let model = model(&cfg);
    let (_, stage) = model.select(None, None).unwrap();
    let fs = MockFileSystem::new();
    WorkerTree::new(&fs, &stage.layout);
    fs.add_file(stage.layout.bookdir.join("checked"), "\n");

    let catalog = FakeCatalog::new();
    let plan = MakeupPlanner::new(&fs, CallerIds::current())
        .plan(stage, Some(&catalog as &dyn CatalogService), "tester")
        .await
        .unwrap();
    assert!(plan.is_empty());
    assert_eq!(plan.work, MakeupWork::Nothing);
    assert!(catalog.created().is_empty());
}

#[test]
fn test_process_list_must_match_outstanding_count() {
    let good = vec![
        "/o/1000_0/a.root".to_string(),
        "/o/1000_1/b.root".to_string(),
    ];
    assert_eq!(missing_process_indices(4, &good, 2).unwrap(), vec![2, 3]);
    assert!(matches!(
        missing_process_indices(4, &good, 3),
        Err(GridstageError::Consistency(_))
    ));
}

#[test]
fn test_job_count_is_bounded_by_configuration() {
    assert_eq!(makeup_job_count(0, 10), 0);
    assert_eq!(makeup_job_count(3, 10), 3);
    assert_eq!(makeup_job_count(30, 10), 10);
}
