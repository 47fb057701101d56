// tests/actions_dispatch.rs

mod common;
use crate::common::{FakeBackend, FakeCatalog, WorkerTree, init_tracing, mock_context};

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use tempfile::TempDir;

use gridstage::actions::{ActionName, ActionRequest, ActionSet, Modifiers, dispatch};
use gridstage::cli::CliArgs;
use gridstage::config::load_and_validate;
use gridstage::errors::GridstageError;
use gridstage::fs::FileSystem;
use gridstage::fs::mock::MockFileSystem;
use gridstage::layout::CallerIds;
use gridstage::project::{ProjectModel, PubsSpec};
use gridstage::submit::SubmissionLock;

/// Two chained stages under `/grid/dt`; markers go to a real temp dir.
fn write_config(dir: &TempDir, gen_jobs: u32, reco_input: &str) -> PathBuf {
    let path = dir.path().join("project.toml");
    let text = format!(
        r#"
[config]
lock_dir = "{lock}"

[[project]]
name = "dt"
version = "v1"

[[project.stage]]
name = "gen"
fcl = ["gen.fcl"]
num_jobs = {gen_jobs}
outdir = "/grid/dt/out/gen"
logdir = "/grid/dt/log/gen"
workdir = "/grid/dt/work/gen"

[[project.stage]]
name = "reco"
fcl = ["reco.fcl"]
{reco_input}
outdir = "/grid/dt/out/reco"
logdir = "/grid/dt/log/reco"
workdir = "/grid/dt/work/reco"
"#,
        lock = dir.path().display(),
    );
    std::fs::write(&path, text).unwrap();
    path
}

fn request(config: &Path, stage: &str, actions: &[ActionName], modifiers: Modifiers) -> ActionRequest {
    ActionRequest {
        config_path: config.to_path_buf(),
        project: None,
        stages: vec![stage.to_string()],
        actions: ActionSet::new(actions.iter().copied()).unwrap(),
        modifiers,
    }
}

fn load(config: &Path) -> ProjectModel {
    ProjectModel::from_config(&load_and_validate(config).unwrap()).unwrap()
}

#[test]
fn test_only_one_primary_action() {
    let set = ActionSet::new([ActionName::Outdir, ActionName::Check, ActionName::DumpStage]).unwrap();
    assert_eq!(set.primary(), Some(ActionName::Check));
    // Declaration order, not argument order.
    assert_eq!(
        set.iter().collect::<Vec<_>>(),
        vec![ActionName::DumpStage, ActionName::Outdir, ActionName::Check]
    );

    match ActionSet::new([ActionName::Submit, ActionName::Check]) {
        Err(GridstageError::Usage(msg)) => {
            assert!(msg.contains("submit"));
            assert!(msg.contains("check"));
        }
        other => panic!("expected Usage, got {other:?}"),
    }
}

#[test]
fn test_action_names_parse_both_spellings() {
    assert_eq!(
        ActionName::from_str("--check_declarations").unwrap(),
        ActionName::CheckDeclarations
    );
    assert_eq!(
        ActionName::from_str("check-declarations-ana").unwrap(),
        ActionName::CheckDeclarationsAna
    );
    assert!(matches!(
        ActionName::from_str("launch"),
        Err(GridstageError::Usage(_))
    ));
    for action in ActionName::ALL {
        assert_eq!(ActionName::from_str(action.name()).unwrap(), *action);
    }
}

#[test]
fn test_cli_builds_request() {
    let args = CliArgs::try_parse_from([
        "gridstage",
        "--xml",
        "campaign.toml",
        "--stage",
        "gen,reco",
        "--submit",
        "--dryrun",
        "--memory",
        "4000",
        "--pubs",
        "12",
        "1-3",
    ])
    .unwrap();
    let request = args.to_request().unwrap();

    assert_eq!(request.config_path, PathBuf::from("campaign.toml"));
    assert_eq!(request.stages, vec!["gen", "reco"]);
    assert_eq!(request.actions.primary(), Some(ActionName::Submit));
    assert!(request.modifiers.dryrun);
    assert_eq!(request.modifiers.overrides.memory, Some(4000));
    assert_eq!(
        request.modifiers.pubs,
        Some(PubsSpec {
            run: 12,
            subruns: vec![1, 2, 3],
            version: None,
        })
    );
}

#[test]
fn test_cli_rejects_two_primaries() {
    let args = CliArgs::try_parse_from(["gridstage", "--check", "--makeup"]).unwrap();
    assert!(matches!(args.to_request(), Err(GridstageError::Usage(_))));

    let args =
        CliArgs::try_parse_from(["gridstage", "--check_declarations", "--add-locations"]).unwrap();
    let request = args.to_request().unwrap();
    assert!(request.actions.contains(ActionName::CheckDeclarations));
    assert!(request.actions.contains(ActionName::AddLocations));
    assert_eq!(request.actions.primary(), None);
}

#[tokio::test]
async fn test_dryrun_submit_touches_nothing() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, 3, "");
    let fs = MockFileSystem::new();
    let catalog = Arc::new(FakeCatalog::new());
    let backend = FakeBackend::new();
    let mut ctx = mock_context(&fs, &catalog, &backend);

    let modifiers = Modifiers {
        dryrun: true,
        ..Modifiers::default()
    };
    let errors = dispatch(&mut ctx, &request(&config, "gen", &[ActionName::Submit], modifiers))
        .await
        .unwrap();

    assert_eq!(errors, 0);
    assert!(backend.calls().is_empty());
    assert!(fs.is_dir(Path::new("/grid/dt/work/gen")));
    assert!(!fs.exists(Path::new("/grid/dt/work/gen/wrapper.fcl")));
    assert!(!fs.exists(Path::new("/grid/dt/log/gen/jobids.list")));
}

#[tokio::test]
async fn test_dryrun_submit_ignores_running_submission() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, 3, "");
    let model = load(&config);
    let (project, stage) = model.select(None, Some("gen")).unwrap();
    let marker = SubmissionLock::marker_path(dir.path(), &project.name, stage);
    std::fs::write(&marker, format!("{}\n", std::process::id())).unwrap();
    let fs = MockFileSystem::new();
    let catalog = Arc::new(FakeCatalog::new());
    let backend = FakeBackend::new();
    let mut ctx = mock_context(&fs, &catalog, &backend);

    let modifiers = Modifiers {
        dryrun: true,
        ..Modifiers::default()
    };
    let errors = dispatch(&mut ctx, &request(&config, "gen", &[ActionName::Submit], modifiers))
        .await
        .unwrap();
    assert_eq!(errors, 0);
    assert!(backend.calls().is_empty());
    assert!(marker.exists());

    // A real submit is still refused.
    let err = dispatch(
        &mut ctx,
        &request(&config, "gen", &[ActionName::Submit], Modifiers::default()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, GridstageError::SubmissionRunning { .. }));
}

#[tokio::test]
async fn test_makeup_on_unsubmitted_stage_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, 3, "");
    let fs = MockFileSystem::new();
    let catalog = Arc::new(FakeCatalog::new());
    let backend = FakeBackend::new();
    let mut ctx = mock_context(&fs, &catalog, &backend);

    let err = dispatch(
        &mut ctx,
        &request(&config, "gen", &[ActionName::Makeup], Modifiers::default()),
    )
    .await
    .unwrap_err();
    match err {
        GridstageError::Structural { path, .. } => assert_eq!(path, Path::new("/grid/dt/out/gen")),
        other => panic!("expected Structural, got {other:?}"),
    }
    for dir in ["/grid/dt/out/gen", "/grid/dt/log/gen", "/grid/dt/work/gen"] {
        assert!(!fs.exists(Path::new(dir)), "{dir} should not be created");
    }
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_submit_records_job_id_and_clears_checked() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, 3, "");
    let fs = MockFileSystem::new();
    fs.add_dir("/grid/dt/out/gen");
    fs.add_dir("/grid/dt/log/gen");
    let catalog = Arc::new(FakeCatalog::new());
    let backend = FakeBackend::new();
    backend.respond_job_id("jobsub_submit_dag", "555.0@jobsub02");
    let mut ctx = mock_context(&fs, &catalog, &backend);

    let errors = dispatch(
        &mut ctx,
        &request(&config, "gen", &[ActionName::Submit], Modifiers::default()),
    )
    .await
    .unwrap();

    assert_eq!(errors, 0);
    let calls = backend.calls_to("jobsub_submit_dag");
    assert_eq!(calls.len(), 1);
    assert!(calls[0].has_arg("file:///grid/dt/work/gen/submit.dag"));
    assert!(fs.exists(Path::new("/grid/dt/work/gen/submit.dag")));
    assert!(fs.exists(Path::new("/grid/dt/work/gen/wrapper.fcl")));
    assert_eq!(
        fs.read_to_string(Path::new("/grid/dt/log/gen/jobids.list")).unwrap(),
        "555.0@jobsub02\n"
    );
    assert!(!fs.exists(Path::new("/grid/dt/log/gen/checked")));
    // The marker is released afterwards.
    let markers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "lock"))
        .count();
    assert_eq!(markers, 0);
}

#[tokio::test]
async fn test_submit_refuses_non_empty_stage() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, 1, "");
    let model = load(&config);
    let (_, stage) = model.select(None, Some("gen")).unwrap();
    let fs = MockFileSystem::new();
    WorkerTree::new(&fs, &stage.layout).good(0, 1);
    let catalog = Arc::new(FakeCatalog::new());
    let backend = FakeBackend::new();
    let mut ctx = mock_context(&fs, &catalog, &backend);

    let err = dispatch(
        &mut ctx,
        &request(&config, "gen", &[ActionName::Submit], Modifiers::default()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, GridstageError::Structural { .. }));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_check_errors_are_summed_over_stages() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, 2, "generator = true\nnum_jobs = 1");
    let model = load(&config);
    let fs = MockFileSystem::new();
    for (name, failed) in [("gen", true), ("reco", false)] {
        let (_, stage) = model.select(None, Some(name)).unwrap();
        let tree = WorkerTree::new(&fs, &stage.layout);
        tree.good(0, 3);
        if failed {
            tree.failed(1, 9);
        }
    }
    let catalog = Arc::new(FakeCatalog::new());
    let backend = FakeBackend::new();
    let mut ctx = mock_context(&fs, &catalog, &backend);

    let mut req = request(&config, "gen", &[ActionName::Check], Modifiers::default());
    req.stages.push("reco".to_string());
    let errors = dispatch(&mut ctx, &req).await.unwrap();

    assert_eq!(errors, 1);
    assert!(fs.exists(Path::new("/grid/dt/log/gen/checked")));
    assert!(fs.exists(Path::new("/grid/dt/log/reco/checked")));
}

#[tokio::test]
async fn test_clean_follows_dependent_stages() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, 1, "");
    let model = load(&config);
    let fs = MockFileSystem::new();
    for name in ["gen", "reco"] {
        let (_, stage) = model.select(None, Some(name)).unwrap();
        WorkerTree::new(&fs, &stage.layout).good(0, 1);
    }
    let catalog = Arc::new(FakeCatalog::new());
    let backend = FakeBackend::new();

    let mut ctx = mock_context(&fs, &catalog, &backend);
    dispatch(
        &mut ctx,
        &request(&config, "gen", &[ActionName::CleanOne], Modifiers::default()),
    )
    .await
    .unwrap();
    assert!(!fs.exists(Path::new("/grid/dt/out/gen")));
    assert!(fs.exists(Path::new("/grid/dt/out/reco")));

    let (_, gen_stage) = model.select(None, Some("gen")).unwrap();
    WorkerTree::new(&fs, &gen_stage.layout).good(0, 1);
    dispatch(
        &mut ctx,
        &request(&config, "gen", &[ActionName::Clean], Modifiers::default()),
    )
    .await
    .unwrap();
    for dir in ["/grid/dt/out/gen", "/grid/dt/log/reco", "/grid/dt/work/reco"] {
        assert!(!fs.exists(Path::new(dir)), "{dir} should be gone");
    }
}

#[tokio::test]
async fn test_clean_refuses_foreign_directories() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, 1, "");
    let fs = MockFileSystem::new();
    fs.add_dir("/grid/dt/out/gen");
    fs.set_owner("/grid/dt/out/gen", 2000);
    let catalog = Arc::new(FakeCatalog::new());
    let backend = FakeBackend::new();
    let mut ctx = mock_context(&fs, &catalog, &backend).with_caller(CallerIds {
        uid: 1000,
        euid: 1000,
    });

    match dispatch(
        &mut ctx,
        &request(&config, "gen", &[ActionName::CleanOne], Modifiers::default()),
    )
    .await
    {
        Err(GridstageError::Ownership { owner, uid, .. }) => {
            assert_eq!(owner, 2000);
            assert_eq!(uid, 1000);
        }
        other => panic!("expected Ownership, got {other:?}"),
    }
    assert!(fs.exists(Path::new("/grid/dt/out/gen")));
}

#[tokio::test]
async fn test_pubs_mode_creates_run_definition() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, 1, "input_def = \"in_def\"");
    let fs = MockFileSystem::new();
    let catalog = Arc::new(FakeCatalog::new());
    let backend = FakeBackend::new();
    let mut ctx = mock_context(&fs, &catalog, &backend);

    let modifiers = Modifiers {
        pubs: Some(PubsSpec {
            run: 12,
            subruns: vec![1, 2, 3],
            version: Some(2),
        }),
        ..Modifiers::default()
    };
    dispatch(&mut ctx, &request(&config, "reco", &[ActionName::Outdir], modifiers))
        .await
        .unwrap();

    assert_eq!(
        catalog.definition("in_def_run12_1-3").as_deref(),
        Some("defname: in_def and run_number 12.1,12.2,12.3")
    );
}

#[tokio::test]
async fn test_unknown_stage_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, 1, "");
    let fs = MockFileSystem::new();
    let catalog = Arc::new(FakeCatalog::new());
    let backend = FakeBackend::new();
    let mut ctx = mock_context(&fs, &catalog, &backend);

    assert!(matches!(
        dispatch(
            &mut ctx,
            &request(&config, "mix", &[ActionName::Status], Modifiers::default()),
        )
        .await,
        Err(GridstageError::StageNotFound(_))
    ));
}

#[test]
fn test_log_level_resolution() {
    use gridstage::cli::LogLevel;
    use gridstage::logging::resolve_level;
    use tracing::Level;

    assert_eq!(resolve_level(Some(LogLevel::Debug), Some("error")), Level::DEBUG);
    assert_eq!(resolve_level(None, Some(" Warning ")), Level::WARN);
    assert_eq!(resolve_level(None, Some("loud")), Level::INFO);
    assert_eq!(resolve_level(None, None), Level::INFO);
}

#[test]
fn test_missing_project_file_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        load_and_validate(dir.path().join("absent.toml")),
        Err(GridstageError::ConfigError(_))
    ));
}

#[test]
fn test_project_cache_reuses_and_invalidates() {
    use gridstage::actions::ProjectCache;

    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, 2, "");
    let mut cache = ProjectCache::new();

    let first = cache.get_or_load(&config).unwrap();
    assert!(cache.contains(&config));
    let again = cache.get_or_load(&config).unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    // Edits are picked up only after invalidation.
    std::fs::write(&config, std::fs::read_to_string(&config).unwrap().replace("num_jobs = 2", "num_jobs = 7")).unwrap();
    assert_eq!(cache.get_or_load(&config).unwrap().select(None, Some("gen")).unwrap().1.num_jobs, 2);
    cache.invalidate(&config);
    assert!(!cache.contains(&config));
    assert_eq!(cache.get_or_load(&config).unwrap().select(None, Some("gen")).unwrap().1.num_jobs, 7);
}
