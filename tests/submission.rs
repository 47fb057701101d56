// tests/submission.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, ProjectConfigBuilder, StageConfigBuilder};
use crate::common::{FakeBackend, ROOT, generator_model, init_tracing, model};

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

use gridstage::errors::{GridstageError, SubmissionError};
use gridstage::exec::{CommandLine, ProcessBackend};
use gridstage::fs::FileSystem;
use gridstage::fs::mock::MockFileSystem;
use gridstage::makeup::{MakeupPlan, MakeupWork};
use gridstage::project::{PubsSpec, StageInput};
use gridstage::submit::{
    DagPlan, SubmissionBuilder, SubmissionDriver, SubmissionLock, SubmissionOptions,
    SubmissionShape, TimeoutPolicy, decide_shape, parse_job_id, render_wrapper,
};

const POLICY: TimeoutPolicy = TimeoutPolicy {
    base_secs: 3600,
    per_job_secs: 1,
    min_secs: 600,
};

fn has_pair(cmd: &CommandLine, name: &str, value: &str) -> bool {
    cmd.arguments()
        .windows(2)
        .any(|w| w[0] == name && w[1] == value)
}

#[test]
fn test_shape_selection() {
    let generator = StageInput::Generator;
    let dataset = StageInput::Dataset("d".into());
    assert_eq!(decide_shape(&generator, 1, false), SubmissionShape::Single);
    assert_eq!(decide_shape(&generator, 2, false), SubmissionShape::Dag);
    assert_eq!(decide_shape(&generator, 1, true), SubmissionShape::Dag);
    assert_eq!(decide_shape(&dataset, 1, false), SubmissionShape::Dag);
}

#[test]
fn test_single_generator_job_is_submitted_directly() {
    let model = generator_model(1);
    let (project, stage) = model.select(None, None).unwrap();
    let fs = MockFileSystem::new();

    let request = SubmissionBuilder::new(&fs, project, stage)
        .build(&SubmissionOptions::default())
        .unwrap();

    assert_eq!(request.shape, SubmissionShape::Single);
    assert!(request.dag.is_none());
    assert!(request.session.is_none());
    let cmd = &request.command;
    assert_eq!(cmd.program(), "jobsub_submit");
    assert!(cmd.has_arg("--group=uboone"));
    assert!(cmd.has_arg("--role=Analysis"));
    assert!(has_pair(cmd, "-N", "1"));
    assert!(has_pair(cmd, "--njobs", "1"));
    assert!(has_pair(cmd, "-f", "/grid/dt/work/gen/wrapper.fcl"));
    assert!(has_pair(cmd, "-c", "wrapper.fcl"));
    assert!(cmd.has_arg("file://condor_lar.sh"));
    assert_eq!(request.staged.len(), 1);
}

#[test]
fn test_multi_job_generator_renders_worker_only_dag() {
    let model = generator_model(3);
    let (project, stage) = model.select(None, None).unwrap();
    let fs = MockFileSystem::new();

    let request = SubmissionBuilder::new(&fs, project, stage)
        .build(&SubmissionOptions::default())
        .unwrap();

    assert_eq!(request.shape, SubmissionShape::Dag);
    assert_eq!(request.command.program(), "jobsub_submit_dag");
    assert!(request.command.has_arg("file:///grid/dt/work/gen/submit.dag"));

    let dag = request.dag.as_ref().unwrap();
    assert!(dag.start.is_empty());
    assert!(dag.stop.is_empty());
    assert_eq!(dag.processes, vec![0, 1, 2]);

    let text = request.dag_text().unwrap();
    assert!(text.starts_with("<serial>\n\n<parallel>\n\njobsub -n "));
    assert!(text.ends_with("</parallel>\n\n</serial>\n"));
    assert_eq!(text.matches("<parallel>").count(), 1);
    assert_eq!(text.matches("--process ").count(), 3);
    assert!(!text.contains("--role="));
    assert!(!text.contains(" -N "));
    // The DAG file itself is staged.
    assert!(
        request
            .staged
            .iter()
            .any(|f| f.path.ends_with("submit.dag") && f.contents == text)
    );
}

#[test]
fn test_pubs_generator_dag_numbers_replicas_from_zero() {
    let model = generator_model(1);
    let (project, stage) = model.select(None, None).unwrap();
    let mut stage = stage.clone();
    stage.pubsify(&PubsSpec {
        run: 5,
        subruns: vec![3, 4, 5],
        version: None,
    });
    assert_eq!(stage.pubs_process_offset(), Some(2));
    let fs = MockFileSystem::new();

    let request = SubmissionBuilder::new(&fs, project, &stage)
        .build(&SubmissionOptions::default())
        .unwrap();

    assert_eq!(request.shape, SubmissionShape::Dag);
    let dag = request.dag.as_ref().unwrap();
    assert_eq!(dag.processes, vec![0, 1, 2]);
    let text = request.dag_text().unwrap();
    assert!(text.contains("--process 0\n"));
    assert!(!text.contains("--process 3"));
    assert!(!text.contains("--process 4"));
}

#[test]
fn test_worker_node_drops_per_submission_flags() {
    let mut worker = CommandLine::new("jobsub_submit");
    worker
        .opt_eq("--group", "uboone")
        .opt_eq("--role", "Production")
        .opt_eq("--jobsub-server", "https://js")
        .opt("-N", 3)
        .arg("file://condor_lar.sh")
        .arg("$HOME/x");
    let dag = DagPlan {
        start: Vec::new(),
        worker,
        processes: vec![4],
        stop: Vec::new(),
    };

    let node = dag.worker_node(4);
    assert_eq!(node.program(), "jobsub");
    assert_eq!(
        node.arguments(),
        ["--group=uboone", "file://condor_lar.sh", "$HOME/x", "--process", "4"]
    );
    assert!(dag.render().contains(r"\$HOME/x"));
}

#[test]
fn test_dataset_input_gets_start_and_stop_sessions() {
    let cfg = ConfigFileBuilder::new()
        .with_project(
            ProjectConfigBuilder::new("dt")
                .server("https://js.example")
                .stage(
                    StageConfigBuilder::new("reco", ROOT)
                        .input_def("in_def")
                        .num_jobs(2)
                        .max_files_per_job(5)
                        .build(),
                )
                .build(),
        )
        .build();
    let model = model(&cfg);
    let (project, stage) = model.select(None, None).unwrap();
    let fs = MockFileSystem::new();
    let builder = SubmissionBuilder::new(&fs, project, stage);

    let opts = SubmissionOptions {
        sam_project: Some("tester_in_def_1".into()),
        ..SubmissionOptions::default()
    };
    let request = builder.build(&opts).unwrap();
    let dag = request.dag.as_ref().unwrap();
    assert_eq!(dag.start.len(), 1);
    assert_eq!(dag.stop.len(), 1);
    assert!(has_pair(&dag.start[0], "--sam_defname", "in_def"));
    assert!(has_pair(&dag.start[0], "--max_files", "10"));
    assert!(has_pair(&dag.stop[0], "--sam_project", "tester_in_def_1"));
    assert!(has_pair(&dag.worker, "--sam_project", "tester_in_def_1"));
    assert!(!dag.worker.has_arg("--njobs"));
    assert!(request.command.has_arg("--jobsub-server=https://js.example"));

    let text = request.dag_text().unwrap();
    assert_eq!(text.matches("<parallel>").count(), 3);

    // A prestarted session is not started again.
    let opts = SubmissionOptions {
        prestarted: true,
        ..opts
    };
    let request = builder.build(&opts).unwrap();
    assert!(request.dag.unwrap().start.is_empty());
}

#[test]
fn test_makeup_process_map_is_staged() {
    let model = generator_model(4);
    let (project, stage) = model.select(None, None).unwrap();
    let fs = MockFileSystem::new();
    let plan = MakeupPlan {
        outstanding: 2,
        job_count: 2,
        work: MakeupWork::ProcessMap {
            processes: vec![1, 3],
        },
    };
    let opts = SubmissionOptions {
        makeup: Some(&plan),
        ..SubmissionOptions::default()
    };

    let request = SubmissionBuilder::new(&fs, project, stage).build(&opts).unwrap();
    assert_eq!(request.job_count, 2);
    let procmap = request
        .staged
        .iter()
        .find(|f| f.path.ends_with("procmap.txt"))
        .unwrap();
    assert_eq!(procmap.contents, "1\n3\n");
    assert!(has_pair(&request.dag.unwrap().worker, "--procmap", "procmap.txt"));
}

#[test]
fn test_input_list_is_copied_into_workdir() {
    let cfg = ConfigFileBuilder::new()
        .with_project(
            ProjectConfigBuilder::new("dt")
                .stage(
                    StageConfigBuilder::new("reco", ROOT)
                        .input_list("/grid/dt/in.list")
                        .build(),
                )
                .build(),
        )
        .build();
    let model = model(&cfg);
    let (project, stage) = model.select(None, None).unwrap();
    let fs = MockFileSystem::new();
    fs.add_file("/grid/dt/in.list", "/data/a.root\n");

    let request = SubmissionBuilder::new(&fs, project, stage)
        .build(&SubmissionOptions::default())
        .unwrap();
    assert!(has_pair(&request.command, "-S", "in.list"));

    request.stage_files(&fs).unwrap();
    assert_eq!(
        fs.read_to_string(Path::new("/grid/dt/work/reco/in.list")).unwrap(),
        "/data/a.root\n"
    );
    assert!(fs.exists(Path::new("/grid/dt/work/reco/wrapper.fcl")));
}

#[test]
fn test_wrapper_layers_are_written_in_order() {
    let cfg = ConfigFileBuilder::new()
        .with_project(
            ProjectConfigBuilder::new("dt")
                .file_type("mc")
                .release_tag("v08_00_00")
                .metadata("services.Extra.key", "\"x\"")
                .stage(
                    StageConfigBuilder::new("gen", ROOT)
                        .fcl(&["/fcl/prodgenie.fcl", "g4.fcl"])
                        .output_run(7)
                        .max_flux_file_mb(200)
                        .build(),
                )
                .build(),
        )
        .build();
    let model = model(&cfg);
    let (project, stage) = model.select(None, None).unwrap();

    let text = render_wrapper(project, stage);
    let sections: Vec<&str> = text.split("#---END_STAGE\n").filter(|s| !s.is_empty()).collect();
    assert_eq!(sections.len(), 2);

    let first = sections[0];
    assert!(first.starts_with("#---STAGE 0\n#include \"prodgenie.fcl\"\n\n"));
    let pos = |needle: &str| first.find(needle).unwrap();
    assert!(pos("applicationVersion: \"v08_00_00\"") < pos("FCLName: \"prodgenie.fcl\""));
    assert!(pos("FCLName") < pos("services.Extra.key: \"x\""));
    assert!(pos("services.Extra.key") < pos("source.firstRun: 7"));
    assert!(pos("source.firstRun") < pos("MaxFluxFileMB: 200"));

    // Flux settings only go into the first section.
    assert!(sections[1].starts_with("#---STAGE 1\n#include \"g4.fcl\"\n"));
    assert!(!sections[1].contains("MaxFluxFileMB"));
    assert!(sections[1].contains("source.firstRun: 7"));
}

#[test]
fn test_timeout_policy() {
    assert_eq!(POLICY.timeout(100, None), Duration::from_secs(3700));
    assert_eq!(POLICY.timeout(100, Some(7200)), Duration::from_secs(7200));
    assert_eq!(POLICY.timeout(100, Some(10)), Duration::from_secs(3700));
    let short = TimeoutPolicy {
        base_secs: 0,
        per_job_secs: 0,
        min_secs: 600,
    };
    assert_eq!(short.timeout(5, None), Duration::from_secs(600));
}

#[test]
fn test_job_id_comes_from_last_matching_line() {
    let out = "Submitting....\nJobsubJobId of first job: 1.0@a\nJobsubJobId of first job: 2.0@b\n";
    assert_eq!(parse_job_id(out).as_deref(), Some("2.0@b"));
    assert_eq!(parse_job_id("nothing here\n"), None);
}

#[tokio::test]
async fn test_driver_maps_backend_outcomes() {
    init_tracing();
    let backend = FakeBackend::new();
    backend
        .respond_job_id("jobsub_submit", "123.0@jobsub01")
        .respond_err("jobsub_submit", 2, "denied")
        .respond_timeout("jobsub_submit")
        .respond_ok("jobsub_submit", "no id\n");
    let driver = SubmissionDriver::new(&backend, POLICY);
    let cmd = CommandLine::new("jobsub_submit");

    let id = driver.submit(cmd.clone(), 10, None).await.unwrap();
    assert_eq!(id, "123.0@jobsub01");
    assert_eq!(backend.timeouts_for("jobsub_submit"), vec![Duration::from_secs(3610)]);

    match driver.submit(cmd.clone(), 1, None).await {
        Err(GridstageError::Submission(SubmissionError::Failed { exit_code, stderr, .. })) => {
            assert_eq!(exit_code, 2);
            assert_eq!(stderr, "denied");
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert!(matches!(
        driver.submit(cmd.clone(), 1, None).await,
        Err(GridstageError::Submission(SubmissionError::TimedOut { .. }))
    ));
    assert!(matches!(
        driver.submit(cmd, 1, None).await,
        Err(GridstageError::Submission(SubmissionError::MissingJobId { .. }))
    ));
}

#[tokio::test]
async fn test_process_backend_kills_on_deadline() {
    let backend = ProcessBackend;
    let mut cmd = CommandLine::new("sleep");
    cmd.arg("5");
    let out = gridstage::exec::CommandBackend::invoke(&backend, cmd, Duration::from_millis(200))
        .await
        .unwrap();
    assert!(out.timed_out);
    assert!(!out.success());
}

#[tokio::test]
async fn test_process_backend_kills_forked_descendants() {
    let backend = ProcessBackend;
    let mut cmd = CommandLine::new("sh");
    cmd.arg("-c").arg("echo started; sleep 30 & sleep 30");
    let began = std::time::Instant::now();
    let out = gridstage::exec::CommandBackend::invoke(&backend, cmd, Duration::from_millis(300))
        .await
        .unwrap();
    assert!(out.timed_out);
    assert!(began.elapsed() < Duration::from_secs(5));
    assert_eq!(out.stdout, "started\n");
}

#[tokio::test]
async fn test_driver_with_real_process() {
    let backend = ProcessBackend;
    let policy = TimeoutPolicy {
        base_secs: 10,
        per_job_secs: 0,
        min_secs: 1,
    };
    let mut cmd = CommandLine::new("echo");
    cmd.arg("JobsubJobId of first job: 77.0@local");
    let id = SubmissionDriver::new(&backend, policy)
        .submit(cmd, 1, None)
        .await
        .unwrap();
    assert_eq!(id, "77.0@local");
}

#[test]
fn test_submission_lock_excludes_concurrent_submits() {
    let dir = TempDir::new().unwrap();
    let model = generator_model(1);
    let (project, stage) = model.select(None, None).unwrap();

    let lock = SubmissionLock::acquire(dir.path(), &project.name, stage).unwrap();
    assert!(lock.path().exists());

    match SubmissionLock::acquire(dir.path(), &project.name, stage) {
        Err(GridstageError::SubmissionRunning { stage: name, marker }) => {
            assert_eq!(name, "gen");
            assert_eq!(marker, lock.path());
        }
        other => panic!("expected SubmissionRunning, got {other:?}"),
    }

    let marker = lock.path().to_path_buf();
    drop(lock);
    assert!(!marker.exists());
    assert!(SubmissionLock::acquire(dir.path(), &project.name, stage).is_ok());
}

#[test]
fn test_stale_submission_marker_is_replaced() {
    let dir = TempDir::new().unwrap();
    let model = generator_model(1);
    let (project, stage) = model.select(None, None).unwrap();
    let marker = SubmissionLock::marker_path(dir.path(), &project.name, stage);
    std::fs::write(&marker, "0\n").unwrap();

    let lock = SubmissionLock::acquire(dir.path(), &project.name, stage).unwrap();
    let pid: u32 = std::fs::read_to_string(lock.path()).unwrap().trim().parse().unwrap();
    assert_eq!(pid, std::process::id());
}

#[test]
fn test_empty_submission_marker_counts_as_held() {
    let dir = TempDir::new().unwrap();
    let model = generator_model(1);
    let (project, stage) = model.select(None, None).unwrap();
    let marker = SubmissionLock::marker_path(dir.path(), &project.name, stage);
    std::fs::write(&marker, "").unwrap();

    assert!(matches!(
        SubmissionLock::acquire(dir.path(), &project.name, stage),
        Err(GridstageError::SubmissionRunning { .. })
    ));
    assert_eq!(std::fs::read_to_string(&marker).unwrap(), "");
}

#[test]
fn test_marker_of_other_users_process_is_respected() {
    let dir = TempDir::new().unwrap();
    let model = generator_model(1);
    let (project, stage) = model.select(None, None).unwrap();
    let marker = SubmissionLock::marker_path(dir.path(), &project.name, stage);
    // init always exists; unprivileged callers get EPERM signalling it.
    std::fs::write(&marker, "1\n").unwrap();

    assert!(matches!(
        SubmissionLock::acquire(dir.path(), &project.name, stage),
        Err(GridstageError::SubmissionRunning { .. })
    ));
    assert_eq!(std::fs::read_to_string(&marker).unwrap(), "1\n");
}

#[test]
fn test_marker_of_exited_process_is_replaced() {
    let dir = TempDir::new().unwrap();
    let model = generator_model(1);
    let (project, stage) = model.select(None, None).unwrap();
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let dead = child.id();
    child.wait().unwrap();
    let marker = SubmissionLock::marker_path(dir.path(), &project.name, stage);
    std::fs::write(&marker, format!("{dead}\n")).unwrap();

    let lock = SubmissionLock::acquire(dir.path(), &project.name, stage).unwrap();
    assert_eq!(
        std::fs::read_to_string(lock.path()).unwrap(),
        format!("{}\n", std::process::id())
    );
    drop(lock);
    assert!(!marker.exists());
    // Only the guard is left behind.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers.len(), 1);
    assert!(leftovers[0].ends_with(".lock.guard"));
}
