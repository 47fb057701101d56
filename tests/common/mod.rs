#![allow(dead_code)]

use std::sync::Arc;

use gridstage::actions::{ActionContext, Target};
use gridstage::config::ConfigFile;
use gridstage::fs::mock::MockFileSystem;
use gridstage::layout::CallerIds;
use gridstage::project::ProjectModel;

pub use gridstage_test_utils::builders;
pub use gridstage_test_utils::{FakeBackend, FakeCatalog, WorkerTree, init_tracing, lines};

/// Root of every virtual campaign tree.
pub const ROOT: &str = "/grid/dt";

pub fn model(cfg: &ConfigFile) -> ProjectModel {
    ProjectModel::from_config(cfg).expect("config should resolve")
}

/// One-project model with a single generator stage `gen`.
pub fn generator_model(num_jobs: u32) -> ProjectModel {
    use builders::{ConfigFileBuilder, ProjectConfigBuilder, StageConfigBuilder};
    model(
        &ConfigFileBuilder::new()
            .with_project(
                ProjectConfigBuilder::new("dt")
                    .stage(StageConfigBuilder::new("gen", ROOT).num_jobs(num_jobs).build())
                    .build(),
            )
            .build(),
    )
}

pub fn target<'a>(model: &'a ProjectModel, stage: &str) -> Target<'a> {
    let (project, stage) = model
        .select(None, Some(stage))
        .expect("stage should exist");
    Target {
        model,
        project,
        stage,
    }
}

/// Context over in-memory collaborators; the fakes share state with the
/// handles passed in.
pub fn mock_context(
    fs: &MockFileSystem,
    catalog: &Arc<FakeCatalog>,
    backend: &FakeBackend,
) -> ActionContext {
    ActionContext::new(
        Arc::new(fs.clone()),
        catalog.clone(),
        Arc::new(backend.clone()),
    )
    .with_caller(CallerIds::current())
    .with_user("tester")
}
