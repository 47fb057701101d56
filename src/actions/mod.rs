// src/actions/mod.rs

//! Action registry and dispatch.
//!
//! An invocation names a set of actions and one or more stages. At most
//! one primary action is allowed; the others are informational or
//! maintenance actions that compose freely. Actions run per stage in the
//! declaration order of [`ActionName`], and every handler returns the
//! number of errors it found.

pub mod catalog;
pub mod check;
pub mod context;
pub mod info;
pub mod maintenance;
pub mod submit;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, info};

use crate::catalog::DatasetRegistrar;
use crate::errors::{GridstageError, Result};
use crate::project::{Project, ProjectModel, PubsSpec, Stage, StageOverrides};
use crate::types::{MergeTool, OutputTier};

pub use catalog::LocationMode;
pub use context::{ActionContext, ProjectCache};

macro_rules! action_names {
    ($( $variant:ident => $name:literal, $primary:literal; )*) => {
        /// Every action the dispatcher knows, in execution order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum ActionName {
            $( $variant, )*
        }

        impl ActionName {
            pub const ALL: &'static [ActionName] = &[$( ActionName::$variant, )*];

            pub fn name(self) -> &'static str {
                match self {
                    $( ActionName::$variant => $name, )*
                }
            }

            /// Primary actions are mutually exclusive.
            pub fn is_primary(self) -> bool {
                match self {
                    $( ActionName::$variant => $primary, )*
                }
            }
        }
    };
}

action_names! {
    DumpProject => "dump_project", false;
    DumpStage => "dump_stage", false;
    Outdir => "outdir", false;
    Logdir => "logdir", false;
    Workdir => "workdir", false;
    Bookdir => "bookdir", false;
    Defname => "defname", false;
    InputFiles => "input_files", false;
    Clean => "clean", false;
    CleanOne => "clean_one", false;
    Shorten => "shorten", false;
    Submit => "submit", true;
    Makeup => "makeup", true;
    Check => "check", true;
    CheckAna => "checkana", true;
    FetchLog => "fetchlog", true;
    Merge => "merge", true;
    MergeHist => "mergehist", true;
    MergeNtuple => "mergentuple", true;
    Audit => "audit", true;
    Status => "status", true;
    Define => "define", true;
    DefineAna => "define_ana", true;
    Undefine => "undefine", true;
    Declare => "declare", true;
    DeclareAna => "declare_ana", true;
    CheckDeclarations => "check_declarations", false;
    CheckDeclarationsAna => "check_declarations_ana", false;
    TestDeclarations => "test_declarations", false;
    TestDeclarationsAna => "test_declarations_ana", false;
    CheckDefinition => "check_definition", false;
    CheckDefinitionAna => "check_definition_ana", false;
    TestDefinition => "test_definition", false;
    TestDefinitionAna => "test_definition_ana", false;
    CheckLocations => "check_locations", false;
    CheckLocationsAna => "check_locations_ana", false;
    AddLocations => "add_locations", false;
    AddLocationsAna => "add_locations_ana", false;
    CleanLocations => "clean_locations", false;
    CleanLocationsAna => "clean_locations_ana", false;
    RemoveLocations => "remove_locations", false;
    RemoveLocationsAna => "remove_locations_ana", false;
    Upload => "upload", false;
    UploadAna => "upload_ana", false;
    CheckTape => "check_tape", false;
    CheckTapeAna => "check_tape_ana", false;
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionName {
    type Err = GridstageError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().trim_start_matches("--").replace('-', "_");
        ActionName::ALL
            .iter()
            .copied()
            .find(|a| a.name() == wanted)
            .ok_or_else(|| GridstageError::Usage(format!("unknown action '{s}'")))
    }
}

/// A validated, ordered set of actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSet {
    actions: Vec<ActionName>,
}

impl ActionSet {
    /// Sort and deduplicate; reject more than one primary action.
    pub fn new(actions: impl IntoIterator<Item = ActionName>) -> Result<Self> {
        let mut actions: Vec<ActionName> = actions.into_iter().collect();
        actions.sort();
        actions.dedup();
        let primaries: Vec<&str> = actions
            .iter()
            .filter(|a| a.is_primary())
            .map(|a| a.name())
            .collect();
        if primaries.len() > 1 {
            return Err(GridstageError::Usage(format!(
                "only one primary action may be given, found: {}",
                primaries.join(", ")
            )));
        }
        Ok(Self { actions })
    }

    pub fn iter(&self) -> impl Iterator<Item = ActionName> + '_ {
        self.actions.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn contains(&self, action: ActionName) -> bool {
        self.actions.contains(&action)
    }

    pub fn primary(&self) -> Option<ActionName> {
        self.actions.iter().copied().find(|a| a.is_primary())
    }
}

/// Modifiers that shape how actions run.
#[derive(Debug, Clone, Default)]
pub struct Modifiers {
    pub recur: bool,
    pub dryrun: bool,
    pub pubs: Option<PubsSpec>,
    pub overrides: StageOverrides,
}

/// One invocation of the dispatcher.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub config_path: PathBuf,
    pub project: Option<String>,
    /// Stages to act on, in order. Empty means the last stage.
    pub stages: Vec<String>,
    pub actions: ActionSet,
    pub modifiers: Modifiers,
}

/// The (project, stage) pair a handler operates on.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub model: &'a ProjectModel,
    pub project: &'a Project,
    pub stage: &'a Stage,
}

/// Resolve the request and run every action on every selected stage.
/// Returns the total error count.
pub async fn dispatch(ctx: &mut ActionContext, request: &ActionRequest) -> Result<usize> {
    let model = ctx.model(&request.config_path)?;
    let ctx = &*ctx;
    let project = model.project(request.project.as_deref())?;

    let stage_names: Vec<String> = if request.stages.is_empty() {
        let (_, last) = model.select(Some(&project.name), None)?;
        vec![last.name.clone()]
    } else {
        request.stages.clone()
    };

    let mut errors = 0;
    for name in &stage_names {
        let (_, configured) = model.select(Some(&project.name), Some(name))?;
        let stage = prepare_stage(ctx, configured, &request.modifiers).await?;
        let target = Target {
            model: &model,
            project,
            stage: &stage,
        };
        debug!(project = %project.name, stage = %stage.name, "dispatching actions");
        for action in request.actions.iter() {
            let found = run_action(ctx, target, action, &request.modifiers).await?;
            if found > 0 {
                info!(action = %action, stage = %stage.name, errors = found, "action reported errors");
            }
            errors += found;
        }
    }
    Ok(errors)
}

/// Copy of a configured stage with command-line overrides and pubs mode
/// applied.
async fn prepare_stage(ctx: &ActionContext, configured: &Stage, mods: &Modifiers) -> Result<Stage> {
    let mut stage = configured.clone();
    mods.overrides.apply(&mut stage);
    if mods.recur {
        stage.recursion.enabled = true;
    }
    if let Some(spec) = &mods.pubs {
        if let Some(def) = stage.pubsify(spec) {
            DatasetRegistrar::new(ctx.catalog.as_ref())
                .ensure_definition(&def.name, &def.dimension)
                .await?;
        }
    }
    Ok(stage)
}

async fn run_action(
    ctx: &ActionContext,
    t: Target<'_>,
    action: ActionName,
    mods: &Modifiers,
) -> Result<usize> {
    use ActionName::*;
    use OutputTier::{Analysis, Primary};

    match action {
        DumpProject => info::dump_project(t),
        DumpStage => info::dump_stage(t),
        Outdir => info::print_dir(&t.stage.layout.outdir),
        Logdir => info::print_dir(&t.stage.layout.logdir),
        Workdir => info::print_dir(&t.stage.layout.workdir),
        Bookdir => info::print_dir(&t.stage.layout.bookdir),
        Defname => info::print_defname(t),
        InputFiles => info::input_files(ctx, t).await,
        Clean => maintenance::clean(ctx, t, true),
        CleanOne => maintenance::clean(ctx, t, false),
        Shorten => check::shorten(ctx, t).await,
        Submit => submit::submit(ctx, t, mods, false).await,
        Makeup => submit::submit(ctx, t, mods, true).await,
        Check => check::check(ctx, t, Primary).await,
        CheckAna => check::check(ctx, t, Analysis).await,
        FetchLog => maintenance::fetchlog(ctx, t).await,
        Merge => maintenance::merge(ctx, t, MergeTool::Custom).await,
        MergeHist => maintenance::merge(ctx, t, MergeTool::Histograms).await,
        MergeNtuple => maintenance::merge(ctx, t, MergeTool::Ntuples).await,
        Audit => catalog::audit(ctx, t).await,
        Status => check::status(ctx, t),
        Define => catalog::check_definition(ctx, t, Primary, true).await,
        DefineAna => catalog::check_definition(ctx, t, Analysis, true).await,
        Undefine => catalog::undefine(ctx, t).await,
        Declare => catalog::declarations(ctx, t, Primary, true).await,
        DeclareAna => catalog::declarations(ctx, t, Analysis, true).await,
        CheckDeclarations => catalog::declarations(ctx, t, Primary, false).await,
        CheckDeclarationsAna => catalog::declarations(ctx, t, Analysis, false).await,
        TestDeclarations => catalog::test_declarations(ctx, t, Primary).await,
        TestDeclarationsAna => catalog::test_declarations(ctx, t, Analysis).await,
        CheckDefinition => catalog::check_definition(ctx, t, Primary, false).await,
        CheckDefinitionAna => catalog::check_definition(ctx, t, Analysis, false).await,
        TestDefinition => catalog::test_definition(ctx, t, Primary).await,
        TestDefinitionAna => catalog::test_definition(ctx, t, Analysis).await,
        CheckLocations => catalog::locations(ctx, t, Primary, LocationMode::Check).await,
        CheckLocationsAna => catalog::locations(ctx, t, Analysis, LocationMode::Check).await,
        AddLocations => catalog::locations(ctx, t, Primary, LocationMode::Add).await,
        AddLocationsAna => catalog::locations(ctx, t, Analysis, LocationMode::Add).await,
        CleanLocations => catalog::locations(ctx, t, Primary, LocationMode::Clean).await,
        CleanLocationsAna => catalog::locations(ctx, t, Analysis, LocationMode::Clean).await,
        RemoveLocations => catalog::locations(ctx, t, Primary, LocationMode::Remove).await,
        RemoveLocationsAna => catalog::locations(ctx, t, Analysis, LocationMode::Remove).await,
        Upload => catalog::locations(ctx, t, Primary, LocationMode::Upload).await,
        UploadAna => catalog::locations(ctx, t, Analysis, LocationMode::Upload).await,
        CheckTape => catalog::check_tape(ctx, t, Primary).await,
        CheckTapeAna => catalog::check_tape(ctx, t, Analysis).await,
    }
}
