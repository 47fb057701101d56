// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum};

use crate::actions::{ActionName, ActionRequest, ActionSet, Modifiers};
use crate::config::default_config_path;
use crate::errors::Result;
use crate::project::{PubsSpec, StageOverrides};

/// Command-line arguments for `gridstage`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "gridstage",
    version,
    about = "Submit, check and catalog multi-stage grid simulation campaigns.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the project file (TOML).
    ///
    /// Default: `$GRIDSTAGE_CONFIG`, else `Gridstage.toml`.
    #[arg(long, alias = "xml", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Project name. Default: the first project.
    #[arg(long, value_name = "NAME")]
    pub project: Option<String>,

    /// Stage name(s), comma separated. Default: the last stage.
    #[arg(long, value_name = "NAME[,NAME...]", value_delimiter = ',')]
    pub stage: Vec<String>,

    /// Override the stage's resource lines.
    #[arg(long, value_name = "LINES")]
    pub lines: Option<String>,

    /// Override the stage's site.
    #[arg(long, value_name = "SITE")]
    pub site: Option<String>,

    /// Override the number of cpus.
    #[arg(long, value_name = "N")]
    pub cpu: Option<u32>,

    /// Override the scratch disk request, e.g. `20GB`.
    #[arg(long, value_name = "SIZE")]
    pub disk: Option<String>,

    /// Override the memory request in MB.
    #[arg(long, value_name = "MB")]
    pub memory: Option<u32>,

    /// Use this dataset definition as the stage's input.
    #[arg(long, value_name = "DEFNAME")]
    pub inputdef: Option<String>,

    /// Reprocess one run: `<run> <subruns> [version]`.
    #[arg(long, num_args = 2..=3, value_names = ["RUN", "SUBRUNS", "VERSION"])]
    pub pubs: Option<Vec<String>>,

    /// Submit against a recursive input definition.
    #[arg(long)]
    pub recur: bool,

    /// Print the submission command without running it.
    #[arg(long)]
    pub dryrun: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `GRIDSTAGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(flatten)]
    pub actions: ActionFlags,
}

/// One flag per action.
#[derive(Debug, Clone, Default, Args)]
pub struct ActionFlags {
    /// Print the resolved project.
    #[arg(long, alias = "dump_project")]
    pub dump_project: bool,
    /// Print the resolved stage.
    #[arg(long, alias = "dump_stage")]
    pub dump_stage: bool,
    /// Print the output directory.
    #[arg(long)]
    pub outdir: bool,
    /// Print the log directory.
    #[arg(long)]
    pub logdir: bool,
    /// Print the work directory.
    #[arg(long)]
    pub workdir: bool,
    /// Print the bookkeeping directory.
    #[arg(long)]
    pub bookdir: bool,
    /// Print the output dataset definition name.
    #[arg(long)]
    pub defname: bool,
    /// List the stage's input files.
    #[arg(long, alias = "input_files")]
    pub input_files: bool,
    /// Delete the stage's directories and those of dependent stages.
    #[arg(long)]
    pub clean: bool,
    /// Delete only this stage's directories.
    #[arg(long, alias = "clean_one")]
    pub clean_one: bool,
    /// Shorten output file names that are too long for the catalog.
    #[arg(long)]
    pub shorten: bool,
    /// Submit the stage's jobs.
    #[arg(long)]
    pub submit: bool,
    /// Submit makeup jobs for missing or failed work.
    #[arg(long)]
    pub makeup: bool,
    /// Reconcile worker output and rewrite the bookkeeping lists.
    #[arg(long)]
    pub check: bool,
    /// Like --check, for analysis output.
    #[arg(long)]
    pub checkana: bool,
    /// Fetch batch logs for every job of the stage.
    #[arg(long)]
    pub fetchlog: bool,
    /// Merge analysis files with the stage's merge command.
    #[arg(long)]
    pub merge: bool,
    /// Merge histogram files with `hadd -T`.
    #[arg(long)]
    pub mergehist: bool,
    /// Merge ntuple files with `hadd`.
    #[arg(long)]
    pub mergentuple: bool,
    /// Compare stage inputs with the parents of its output.
    #[arg(long)]
    pub audit: bool,
    /// Print per-stage counts.
    #[arg(long)]
    pub status: bool,
    /// Create the output dataset definition.
    #[arg(long)]
    pub define: bool,
    /// Create the analysis dataset definition.
    #[arg(long, alias = "define_ana")]
    pub define_ana: bool,
    /// Delete the output dataset definition.
    #[arg(long)]
    pub undefine: bool,
    /// Declare output files to the catalog.
    #[arg(long)]
    pub declare: bool,
    /// Declare analysis files to the catalog.
    #[arg(long, alias = "declare_ana")]
    pub declare_ana: bool,
    /// Report undeclared output files.
    #[arg(long, alias = "check_declarations")]
    pub check_declarations: bool,
    #[arg(long, alias = "check_declarations_ana")]
    pub check_declarations_ana: bool,
    /// Print a catalog summary of declared output.
    #[arg(long, alias = "test_declarations")]
    pub test_declarations: bool,
    #[arg(long, alias = "test_declarations_ana")]
    pub test_declarations_ana: bool,
    /// Report whether the output definition exists.
    #[arg(long, alias = "check_definition")]
    pub check_definition: bool,
    #[arg(long, alias = "check_definition_ana")]
    pub check_definition_ana: bool,
    /// Print a catalog summary of the output definition.
    #[arg(long, alias = "test_definition")]
    pub test_definition: bool,
    #[arg(long, alias = "test_definition_ana")]
    pub test_definition_ana: bool,
    /// Compare disk locations with catalog locations.
    #[arg(long, alias = "check_locations")]
    pub check_locations: bool,
    #[arg(long, alias = "check_locations_ana")]
    pub check_locations_ana: bool,
    /// Add missing disk locations to the catalog.
    #[arg(long, alias = "add_locations")]
    pub add_locations: bool,
    #[arg(long, alias = "add_locations_ana")]
    pub add_locations_ana: bool,
    /// Remove stale catalog locations.
    #[arg(long, alias = "clean_locations")]
    pub clean_locations: bool,
    #[arg(long, alias = "clean_locations_ana")]
    pub clean_locations_ana: bool,
    /// Remove every disk location from the catalog.
    #[arg(long, alias = "remove_locations")]
    pub remove_locations: bool,
    #[arg(long, alias = "remove_locations_ana")]
    pub remove_locations_ana: bool,
    /// Copy files without a tape location to the dropbox.
    #[arg(long)]
    pub upload: bool,
    #[arg(long, alias = "upload_ana")]
    pub upload_ana: bool,
    /// Report files without a tape location.
    #[arg(long, alias = "check_tape")]
    pub check_tape: bool,
    #[arg(long, alias = "check_tape_ana")]
    pub check_tape_ana: bool,
}

impl ActionFlags {
    /// Actions whose flag is set, in declaration order.
    pub fn selected(&self) -> Vec<ActionName> {
        [
            (self.dump_project, ActionName::DumpProject),
            (self.dump_stage, ActionName::DumpStage),
            (self.outdir, ActionName::Outdir),
            (self.logdir, ActionName::Logdir),
            (self.workdir, ActionName::Workdir),
            (self.bookdir, ActionName::Bookdir),
            (self.defname, ActionName::Defname),
            (self.input_files, ActionName::InputFiles),
            (self.clean, ActionName::Clean),
            (self.clean_one, ActionName::CleanOne),
            (self.shorten, ActionName::Shorten),
            (self.submit, ActionName::Submit),
            (self.makeup, ActionName::Makeup),
            (self.check, ActionName::Check),
            (self.checkana, ActionName::CheckAna),
            (self.fetchlog, ActionName::FetchLog),
            (self.merge, ActionName::Merge),
            (self.mergehist, ActionName::MergeHist),
            (self.mergentuple, ActionName::MergeNtuple),
            (self.audit, ActionName::Audit),
            (self.status, ActionName::Status),
            (self.define, ActionName::Define),
            (self.define_ana, ActionName::DefineAna),
            (self.undefine, ActionName::Undefine),
            (self.declare, ActionName::Declare),
            (self.declare_ana, ActionName::DeclareAna),
            (self.check_declarations, ActionName::CheckDeclarations),
            (self.check_declarations_ana, ActionName::CheckDeclarationsAna),
            (self.test_declarations, ActionName::TestDeclarations),
            (self.test_declarations_ana, ActionName::TestDeclarationsAna),
            (self.check_definition, ActionName::CheckDefinition),
            (self.check_definition_ana, ActionName::CheckDefinitionAna),
            (self.test_definition, ActionName::TestDefinition),
            (self.test_definition_ana, ActionName::TestDefinitionAna),
            (self.check_locations, ActionName::CheckLocations),
            (self.check_locations_ana, ActionName::CheckLocationsAna),
            (self.add_locations, ActionName::AddLocations),
            (self.add_locations_ana, ActionName::AddLocationsAna),
            (self.clean_locations, ActionName::CleanLocations),
            (self.clean_locations_ana, ActionName::CleanLocationsAna),
            (self.remove_locations, ActionName::RemoveLocations),
            (self.remove_locations_ana, ActionName::RemoveLocationsAna),
            (self.upload, ActionName::Upload),
            (self.upload_ana, ActionName::UploadAna),
            (self.check_tape, ActionName::CheckTape),
            (self.check_tape_ana, ActionName::CheckTapeAna),
        ]
        .into_iter()
        .filter_map(|(set, action)| set.then_some(action))
        .collect()
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliArgs {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    /// Turn parsed arguments into a dispatcher request.
    pub fn to_request(&self) -> Result<ActionRequest> {
        let actions = ActionSet::new(self.actions.selected())?;
        let pubs = match &self.pubs {
            Some(args) => Some(PubsSpec::from_args(args)?),
            None => None,
        };
        let overrides = StageOverrides {
            lines: self.lines.clone(),
            site: self.site.clone(),
            cpu: self.cpu,
            disk: self.disk.clone(),
            memory: self.memory,
            inputdef: self.inputdef.clone(),
            recur: self.recur,
        };
        Ok(ActionRequest {
            config_path: self.config_path(),
            project: self.project.clone(),
            stages: self.stage.iter().filter(|s| !s.is_empty()).cloned().collect(),
            actions,
            modifiers: Modifiers {
                recur: self.recur,
                dryrun: self.dryrun,
                pubs,
                overrides,
            },
        })
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
