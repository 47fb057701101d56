// src/lib.rs

pub mod actions;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod layout;
pub mod logging;
pub mod makeup;
pub mod project;
pub mod reconcile;
pub mod submit;
pub mod types;

use std::sync::Arc;

use tracing::{debug, info};

use crate::actions::{ActionContext, ProjectCache, dispatch};
use crate::catalog::SamwebCatalog;
use crate::cli::CliArgs;
use crate::errors::{GridstageError, Result};
use crate::exec::ProcessBackend;
use crate::fs::RealFileSystem;

/// High-level entry point used by `main.rs`.
///
/// Builds the production context (real filesystem, `samweb` catalog and
/// process backend) and dispatches the requested actions. Returns the
/// aggregated error count.
pub async fn run(args: CliArgs) -> Result<usize> {
    let request = args.to_request()?;
    if request.actions.is_empty() {
        return Err(GridstageError::Usage(
            "no action given, see --help".to_string(),
        ));
    }
    debug!(config = %request.config_path.display(), "loading project file");

    let mut cache = ProjectCache::new();
    let model = cache.get_or_load(&request.config_path)?;

    let backend = Arc::new(ProcessBackend);
    let catalog = SamwebCatalog::new(backend.clone(), model.config.experiment.clone());
    let mut ctx = ActionContext::new(Arc::new(RealFileSystem), Arc::new(catalog), backend)
        .with_cache(cache);
    let errors = dispatch(&mut ctx, &request).await?;
    info!(errors, "actions finished");
    Ok(errors)
}
