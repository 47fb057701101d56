// src/actions/context.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::catalog::{CatalogService, current_user};
use crate::config::load_and_validate;
use crate::errors::Result;
use crate::exec::CommandBackend;
use crate::fs::FileSystem;
use crate::layout::CallerIds;
use crate::project::ProjectModel;

/// Resolved project models keyed by configuration path.
///
/// Loading resolves inheritance and inputs for every stage, so repeated
/// lookups within one invocation reuse the first result.
#[derive(Debug, Default)]
pub struct ProjectCache {
    models: HashMap<PathBuf, Arc<ProjectModel>>,
}

impl ProjectCache {
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    /// Get the model for a configuration file, loading and caching it if
    /// necessary.
    pub fn get_or_load(&mut self, path: &Path) -> Result<Arc<ProjectModel>> {
        if let Some(model) = self.models.get(path) {
            return Ok(Arc::clone(model));
        }

        debug!("cache miss: loading projects from {:?}", path);
        let cfg = load_and_validate(path)?;
        let model = Arc::new(ProjectModel::from_config(&cfg)?);
        self.models.insert(path.to_path_buf(), Arc::clone(&model));
        Ok(model)
    }

    /// Drop the cached model for a configuration file.
    pub fn invalidate(&mut self, path: &Path) {
        if self.models.remove(path).is_some() {
            debug!("invalidated project cache for {:?}", path);
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.models.contains_key(path)
    }
}

/// Collaborators shared by every action handler.
#[derive(Debug)]
pub struct ActionContext {
    pub fs: Arc<dyn FileSystem>,
    pub catalog: Arc<dyn CatalogService>,
    pub backend: Arc<dyn CommandBackend>,
    pub caller: CallerIds,
    /// Name used to derive catalog project names.
    pub user: String,
    pub cache: ProjectCache,
}

impl ActionContext {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        catalog: Arc<dyn CatalogService>,
        backend: Arc<dyn CommandBackend>,
    ) -> Self {
        Self {
            fs,
            catalog,
            backend,
            caller: CallerIds::current(),
            user: current_user(),
            cache: ProjectCache::new(),
        }
    }

    pub fn with_caller(mut self, caller: CallerIds) -> Self {
        self.caller = caller;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Reuse models already loaded by the caller.
    pub fn with_cache(mut self, cache: ProjectCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn model(&mut self, config_path: &Path) -> Result<Arc<ProjectModel>> {
        self.cache.get_or_load(config_path)
    }
}
