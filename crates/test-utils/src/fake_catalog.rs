use std::collections::BTreeMap;
use std::sync::Mutex;

use gridstage::catalog::{CatalogFuture, CatalogService, FileLocation};
use gridstage::errors::CatalogError;
use serde_json::Value;

/// Everything the fake catalog knows and everything it was asked to do.
#[derive(Debug, Default, Clone)]
pub struct CatalogState {
    pub definitions: BTreeMap<String, String>,
    /// Query results keyed by the exact dimension string.
    pub files: BTreeMap<String, Vec<String>>,
    pub counts: BTreeMap<String, u64>,
    pub locations: BTreeMap<String, Vec<String>>,
    pub metadata: BTreeMap<String, Value>,

    pub created: Vec<(String, String)>,
    pub deleted: Vec<String>,
    pub started: Vec<(String, String)>,
    pub declared: Vec<Value>,
    pub modified: Vec<(String, Value)>,
    pub rejected_declarations: bool,
}

/// In-memory catalog.
///
/// `list_files` answers exact dimension matches first; a bare
/// `defname: X` for a known definition falls back to the files registered
/// for that definition's dimension.
#[derive(Debug, Default)]
pub struct FakeCatalog {
    state: Mutex<CatalogState>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_definition(self, name: &str, dimension: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .definitions
            .insert(name.to_string(), dimension.to_string());
        self
    }

    pub fn with_files(self, dimension: &str, files: &[&str]) -> Self {
        self.state.lock().unwrap().files.insert(
            dimension.to_string(),
            files.iter().map(|f| f.to_string()).collect(),
        );
        self
    }

    pub fn with_count(self, dimension: &str, count: u64) -> Self {
        self.state
            .lock()
            .unwrap()
            .counts
            .insert(dimension.to_string(), count);
        self
    }

    pub fn with_location(self, file: &str, location: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .locations
            .entry(file.to_string())
            .or_default()
            .push(location.to_string());
        self
    }

    pub fn with_metadata(self, file: &str, md: Value) -> Self {
        self.state
            .lock()
            .unwrap()
            .metadata
            .insert(file.to_string(), md);
        self
    }

    pub fn rejecting_declarations(self) -> Self {
        self.state.lock().unwrap().rejected_declarations = true;
        self
    }

    pub fn snapshot(&self) -> CatalogState {
        self.state.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<(String, String)> {
        self.snapshot().created
    }

    pub fn definition(&self, name: &str) -> Option<String> {
        self.snapshot().definitions.get(name).cloned()
    }

    fn query(state: &CatalogState, dimension: &str) -> Vec<String> {
        if let Some(files) = state.files.get(dimension) {
            return files.clone();
        }
        let named = dimension
            .strip_prefix("defname: ")
            .and_then(|name| state.definitions.get(name.trim()));
        match named {
            Some(dim) => state.files.get(dim).cloned().unwrap_or_default(),
            None => Vec::new(),
        }
    }
}

impl CatalogService for FakeCatalog {
    fn describe_definition<'a>(&'a self, name: &'a str) -> CatalogFuture<'a, String> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            state
                .definitions
                .get(name)
                .map(|dim| format!("Definition Name: {name}\n  Dimensions: {dim}\n"))
                .ok_or_else(|| CatalogError::DefinitionNotFound(name.to_string()))
        })
    }

    fn create_definition<'a>(
        &'a self,
        name: &'a str,
        dimension: &'a str,
    ) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state
                .definitions
                .insert(name.to_string(), dimension.to_string());
            state.created.push((name.to_string(), dimension.to_string()));
            Ok(())
        })
    }

    fn delete_definition<'a>(&'a self, name: &'a str) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.definitions.remove(name).is_none() {
                return Err(CatalogError::DefinitionNotFound(name.to_string()));
            }
            state.deleted.push(name.to_string());
            Ok(())
        })
    }

    fn list_files<'a>(&'a self, dimension: &'a str) -> CatalogFuture<'a, Vec<String>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            Ok(Self::query(&state, dimension))
        })
    }

    fn count_files<'a>(&'a self, dimension: &'a str) -> CatalogFuture<'a, u64> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            Ok(state
                .counts
                .get(dimension)
                .copied()
                .unwrap_or_else(|| Self::query(&state, dimension).len() as u64))
        })
    }

    fn list_files_summary<'a>(&'a self, dimension: &'a str) -> CatalogFuture<'a, String> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            Ok(format!("File count:\t{}\n", Self::query(&state, dimension).len()))
        })
    }

    fn locate_file<'a>(&'a self, name: &'a str) -> CatalogFuture<'a, Vec<FileLocation>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            Ok(state
                .locations
                .get(name)
                .map(|locs| locs.iter().filter_map(|l| FileLocation::parse(l)).collect())
                .unwrap_or_default())
        })
    }

    fn add_file_location<'a>(
        &'a self,
        name: &'a str,
        location: &'a str,
    ) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            self.state
                .lock()
                .unwrap()
                .locations
                .entry(name.to_string())
                .or_default()
                .push(location.to_string());
            Ok(())
        })
    }

    fn remove_file_location<'a>(
        &'a self,
        name: &'a str,
        location: &'a str,
    ) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if let Some(locs) = state.locations.get_mut(name) {
                locs.retain(|l| l != location);
            }
            Ok(())
        })
    }

    fn start_project<'a>(&'a self, defname: &'a str, project: &'a str) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            self.state
                .lock()
                .unwrap()
                .started
                .push((defname.to_string(), project.to_string()));
            Ok(())
        })
    }

    fn get_metadata<'a>(&'a self, name: &'a str) -> CatalogFuture<'a, Value> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            state
                .metadata
                .get(name)
                .cloned()
                .ok_or_else(|| CatalogError::FileNotFound(name.to_string()))
        })
    }

    fn declare_file<'a>(&'a self, metadata: &'a Value) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.rejected_declarations {
                return Err(CatalogError::Service {
                    operation: "declare-file".to_string(),
                    message: "rejected".to_string(),
                });
            }
            if let Some(name) = metadata.get("file_name").and_then(Value::as_str) {
                state.metadata.insert(name.to_string(), metadata.clone());
            }
            state.declared.push(metadata.clone());
            Ok(())
        })
    }

    fn modify_metadata<'a>(
        &'a self,
        name: &'a str,
        metadata: &'a Value,
    ) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            self.state
                .lock()
                .unwrap()
                .modified
                .push((name.to_string(), metadata.clone()));
            Ok(())
        })
    }
}
