// src/catalog/mod.rs

//! Dataset/metadata catalog boundary.
//!
//! The catalog is an external service reached through a narrow set of
//! queries. [`SamwebCatalog`] drives the `samweb` command-line client;
//! tests provide an in-memory implementation.

pub mod dimensions;
pub mod registrar;
pub mod samweb;

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;

use crate::errors::CatalogError;

pub use dimensions::{
    RecursiveDefinition, current_user, datastream_dimension, output_dimension, project_name,
    project_wildcard, recursive_dimension, unconsumed_dimension,
};
pub use registrar::{DatasetRegistrar, DeleteOutcome, EnsureOutcome};
pub use samweb::SamwebCatalog;

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
pub type CatalogFuture<'a, T> = Pin<Box<dyn Future<Output = CatalogResult<T>> + Send + 'a>>;

/// Where a replica of a catalogued file lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    Disk,
    Tape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub kind: LocationKind,
    /// Location as reported by the catalog, e.g. `dcache:/pnfs/x/y` or
    /// `enstore:/pnfs/x/y(123@vol)`.
    pub location: String,
}

impl FileLocation {
    /// Parse one line of `locate-file` output.
    pub fn parse(line: &str) -> Option<FileLocation> {
        let location = line.trim();
        if location.is_empty() {
            return None;
        }
        let kind = if location.starts_with("enstore:") {
            LocationKind::Tape
        } else {
            LocationKind::Disk
        };
        Some(FileLocation {
            kind,
            location: location.to_string(),
        })
    }

    /// Directory part with any `<node>:` prefix and `(…)` suffix removed.
    pub fn directory(&self) -> &str {
        let loc = self.location.as_str();
        let loc = loc.split_once(':').map(|(_, rest)| rest).unwrap_or(loc);
        loc.split('(').next().unwrap_or(loc)
    }
}

/// Operations the orchestrator needs from the catalog.
///
/// "Not found" answers are reported as [`CatalogError::DefinitionNotFound`]
/// or [`CatalogError::FileNotFound`], never as `Service`.
pub trait CatalogService: Send + Sync + Debug {
    fn describe_definition<'a>(&'a self, name: &'a str) -> CatalogFuture<'a, String>;
    fn create_definition<'a>(&'a self, name: &'a str, dimension: &'a str)
        -> CatalogFuture<'a, ()>;
    fn delete_definition<'a>(&'a self, name: &'a str) -> CatalogFuture<'a, ()>;

    fn list_files<'a>(&'a self, dimension: &'a str) -> CatalogFuture<'a, Vec<String>>;
    fn count_files<'a>(&'a self, dimension: &'a str) -> CatalogFuture<'a, u64>;
    fn list_files_summary<'a>(&'a self, dimension: &'a str) -> CatalogFuture<'a, String>;

    fn locate_file<'a>(&'a self, name: &'a str) -> CatalogFuture<'a, Vec<FileLocation>>;
    fn add_file_location<'a>(&'a self, name: &'a str, location: &'a str)
        -> CatalogFuture<'a, ()>;
    fn remove_file_location<'a>(
        &'a self,
        name: &'a str,
        location: &'a str,
    ) -> CatalogFuture<'a, ()>;

    /// Start a streaming session on `defname` outside the batch system.
    fn start_project<'a>(&'a self, defname: &'a str, project: &'a str) -> CatalogFuture<'a, ()>;

    fn get_metadata<'a>(&'a self, name: &'a str) -> CatalogFuture<'a, serde_json::Value>;
    fn declare_file<'a>(&'a self, metadata: &'a serde_json::Value) -> CatalogFuture<'a, ()>;
    fn modify_metadata<'a>(
        &'a self,
        name: &'a str,
        metadata: &'a serde_json::Value,
    ) -> CatalogFuture<'a, ()>;
}
