// src/catalog/registrar.rs

use tracing::info;

use super::dimensions::{RecursiveDefinition, recursive_dimension};
use super::{CatalogResult, CatalogService};
use crate::project::{Project, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Exists,
    Created,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Absent,
}

/// Idempotent management of named dataset definitions.
///
/// Definitions are never updated: an existing definition is reused as is.
#[derive(Debug, Clone, Copy)]
pub struct DatasetRegistrar<'a> {
    catalog: &'a dyn CatalogService,
}

impl<'a> DatasetRegistrar<'a> {
    pub fn new(catalog: &'a dyn CatalogService) -> Self {
        Self { catalog }
    }

    pub async fn exists(&self, name: &str) -> CatalogResult<bool> {
        match self.catalog.describe_definition(name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn ensure_definition(&self, name: &str, dimension: &str) -> CatalogResult<EnsureOutcome> {
        if self.exists(name).await? {
            println!("Definition {name} already exists.");
            return Ok(EnsureOutcome::Exists);
        }
        println!("Creating dataset definition {name}");
        info!(defname = name, dimension, "creating dataset definition");
        self.catalog.create_definition(name, dimension).await?;
        Ok(EnsureOutcome::Created)
    }

    pub async fn delete_definition(&self, name: &str) -> CatalogResult<DeleteOutcome> {
        if !self.exists(name).await? {
            println!("No such definition {name}.");
            return Ok(DeleteOutcome::Absent);
        }
        match self.catalog.delete_definition(name).await {
            Ok(()) => {
                println!("Definition {name} deleted.");
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if e.is_not_found() => Ok(DeleteOutcome::Absent),
            Err(e) => Err(e),
        }
    }

    /// Ensure a definition that selects nothing.
    pub async fn ensure_dummy(&self, name: &str) -> CatalogResult<EnsureOutcome> {
        self.ensure_definition(name, &format!("file_name dummy_{name}"))
            .await
    }

    /// Ensure the recursive input definition of `stage`.
    ///
    /// Returns `None` when the stage is not recursive. The dimension is only
    /// derived when the definition does not exist yet.
    pub async fn ensure_recursive(
        &self,
        project: &Project,
        stage: &Stage,
        user: &str,
    ) -> CatalogResult<Option<(RecursiveDefinition, EnsureOutcome)>> {
        let Some(def) = recursive_dimension(project, stage, user) else {
            return Ok(None);
        };
        if self.exists(&def.name).await? {
            return Ok(Some((def, EnsureOutcome::Exists)));
        }
        for dummy in &def.dummies {
            self.ensure_dummy(dummy).await?;
        }
        println!("Creating recursive dataset definition {}", def.name);
        info!(defname = %def.name, dimension = %def.dimension, "creating recursive definition");
        self.catalog
            .create_definition(&def.name, &def.dimension)
            .await?;
        Ok(Some((def, EnsureOutcome::Created)))
    }
}
