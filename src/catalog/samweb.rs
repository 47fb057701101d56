// src/catalog/samweb.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{CatalogFuture, CatalogResult, CatalogService, FileLocation};
use crate::errors::CatalogError;
use crate::exec::{CommandBackend, CommandLine};

const SAMWEB_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy)]
enum Subject {
    Definition,
    File,
}

impl Subject {
    fn not_found(self, name: &str) -> CatalogError {
        match self {
            Subject::Definition => CatalogError::DefinitionNotFound(name.to_string()),
            Subject::File => CatalogError::FileNotFound(name.to_string()),
        }
    }
}

/// Catalog client driving the `samweb` command-line tool.
#[derive(Debug, Clone)]
pub struct SamwebCatalog {
    backend: Arc<dyn CommandBackend>,
    experiment: String,
    timeout: Duration,
}

impl SamwebCatalog {
    pub fn new(backend: Arc<dyn CommandBackend>, experiment: impl Into<String>) -> Self {
        Self {
            backend,
            experiment: experiment.into(),
            timeout: SAMWEB_TIMEOUT,
        }
    }

    fn command(&self, subcommand: &str) -> CommandLine {
        let mut cmd = CommandLine::new("samweb");
        cmd.opt("-e", &self.experiment).arg(subcommand);
        cmd
    }

    async fn run(
        &self,
        operation: &str,
        cmd: CommandLine,
        subject: Option<(Subject, &str)>,
    ) -> CatalogResult<String> {
        debug!(operation, cmd = %cmd, "catalog query");
        let out = self
            .backend
            .invoke(cmd, self.timeout)
            .await
            .map_err(|e| service(operation, e.to_string()))?;
        if out.success() {
            return Ok(out.stdout);
        }
        if let Some((subject, name)) = subject {
            if looks_like_not_found(&out.stderr) || looks_like_not_found(&out.stdout) {
                return Err(subject.not_found(name));
            }
        }
        let message = if out.timed_out {
            "timed out".to_string()
        } else if out.stderr.trim().is_empty() {
            format!("exit status {}", out.exit_code)
        } else {
            out.stderr.trim().to_string()
        };
        Err(service(operation, message))
    }

    /// Write `metadata` to a scratch JSON file for commands that take one.
    async fn metadata_file(&self, operation: &str, metadata: &serde_json::Value) -> CatalogResult<PathBuf> {
        let path = std::env::temp_dir().join(format!("gridstage-{}.json", uuid::Uuid::new_v4()));
        let text = serde_json::to_string_pretty(metadata)
            .map_err(|e| service(operation, e.to_string()))?;
        tokio::fs::write(&path, text)
            .await
            .map_err(|e| service(operation, e.to_string()))?;
        Ok(path)
    }
}

fn service(operation: &str, message: String) -> CatalogError {
    CatalogError::Service {
        operation: operation.to_string(),
        message,
    }
}

fn looks_like_not_found(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("not found") || lower.contains("no such") || lower.contains("does not exist")
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

impl CatalogService for SamwebCatalog {
    fn describe_definition<'a>(&'a self, name: &'a str) -> CatalogFuture<'a, String> {
        Box::pin(async move {
            let mut cmd = self.command("describe-definition");
            cmd.arg(name);
            self.run("describe-definition", cmd, Some((Subject::Definition, name)))
                .await
        })
    }

    fn create_definition<'a>(
        &'a self,
        name: &'a str,
        dimension: &'a str,
    ) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            let mut cmd = self.command("create-definition");
            cmd.arg(name).arg(dimension);
            self.run("create-definition", cmd, None).await.map(|_| ())
        })
    }

    fn delete_definition<'a>(&'a self, name: &'a str) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            let mut cmd = self.command("delete-definition");
            cmd.arg(name);
            self.run("delete-definition", cmd, Some((Subject::Definition, name)))
                .await
                .map(|_| ())
        })
    }

    fn list_files<'a>(&'a self, dimension: &'a str) -> CatalogFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut cmd = self.command("list-files");
            cmd.arg(dimension);
            let out = self.run("list-files", cmd, None).await?;
            Ok(non_empty_lines(&out))
        })
    }

    fn count_files<'a>(&'a self, dimension: &'a str) -> CatalogFuture<'a, u64> {
        Box::pin(async move {
            let mut cmd = self.command("count-files");
            cmd.arg(dimension);
            let out = self.run("count-files", cmd, None).await?;
            out.trim()
                .parse::<u64>()
                .map_err(|_| service("count-files", format!("unexpected output '{}'", out.trim())))
        })
    }

    fn list_files_summary<'a>(&'a self, dimension: &'a str) -> CatalogFuture<'a, String> {
        Box::pin(async move {
            let mut cmd = self.command("list-files");
            cmd.arg("--summary").arg(dimension);
            self.run("list-files --summary", cmd, None).await
        })
    }

    fn locate_file<'a>(&'a self, name: &'a str) -> CatalogFuture<'a, Vec<FileLocation>> {
        Box::pin(async move {
            let mut cmd = self.command("locate-file");
            cmd.arg(name);
            let out = self
                .run("locate-file", cmd, Some((Subject::File, name)))
                .await?;
            Ok(out.lines().filter_map(FileLocation::parse).collect())
        })
    }

    fn add_file_location<'a>(
        &'a self,
        name: &'a str,
        location: &'a str,
    ) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            let mut cmd = self.command("add-file-location");
            cmd.arg(name).arg(location);
            self.run("add-file-location", cmd, Some((Subject::File, name)))
                .await
                .map(|_| ())
        })
    }

    fn remove_file_location<'a>(
        &'a self,
        name: &'a str,
        location: &'a str,
    ) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            let mut cmd = self.command("remove-file-location");
            cmd.arg(name).arg(location);
            self.run("remove-file-location", cmd, Some((Subject::File, name)))
                .await
                .map(|_| ())
        })
    }

    fn start_project<'a>(&'a self, defname: &'a str, project: &'a str) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            let mut cmd = self.command("start-project");
            cmd.opt_eq("--defname", defname)
                .opt_eq("--station", &self.experiment)
                .opt_eq("--group", &self.experiment)
                .arg(project);
            self.run("start-project", cmd, Some((Subject::Definition, defname)))
                .await
                .map(|_| ())
        })
    }

    fn get_metadata<'a>(&'a self, name: &'a str) -> CatalogFuture<'a, serde_json::Value> {
        Box::pin(async move {
            let mut cmd = self.command("get-metadata");
            cmd.arg("--json").arg(name);
            let out = self
                .run("get-metadata", cmd, Some((Subject::File, name)))
                .await?;
            serde_json::from_str(&out).map_err(|e| service("get-metadata", e.to_string()))
        })
    }

    fn declare_file<'a>(&'a self, metadata: &'a serde_json::Value) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            let path = self.metadata_file("declare-file", metadata).await?;
            let mut cmd = self.command("declare-file");
            cmd.arg(path.display().to_string());
            let result = self.run("declare-file", cmd, None).await.map(|_| ());
            let _ = tokio::fs::remove_file(&path).await;
            result
        })
    }

    fn modify_metadata<'a>(
        &'a self,
        name: &'a str,
        metadata: &'a serde_json::Value,
    ) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            let path = self.metadata_file("modify-metadata", metadata).await?;
            let mut cmd = self.command("modify-metadata");
            cmd.arg(name).arg(path.display().to_string());
            let result = self
                .run("modify-metadata", cmd, Some((Subject::File, name)))
                .await
                .map(|_| ());
            let _ = tokio::fs::remove_file(&path).await;
            result
        })
    }
}
