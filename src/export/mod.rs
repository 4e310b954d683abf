//! Export stage — turns a stored query into a finished local CSV artifact
//!
//! Two strategies implement the same [`Exporter`] contract:
//! - [`server::ServerSideExporter`] appends an export clause and lets the
//!   engine write the file at a path on its own filesystem (fast path;
//!   needs `FILE` privilege and an engine-writable directory)
//! - [`client::ClientSideExporter`] pulls rows over the client connection
//!   and encodes CSV locally (portable path; read privilege only)
//!
//! The strategy is selected by [`ExportMode`](crate::config::ExportMode)
//! in configuration; everything downstream handles only the produced
//! [`ExportArtifact`].

pub mod client;
mod headers;
pub mod server;

use crate::config::{Config, DatabaseConfig, ExportMode};
use crate::error::Result;
use crate::query_source::QueryDefinition;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use sqlx::ConnectOptions;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use std::path::{Path, PathBuf};

/// A finished local CSV artifact and its logical destination name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    /// Path of the local file
    pub path: PathBuf,
    /// File name the artifact is delivered under (`<name>.csv`)
    pub remote_name: String,
}

/// Export strategy contract
///
/// `preflight` runs once before the batch (server-side uses it to align
/// the working directory with the engine's permitted write location);
/// `export` produces one artifact per query.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// One-time setup before the batch starts
    async fn preflight(&mut self) -> Result<()> {
        Ok(())
    }

    /// Execute the query and produce the local artifact
    async fn export(&self, query: &QueryDefinition) -> Result<ExportArtifact>;
}

/// Build the exporter selected by configuration
pub fn exporter_for(config: &Config) -> Box<dyn Exporter> {
    match config.export.mode {
        ExportMode::ServerSide => Box::new(server::ServerSideExporter::new(
            config.database.clone(),
            config.export.clone(),
        )),
        ExportMode::ClientSide => Box::new(client::ClientSideExporter::new(
            config.database.clone(),
            config.export.clone(),
        )),
    }
}

/// Open a connection to the source database
///
/// Connections are scoped per operation: opened, used, closed. Nothing
/// holds a pool across the batch.
pub(crate) async fn connect(db: &DatabaseConfig) -> Result<MySqlConnection> {
    let mut options = MySqlConnectOptions::new()
        .host(&db.host)
        .port(db.port)
        .username(&db.username)
        .database(&db.database);
    if let Some(password) = &db.password {
        options = options.password(password);
    }
    Ok(options.connect().await?)
}

/// Resolve the artifact path for `name` inside `work_dir`, avoiding
/// collisions with files that cannot be removed
///
/// A stale artifact at the target path is removed first (the engine's
/// file-write sink refuses to overwrite an existing path). If removal
/// fails, the new artifact gets a timestamp+random suffix instead of
/// overwriting or failing the item.
pub(crate) fn unique_artifact_path(work_dir: &Path, name: &str) -> (PathBuf, String) {
    let file_name = format!("{name}.csv");
    let target = work_dir.join(&file_name);

    if !target.exists() {
        return (target, file_name);
    }
    match std::fs::remove_file(&target) {
        Ok(()) => (target, file_name),
        Err(e) => {
            let suffixed = format!(
                "{name}-{}-{:04x}.csv",
                Utc::now().format("%Y%m%d%H%M%S"),
                rand::thread_rng().gen_range(0u16..=0xffff)
            );
            tracing::warn!(
                path = %target.display(),
                error = %e,
                fallback = %suffixed,
                "stale artifact could not be removed, using suffixed name"
            );
            (work_dir.join(&suffixed), suffixed)
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unique_path_uses_plain_name_when_free() {
        let dir = TempDir::new().unwrap();
        let (path, name) = unique_artifact_path(dir.path(), "orders");

        assert_eq!(path, dir.path().join("orders.csv"));
        assert_eq!(name, "orders.csv");
    }

    #[test]
    fn unique_path_removes_stale_artifact() {
        let dir = TempDir::new().unwrap();
        let stale = dir.path().join("orders.csv");
        std::fs::write(&stale, "old data").unwrap();

        let (path, name) = unique_artifact_path(dir.path(), "orders");

        assert_eq!(path, stale);
        assert_eq!(name, "orders.csv");
        assert!(!stale.exists(), "stale artifact should have been removed");
    }

    #[test]
    fn unique_path_falls_back_to_suffix_when_removal_fails() {
        let dir = TempDir::new().unwrap();
        // A directory squatting on the artifact path cannot be removed
        // with remove_file, regardless of permissions
        let stale = dir.path().join("orders.csv");
        std::fs::create_dir(&stale).unwrap();

        let (path, name) = unique_artifact_path(dir.path(), "orders");

        assert_ne!(path, stale, "must not reuse the unremovable path");
        assert!(name.starts_with("orders-"), "suffix keeps the base name");
        assert!(name.ends_with(".csv"));
        assert!(stale.exists(), "stale entry is left in place");
    }

    #[test]
    fn exporter_for_respects_mode() {
        let mut config = Config::default();
        config.export.mode = ExportMode::ClientSide;
        // Both arms construct without touching the database
        let _client = exporter_for(&config);
        config.export.mode = ExportMode::ServerSide;
        let _server = exporter_for(&config);
    }
}
