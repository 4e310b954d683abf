//! Batch orchestration — load, export, deliver, summarize
//!
//! One query is processed fully before the next begins. Preflight
//! (configuration validation, exporter directory alignment, delivery
//! connectivity and directory readiness) runs once per batch and is
//! pipeline-fatal; per-item failures at any stage are caught, recorded
//! in the [`RunSummary`], and the batch continues.

use crate::config::Config;
use crate::delivery::store::SftpStore;
use crate::delivery::{DeliveryTarget, RemoteDelivery};
use crate::error::{Error, Result};
use crate::export::{Exporter, exporter_for};
use crate::query_source::QuerySource;
use std::sync::Arc;

/// Pipeline stage a failure occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Loading and validating the stored query
    Load,
    /// Executing the query and producing the artifact
    Export,
    /// Uploading the artifact to the remote store
    Deliver,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Load => write!(f, "load"),
            Stage::Export => write!(f, "export"),
            Stage::Deliver => write!(f, "deliver"),
        }
    }
}

/// One recorded per-item failure
#[derive(Debug, Clone)]
pub struct ItemFailure {
    /// The query identifier that failed
    pub name: String,
    /// The stage the failure occurred in
    pub stage: Stage,
    /// The failure reason
    pub reason: String,
}

/// Aggregated outcome of one pipeline invocation
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Number of items attempted
    pub attempted: usize,
    /// Number of items that were delivered
    pub succeeded: usize,
    /// Number of items that failed at some stage
    pub failed: usize,
    /// Per-item failure reasons
    pub failures: Vec<ItemFailure>,
}

impl RunSummary {
    fn record_success(&mut self, name: &str) {
        self.attempted += 1;
        self.succeeded += 1;
        tracing::info!(query = name, "item delivered");
    }

    fn record_failure(&mut self, name: &str, stage: Stage, error: &Error) {
        self.attempted += 1;
        self.failed += 1;
        tracing::error!(query = name, stage = %stage, error = %error, "item failed");
        self.failures.push(ItemFailure {
            name: name.to_string(),
            stage,
            reason: error.to_string(),
        });
    }

    /// Whether every attempted item succeeded
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Orchestrates load → export → deliver for a batch of named queries
pub struct Pipeline {
    source: QuerySource,
    exporter: Box<dyn Exporter>,
    delivery: RemoteDelivery,
    target: DeliveryTarget,
    keep_local: bool,
}

impl Pipeline {
    /// Build the pipeline from configuration
    ///
    /// Validates required settings first (fails fast, pipeline-fatal),
    /// then discovers the transport client binaries and fetches the host
    /// identity record when the trust policy asks for one. Nothing here
    /// touches the database or the remote directory yet; that happens in
    /// [`run`](Self::run)'s preflight.
    pub async fn prepare(config: &Config) -> Result<Self> {
        config.validate()?;
        config.export.csv.validate()?;

        let target = DeliveryTarget::from_config(&config.delivery);
        let store = SftpStore::prepare(target.clone(), &config.delivery.keyscan_retry).await?;

        Ok(Self {
            source: QuerySource::new(&config.export.query_dir),
            exporter: exporter_for(config),
            delivery: RemoteDelivery::new(Arc::new(store)),
            target,
            keep_local: config.export.keep_local,
        })
    }

    /// Build the pipeline from pre-constructed components
    ///
    /// Lets embedders supply their own transport or export strategy.
    pub fn from_parts(
        source: QuerySource,
        exporter: Box<dyn Exporter>,
        delivery: RemoteDelivery,
        target: DeliveryTarget,
        keep_local: bool,
    ) -> Self {
        Self {
            source,
            exporter,
            delivery,
            target,
            keep_local,
        }
    }

    /// Discover every stored query in the query directory
    pub async fn discover_queries(&self) -> Result<Vec<String>> {
        self.source.discover().await
    }

    /// Process the batch, one item at a time
    ///
    /// Preflight failures abort immediately with an error; per-item
    /// failures are recorded and the batch continues.
    pub async fn run(&mut self, names: &[String]) -> Result<RunSummary> {
        self.exporter.preflight().await?;
        let target = self.delivery.preflight(&self.target).await?;
        if target.remote_dir != self.target.remote_dir {
            tracing::info!(
                remote_dir = %target.remote_dir,
                "using rewritten remote directory for this run"
            );
        }

        let mut summary = RunSummary::default();
        for name in names {
            match self.process_item(name, &target).await {
                Ok(()) => summary.record_success(name),
                Err((stage, error)) => summary.record_failure(name, stage, &error),
            }
        }

        tracing::info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch complete"
        );
        Ok(summary)
    }

    async fn process_item(
        &self,
        name: &str,
        target: &DeliveryTarget,
    ) -> std::result::Result<(), (Stage, Error)> {
        let query = self.source.load(name).await.map_err(|e| (Stage::Load, e))?;
        let artifact = self
            .exporter
            .export(&query)
            .await
            .map_err(|e| (Stage::Export, e))?;
        self.delivery
            .deliver(&artifact, target)
            .await
            .map_err(|e| (Stage::Deliver, e))?;

        if !self.keep_local {
            // The canonical copy now lives remote-side; a failed local
            // cleanup is worth a warning, not a failed item.
            if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
                tracing::warn!(
                    artifact = %artifact.path.display(),
                    error = %e,
                    "could not remove delivered artifact"
                );
            }
        }
        Ok(())
    }
}
