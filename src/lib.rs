//! # csvdrop
//!
//! Exports result sets of stored SQL queries to CSV files and delivers
//! them to a remote file drop without ever exposing a partially written
//! file to consumers.
//!
//! ## Design Philosophy
//!
//! csvdrop is designed around two guarantees:
//! - **Correct CSV, everywhere** - the same format specification drives
//!   both export strategies: the engine's own file writer (server-side)
//!   and the local encoder (client-side)
//! - **Atomic delivery** - artifacts travel under a temporary `.part`
//!   name and are renamed only after the full byte content transferred;
//!   consumers never see a partial file under the final name
//!
//! Processing is strictly sequential: one query is loaded, exported, and
//! delivered fully before the next begins. Per-item failures are
//! recorded and the batch continues; configuration and preflight
//! failures abort before anything runs.
//!
//! ## Quick Start
//!
//! ```no_run
//! use csvdrop::{Config, Pipeline};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Path::new("csvdrop.json"))?;
//!
//!     let mut pipeline = Pipeline::prepare(&config).await?;
//!     let queries = pipeline.discover_queries().await?;
//!     let summary = pipeline.run(&queries).await?;
//!
//!     println!(
//!         "{} attempted, {} succeeded, {} failed",
//!         summary.attempted, summary.succeeded, summary.failed
//!     );
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// CSV format specification and encoder
pub mod csv;
/// Remote delivery with atomic write-then-rename
pub mod delivery;
/// Error types
pub mod error;
/// Export strategies (server-side and client-side)
pub mod export;
/// Log subscriber setup
pub mod logging;
/// Batch orchestration
pub mod pipeline;
/// Stored query loading and validation
pub mod query_source;

// Re-export commonly used types
pub use config::{
    Config, DatabaseConfig, DeliveryAuth, DeliveryConfig, ExportConfig, ExportMode,
    FixedRetryConfig, HostTrust, LoggingConfig,
};
pub use csv::{CsvEncoder, CsvFormat};
pub use delivery::{DeliveryTarget, RemoteDelivery, RemoteStore, store::SftpStore};
pub use error::{DeliveryError, Error, ExportError, QueryError, Result};
pub use export::{ExportArtifact, Exporter, client::ClientSideExporter, server::ServerSideExporter};
pub use pipeline::{ItemFailure, Pipeline, RunSummary, Stage};
pub use query_source::{QueryDefinition, QuerySource};
