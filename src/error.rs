//! Error types for csvdrop
//!
//! This module provides the error taxonomy for the export-and-deliver
//! pipeline:
//! - Domain-specific error types (Query, Export, Delivery)
//! - Configuration errors with the offending key attached
//! - A distinction between pipeline-fatal failures (configuration,
//!   delivery preflight) and per-item failures (a single query's export
//!   or delivery), applied by the pipeline when it records outcomes

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for csvdrop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for csvdrop
///
/// This is the primary error type used throughout the library. Each variant
/// includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "database.host")
        key: Option<String>,
    },

    /// Stored query could not be loaded or failed validation
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Export failed (query execution or artifact verification)
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// Remote delivery failed (transport, directory, or credential problems)
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from loading and validating stored query definitions
#[derive(Debug, Error)]
pub enum QueryError {
    /// Query file does not exist in the query directory
    #[error("query {name} not found at {path}")]
    NotFound {
        /// The query identifier that was requested
        name: String,
        /// The path that was probed
        path: PathBuf,
    },

    /// Query body is empty after cleaning
    #[error("query {name} has an empty body")]
    EmptyBody {
        /// The query identifier with the empty body
        name: String,
    },

    /// Query body already contains an export-to-file clause
    ///
    /// Appending a second destination clause would double-write the file
    /// target, so this is a rejected input rather than a silent rewrite.
    #[error("query {name} already contains an INTO OUTFILE clause")]
    EmbeddedExportClause {
        /// The query identifier carrying the embedded clause
        name: String,
    },
}

/// Errors from the export stage (either strategy)
#[derive(Debug, Error)]
pub enum ExportError {
    /// The database engine rejected or errored the query
    #[error("query {name} failed to execute: {detail}")]
    QueryExecutionFailed {
        /// The query identifier that failed
        name: String,
        /// The underlying engine error detail
        detail: String,
    },

    /// The artifact could not be confirmed after execution
    #[error("export of {name} did not produce {path}: {diagnostics}")]
    Incomplete {
        /// The query identifier whose artifact is missing
        name: String,
        /// The path where the artifact was expected
        path: PathBuf,
        /// Diagnostic context (directory listing, engine write-permission setting)
        diagnostics: String,
    },

    /// The artifact could not be written locally
    #[error("failed to write artifact {path}: {detail}")]
    WriteFailed {
        /// The artifact path that could not be written
        path: PathBuf,
        /// The underlying I/O error detail
        detail: String,
    },
}

/// Errors from the remote delivery stage
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The remote endpoint did not answer the connectivity round-trip
    #[error("delivery target {host}:{port} unreachable: {detail}")]
    Unreachable {
        /// Remote host
        host: String,
        /// Remote port
        port: u16,
        /// Transport error detail
        detail: String,
    },

    /// The remote directory could not be created, even under the
    /// home-relative fallback
    #[error("remote directory {dir} unavailable: {detail}")]
    RemoteDirUnavailable {
        /// The directory that could not be made available
        dir: String,
        /// The last transport error detail
        detail: String,
    },

    /// Creating a directory component was denied by the remote store
    ///
    /// Surfaced separately from [`DeliveryError::Transport`] so the
    /// preflight can decide whether a home-relative rewrite applies.
    #[error("permission denied creating remote directory {dir}")]
    CreateDenied {
        /// The directory component that was denied
        dir: String,
    },

    /// Password authentication was configured but the credential-injection
    /// helper binary is not installed
    ///
    /// Passing the secret on an argument list would expose it to every
    /// local user, so there is no insecure fallback: fail fast instead.
    #[error("password authentication requires the sshpass helper, which was not found in PATH")]
    MissingCredentialHelper,

    /// A required transport client binary is not installed
    #[error("required client binary {binary} not found in PATH")]
    ClientMissing {
        /// The binary that could not be discovered
        binary: String,
    },

    /// The host identity record could not be fetched
    #[error("could not fetch host identity for {host}: {detail}")]
    HostIdentityUnavailable {
        /// Remote host
        host: String,
        /// Detail from the last fetch attempt
        detail: String,
    },

    /// A transport operation failed
    #[error("transport failure during {operation}: {detail}")]
    Transport {
        /// The operation that failed (e.g., "upload", "rename")
        operation: String,
        /// Error detail (typically the client's stderr)
        detail: String,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_display_includes_name() {
        let err = Error::Query(QueryError::EmptyBody {
            name: "daily_orders".into(),
        });
        assert_eq!(err.to_string(), "query error: query daily_orders has an empty body");
    }

    #[test]
    fn embedded_clause_display_names_the_clause() {
        let err = QueryError::EmbeddedExportClause {
            name: "bad_query".into(),
        };
        assert!(err.to_string().contains("INTO OUTFILE"));
        assert!(err.to_string().contains("bad_query"));
    }

    #[test]
    fn export_incomplete_display_carries_diagnostics() {
        let err = ExportError::Incomplete {
            name: "daily_orders".into(),
            path: PathBuf::from("/var/exports/daily_orders.csv"),
            diagnostics: "secure_file_priv=/var/lib/mysql-files".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/var/exports/daily_orders.csv"));
        assert!(msg.contains("secure_file_priv"));
    }

    #[test]
    fn delivery_unreachable_display_includes_endpoint() {
        let err = DeliveryError::Unreachable {
            host: "drop.example.com".into(),
            port: 2222,
            detail: "connection refused".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("drop.example.com:2222"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn missing_credential_helper_mentions_sshpass() {
        let msg = DeliveryError::MissingCredentialHelper.to_string();
        assert!(msg.contains("sshpass"));
    }

    #[test]
    fn io_error_converts_via_from() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn sub_errors_convert_via_from() {
        let err: Error = QueryError::EmptyBody { name: "q".into() }.into();
        assert!(matches!(err, Error::Query(_)));

        let err: Error = DeliveryError::MissingCredentialHelper.into();
        assert!(matches!(err, Error::Delivery(_)));

        let err: Error = ExportError::QueryExecutionFailed {
            name: "q".into(),
            detail: "syntax error".into(),
        }
        .into();
        assert!(matches!(err, Error::Export(_)));
    }
}
