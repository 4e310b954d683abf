//! Configuration types for csvdrop

use crate::csv::CsvFormat;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the export-and-deliver pipeline
///
/// Fields are organized into logical sub-configs:
/// - [`database`](DatabaseConfig) — source engine endpoint and credentials
/// - [`export`](ExportConfig) — query directory, working directory, CSV format, strategy
/// - [`delivery`](DeliveryConfig) — remote file-drop endpoint, credentials, trust policy
/// - [`logging`](LoggingConfig) — log level and destination
///
/// The configuration is constructed once at startup (from a JSON file via
/// [`Config::load`]) and passed by reference into the pipeline components.
/// There is no ambient global state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source database endpoint and credentials
    pub database: DatabaseConfig,

    /// Export behavior settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Remote delivery settings
    pub delivery: DeliveryConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read configuration file {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("cannot parse configuration file {}: {}", path.display(), e),
            key: None,
        })?;
        Ok(config)
    }

    /// Validate that all required settings are present
    ///
    /// Called once before any batch item runs; a failure here is
    /// pipeline-fatal. Returns the first missing setting with its key.
    pub fn validate(&self) -> Result<()> {
        fn require(value: &str, key: &str) -> Result<()> {
            if value.trim().is_empty() {
                return Err(Error::Config {
                    message: format!("required setting {key} is missing"),
                    key: Some(key.to_string()),
                });
            }
            Ok(())
        }

        require(&self.database.host, "database.host")?;
        require(&self.database.username, "database.username")?;
        require(&self.database.database, "database.database")?;

        if self.export.query_dir.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "required setting export.query_dir is missing".into(),
                key: Some("export.query_dir".into()),
            });
        }

        require(&self.delivery.host, "delivery.host")?;
        require(&self.delivery.username, "delivery.username")?;
        require(&self.delivery.remote_dir, "delivery.remote_dir")?;

        match &self.delivery.auth {
            DeliveryAuth::Key { identity_file } => {
                if identity_file.as_os_str().is_empty() {
                    return Err(Error::Config {
                        message: "key authentication requires delivery.auth.identity_file".into(),
                        key: Some("delivery.auth.identity_file".into()),
                    });
                }
            }
            DeliveryAuth::Password { password } => require(password, "delivery.auth.password")?,
        }

        Ok(())
    }
}

/// Source database configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database server hostname
    pub host: String,

    /// Database server port (default: 3306)
    #[serde(default = "default_database_port")]
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Database (schema) to run queries against
    pub database: String,
}

/// Export strategy selection
///
/// The server-side strategy asks the engine to write the file at a path
/// on its own filesystem (fast, needs `FILE` privilege and a writable
/// engine-local directory). The client-side strategy pulls rows over the
/// connection and encodes CSV locally (portable, read privilege only).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// Append an export clause and let the engine write the file
    ServerSide,
    /// Pull rows over the client connection and encode locally (default)
    #[default]
    ClientSide,
}

/// Export behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory containing stored query files (`<name>.sql`)
    #[serde(default)]
    pub query_dir: PathBuf,

    /// Local working directory where artifacts are produced (default: "./exports")
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Export strategy
    #[serde(default)]
    pub mode: ExportMode,

    /// Keep the local artifact after confirmed delivery (default: false)
    #[serde(default)]
    pub keep_local: bool,

    /// CSV output format
    #[serde(default)]
    pub csv: CsvFormat,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            query_dir: PathBuf::new(),
            work_dir: default_work_dir(),
            mode: ExportMode::default(),
            keep_local: false,
            csv: CsvFormat::default(),
        }
    }
}

/// Authentication method for the remote file drop
///
/// Exactly one method applies; the enum makes a mixed or absent
/// configuration unrepresentable.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum DeliveryAuth {
    /// Key-based authentication (preferred)
    Key {
        /// Path to the private key file
        identity_file: PathBuf,
    },
    /// Password-based authentication
    ///
    /// Requires the `sshpass` helper so the secret is injected through the
    /// environment rather than an argument list.
    Password {
        /// The password
        password: String,
    },
}

/// Host-trust policy for the remote endpoint
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum HostTrust {
    /// No host verification (logged as a warning)
    Insecure,
    /// Verify against a caller-supplied known-hosts file
    KnownHosts {
        /// Path to the known-hosts file
        file: PathBuf,
    },
    /// Fetch the host identity once per run and verify against it (default)
    #[default]
    Fetch,
}

/// Remote delivery configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Remote hostname
    pub host: String,

    /// Remote port (default: 22)
    #[serde(default = "default_delivery_port")]
    pub port: u16,

    /// Username on the remote host
    pub username: String,

    /// Authentication method
    pub auth: DeliveryAuth,

    /// Remote directory artifacts are dropped into
    pub remote_dir: String,

    /// Host-trust policy
    #[serde(default)]
    pub host_trust: HostTrust,

    /// Retry settings for the host-identity fetch
    #[serde(default)]
    pub keyscan_retry: FixedRetryConfig,
}

/// Bounded retry with a fixed sleep between attempts
///
/// Used only for the host-identity fetch; uploads are not retried
/// internally.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FixedRetryConfig {
    /// Maximum number of attempts (default: 3)
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in seconds (default: 2)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub delay: Duration,
}

impl Default for FixedRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            delay: default_retry_delay(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level directive (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file; stderr when absent
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

// Default value functions
fn default_database_port() -> u16 {
    3306
}

fn default_delivery_port() -> u16 {
    22
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("exports")
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_log_level() -> String {
    "info".to_string()
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_delivery_port(),
            username: String::new(),
            auth: DeliveryAuth::Key {
                identity_file: PathBuf::new(),
            },
            remote_dir: String::new(),
            host_trust: HostTrust::default(),
            keyscan_retry: FixedRetryConfig::default(),
        }
    }
}
