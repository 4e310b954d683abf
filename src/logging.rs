//! Logging setup — tracing-subscriber over the configured sink
//!
//! The library itself only emits `tracing` events; this module is for
//! the binary (or an embedder that wants the same defaults) to install a
//! subscriber: compact timestamped lines, level from configuration, to
//! stderr or an append-mode log file.

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber described by `config`
///
/// Fails when the level directive does not parse, the log file cannot be
/// opened, or a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(&config.level)?;

    let result = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    result.map_err(|e| Error::Config {
        message: format!("could not install log subscriber: {e}"),
        key: None,
    })
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).map_err(|e| Error::Config {
        message: format!("invalid logging.level {level:?}: {e}"),
        key: Some("logging.level".into()),
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_levels_parse() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            build_filter(level).expect(level);
        }
    }

    #[test]
    fn per_target_directives_parse() {
        build_filter("info,sqlx=warn,csvdrop::delivery=debug").unwrap();
    }

    #[test]
    fn invalid_directive_is_a_config_error_with_key() {
        match build_filter("not a level!!") {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("logging.level"));
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }
}
