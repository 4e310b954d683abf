//! Remote delivery — atomic write-then-rename file drop
//!
//! Artifacts are uploaded under a temporary `.part` name and renamed to
//! the final name only after the full byte content has transferred, so a
//! partial or interrupted transfer never produces a visible artifact on
//! the remote side.
//!
//! The transport sits behind the [`RemoteStore`] trait; production uses
//! [`store::SftpStore`] over the OpenSSH client binaries, tests use an
//! in-memory fake. The directory preflight returns a possibly-updated
//! [`DeliveryTarget`] rather than mutating in place: when absolute-path
//! creation is denied, the same progressive-creation procedure runs
//! against a home-relative rewrite, and the rewritten target is what the
//! rest of the run uses.

pub mod known_hosts;
pub mod store;

use crate::config::{DeliveryAuth, DeliveryConfig, HostTrust};
use crate::error::{DeliveryError, Result};
use crate::export::ExportArtifact;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Remote endpoint, credential, directory, and trust policy for one run
#[derive(Debug, Clone)]
pub struct DeliveryTarget {
    /// Remote hostname
    pub host: String,
    /// Remote port
    pub port: u16,
    /// Username on the remote host
    pub username: String,
    /// Authentication method (exactly one)
    pub auth: DeliveryAuth,
    /// Remote directory artifacts land in
    pub remote_dir: String,
    /// Host-trust policy
    pub host_trust: HostTrust,
}

impl DeliveryTarget {
    /// Build the target from delivery configuration
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            auth: config.auth.clone(),
            remote_dir: config.remote_dir.clone(),
            host_trust: config.host_trust.clone(),
        }
    }
}

/// Transport operations against the remote file store
///
/// One implementation per transport; the trait exists so delivery
/// semantics (progressive directory creation, the rename protocol, the
/// home-relative fallback) are testable without a network.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// No-op round-trip against the endpoint
    async fn check_connectivity(&self) -> std::result::Result<(), DeliveryError>;

    /// Whether `dir` exists on the remote store
    async fn dir_exists(&self, dir: &str) -> std::result::Result<bool, DeliveryError>;

    /// Create a single directory
    async fn make_dir(&self, dir: &str) -> std::result::Result<(), DeliveryError>;

    /// Write the local file's bytes to `remote`
    async fn upload(&self, local: &Path, remote: &str)
    -> std::result::Result<(), DeliveryError>;

    /// Atomically rename `from` to `to` on the remote store
    async fn rename(&self, from: &str, to: &str) -> std::result::Result<(), DeliveryError>;
}

/// Uploads artifacts to a remote file drop through a [`RemoteStore`]
pub struct RemoteDelivery {
    store: Arc<dyn RemoteStore>,
}

impl RemoteDelivery {
    /// Create a delivery front end over the given store
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// One-time connectivity and directory preflight
    ///
    /// Returns the target to use for the rest of the run: identical to
    /// the input unless the remote directory had to be rewritten to its
    /// home-relative form.
    pub async fn preflight(&self, target: &DeliveryTarget) -> Result<DeliveryTarget> {
        self.store
            .check_connectivity()
            .await
            .map_err(|e| DeliveryError::Unreachable {
                host: target.host.clone(),
                port: target.port,
                detail: e.to_string(),
            })?;

        match self.ensure_dir(&target.remote_dir).await {
            Ok(()) => Ok(target.clone()),
            Err(DeliveryError::CreateDenied { dir })
                if target.remote_dir.starts_with('/') =>
            {
                let relative = home_relative(&target.remote_dir);
                tracing::warn!(
                    denied = %dir,
                    fallback = %relative,
                    "absolute remote path denied, retrying home-relative"
                );
                match self.ensure_dir(&relative).await {
                    Ok(()) => {
                        let mut updated = target.clone();
                        updated.remote_dir = relative;
                        Ok(updated)
                    }
                    Err(e) => Err(DeliveryError::RemoteDirUnavailable {
                        dir: target.remote_dir.clone(),
                        detail: e.to_string(),
                    }
                    .into()),
                }
            }
            Err(e) => Err(DeliveryError::RemoteDirUnavailable {
                dir: target.remote_dir.clone(),
                detail: e.to_string(),
            }
            .into()),
        }
    }

    /// Probe the full path; when absent, create components progressively
    /// from the root
    async fn ensure_dir(&self, dir: &str) -> std::result::Result<(), DeliveryError> {
        if self.store.dir_exists(dir).await? {
            return Ok(());
        }

        let absolute = dir.starts_with('/');
        let mut prefix = String::new();
        for component in dir.split('/').filter(|c| !c.is_empty()) {
            if prefix.is_empty() {
                prefix = if absolute {
                    format!("/{component}")
                } else {
                    component.to_string()
                };
            } else {
                prefix = format!("{prefix}/{component}");
            }
            if !self.store.dir_exists(&prefix).await? {
                self.store.make_dir(&prefix).await?;
            }
        }
        Ok(())
    }

    /// Upload the artifact under its `.part` name, then rename
    ///
    /// Only a successful rename counts as delivered.
    pub async fn deliver(&self, artifact: &ExportArtifact, target: &DeliveryTarget) -> Result<()> {
        let final_name = remote_path(&target.remote_dir, &artifact.remote_name);
        let part_name = format!("{final_name}.part");

        self.store.upload(&artifact.path, &part_name).await?;
        self.store.rename(&part_name, &final_name).await?;

        tracing::info!(
            artifact = %artifact.path.display(),
            remote = %final_name,
            "artifact delivered"
        );
        Ok(())
    }
}

/// Rewrite an absolute path to its home-relative form
fn home_relative(dir: &str) -> String {
    dir.trim_start_matches('/').to_string()
}

fn remote_path(dir: &str, name: &str) -> String {
    format!("{}/{name}", dir.trim_end_matches('/'))
}
