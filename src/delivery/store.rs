//! SFTP transport over the OpenSSH client binaries
//!
//! Every operation is a batch script fed to `sftp -b -` on stdin, with
//! all invocation parameters passed as structured argument lists. No
//! shell assembles any part of a command line, so paths and credentials
//! never get re-interpreted. Password authentication goes through the
//! `sshpass` helper with the secret injected via the environment
//! (`sshpass -e`); the secret never appears on an argument list.

use super::{DeliveryTarget, RemoteStore, known_hosts};
use crate::config::{DeliveryAuth, FixedRetryConfig, HostTrust};
use crate::error::DeliveryError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Resolved host-trust material for one run
enum TrustRecord {
    /// No verification; every batch disables strict checking
    Insecure,
    /// Caller-supplied known-hosts file
    File(PathBuf),
    /// Freshly fetched record; the temp file lives as long as the store
    Fetched(NamedTempFile),
}

impl TrustRecord {
    fn known_hosts_file(&self) -> Option<&Path> {
        match self {
            TrustRecord::Insecure => None,
            TrustRecord::File(path) => Some(path),
            TrustRecord::Fetched(file) => Some(file.path()),
        }
    }
}

/// [`RemoteStore`] implementation driving the OpenSSH `sftp` client
pub struct SftpStore {
    sftp: PathBuf,
    credential_helper: Option<PathBuf>,
    target: DeliveryTarget,
    trust: TrustRecord,
}

impl SftpStore {
    /// Discover client binaries and resolve trust material for `target`
    ///
    /// Fails fast when the `sftp` client is missing, when password
    /// authentication is configured without the `sshpass` helper, or
    /// when the host identity record cannot be fetched.
    pub async fn prepare(
        target: DeliveryTarget,
        keyscan_retry: &FixedRetryConfig,
    ) -> Result<Self, DeliveryError> {
        let sftp = which::which("sftp").map_err(|_| DeliveryError::ClientMissing {
            binary: "sftp".into(),
        })?;

        let credential_helper = match &target.auth {
            DeliveryAuth::Password { .. } => Some(
                which::which("sshpass").map_err(|_| DeliveryError::MissingCredentialHelper)?,
            ),
            DeliveryAuth::Key { .. } => None,
        };

        let trust = match &target.host_trust {
            HostTrust::Insecure => {
                tracing::warn!(
                    host = %target.host,
                    "host identity verification is disabled for this run"
                );
                TrustRecord::Insecure
            }
            HostTrust::KnownHosts { file } => TrustRecord::File(file.clone()),
            HostTrust::Fetch => TrustRecord::Fetched(
                known_hosts::fetch(&target.host, target.port, keyscan_retry).await?,
            ),
        };

        Ok(Self {
            sftp,
            credential_helper,
            target,
            trust,
        })
    }

    /// Build the client invocation for one batch
    fn command(&self) -> Command {
        let mut cmd = match (&self.credential_helper, &self.target.auth) {
            (Some(helper), DeliveryAuth::Password { password }) => {
                let mut cmd = Command::new(helper);
                cmd.arg("-e").arg(&self.sftp);
                cmd.env("SSHPASS", password);
                cmd
            }
            _ => Command::new(&self.sftp),
        };

        cmd.arg("-b").arg("-");
        cmd.arg("-P").arg(self.target.port.to_string());

        match self.trust.known_hosts_file() {
            Some(file) => {
                cmd.arg("-o").arg("StrictHostKeyChecking=yes");
                cmd.arg("-o")
                    .arg(format!("UserKnownHostsFile={}", file.display()));
            }
            None => {
                cmd.arg("-o").arg("StrictHostKeyChecking=no");
                cmd.arg("-o").arg("UserKnownHostsFile=/dev/null");
            }
        }

        if let DeliveryAuth::Key { identity_file } = &self.target.auth {
            cmd.arg("-o").arg("BatchMode=yes");
            cmd.arg("-i").arg(identity_file);
        }

        cmd.arg(format!("{}@{}", self.target.username, self.target.host));
        cmd
    }

    async fn run_batch(
        &self,
        operation: &str,
        batch: &str,
    ) -> Result<std::process::Output, DeliveryError> {
        let mut cmd = self.command();
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| DeliveryError::Transport {
            operation: operation.to_string(),
            detail: format!("failed to execute sftp: {e}"),
        })?;

        let mut stdin = child.stdin.take().ok_or_else(|| DeliveryError::Transport {
            operation: operation.to_string(),
            detail: "could not open sftp stdin".into(),
        })?;
        stdin
            .write_all(batch.as_bytes())
            .await
            .map_err(|e| DeliveryError::Transport {
                operation: operation.to_string(),
                detail: format!("failed to send batch: {e}"),
            })?;
        drop(stdin);

        child
            .wait_with_output()
            .await
            .map_err(|e| DeliveryError::Transport {
                operation: operation.to_string(),
                detail: e.to_string(),
            })
    }

    fn transport_error(operation: &str, output: &std::process::Output) -> DeliveryError {
        DeliveryError::Transport {
            operation: operation.to_string(),
            detail: stderr_detail(output),
        }
    }
}

#[async_trait]
impl RemoteStore for SftpStore {
    async fn check_connectivity(&self) -> Result<(), DeliveryError> {
        let output = self.run_batch("connectivity check", "pwd\n").await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::transport_error("connectivity check", &output))
        }
    }

    async fn dir_exists(&self, dir: &str) -> Result<bool, DeliveryError> {
        let batch = format!("cd {}\n", quote(dir));
        let output = self.run_batch("directory probe", &batch).await?;
        if output.status.success() {
            return Ok(true);
        }
        let detail = stderr_detail(&output);
        if is_absence(&detail) {
            Ok(false)
        } else {
            Err(DeliveryError::Transport {
                operation: "directory probe".into(),
                detail,
            })
        }
    }

    async fn make_dir(&self, dir: &str) -> Result<(), DeliveryError> {
        let batch = format!("mkdir {}\n", quote(dir));
        let output = self.run_batch("mkdir", &batch).await?;
        if output.status.success() {
            return Ok(());
        }
        let detail = stderr_detail(&output);
        if is_permission_denied(&detail) {
            Err(DeliveryError::CreateDenied {
                dir: dir.to_string(),
            })
        } else {
            Err(DeliveryError::Transport {
                operation: "mkdir".into(),
                detail,
            })
        }
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<(), DeliveryError> {
        let batch = format!(
            "put {} {}\n",
            quote(&local.to_string_lossy()),
            quote(remote)
        );
        let output = self.run_batch("upload", &batch).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::transport_error("upload", &output))
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), DeliveryError> {
        // A dash-prefixed rm tolerates the target being absent; the
        // rename itself must succeed for the item to count as delivered.
        let batch = format!("-rm {}\nrename {} {}\n", quote(to), quote(from), quote(to));
        let output = self.run_batch("rename", &batch).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::transport_error("rename", &output))
        }
    }
}

/// Quote a path for an sftp batch line
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn stderr_detail(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        format!("sftp exited with {}", output.status)
    } else {
        trimmed.to_string()
    }
}

fn is_permission_denied(detail: &str) -> bool {
    detail.to_ascii_lowercase().contains("permission denied")
}

fn is_absence(detail: &str) -> bool {
    let lower = detail.to_ascii_lowercase();
    lower.contains("no such file") || lower.contains("not found")
}
