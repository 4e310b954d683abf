//! Per-run host identity records
//!
//! When the trust policy is `Fetch`, the remote host's public keys are
//! scanned once per run with `ssh-keyscan` and written to a temporary
//! known-hosts file that the transport verifies against. The record
//! lives exactly as long as the run: the temp file is removed when the
//! store is dropped.
//!
//! The fetch is the one place in the pipeline with internal retry:
//! bounded attempts with a fixed sleep, since a drop box that was just
//! rebooted is the common transient here.

use crate::config::FixedRetryConfig;
use crate::error::DeliveryError;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::process::Command;

/// Fetch the host identity record for `host`, retrying on failure
pub(crate) async fn fetch(
    host: &str,
    port: u16,
    retry: &FixedRetryConfig,
) -> Result<NamedTempFile, DeliveryError> {
    let keyscan = which::which("ssh-keyscan").map_err(|_| DeliveryError::ClientMissing {
        binary: "ssh-keyscan".into(),
    })?;
    fetch_with(&keyscan, host, port, retry).await
}

/// Fetch using an explicit `ssh-keyscan` binary
async fn fetch_with(
    keyscan: &Path,
    host: &str,
    port: u16,
    retry: &FixedRetryConfig,
) -> Result<NamedTempFile, DeliveryError> {
    let max_attempts = retry.max_attempts.max(1);
    let mut last_detail = String::new();

    for attempt in 1..=max_attempts {
        let output = Command::new(keyscan)
            .arg("-p")
            .arg(port.to_string())
            .arg("-T")
            .arg("10")
            .arg(host)
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() && !out.stdout.is_empty() => {
                let mut file = NamedTempFile::new().map_err(|e| DeliveryError::Transport {
                    operation: "known-hosts write".into(),
                    detail: e.to_string(),
                })?;
                file.write_all(&out.stdout)
                    .and_then(|()| file.flush())
                    .map_err(|e| DeliveryError::Transport {
                        operation: "known-hosts write".into(),
                        detail: e.to_string(),
                    })?;
                tracing::debug!(host, attempt, "host identity record fetched");
                return Ok(file);
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                last_detail = if stderr.trim().is_empty() {
                    "no host keys returned".to_string()
                } else {
                    stderr.trim().to_string()
                };
            }
            Err(e) => last_detail = e.to_string(),
        }

        if attempt < max_attempts {
            tracing::warn!(
                host,
                attempt,
                max_attempts,
                detail = %last_detail,
                "host identity fetch failed, retrying"
            );
            tokio::time::sleep(retry.delay).await;
        }
    }

    Err(DeliveryError::HostIdentityUnavailable {
        host: host.to_string(),
        detail: last_detail,
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quick_retry(max_attempts: u32) -> FixedRetryConfig {
        FixedRetryConfig {
            max_attempts,
            delay: Duration::from_millis(10),
        }
    }

    #[cfg(unix)]
    fn fake_keyscan(dir: &Path, script_body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-keyscan");
        std::fs::write(&path, format!("#!/bin/sh\n{script_body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_scan_writes_record_to_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let keyscan = fake_keyscan(
            dir.path(),
            r#"echo "drop.example.com ssh-ed25519 AAAAC3NzaC1lZDI1NTE5""#,
        );

        let record = fetch_with(&keyscan, "drop.example.com", 22, &quick_retry(1))
            .await
            .unwrap();

        let content = std::fs::read_to_string(record.path()).unwrap();
        assert!(content.contains("drop.example.com ssh-ed25519"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_scan_is_retried_exactly_max_attempts_times() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("attempts");
        let keyscan = fake_keyscan(
            dir.path(),
            &format!("echo x >> {}\nexit 1", counter.display()),
        );

        let err = fetch_with(&keyscan, "drop.example.com", 22, &quick_retry(3))
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::HostIdentityUnavailable { .. }));
        let attempts = std::fs::read_to_string(&counter).unwrap().lines().count();
        assert_eq!(attempts, 3, "bounded attempts, no more");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn empty_scan_output_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        // Exits 0 but prints nothing: some keyscan builds do this when
        // the host answers on the port without speaking SSH
        let keyscan = fake_keyscan(dir.path(), "exit 0");

        let err = fetch_with(&keyscan, "drop.example.com", 22, &quick_retry(2))
            .await
            .unwrap_err();

        match err {
            DeliveryError::HostIdentityUnavailable { detail, .. } => {
                assert!(detail.contains("no host keys"));
            }
            other => panic!("expected HostIdentityUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_surfaces_after_attempts() {
        let err = fetch_with(
            Path::new("/nonexistent/ssh-keyscan"),
            "drop.example.com",
            22,
            &quick_retry(1),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DeliveryError::HostIdentityUnavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zero_max_attempts_still_tries_once() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("attempts");
        let keyscan = fake_keyscan(
            dir.path(),
            &format!("echo x >> {}\nexit 1", counter.display()),
        );

        let _ = fetch_with(&keyscan, "h", 22, &quick_retry(0)).await;

        let attempts = std::fs::read_to_string(&counter).unwrap().lines().count();
        assert_eq!(attempts, 1);
    }
}
