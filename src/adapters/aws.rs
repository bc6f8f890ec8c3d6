//! S3 mirroring through the `aws` CLI.
//!
//! Runs `aws s3 sync <src> <dst>`, which uploads new and changed files and
//! never deletes extras on the destination.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::MirrorError;

use super::{RemoteLocation, RemoteMirror};

/// Mirror backed by the AWS CLI
pub struct AwsCliMirror {
    /// Path to the aws binary (default: "aws")
    binary_path: String,
    timeout: Duration,
    excludes: Vec<String>,
}

impl Default for AwsCliMirror {
    fn default() -> Self {
        Self::with_binary_path("aws")
    }
}

impl AwsCliMirror {
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            timeout: Duration::from_secs(900),
            excludes: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Patterns passed through as `--exclude`
    pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }

    fn sync_args(&self, source: &str, destination: &str) -> Vec<String> {
        let mut args = vec![
            "s3".to_string(),
            "sync".to_string(),
            source.to_string(),
            destination.to_string(),
        ];
        for pattern in &self.excludes {
            args.push("--exclude".to_string());
            args.push(pattern.clone());
        }
        args
    }

    async fn sync(&self, source: &str, destination: &str) -> Result<(), MirrorError> {
        let args = self.sync_args(source, destination);
        debug!(binary = %self.binary_path, ?args, "Running sync command");

        let child = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MirrorError::Spawn {
                binary: self.binary_path.clone(),
                source,
            })?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| MirrorError::Timeout {
                remote: destination.to_string(),
                timeout_seconds: self.timeout.as_secs(),
            })?
            .map_err(|source| MirrorError::Spawn {
                binary: self.binary_path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(MirrorError::CommandFailed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(%source, %destination, "Sync completed");
        Ok(())
    }
}

#[async_trait]
impl RemoteMirror for AwsCliMirror {
    fn name(&self) -> &str {
        "aws-cli"
    }

    async fn mirror_to_remote(
        &self,
        local_dir: &Path,
        remote: &RemoteLocation,
    ) -> Result<(), MirrorError> {
        self.sync(&local_dir.to_string_lossy(), &remote.to_string())
            .await
    }

    async fn mirror_from_remote(
        &self,
        remote: &RemoteLocation,
        local_dir: &Path,
    ) -> Result<(), MirrorError> {
        self.sync(&remote.to_string(), &local_dir.to_string_lossy())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_args_with_excludes() {
        let mirror = AwsCliMirror::default().with_excludes(vec!["*.tmp".to_string()]);
        let args = mirror.sync_args("/srv/artifact/run", "s3://bucket/artifact/run");

        assert_eq!(
            args,
            vec![
                "s3",
                "sync",
                "/srv/artifact/run",
                "s3://bucket/artifact/run",
                "--exclude",
                "*.tmp"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let mirror = AwsCliMirror::with_binary_path("/nonexistent/aws-cli-binary");
        let remote = RemoteLocation::parse("s3://bucket/prefix").unwrap();

        let err = mirror
            .mirror_to_remote(Path::new("/tmp"), &remote)
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_reports_exit_code() {
        // `false` ignores its arguments and exits 1
        let mirror = AwsCliMirror::with_binary_path("false");
        let remote = RemoteLocation::parse("s3://bucket/prefix").unwrap();

        let err = mirror
            .mirror_from_remote(&remote, Path::new("/tmp"))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::CommandFailed { exit_code: 1, .. }));
    }
}
