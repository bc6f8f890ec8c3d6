//! Mirroring to a `file://` location.
//!
//! Same additive semantics as `aws s3 sync`: files missing or different on
//! the destination are copied, nothing is deleted.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use glob::Pattern;
use tokio::fs;
use tracing::debug;

use crate::error::MirrorError;
use crate::registry::file_digest;

use super::{RemoteLocation, RemoteMirror};

/// Mirror to a directory on a mounted filesystem
#[derive(Debug, Default)]
pub struct LocalMirror {
    excludes: Vec<Pattern>,
}

impl LocalMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip files whose path relative to the source matches any pattern
    pub fn with_excludes(patterns: &[String]) -> Result<Self, MirrorError> {
        let excludes = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| MirrorError::InvalidExclude {
                    pattern: p.clone(),
                    message: e.msg.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { excludes })
    }

    fn is_excluded(&self, relative: &Path) -> bool {
        let relative = relative.to_string_lossy();
        self.excludes.iter().any(|p| p.matches(&relative))
    }

    /// Copy new or changed files from `source` into `destination`.
    /// Returns the number of files copied.
    pub async fn sync_dir(&self, source: &Path, destination: &Path) -> Result<usize, MirrorError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| MirrorError::Io { path, source }
        };

        if !source.is_dir() {
            return Err(MirrorError::Io {
                path: source.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "source is not a directory"),
            });
        }

        let mut copied = 0;
        let mut pending: Vec<PathBuf> = vec![PathBuf::new()];

        while let Some(relative_dir) = pending.pop() {
            let dir = source.join(&relative_dir);
            let mut entries = fs::read_dir(&dir).await.map_err(io_err(&dir))?;

            while let Some(entry) = entries.next_entry().await.map_err(io_err(&dir))? {
                let relative = relative_dir.join(entry.file_name());
                let file_type = entry.file_type().await.map_err(io_err(&entry.path()))?;

                if file_type.is_dir() {
                    pending.push(relative);
                    continue;
                }
                if !file_type.is_file() || self.is_excluded(&relative) {
                    continue;
                }

                let from = entry.path();
                let to = destination.join(&relative);
                if !needs_copy(&from, &to).await? {
                    continue;
                }

                if let Some(parent) = to.parent() {
                    fs::create_dir_all(parent).await.map_err(io_err(parent))?;
                }
                fs::copy(&from, &to).await.map_err(io_err(&to))?;
                copied += 1;
            }
        }

        debug!(
            source = %source.display(),
            destination = %destination.display(),
            copied,
            "Local sync completed"
        );
        Ok(copied)
    }
}

/// A file needs copying when it is absent or its contents differ
async fn needs_copy(from: &Path, to: &Path) -> Result<bool, MirrorError> {
    let to_meta = match fs::metadata(to).await {
        Ok(meta) => meta,
        Err(_) => return Ok(true),
    };
    let from_meta = fs::metadata(from).await.map_err(|source| MirrorError::Io {
        path: from.to_path_buf(),
        source,
    })?;

    if from_meta.len() != to_meta.len() {
        return Ok(true);
    }

    let (from_digest, to_digest) = tokio::try_join!(file_digest(from), file_digest(to))
        .map_err(|source| MirrorError::Io {
            path: from.to_path_buf(),
            source,
        })?;
    Ok(from_digest != to_digest)
}

#[async_trait]
impl RemoteMirror for LocalMirror {
    fn name(&self) -> &str {
        "local"
    }

    async fn mirror_to_remote(
        &self,
        local_dir: &Path,
        remote: &RemoteLocation,
    ) -> Result<(), MirrorError> {
        self.sync_dir(local_dir, &remote.local_path()).await.map(|_| ())
    }

    async fn mirror_from_remote(
        &self,
        remote: &RemoteLocation,
        local_dir: &Path,
    ) -> Result<(), MirrorError> {
        self.sync_dir(&remote.local_path(), local_dir).await.map(|_| ())
    }
}
