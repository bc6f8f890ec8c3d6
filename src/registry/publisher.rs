//! Publishing of accepted models ("pusher").
//!
//! The transformer and the model are each copied twice: into the run's
//! `model_pusher` directory and into a new version directory under their
//! version root. A version directory is assembled in a hidden staging
//! directory inside the root and renamed into place in one step, so the
//! resolver only ever sees complete versions.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, instrument, warn};

use crate::domain::{ModelPusherArtifact, ModelPusherConfig};
use crate::error::PublishError;

use super::digest::compute_hash;

/// Copies a run's winning artifacts into the serving roots
pub struct ArtifactPublisher {
    config: ModelPusherConfig,
}

impl ArtifactPublisher {
    pub fn new(config: ModelPusherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelPusherConfig {
        &self.config
    }

    /// Publish the transformer and model of one run.
    ///
    /// Each version root gets its own atomic rename; the two roots are not
    /// updated together. If the model cannot be published after the
    /// transformer was, the error is [`PublishError::Partial`] and lists
    /// every file already written.
    #[instrument(skip(self), fields(version = self.config.version))]
    pub async fn publish(
        &self,
        transformer_source: &Path,
        model_source: &Path,
    ) -> Result<ModelPusherArtifact, PublishError> {
        for source in [transformer_source, model_source] {
            if !source.is_file() {
                return Err(PublishError::MissingSource(source.to_path_buf()));
            }
        }

        let transformer_bytes = read_source(transformer_source).await?;
        let model_bytes = read_source(model_source).await?;

        let mut published = Vec::new();
        let result = self
            .publish_all(&transformer_bytes, &model_bytes, &mut published)
            .await;

        match result {
            Ok(()) => {
                let artifact = ModelPusherArtifact {
                    version: self.config.version,
                    saved_model_path: self.config.saved_model_path(),
                    model_file_path: self.config.model_file_path(),
                    saved_transformer_path: self.config.saved_transformer_path(),
                    transformer_file_path: self.config.transformer_file_path(),
                    model_digest: compute_hash(&model_bytes),
                    transformer_digest: compute_hash(&transformer_bytes),
                };
                info!(
                    model = %artifact.saved_model_path.display(),
                    transformer = %artifact.saved_transformer_path.display(),
                    "Published model version"
                );
                Ok(artifact)
            }
            Err(e) if published.is_empty() => Err(e),
            Err(e) => {
                warn!(written = published.len(), error = %e, "Publish stopped partway");
                Err(PublishError::Partial {
                    published,
                    source: Box::new(e),
                })
            }
        }
    }

    async fn publish_all(
        &self,
        transformer_bytes: &[u8],
        model_bytes: &[u8],
        published: &mut Vec<PathBuf>,
    ) -> Result<(), PublishError> {
        let config = &self.config;

        let path = config.transformer_file_path();
        write_atomic(&path, transformer_bytes).await?;
        published.push(path);

        published.push(
            publish_version(
                &config.transformer_root,
                config.version,
                &config.transformer_file_name,
                transformer_bytes,
            )
            .await?,
        );

        let path = config.model_file_path();
        write_atomic(&path, model_bytes).await?;
        published.push(path);

        published.push(
            publish_version(
                &config.model_root,
                config.version,
                &config.model_file_name,
                model_bytes,
            )
            .await?,
        );

        Ok(())
    }
}

async fn read_source(path: &Path) -> Result<Vec<u8>, PublishError> {
    fs::read(path).await.map_err(|source| PublishError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PublishError + '_ {
    move |source| PublishError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write a file via temp-then-rename, creating its parent on demand
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PublishError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }

    let temp_path = path.with_extension("tmp");
    write_synced(&temp_path, bytes).await?;
    fs::rename(&temp_path, path).await.map_err(io_error(path))?;

    Ok(())
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), PublishError> {
    fs::write(path, bytes).await.map_err(io_error(path))?;
    let file = fs::File::open(path).await.map_err(io_error(path))?;
    file.sync_all().await.map_err(io_error(path))?;
    Ok(())
}

/// Create `<root>/<version>/<file_name>` atomically, never overwriting a version
async fn publish_version(
    root: &Path,
    version: u64,
    file_name: &str,
    bytes: &[u8],
) -> Result<PathBuf, PublishError> {
    let version_dir = root.join(version.to_string());
    fs::create_dir_all(root).await.map_err(io_error(root))?;

    if version_dir.exists() {
        return Err(PublishError::VersionExists {
            root: root.to_path_buf(),
            version,
        });
    }

    // Dropping the staging dir on an early return removes it
    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(root)
        .map_err(io_error(root))?;

    write_synced(&staging.path().join(file_name), bytes).await?;

    // After a successful rename the drop of `staging` finds nothing to remove
    if let Err(source) = fs::rename(staging.path(), &version_dir).await {
        return Err(if version_dir.exists() {
            PublishError::VersionExists {
                root: root.to_path_buf(),
                version,
            }
        } else {
            PublishError::Io {
                path: version_dir,
                source,
            }
        });
    }

    Ok(version_dir.join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelResolver;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        root: PathBuf,
        transformer: PathBuf,
        model: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let transformer = root.join("src").join("preprocessing.pkl");
        let model = root.join("src").join("model.pkl");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(&transformer, b"transformer-bytes").unwrap();
        std::fs::write(&model, b"model-bytes").unwrap();
        Fixture {
            _temp: temp,
            root,
            transformer,
            model,
        }
    }

    fn config(root: &Path, run: &str, version: u64) -> ModelPusherConfig {
        ModelPusherConfig {
            version,
            model_pusher_dir: root.join("artifact").join(run).join("model_pusher"),
            model_root: root.join("saved_models"),
            transformer_root: root.join("saved_transformers"),
            model_file_name: "model.pkl".to_string(),
            transformer_file_name: "preprocessing.pkl".to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_writes_all_four_files() {
        let fx = fixture();
        let publisher = ArtifactPublisher::new(config(&fx.root, "r1", 100));

        let artifact = publisher.publish(&fx.transformer, &fx.model).await.unwrap();

        assert_eq!(std::fs::read(&artifact.saved_model_path).unwrap(), b"model-bytes");
        assert_eq!(std::fs::read(&artifact.model_file_path).unwrap(), b"model-bytes");
        assert_eq!(
            std::fs::read(&artifact.saved_transformer_path).unwrap(),
            b"transformer-bytes"
        );
        assert_eq!(
            std::fs::read(&artifact.transformer_file_path).unwrap(),
            b"transformer-bytes"
        );
        assert_eq!(artifact.model_digest, compute_hash(b"model-bytes"));

        // No staging leftovers
        let leftovers: Vec<_> = std::fs::read_dir(fx.root.join("saved_models"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_second_publish_becomes_latest() {
        let fx = fixture();

        ArtifactPublisher::new(config(&fx.root, "r1", 100))
            .publish(&fx.transformer, &fx.model)
            .await
            .unwrap();
        let second = ArtifactPublisher::new(config(&fx.root, "r2", 200))
            .publish(&fx.transformer, &fx.model)
            .await
            .unwrap();

        let resolver = ModelResolver::new(fx.root.join("saved_models"), fx.root.join("saved_transformers"));
        assert!(fx.root.join("saved_models").join("100").is_dir());
        assert_eq!(resolver.get_best_model_path().unwrap(), second.saved_model_path);
        assert_eq!(
            resolver.get_best_transformer_path().unwrap(),
            second.saved_transformer_path
        );
    }

    #[tokio::test]
    async fn test_existing_version_is_not_overwritten() {
        let fx = fixture();
        let publisher = ArtifactPublisher::new(config(&fx.root, "r1", 100));
        publisher.publish(&fx.transformer, &fx.model).await.unwrap();

        std::fs::write(&fx.model, b"new-model").unwrap();
        let err = publisher.publish(&fx.transformer, &fx.model).await.unwrap_err();

        // The transformer copy under the run dir was rewritten before the
        // version collision was detected
        match err {
            PublishError::Partial { published, source } => {
                assert_eq!(published.len(), 1);
                assert!(matches!(*source, PublishError::VersionExists { version: 100, .. }));
            }
            other => panic!("expected partial publish, got {other:?}"),
        }
        assert_eq!(
            std::fs::read(fx.root.join("saved_models/100/model.pkl")).unwrap(),
            b"model-bytes"
        );
    }

    #[tokio::test]
    async fn test_model_failure_after_transformer_is_partial() {
        let fx = fixture();
        let cfg = config(&fx.root, "r1", 100);
        // Occupy the model version so only the transformer side succeeds
        std::fs::create_dir_all(cfg.model_root.join("100")).unwrap();

        let err = ArtifactPublisher::new(cfg.clone())
            .publish(&fx.transformer, &fx.model)
            .await
            .unwrap_err();

        match err {
            PublishError::Partial { published, .. } => {
                assert!(published.contains(&cfg.saved_transformer_path()));
                assert!(!published.contains(&cfg.saved_model_path()));
            }
            other => panic!("expected partial publish, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_source_writes_nothing() {
        let fx = fixture();
        let missing = fx.root.join("src").join("absent.pkl");

        let err = ArtifactPublisher::new(config(&fx.root, "r1", 100))
            .publish(&fx.transformer, &missing)
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::MissingSource(ref p) if p == &missing));
        assert!(!fx.root.join("saved_transformers").exists());
    }
}
