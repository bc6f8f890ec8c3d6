//! Adapter interfaces for external systems.
//!
//! Two seams leave the crate:
//! - `TrainingStages`: the statistical work of each stage
//! - `RemoteMirror`: one-directional sync of a directory to an object store

pub mod aws;
pub mod command;
pub mod local;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::RemoteSettings;
use crate::domain::{
    DataIngestionArtifact, DataIngestionConfig, DataTransformationArtifact,
    DataTransformationConfig, DataValidationArtifact, DataValidationConfig,
    ModelEvaluationArtifact, ModelEvaluationConfig, ModelTrainerArtifact, ModelTrainerConfig,
    PipelineRun,
};
use crate::error::{MirrorError, StageError};

pub use aws::AwsCliMirror;
pub use command::CommandStages;
pub use local::LocalMirror;

/// The five externally implemented stages.
///
/// Each stage reads the artifacts of earlier stages and returns a new one.
/// The orchestrator never looks inside a stage.
#[async_trait]
pub trait TrainingStages: Send + Sync {
    /// Human-readable implementation name
    fn name(&self) -> &str;

    async fn ingest(
        &self,
        run: &PipelineRun,
        config: &DataIngestionConfig,
    ) -> Result<DataIngestionArtifact, StageError>;

    async fn validate(
        &self,
        run: &PipelineRun,
        ingestion: &DataIngestionArtifact,
        config: &DataValidationConfig,
    ) -> Result<DataValidationArtifact, StageError>;

    async fn transform(
        &self,
        run: &PipelineRun,
        validation: &DataValidationArtifact,
        config: &DataTransformationConfig,
    ) -> Result<DataTransformationArtifact, StageError>;

    async fn train(
        &self,
        run: &PipelineRun,
        transformation: &DataTransformationArtifact,
        config: &ModelTrainerConfig,
    ) -> Result<ModelTrainerArtifact, StageError>;

    async fn evaluate(
        &self,
        run: &PipelineRun,
        validation: &DataValidationArtifact,
        trainer: &ModelTrainerArtifact,
        config: &ModelEvaluationConfig,
    ) -> Result<ModelEvaluationArtifact, StageError>;
}

/// Trait for remote stores that a directory can be mirrored to
#[async_trait]
pub trait RemoteMirror: Send + Sync {
    fn name(&self) -> &str;

    /// Upload files present locally but absent or changed remotely.
    /// Extra remote files are left alone.
    async fn mirror_to_remote(
        &self,
        local_dir: &Path,
        remote: &RemoteLocation,
    ) -> Result<(), MirrorError>;

    /// Download files present remotely but absent or changed locally
    async fn mirror_from_remote(
        &self,
        remote: &RemoteLocation,
        local_dir: &Path,
    ) -> Result<(), MirrorError>;
}

/// A `scheme://bucket/prefix` address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub scheme: String,
    pub bucket: String,
    pub prefix: String,
}

impl RemoteLocation {
    pub fn parse(url: &str) -> Result<Self, MirrorError> {
        let invalid = || MirrorError::InvalidLocation(url.to_string());

        let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
        if scheme.is_empty() {
            return Err(invalid());
        }

        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        // file:///abs/path has an empty bucket
        if bucket.is_empty() && scheme != "file" {
            return Err(invalid());
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        })
    }

    /// Append a path segment to the prefix
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.trim_matches('/');
        let prefix = if self.prefix.is_empty() {
            segment.to_string()
        } else {
            format!("{}/{}", self.prefix, segment)
        };
        Self {
            prefix,
            ..self.clone()
        }
    }

    /// Filesystem path of a `file://` location
    pub fn local_path(&self) -> PathBuf {
        if self.bucket.is_empty() {
            PathBuf::from(format!("/{}", self.prefix))
        } else {
            PathBuf::from(&self.bucket).join(&self.prefix)
        }
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}://{}", self.scheme, self.bucket)
        } else {
            write!(f, "{}://{}/{}", self.scheme, self.bucket, self.prefix)
        }
    }
}

/// Pick the mirror implementation for a location's scheme
pub fn mirror_for(
    location: &RemoteLocation,
    settings: &RemoteSettings,
) -> Result<Arc<dyn RemoteMirror>, MirrorError> {
    match location.scheme.as_str() {
        "s3" => Ok(Arc::new(
            AwsCliMirror::with_binary_path(&settings.aws_binary)
                .with_timeout(Duration::from_secs(settings.timeout_seconds))
                .with_excludes(settings.exclude.clone()),
        )),
        "file" => Ok(Arc::new(LocalMirror::with_excludes(&settings.exclude)?)),
        other => Err(MirrorError::UnsupportedScheme(other.to_string())),
    }
}
