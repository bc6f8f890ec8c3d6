//! Error kinds for the training pipeline.
//!
//! Each component returns its own closed error enum so callers can branch
//! on the kind of failure instead of matching on messages. The orchestrator
//! folds them into [`PipelineError`].

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::StageName;

/// A stage could not produce its artifact
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Stage '{stage}' failed to start: {message}")]
    Spawn { stage: StageName, message: String },

    #[error("Stage '{stage}' timed out after {timeout_seconds}s")]
    Timeout {
        stage: StageName,
        timeout_seconds: u64,
    },

    #[error("Stage '{stage}' exited with code {exit_code}: {stderr}")]
    Exited {
        stage: StageName,
        exit_code: i32,
        stderr: String,
    },

    #[error("Stage '{stage}' produced an invalid artifact: {message}")]
    InvalidOutput { stage: StageName, message: String },

    #[error("Stage '{stage}' is not configured")]
    NotConfigured { stage: StageName },

    #[error("Stage '{stage}' failed: {message}")]
    Failed { stage: StageName, message: String },
}

impl StageError {
    /// Stage that raised the error
    pub fn stage(&self) -> StageName {
        match self {
            Self::Spawn { stage, .. }
            | Self::Timeout { stage, .. }
            | Self::Exited { stage, .. }
            | Self::InvalidOutput { stage, .. }
            | Self::NotConfigured { stage }
            | Self::Failed { stage, .. } => *stage,
        }
    }
}

/// A version registry was missing or malformed when a path was required
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Version root does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("Version root contains no versions: {0}")]
    NoVersions(PathBuf),

    #[error("Version directory name '{name}' under {root} is not a non-negative integer")]
    MalformedVersion { root: PathBuf, name: String },

    #[error("Failed to read version root {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Publishing the accepted artifacts failed
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Source artifact does not exist: {0}")]
    MissingSource(PathBuf),

    #[error("Version {version} already exists under {root}")]
    VersionExists { root: PathBuf, version: u64 },

    #[error("Publish stopped after writing {} file(s): {source}", .published.len())]
    Partial {
        published: Vec<PathBuf>,
        #[source]
        source: Box<PublishError>,
    },

    #[error("Failed to publish {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Remote synchronization could not complete
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Invalid remote location '{0}' (expected scheme://bucket/prefix)")]
    InvalidLocation(String),

    #[error("Unsupported remote scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("Invalid exclude pattern '{pattern}': {message}")]
    InvalidExclude { pattern: String, message: String },

    #[error("Failed to spawn sync command '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sync to {remote} timed out after {timeout_seconds}s")]
    Timeout { remote: String, timeout_seconds: u64 },

    #[error("Sync command exited with code {exit_code}: {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    #[error("Mirror I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Closed set of failure kinds a caller can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AlreadyRunning,
    Stage,
    ModelNotAccepted,
    Registry,
    Publish,
    Mirror,
    Storage,
}

/// Failure of a whole pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Training pipeline is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("Trained model is not better than the best model: {reason}")]
    ModelNotAccepted { reason: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error("Artifact storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyRunning => ErrorKind::AlreadyRunning,
            Self::Stage(_) => ErrorKind::Stage,
            Self::ModelNotAccepted { .. } => ErrorKind::ModelNotAccepted,
            Self::Registry(_) => ErrorKind::Registry,
            Self::Publish(_) => ErrorKind::Publish,
            Self::Mirror(_) => ErrorKind::Mirror,
            Self::Storage { .. } => ErrorKind::Storage,
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = PipelineError::from(StageError::NotConfigured {
            stage: StageName::ModelTrainer,
        });
        assert_eq!(err.kind(), ErrorKind::Stage);

        let err = PipelineError::ModelNotAccepted {
            reason: "improvement 0.01 below threshold 0.02".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ModelNotAccepted);

        let err = PipelineError::from(MirrorError::UnsupportedScheme("gs".to_string()));
        assert_eq!(err.kind(), ErrorKind::Mirror);
    }

    #[test]
    fn test_partial_publish_message() {
        let err = PublishError::Partial {
            published: vec![PathBuf::from("/models/t/7/preprocessing.pkl")],
            source: Box::new(PublishError::MissingSource(PathBuf::from("/tmp/model.pkl"))),
        };
        assert!(err.to_string().contains("1 file(s)"));
    }

    #[test]
    fn test_stage_error_reports_stage() {
        let err = StageError::Timeout {
            stage: StageName::DataIngestion,
            timeout_seconds: 5,
        };
        assert_eq!(err.stage(), StageName::DataIngestion);
        assert!(err.to_string().contains("data_ingestion"));
    }
}
