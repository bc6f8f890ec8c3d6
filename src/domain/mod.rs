//! Domain types for the training pipeline.
//!
//! This module contains the core data structures:
//! - Artifact: One immutable record per stage
//! - Events: Journal entries written during a run
//! - Run: Run identity and replayed run state
//! - StageConfig: Paths and thresholds handed to each stage

pub mod artifact;
pub mod events;
pub mod run;
pub mod stage_config;

// Re-export commonly used types
pub use artifact::{
    ClassificationMetric, DataIngestionArtifact, DataTransformationArtifact,
    DataValidationArtifact, ModelEvaluationArtifact, ModelPusherArtifact, ModelTrainerArtifact,
    StageArtifact, StageName,
};
pub use events::{EventType, PipelineEvent};
pub use run::{PipelineRun, RunRecord, RunState, StageStatus};
pub use stage_config::{
    DataIngestionConfig, DataTransformationConfig, DataValidationConfig, ModelEvaluationConfig,
    ModelPusherConfig, ModelTrainerConfig,
};
