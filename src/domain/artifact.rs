//! Artifacts produced by training stages.
//!
//! Each stage returns exactly one artifact record. Artifacts are immutable:
//! downstream stages receive them by value or reference and build a new one.

use std::fmt;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Stages of a training run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    DataIngestion,
    DataValidation,
    DataTransformation,
    ModelTrainer,
    ModelEvaluation,
    ModelPusher,
}

impl StageName {
    /// Fixed execution order; no stage may be skipped or reordered
    pub const ORDER: [StageName; 6] = [
        StageName::DataIngestion,
        StageName::DataValidation,
        StageName::DataTransformation,
        StageName::ModelTrainer,
        StageName::ModelEvaluation,
        StageName::ModelPusher,
    ];

    /// Directory name of this stage inside a run directory
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataIngestion => "data_ingestion",
            Self::DataValidation => "data_validation",
            Self::DataTransformation => "data_transformation",
            Self::ModelTrainer => "model_trainer",
            Self::ModelEvaluation => "model_evaluation",
            Self::ModelPusher => "model_pusher",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An artifact record tied to the stage that produces it
pub trait StageArtifact: Serialize + DeserializeOwned + Send {
    const STAGE: StageName;
}

/// Train/test splits written by ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIngestionArtifact {
    pub trained_file_path: PathBuf,
    pub test_file_path: PathBuf,
}

impl StageArtifact for DataIngestionArtifact {
    const STAGE: StageName = StageName::DataIngestion;
}

/// Validation verdict and where the validated/invalid data ended up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValidationArtifact {
    pub validation_status: bool,
    pub valid_train_file_path: PathBuf,
    pub valid_test_file_path: PathBuf,
    #[serde(default)]
    pub invalid_train_file_path: Option<PathBuf>,
    #[serde(default)]
    pub invalid_test_file_path: Option<PathBuf>,
    pub drift_report_file_path: PathBuf,
}

impl StageArtifact for DataValidationArtifact {
    const STAGE: StageName = StageName::DataValidation;
}

/// Fitted transformer object and transformed arrays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTransformationArtifact {
    pub transformed_object_file_path: PathBuf,
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
}

impl StageArtifact for DataTransformationArtifact {
    const STAGE: StageName = StageName::DataTransformation;
}

/// Classification scores reported by the trainer and evaluator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetric {
    pub f1_score: f64,
    pub precision_score: f64,
    pub recall_score: f64,
}

/// Trained model plus its train/test metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTrainerArtifact {
    pub trained_model_file_path: PathBuf,
    pub train_metric_artifact: ClassificationMetric,
    pub test_metric_artifact: ClassificationMetric,
}

impl StageArtifact for ModelTrainerArtifact {
    const STAGE: StageName = StageName::ModelTrainer;
}

/// Acceptance decision for the candidate model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluationArtifact {
    pub is_model_accepted: bool,
    /// Score delta of the candidate over the current best model
    pub improved_accuracy: f64,
    /// Current production model, absent on the first ever run
    #[serde(default)]
    pub best_model_path: Option<PathBuf>,
    pub trained_model_path: PathBuf,
    #[serde(default)]
    pub train_model_metric_artifact: Option<ClassificationMetric>,
    #[serde(default)]
    pub best_model_metric_artifact: Option<ClassificationMetric>,
}

impl StageArtifact for ModelEvaluationArtifact {
    const STAGE: StageName = StageName::ModelEvaluation;
}

/// Final locations of a published model and transformer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPusherArtifact {
    /// Version directory name both files were published under
    pub version: u64,
    /// `<model_root>/<version>/model.pkl`
    pub saved_model_path: PathBuf,
    /// Run-scoped copy under the run's model_pusher directory
    pub model_file_path: PathBuf,
    /// `<transformer_root>/<version>/preprocessing.pkl`
    pub saved_transformer_path: PathBuf,
    /// Run-scoped copy under the run's model_pusher directory
    pub transformer_file_path: PathBuf,
    /// "sha256:<hex>" of the published model bytes
    pub model_digest: String,
    /// "sha256:<hex>" of the published transformer bytes
    pub transformer_digest: String,
}

impl StageArtifact for ModelPusherArtifact {
    const STAGE: StageName = StageName::ModelPusher;
}
