//! Per-stage configuration handed to the stage collaborators.
//!
//! Every config carries exactly the paths its stage writes to plus the
//! thresholds it is judged by. They are built by the artifact store from
//! the run directory layout.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIngestionConfig {
    pub data_ingestion_dir: PathBuf,
    pub feature_store_file_path: PathBuf,
    pub training_file_path: PathBuf,
    pub testing_file_path: PathBuf,
    pub train_test_split_ratio: f64,
    pub collection_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValidationConfig {
    pub data_validation_dir: PathBuf,
    pub valid_train_file_path: PathBuf,
    pub valid_test_file_path: PathBuf,
    pub invalid_train_file_path: PathBuf,
    pub invalid_test_file_path: PathBuf,
    pub drift_report_file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTransformationConfig {
    pub data_transformation_dir: PathBuf,
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
    pub transformed_object_file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTrainerConfig {
    pub model_trainer_dir: PathBuf,
    pub trained_model_file_path: PathBuf,
    pub expected_score: f64,
    pub overfitting_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluationConfig {
    pub model_evaluation_dir: PathBuf,
    pub report_file_path: PathBuf,
    pub change_threshold: f64,
    /// Current production model resolved before evaluation starts
    pub best_model_path: Option<PathBuf>,
}

/// Destinations for publishing one accepted run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPusherConfig {
    pub version: u64,
    pub model_pusher_dir: PathBuf,
    pub model_root: PathBuf,
    pub transformer_root: PathBuf,
    pub model_file_name: String,
    pub transformer_file_name: String,
}

impl ModelPusherConfig {
    /// Run-scoped copy of the model
    pub fn model_file_path(&self) -> PathBuf {
        self.model_pusher_dir.join(&self.model_file_name)
    }

    /// Run-scoped copy of the transformer
    pub fn transformer_file_path(&self) -> PathBuf {
        self.model_pusher_dir.join(&self.transformer_file_name)
    }

    pub fn saved_model_path(&self) -> PathBuf {
        self.model_root
            .join(self.version.to_string())
            .join(&self.model_file_name)
    }

    pub fn saved_transformer_path(&self) -> PathBuf {
        self.transformer_root
            .join(self.version.to_string())
            .join(&self.transformer_file_name)
    }
}
