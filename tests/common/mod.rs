//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::Notify;

use trainctl::adapters::{RemoteLocation, RemoteMirror, TrainingStages};
use trainctl::config::TrainingSettings;
use trainctl::core::OrchestratorConfig;
use trainctl::domain::{
    ClassificationMetric, DataIngestionArtifact, DataIngestionConfig, DataTransformationArtifact,
    DataTransformationConfig, DataValidationArtifact, DataValidationConfig,
    ModelEvaluationArtifact, ModelEvaluationConfig, ModelTrainerArtifact, ModelTrainerConfig,
    PipelineRun, StageName,
};
use trainctl::error::{MirrorError, StageError};

pub fn write_file(path: &Path, bytes: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

pub fn run_at(hour: u32, minute: u32) -> PipelineRun {
    PipelineRun::at(Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap())
}

pub fn orchestrator_config(temp: &TempDir) -> OrchestratorConfig {
    OrchestratorConfig {
        artifact_dir: temp.path().join("artifact"),
        model_dir: temp.path().join("saved_models"),
        transformer_dir: temp.path().join("saved_transformers"),
        training: TrainingSettings::default(),
    }
}

/// Stages that produce real files with configurable content and outcome
pub struct FakeStages {
    pub accept: bool,
    pub fail_at: Option<StageName>,
    pub model_bytes: Vec<u8>,
    pub transformer_bytes: Vec<u8>,
    /// When set, ingestion waits for a notification before returning
    pub gate: Option<Arc<Notify>>,
    pub calls: Mutex<Vec<StageName>>,
}

impl FakeStages {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            fail_at: None,
            model_bytes: b"model-v1".to_vec(),
            transformer_bytes: b"transformer-v1".to_vec(),
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            accept: false,
            ..Self::accepting()
        }
    }

    pub fn failing_at(stage: StageName) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::accepting()
        }
    }

    pub fn calls(&self) -> Vec<StageName> {
        self.calls.lock().unwrap().clone()
    }

    fn enter(&self, stage: StageName) -> Result<(), StageError> {
        self.calls.lock().unwrap().push(stage);
        if self.fail_at == Some(stage) {
            return Err(StageError::Failed {
                stage,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

fn metric(score: f64) -> ClassificationMetric {
    ClassificationMetric {
        f1_score: score,
        precision_score: score,
        recall_score: score,
    }
}

#[async_trait]
impl TrainingStages for FakeStages {
    fn name(&self) -> &str {
        "fake"
    }

    async fn ingest(
        &self,
        _run: &PipelineRun,
        config: &DataIngestionConfig,
    ) -> Result<DataIngestionArtifact, StageError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.enter(StageName::DataIngestion)?;
        write_file(&config.training_file_path, b"a,b\n1,2\n");
        write_file(&config.testing_file_path, b"a,b\n3,4\n");
        Ok(DataIngestionArtifact {
            trained_file_path: config.training_file_path.clone(),
            test_file_path: config.testing_file_path.clone(),
        })
    }

    async fn validate(
        &self,
        _run: &PipelineRun,
        ingestion: &DataIngestionArtifact,
        config: &DataValidationConfig,
    ) -> Result<DataValidationArtifact, StageError> {
        self.enter(StageName::DataValidation)?;
        Ok(DataValidationArtifact {
            validation_status: true,
            valid_train_file_path: ingestion.trained_file_path.clone(),
            valid_test_file_path: ingestion.test_file_path.clone(),
            invalid_train_file_path: None,
            invalid_test_file_path: None,
            drift_report_file_path: config.drift_report_file_path.clone(),
        })
    }

    async fn transform(
        &self,
        _run: &PipelineRun,
        _validation: &DataValidationArtifact,
        config: &DataTransformationConfig,
    ) -> Result<DataTransformationArtifact, StageError> {
        self.enter(StageName::DataTransformation)?;
        write_file(&config.transformed_object_file_path, &self.transformer_bytes);
        Ok(DataTransformationArtifact {
            transformed_object_file_path: config.transformed_object_file_path.clone(),
            transformed_train_file_path: config.transformed_train_file_path.clone(),
            transformed_test_file_path: config.transformed_test_file_path.clone(),
        })
    }

    async fn train(
        &self,
        _run: &PipelineRun,
        _transformation: &DataTransformationArtifact,
        config: &ModelTrainerConfig,
    ) -> Result<ModelTrainerArtifact, StageError> {
        self.enter(StageName::ModelTrainer)?;
        write_file(&config.trained_model_file_path, &self.model_bytes);
        Ok(ModelTrainerArtifact {
            trained_model_file_path: config.trained_model_file_path.clone(),
            train_metric_artifact: metric(0.95),
            test_metric_artifact: metric(0.93),
        })
    }

    async fn evaluate(
        &self,
        _run: &PipelineRun,
        _validation: &DataValidationArtifact,
        trainer: &ModelTrainerArtifact,
        config: &ModelEvaluationConfig,
    ) -> Result<ModelEvaluationArtifact, StageError> {
        self.enter(StageName::ModelEvaluation)?;
        Ok(ModelEvaluationArtifact {
            is_model_accepted: self.accept,
            improved_accuracy: if self.accept { 0.05 } else { 0.001 },
            best_model_path: config.best_model_path.clone(),
            trained_model_path: trainer.trained_model_file_path.clone(),
            train_model_metric_artifact: Some(trainer.test_metric_artifact),
            best_model_metric_artifact: config.best_model_path.as_ref().map(|_| metric(0.9)),
        })
    }
}

/// Mirror that records every call and optionally fails
#[derive(Default)]
pub struct RecordingMirror {
    pub fail: bool,
    pub uploads: Mutex<Vec<(PathBuf, String)>>,
}

impl RecordingMirror {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteMirror for RecordingMirror {
    fn name(&self) -> &str {
        "recording"
    }

    async fn mirror_to_remote(
        &self,
        local_dir: &Path,
        remote: &RemoteLocation,
    ) -> Result<(), MirrorError> {
        self.uploads
            .lock()
            .unwrap()
            .push((local_dir.to_path_buf(), remote.to_string()));
        if self.fail {
            return Err(MirrorError::CommandFailed {
                exit_code: 1,
                stderr: "upload failed: access denied".to_string(),
            });
        }
        Ok(())
    }

    async fn mirror_from_remote(
        &self,
        _remote: &RemoteLocation,
        _local_dir: &Path,
    ) -> Result<(), MirrorError> {
        Ok(())
    }
}
