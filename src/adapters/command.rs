//! Subprocess implementation of the training stages.
//!
//! Each stage spawns its configured command, writes a JSON request to stdin
//! and reads the stage's artifact as JSON from stdout:
//!
//! ```json
//! {"stage": "model_trainer", "run": {...}, "config": {...}, "input": {...}}
//! ```
//!
//! Anything the stage prints for humans belongs on stderr.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::core::StageCommands;
use crate::domain::{
    DataIngestionArtifact, DataIngestionConfig, DataTransformationArtifact,
    DataTransformationConfig, DataValidationArtifact, DataValidationConfig,
    ModelEvaluationArtifact, ModelEvaluationConfig, ModelTrainerArtifact, ModelTrainerConfig,
    PipelineRun, StageArtifact, StageName,
};
use crate::error::StageError;

use super::TrainingStages;

/// Request written to a stage's stdin
#[derive(Debug, Serialize)]
struct StageRequest<'a, C, I> {
    stage: StageName,
    run: &'a PipelineRun,
    config: &'a C,
    input: I,
}

#[derive(Debug, Serialize)]
struct EvaluationInput<'a> {
    validation: &'a DataValidationArtifact,
    trainer: &'a ModelTrainerArtifact,
}

/// Stages backed by external commands
pub struct CommandStages {
    commands: StageCommands,
}

impl CommandStages {
    pub fn new(commands: StageCommands) -> Self {
        Self { commands }
    }

    /// Run the command bound to `O::STAGE` and parse its artifact
    async fn invoke<C, I, O>(&self, run: &PipelineRun, config: &C, input: I) -> Result<O, StageError>
    where
        C: Serialize + Sync,
        I: Serialize + Send,
        O: StageArtifact,
    {
        let stage = O::STAGE;
        let command = self
            .commands
            .get(stage)
            .ok_or(StageError::NotConfigured { stage })?;
        let stage_timeout = self.commands.timeout(stage);

        let request = serde_json::to_vec(&StageRequest {
            stage,
            run,
            config,
            input,
        })
        .map_err(|e| StageError::Failed {
            stage,
            message: format!("Failed to encode stage request: {}", e),
        })?;

        debug!(%stage, program = %command.program, "Spawning stage command");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .envs(&command.env)
            .env("TRAINCTL_STAGE", stage.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StageError::Spawn {
                stage,
                message: format!("{}: {}", command.program, e),
            })?;

        // The request write and the wait share one deadline. A stage that
        // exits without reading stdin is judged by its exit status.
        let interaction = async move {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(&request).await {
                    debug!(%stage, error = %e, "Stage closed stdin before reading the request");
                }
                // Dropping stdin signals EOF
            }
            child.wait_with_output().await
        };

        let output = timeout(stage_timeout, interaction)
            .await
            .map_err(|_| StageError::Timeout {
                stage,
                timeout_seconds: stage_timeout.as_secs(),
            })?
            .map_err(|e| StageError::Failed {
                stage,
                message: format!("Failed to wait for stage process: {}", e),
            })?;

        if !output.status.success() {
            return Err(StageError::Exited {
                stage,
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| StageError::InvalidOutput {
            stage,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl TrainingStages for CommandStages {
    fn name(&self) -> &str {
        "command"
    }

    async fn ingest(
        &self,
        run: &PipelineRun,
        config: &DataIngestionConfig,
    ) -> Result<DataIngestionArtifact, StageError> {
        self.invoke(run, config, ()).await
    }

    async fn validate(
        &self,
        run: &PipelineRun,
        ingestion: &DataIngestionArtifact,
        config: &DataValidationConfig,
    ) -> Result<DataValidationArtifact, StageError> {
        self.invoke(run, config, ingestion).await
    }

    async fn transform(
        &self,
        run: &PipelineRun,
        validation: &DataValidationArtifact,
        config: &DataTransformationConfig,
    ) -> Result<DataTransformationArtifact, StageError> {
        self.invoke(run, config, validation).await
    }

    async fn train(
        &self,
        run: &PipelineRun,
        transformation: &DataTransformationArtifact,
        config: &ModelTrainerConfig,
    ) -> Result<ModelTrainerArtifact, StageError> {
        self.invoke(run, config, transformation).await
    }

    async fn evaluate(
        &self,
        run: &PipelineRun,
        validation: &DataValidationArtifact,
        trainer: &ModelTrainerArtifact,
        config: &ModelEvaluationConfig,
    ) -> Result<ModelEvaluationArtifact, StageError> {
        self.invoke(run, config, EvaluationInput { validation, trainer })
            .await
    }
}
