//! Stage command definitions.
//!
//! The statistical work of each stage runs outside this crate. Each stage
//! is bound to an external command in the `stages` section of the config:
//!
//! ```yaml
//! stages:
//!   data_ingestion:
//!     program: python
//!     args: ["-m", "sensor.components.data_ingestion"]
//!     timeout_seconds: 1800
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::StageName;

/// Commands for the five externally implemented stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageCommands {
    /// Timeout applied to stages without their own override
    #[serde(default = "default_stage_timeout")]
    pub default_timeout_seconds: u64,

    pub data_ingestion: Option<StageCommand>,
    pub data_validation: Option<StageCommand>,
    pub data_transformation: Option<StageCommand>,
    pub model_trainer: Option<StageCommand>,
    pub model_evaluation: Option<StageCommand>,
}

fn default_stage_timeout() -> u64 {
    3600
}

impl Default for StageCommands {
    fn default() -> Self {
        Self {
            default_timeout_seconds: default_stage_timeout(),
            data_ingestion: None,
            data_validation: None,
            data_transformation: None,
            model_trainer: None,
            model_evaluation: None,
        }
    }
}

impl StageCommands {
    /// Load stage commands from a standalone YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read stages file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse stages YAML")
    }

    /// Command bound to a stage (the pusher is built in and never has one)
    pub fn get(&self, stage: StageName) -> Option<&StageCommand> {
        match stage {
            StageName::DataIngestion => self.data_ingestion.as_ref(),
            StageName::DataValidation => self.data_validation.as_ref(),
            StageName::DataTransformation => self.data_transformation.as_ref(),
            StageName::ModelTrainer => self.model_trainer.as_ref(),
            StageName::ModelEvaluation => self.model_evaluation.as_ref(),
            StageName::ModelPusher => None,
        }
    }

    /// Every external stage must be bound to a non-empty program
    pub fn validate(&self) -> Result<()> {
        for stage in StageName::ORDER {
            if stage == StageName::ModelPusher {
                continue;
            }

            match self.get(stage) {
                None => anyhow::bail!("Stage '{}' has no command configured", stage),
                Some(command) if command.program.trim().is_empty() => {
                    anyhow::bail!("Stage '{}' has an empty program", stage)
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Effective timeout for a stage
    pub fn timeout(&self, stage: StageName) -> Duration {
        let seconds = self
            .get(stage)
            .and_then(|c| c.timeout_seconds)
            .unwrap_or(self.default_timeout_seconds);
        Duration::from_secs(seconds)
    }
}

/// An external command implementing one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageCommand {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment for the stage process
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Override of `default_timeout_seconds`
    pub timeout_seconds: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAGES_YAML: &str = r#"
default_timeout_seconds: 120

data_ingestion:
  program: python
  args: ["-m", "sensor.components.data_ingestion"]
  env:
    MONGO_DB_URL: mongodb://localhost
data_validation:
  program: python
  args: ["-m", "sensor.components.data_validation"]
data_transformation:
  program: python
  args: ["-m", "sensor.components.data_transformation"]
model_trainer:
  program: python
  args: ["-m", "sensor.components.model_trainer"]
  timeout_seconds: 7200
model_evaluation:
  program: python
  args: ["-m", "sensor.components.model_evaluation"]
"#;

    #[test]
    fn test_stage_commands_parsing() {
        let stages = StageCommands::from_yaml(STAGES_YAML).unwrap();

        assert!(stages.validate().is_ok());
        let ingest = stages.get(StageName::DataIngestion).unwrap();
        assert_eq!(ingest.args.len(), 2);
        assert_eq!(
            ingest.env.get("MONGO_DB_URL").map(String::as_str),
            Some("mongodb://localhost")
        );
        assert!(stages.get(StageName::ModelPusher).is_none());
    }

    #[test]
    fn test_stage_timeouts() {
        let stages = StageCommands::from_yaml(STAGES_YAML).unwrap();

        assert_eq!(stages.timeout(StageName::ModelTrainer), Duration::from_secs(7200));
        assert_eq!(stages.timeout(StageName::DataValidation), Duration::from_secs(120));
    }

    #[test]
    fn test_missing_stage_fails_validation() {
        let yaml = r#"
data_ingestion:
  program: python
"#;
        let stages = StageCommands::from_yaml(yaml).unwrap();
        let err = stages.validate().unwrap_err();
        assert!(err.to_string().contains("data_validation"));
    }

    #[test]
    fn test_default_timeout_when_unconfigured() {
        let stages = StageCommands::default();
        assert_eq!(stages.timeout(StageName::DataIngestion), Duration::from_secs(3600));
    }
}
