//! Per-run artifact directory with an append-only journal.
//!
//! Each run owns `<artifact_root>/<run-dir>/`, one subdirectory per stage,
//! a `run.json` identity file and an `events.jsonl` journal. Events are
//! stored as newline-delimited JSON for easy inspection after a mirror.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::config::paths;
use crate::config::TrainingSettings;
use crate::domain::{
    DataIngestionConfig, DataTransformationConfig, DataValidationConfig, ModelEvaluationConfig,
    ModelPusherConfig, ModelTrainerConfig, PipelineEvent, PipelineRun, StageArtifact, StageName,
};
use crate::error::PipelineError;

type StoreResult<T> = std::result::Result<T, PipelineError>;

/// Upper bound on same-second runs sharing one timestamp
const MAX_RUN_SEQ: u32 = 1000;

/// File-based store for one run's artifacts and journal
pub struct ArtifactStore {
    run: PipelineRun,

    /// Directory containing the run
    run_dir: PathBuf,

    /// Path to the events.jsonl file
    events_path: PathBuf,
}

impl ArtifactStore {
    /// Claim a fresh run directory for a new run
    ///
    /// An existing directory is never reused. When the run's name is taken
    /// (another run in the same second) the next sequence slot is claimed
    /// instead, and `run()` reports the identity that was actually used.
    pub async fn open(artifact_root: &Path, run: &PipelineRun) -> StoreResult<Self> {
        fs::create_dir_all(artifact_root)
            .await
            .map_err(|e| PipelineError::storage(artifact_root, e))?;

        let mut run = run.clone();
        let run_dir = loop {
            let candidate = artifact_root.join(run.dir_name());
            match fs::create_dir(&candidate).await {
                Ok(()) => break candidate,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && run.seq < MAX_RUN_SEQ => {
                    debug!(dir = %candidate.display(), "Run directory taken, trying next slot");
                    run = run.next_seq();
                }
                Err(e) => return Err(PipelineError::storage(&candidate, e)),
            }
        };

        let run_file = run_dir.join(paths::RUN_FILE_NAME);
        let json = to_json_pretty(&run, &run_file)?;
        fs::write(&run_file, json)
            .await
            .map_err(|e| PipelineError::storage(&run_file, e))?;

        Ok(Self {
            run,
            events_path: run_dir.join(paths::EVENTS_FILE_NAME),
            run_dir,
        })
    }

    /// Open the directory of a previous run by its directory name
    pub async fn open_existing(artifact_root: &Path, dir_name: &str) -> StoreResult<Self> {
        let run_dir = artifact_root.join(dir_name);
        let run_file = run_dir.join(paths::RUN_FILE_NAME);

        let content = fs::read_to_string(&run_file)
            .await
            .map_err(|e| PipelineError::storage(&run_file, e))?;
        let run: PipelineRun = serde_json::from_str(&content).map_err(|e| {
            PipelineError::storage(
                &run_file,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;

        Ok(Self {
            run,
            events_path: run_dir.join(paths::EVENTS_FILE_NAME),
            run_dir,
        })
    }

    pub fn run(&self) -> &PipelineRun {
        &self.run
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Directory owned by a stage
    pub fn stage_dir(&self, stage: StageName) -> PathBuf {
        self.run_dir.join(stage.as_str())
    }

    pub fn ingestion_config(&self, training: &TrainingSettings) -> DataIngestionConfig {
        let dir = self.stage_dir(StageName::DataIngestion);
        let ingested = dir.join(paths::DATA_INGESTION_INGESTED_DIR);
        DataIngestionConfig {
            feature_store_file_path: dir
                .join(paths::DATA_INGESTION_FEATURE_STORE_DIR)
                .join(&training.data_file_name),
            training_file_path: ingested.join(paths::TRAIN_FILE_NAME),
            testing_file_path: ingested.join(paths::TEST_FILE_NAME),
            train_test_split_ratio: training.train_test_split_ratio,
            collection_name: training.collection_name.clone(),
            data_ingestion_dir: dir,
        }
    }

    pub fn validation_config(&self) -> DataValidationConfig {
        let dir = self.stage_dir(StageName::DataValidation);
        let valid = dir.join(paths::DATA_VALIDATION_VALID_DIR);
        let invalid = dir.join(paths::DATA_VALIDATION_INVALID_DIR);
        DataValidationConfig {
            valid_train_file_path: valid.join(paths::TRAIN_FILE_NAME),
            valid_test_file_path: valid.join(paths::TEST_FILE_NAME),
            invalid_train_file_path: invalid.join(paths::TRAIN_FILE_NAME),
            invalid_test_file_path: invalid.join(paths::TEST_FILE_NAME),
            drift_report_file_path: dir
                .join(paths::DATA_VALIDATION_DRIFT_REPORT_DIR)
                .join(paths::DATA_VALIDATION_DRIFT_REPORT_FILE_NAME),
            data_validation_dir: dir,
        }
    }

    pub fn transformation_config(&self) -> DataTransformationConfig {
        let dir = self.stage_dir(StageName::DataTransformation);
        let transformed = dir.join(paths::DATA_TRANSFORMATION_TRANSFORMED_DATA_DIR);
        DataTransformationConfig {
            transformed_train_file_path: transformed.join(paths::TRANSFORMED_TRAIN_FILE_NAME),
            transformed_test_file_path: transformed.join(paths::TRANSFORMED_TEST_FILE_NAME),
            transformed_object_file_path: dir
                .join(paths::DATA_TRANSFORMATION_TRANSFORMED_OBJECT_DIR)
                .join(paths::PREPROCESSING_OBJECT_FILE_NAME),
            data_transformation_dir: dir,
        }
    }

    pub fn trainer_config(&self, training: &TrainingSettings) -> ModelTrainerConfig {
        let dir = self.stage_dir(StageName::ModelTrainer);
        ModelTrainerConfig {
            trained_model_file_path: dir
                .join(paths::MODEL_TRAINER_TRAINED_MODEL_DIR)
                .join(paths::MODEL_FILE_NAME),
            expected_score: training.expected_score,
            overfitting_threshold: training.overfitting_threshold,
            model_trainer_dir: dir,
        }
    }

    pub fn evaluation_config(
        &self,
        training: &TrainingSettings,
        best_model_path: Option<PathBuf>,
    ) -> ModelEvaluationConfig {
        let dir = self.stage_dir(StageName::ModelEvaluation);
        ModelEvaluationConfig {
            report_file_path: dir.join(paths::MODEL_EVALUATION_REPORT_NAME),
            change_threshold: training.model_change_threshold,
            best_model_path,
            model_evaluation_dir: dir,
        }
    }

    /// Publish config for `version`, normally `next_publish_version` of the roots
    pub fn pusher_config(
        &self,
        model_root: &Path,
        transformer_root: &Path,
        version: u64,
    ) -> ModelPusherConfig {
        ModelPusherConfig {
            version,
            model_pusher_dir: self.stage_dir(StageName::ModelPusher),
            model_root: model_root.to_path_buf(),
            transformer_root: transformer_root.to_path_buf(),
            model_file_name: paths::MODEL_FILE_NAME.to_string(),
            transformer_file_name: paths::PREPROCESSING_OBJECT_FILE_NAME.to_string(),
        }
    }

    /// Record a stage's artifact next to the files it describes
    pub async fn save_artifact<A: StageArtifact + Sync>(&self, artifact: &A) -> StoreResult<PathBuf> {
        let dir = self.stage_dir(A::STAGE);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| PipelineError::storage(&dir, e))?;

        let path = dir.join(paths::ARTIFACT_RECORD_FILE_NAME);
        let json = to_json_pretty(artifact, &path)?;
        fs::write(&path, json)
            .await
            .map_err(|e| PipelineError::storage(&path, e))?;

        Ok(path)
    }

    /// Append an event to the journal
    pub async fn append(&self, event: &PipelineEvent) -> StoreResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .map_err(|e| PipelineError::storage(&self.events_path, e))?;

        let json = serde_json::to_string(event)
            .map_err(|e| PipelineError::storage(&self.events_path, std::io::Error::other(e)))?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .map_err(|e| PipelineError::storage(&self.events_path, e))?;
        file.flush()
            .await
            .map_err(|e| PipelineError::storage(&self.events_path, e))?;

        Ok(())
    }

    /// Replay all journal events in order
    pub async fn replay(&self) -> StoreResult<Vec<PipelineEvent>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .map_err(|e| PipelineError::storage(&self.events_path, e))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| PipelineError::storage(&self.events_path, e))?
        {
            if line.trim().is_empty() {
                continue;
            }
            let event: PipelineEvent = serde_json::from_str(&line).map_err(|e| {
                PipelineError::storage(
                    &self.events_path,
                    std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                )
            })?;
            events.push(event);
        }

        Ok(events)
    }

    /// List run directory names under the artifact root, newest first
    pub async fn list_runs(artifact_root: &Path) -> StoreResult<Vec<String>> {
        if !artifact_root.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(artifact_root)
            .await
            .map_err(|e| PipelineError::storage(artifact_root, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PipelineError::storage(artifact_root, e))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Some(key) = PipelineRun::parse_dir_name(&name) {
                if entry.path().is_dir() {
                    runs.push((key, name));
                }
            }
        }

        runs.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(runs.into_iter().map(|(_, name)| name).collect())
    }
}

fn to_json_pretty<T: Serialize + ?Sized>(value: &T, path: &Path) -> StoreResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| PipelineError::storage(path, std::io::Error::other(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataIngestionArtifact, EventType};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn run_at(secs: u32) -> PipelineRun {
        PipelineRun::at(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, secs).unwrap())
    }

    #[tokio::test]
    async fn test_open_creates_run_dir() {
        let temp = TempDir::new().unwrap();
        let run = run_at(0);
        let store = ArtifactStore::open(temp.path(), &run).await.unwrap();

        assert_eq!(store.run_dir(), temp.path().join("05_01_2024_10_00_00"));
        assert!(store.run_dir().join(paths::RUN_FILE_NAME).exists());

        let reopened = ArtifactStore::open_existing(temp.path(), "05_01_2024_10_00_00")
            .await
            .unwrap();
        assert_eq!(reopened.run(), &run);
    }

    #[tokio::test]
    async fn test_open_never_reuses_a_run_dir() {
        let temp = TempDir::new().unwrap();
        let first_run = run_at(0);
        let first = ArtifactStore::open(temp.path(), &first_run).await.unwrap();
        first
            .append(&PipelineEvent::new(first_run.id, None, EventType::RunStarted, "first"))
            .await
            .unwrap();

        let second_run = run_at(0);
        let second = ArtifactStore::open(temp.path(), &second_run).await.unwrap();

        assert_ne!(first.run_dir(), second.run_dir());
        assert_eq!(second.run_dir(), temp.path().join("05_01_2024_10_00_00_1"));
        assert_eq!(second.run().id, second_run.id);
        assert_eq!(second.run().seq, 1);
        assert!(second.replay().await.unwrap().is_empty());

        // The first run's identity and journal are untouched
        let reopened = ArtifactStore::open_existing(temp.path(), "05_01_2024_10_00_00")
            .await
            .unwrap();
        assert_eq!(reopened.run(), &first_run);
        assert_eq!(reopened.replay().await.unwrap().len(), 1);

        let third = ArtifactStore::open(temp.path(), &run_at(0)).await.unwrap();
        assert_eq!(third.run_dir(), temp.path().join("05_01_2024_10_00_00_2"));
    }

    #[tokio::test]
    async fn test_event_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let run = run_at(0);
        let store = ArtifactStore::open(temp.path(), &run).await.unwrap();

        for stage in [StageName::DataIngestion, StageName::DataValidation] {
            let event = PipelineEvent::new(run.id, Some(stage), EventType::StageStarted, "start");
            store.append(&event).await.unwrap();
        }

        let events = store.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].stage, Some(StageName::DataIngestion));
        assert_eq!(events[1].stage, Some(StageName::DataValidation));
    }

    #[tokio::test]
    async fn test_stage_configs_stay_inside_run_dir() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::open(temp.path(), &run_at(0)).await.unwrap();
        let training = TrainingSettings::default();

        let ingestion = store.ingestion_config(&training);
        assert!(ingestion.training_file_path.starts_with(store.run_dir()));
        assert!(ingestion
            .feature_store_file_path
            .ends_with("data_ingestion/feature_store/sensor.csv"));

        let transformation = store.transformation_config();
        assert!(transformation
            .transformed_object_file_path
            .ends_with("data_transformation/transformed_object/preprocessing.pkl"));

        let trainer = store.trainer_config(&training);
        assert!(trainer
            .trained_model_file_path
            .ends_with("model_trainer/trained_model/model.pkl"));
        assert_eq!(trainer.expected_score, 0.6);

        let evaluation = store.evaluation_config(&training, None);
        assert_eq!(evaluation.change_threshold, 0.02);
        assert!(evaluation.best_model_path.is_none());
    }

    #[tokio::test]
    async fn test_save_artifact_record() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::open(temp.path(), &run_at(0)).await.unwrap();

        let artifact = DataIngestionArtifact {
            trained_file_path: PathBuf::from("train.csv"),
            test_file_path: PathBuf::from("test.csv"),
        };
        let path = store.save_artifact(&artifact).await.unwrap();

        assert!(path.ends_with("data_ingestion/artifact.json"));
        let parsed: DataIngestionArtifact =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed, artifact);
    }

    #[tokio::test]
    async fn test_list_runs_newest_first() {
        let temp = TempDir::new().unwrap();
        for secs in [5, 1, 30, 5] {
            ArtifactStore::open(temp.path(), &run_at(secs)).await.unwrap();
        }
        std::fs::create_dir_all(temp.path().join("not-a-run")).unwrap();

        let runs = ArtifactStore::list_runs(temp.path()).await.unwrap();
        assert_eq!(
            runs,
            vec![
                "05_01_2024_10_00_30".to_string(),
                "05_01_2024_10_00_05_1".to_string(),
                "05_01_2024_10_00_05".to_string(),
                "05_01_2024_10_00_01".to_string(),
            ]
        );
    }
}
