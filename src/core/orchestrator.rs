//! Main orchestrator for training runs.
//!
//! Runs the five stages in order, threads each artifact into the next
//! stage, journals every step and publishes the model when evaluation
//! accepts it. After the run the run directory (and on success the model
//! roots) are mirrored to the remote store.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument, warn};

use crate::adapters::{RemoteLocation, RemoteMirror, TrainingStages};
use crate::config::{paths, ResolvedConfig, TrainingSettings};
use crate::domain::{
    DataTransformationArtifact, EventType, ModelEvaluationArtifact, ModelPusherArtifact,
    PipelineEvent, PipelineRun, RunRecord, StageArtifact, StageName,
};
use crate::error::{MirrorError, PipelineError, RegistryError, StageError};
use crate::registry::{next_publish_version, ArtifactPublisher, ModelResolver};

use super::artifact_store::ArtifactStore;
use super::run_guard::RunGuard;

/// Roots and thresholds the orchestrator works with
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub artifact_dir: PathBuf,
    pub model_dir: PathBuf,
    pub transformer_dir: PathBuf,
    pub training: TrainingSettings,
}

impl OrchestratorConfig {
    pub fn from_resolved(config: &ResolvedConfig) -> Self {
        Self {
            artifact_dir: config.artifact_dir.clone(),
            model_dir: config.saved_models.clone(),
            transformer_dir: config.saved_transformers.clone(),
            training: config.training.clone(),
        }
    }

    pub fn resolver(&self) -> ModelResolver {
        ModelResolver::new(&self.model_dir, &self.transformer_dir)
    }
}

/// How a run that did not fail ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The candidate was accepted and published as a new version
    Published(ModelPusherArtifact),

    /// Evaluation kept the current best model
    Rejected {
        reason: String,
        evaluation: ModelEvaluationArtifact,
    },
}

impl RunOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }

    /// Treat a rejection as an error
    pub fn into_result(self) -> Result<ModelPusherArtifact, PipelineError> {
        match self {
            Self::Published(artifact) => Ok(artifact),
            Self::Rejected { reason, .. } => Err(PipelineError::ModelNotAccepted { reason }),
        }
    }
}

/// Result of one `run_pipeline` call
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: PipelineRun,
    pub run_dir: PathBuf,
    pub outcome: RunOutcome,
}

/// Main training orchestrator
pub struct Orchestrator {
    config: OrchestratorConfig,
    stages: Arc<dyn TrainingStages>,
    remote: Option<(Arc<dyn RemoteMirror>, RemoteLocation)>,
    guard: Arc<RunGuard>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, stages: Arc<dyn TrainingStages>) -> Self {
        Self {
            config,
            stages,
            remote: None,
            guard: Arc::new(RunGuard::new()),
        }
    }

    /// Mirror run artifacts and model roots below `location`
    pub fn with_remote(mut self, mirror: Arc<dyn RemoteMirror>, location: RemoteLocation) -> Self {
        self.remote = Some((mirror, location));
        self
    }

    /// Share a run guard with other holders (e.g. a serving endpoint)
    pub fn with_guard(mut self, guard: Arc<RunGuard>) -> Self {
        self.guard = guard;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn guard(&self) -> &Arc<RunGuard> {
        &self.guard
    }

    /// Whether a run is in progress in this process
    pub fn is_pipeline_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Run all stages once with a fresh run identity
    pub async fn run_pipeline(&self) -> Result<RunReport, PipelineError> {
        self.run_with(PipelineRun::new()).await
    }

    /// Run all stages once under the given identity
    ///
    /// If the run's directory name is already taken the run is moved to the
    /// next sequence slot; `RunReport::run` holds the identity actually used.
    #[instrument(skip(self, run), fields(run = %run.dir_name(), stages = self.stages.name()))]
    pub async fn run_with(&self, run: PipelineRun) -> Result<RunReport, PipelineError> {
        let ticket = self.guard.try_start().ok_or(PipelineError::AlreadyRunning)?;
        info!("Starting training pipeline");

        let store = ArtifactStore::open(&self.config.artifact_dir, &run).await?;
        let run = store.run().clone();
        info!(run_dir = %store.run_dir().display(), "Run directory created");
        store
            .append(&PipelineEvent::new(
                run.id,
                None,
                EventType::RunStarted,
                format!("Run {} started", run.dir_name()),
            ))
            .await?;

        let result = self.execute_stages(&store).await;

        // Released before mirroring so a slow upload never blocks the next run
        drop(ticket);

        match result {
            Ok(outcome) => {
                self.finish_run(&store, &outcome).await?;
                if outcome.is_published() {
                    self.mirror_published(&store).await?;
                } else {
                    self.mirror_run_best_effort(&store).await;
                }
                Ok(RunReport {
                    run_dir: store.run_dir().to_path_buf(),
                    run,
                    outcome,
                })
            }
            Err(e) => {
                error!(error = %e, "Training pipeline failed");
                let event = PipelineEvent::new(run.id, None, EventType::RunFailed, "Run failed")
                    .with_error(e.to_string());
                if let Err(journal_err) = store.append(&event).await {
                    warn!(error = %journal_err, "Failed to journal run failure");
                }
                self.mirror_run_best_effort(&store).await;
                Err(e)
            }
        }
    }

    async fn execute_stages(&self, store: &ArtifactStore) -> Result<RunOutcome, PipelineError> {
        let run = store.run();
        let training = &self.config.training;
        let stages = self.stages.as_ref();

        let ingestion_config = store.ingestion_config(training);
        let ingestion = self
            .run_stage(store, stages.ingest(run, &ingestion_config))
            .await?;

        let validation_config = store.validation_config();
        let validation = self
            .run_stage(store, stages.validate(run, &ingestion, &validation_config))
            .await?;

        let transformation_config = store.transformation_config();
        let transformation = self
            .run_stage(
                store,
                stages.transform(run, &validation, &transformation_config),
            )
            .await?;

        let trainer_config = store.trainer_config(training);
        let trainer = self
            .run_stage(store, stages.train(run, &transformation, &trainer_config))
            .await?;

        let best_model_path = self
            .scan_registry(|resolver| {
                if resolver.is_model_exists() {
                    resolver.get_best_model_path().map(Some)
                } else {
                    Ok(None)
                }
            })
            .await?;
        let evaluation_config = store.evaluation_config(training, best_model_path);
        let evaluation = self
            .run_stage(
                store,
                stages.evaluate(run, &validation, &trainer, &evaluation_config),
            )
            .await?;

        if !evaluation.is_model_accepted {
            let reason = format!(
                "improved accuracy {:.4} does not exceed threshold {}",
                evaluation.improved_accuracy, training.model_change_threshold
            );
            info!(%reason, "Trained model rejected");
            return Ok(RunOutcome::Rejected { reason, evaluation });
        }

        let started = Instant::now();
        store
            .append(&PipelineEvent::new(
                run.id,
                Some(StageName::ModelPusher),
                EventType::StageStarted,
                "Stage 'model_pusher' started",
            ))
            .await?;

        match self
            .publish_accepted(store, &transformation, &evaluation)
            .await
        {
            Ok(artifact) => {
                store.save_artifact(&artifact).await?;
                store
                    .append(
                        &PipelineEvent::new(
                            run.id,
                            Some(StageName::ModelPusher),
                            EventType::StageCompleted,
                            format!("Published version {}", artifact.version),
                        )
                        .with_duration(started.elapsed().as_millis() as u64),
                    )
                    .await?;
                Ok(RunOutcome::Published(artifact))
            }
            Err(e) => {
                store
                    .append(
                        &PipelineEvent::new(
                            run.id,
                            Some(StageName::ModelPusher),
                            EventType::StageFailed,
                            "Stage 'model_pusher' failed",
                        )
                        .with_duration(started.elapsed().as_millis() as u64)
                        .with_error(e.to_string()),
                    )
                    .await?;
                Err(e)
            }
        }
    }

    /// Publish the accepted candidate as the next version
    async fn publish_accepted(
        &self,
        store: &ArtifactStore,
        transformation: &DataTransformationArtifact,
        evaluation: &ModelEvaluationArtifact,
    ) -> Result<ModelPusherArtifact, PipelineError> {
        let floor = store.run().version();
        let version = self
            .scan_registry(move |resolver| {
                next_publish_version(&[resolver.model_dir(), resolver.transformer_dir()], floor)
            })
            .await?;

        let publisher = ArtifactPublisher::new(store.pusher_config(
            &self.config.model_dir,
            &self.config.transformer_dir,
            version,
        ));
        let artifact = publisher
            .publish(
                &transformation.transformed_object_file_path,
                &evaluation.trained_model_path,
            )
            .await?;
        Ok(artifact)
    }

    /// Run a blocking registry scan off the async worker threads
    async fn scan_registry<T, F>(&self, scan: F) -> Result<T, PipelineError>
    where
        T: Send + 'static,
        F: FnOnce(ModelResolver) -> Result<T, RegistryError> + Send + 'static,
    {
        let resolver = self.config.resolver();
        let root = self.config.model_dir.clone();
        let result = tokio::task::spawn_blocking(move || scan(resolver))
            .await
            .map_err(|e| RegistryError::Io {
                path: root,
                source: std::io::Error::other(e),
            })?;
        Ok(result?)
    }

    /// Await one stage, journal it and record its artifact
    async fn run_stage<A, F>(&self, store: &ArtifactStore, stage: F) -> Result<A, PipelineError>
    where
        A: StageArtifact + Sync,
        F: Future<Output = Result<A, StageError>>,
    {
        let name = A::STAGE;
        let run_id = store.run().id;
        let started = Instant::now();

        store
            .append(&PipelineEvent::new(
                run_id,
                Some(name),
                EventType::StageStarted,
                format!("Stage '{}' started", name),
            ))
            .await?;
        info!(stage = %name, "Stage started");

        let result = stage.await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(artifact) => {
                store.save_artifact(&artifact).await?;
                store
                    .append(
                        &PipelineEvent::new(
                            run_id,
                            Some(name),
                            EventType::StageCompleted,
                            format!("Stage '{}' completed in {}ms", name, duration_ms),
                        )
                        .with_duration(duration_ms),
                    )
                    .await?;
                info!(stage = %name, duration_ms, "Stage completed");
                Ok(artifact)
            }
            Err(e) => {
                store
                    .append(
                        &PipelineEvent::new(
                            run_id,
                            Some(name),
                            EventType::StageFailed,
                            format!("Stage '{}' failed", name),
                        )
                        .with_duration(duration_ms)
                        .with_error(e.to_string()),
                    )
                    .await?;
                error!(stage = %name, duration_ms, error = %e, "Stage failed");
                Err(e.into())
            }
        }
    }

    async fn finish_run(&self, store: &ArtifactStore, outcome: &RunOutcome) -> Result<(), PipelineError> {
        let run_id = store.run().id;
        let event = match outcome {
            RunOutcome::Published(artifact) => PipelineEvent::new(
                run_id,
                None,
                EventType::ModelPublished,
                format!("Model version {} published", artifact.version),
            ),
            RunOutcome::Rejected { reason, .. } => {
                PipelineEvent::new(run_id, None, EventType::ModelRejected, "Trained model rejected")
                    .with_error(reason.clone())
            }
        };
        store.append(&event).await?;
        store
            .append(&PipelineEvent::new(
                run_id,
                None,
                EventType::RunCompleted,
                "Run completed",
            ))
            .await
    }

    /// Mirror the run directory and both model roots; failures propagate
    async fn mirror_published(&self, store: &ArtifactStore) -> Result<(), PipelineError> {
        let Some((mirror, base)) = &self.remote else {
            return Ok(());
        };

        let targets = [
            (store.run_dir().to_path_buf(), run_location(base, store)),
            (self.config.model_dir.clone(), base.join(paths::SAVED_MODEL_DIR)),
            (
                self.config.transformer_dir.clone(),
                base.join(paths::SAVED_TRANSFORMER_DIR),
            ),
        ];
        for (local, remote) in targets {
            info!(mirror = mirror.name(), local = %local.display(), %remote, "Mirroring to remote");
            if let Err(e) = mirror.mirror_to_remote(&local, &remote).await {
                error!(%remote, error = %e, "Mirror of published run failed");
                record_mirror_failure(store, &remote, &e).await;
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Mirror the run directory for post-mortem, never failing the run
    async fn mirror_run_best_effort(&self, store: &ArtifactStore) {
        let Some((mirror, base)) = &self.remote else {
            return;
        };

        let remote = run_location(base, store);
        info!(mirror = mirror.name(), %remote, "Mirroring run artifacts");
        if let Err(e) = mirror.mirror_to_remote(store.run_dir(), &remote).await {
            warn!(%remote, error = %e, "Best-effort mirror failed");
            record_mirror_failure(store, &remote, &e).await;
        }
    }

    /// List recent runs with their replayed state, newest first
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<(String, Option<RunRecord>)>, PipelineError> {
        let names = ArtifactStore::list_runs(&self.config.artifact_dir).await?;
        let mut runs = Vec::new();
        for name in names.into_iter().take(limit) {
            let record = self.get_run_status(&name).await?;
            runs.push((name, record));
        }
        Ok(runs)
    }

    /// Replay the journal of a run directory
    pub async fn get_run_status(&self, dir_name: &str) -> Result<Option<RunRecord>, PipelineError> {
        let store = ArtifactStore::open_existing(&self.config.artifact_dir, dir_name).await?;
        let events = store.replay().await?;
        Ok(RunRecord::from_events(&events))
    }
}

async fn record_mirror_failure(store: &ArtifactStore, remote: &RemoteLocation, err: &MirrorError) {
    let event = PipelineEvent::new(
        store.run().id,
        None,
        EventType::MirrorFailed,
        format!("Mirror to {} failed", remote),
    )
    .with_error(err.to_string());
    if let Err(journal_err) = store.append(&event).await {
        warn!(error = %journal_err, "Failed to journal mirror failure");
    }
}

fn run_location(base: &RemoteLocation, store: &ArtifactStore) -> RemoteLocation {
    base.join(paths::REMOTE_ARTIFACT_PREFIX)
        .join(&store.run().dir_name())
}
