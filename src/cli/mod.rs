//! Command-line interface for trainctl.
//!
//! Provides commands for running the training pipeline, resolving the
//! current model, inspecting past runs and pulling the registry from the
//! remote store.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::{mirror_for, CommandStages, RemoteLocation};
use crate::config::{self, paths, ResolvedConfig};
use crate::core::{Orchestrator, OrchestratorConfig, RunLock, RunOutcome};
use crate::domain::{RunRecord, RunState, StageStatus};

/// trainctl - Training pipeline orchestrator
#[derive(Parser, Debug)]
#[command(name = "trainctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the training pipeline once
    Train {
        /// Skip mirroring to the remote store
        #[arg(long)]
        no_mirror: bool,
    },

    /// Print the latest published model and transformer paths
    Resolve,

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Check the status of a run
    Status {
        /// Run directory name (e.g. 05_01_2024_10_00_00)
        run: String,
    },

    /// Download saved models and transformers from the remote store
    Pull,

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;

        match self.command {
            Commands::Train { no_mirror } => train(cfg, no_mirror).await,
            Commands::Resolve => resolve(cfg),
            Commands::Runs { limit } => list_runs(cfg, limit).await,
            Commands::Status { run } => show_status(cfg, &run).await,
            Commands::Pull => pull(cfg).await,
            Commands::Config => show_config(cfg),
        }
    }
}

fn remote_location(cfg: &ResolvedConfig) -> Result<Option<RemoteLocation>> {
    cfg.remote
        .bucket_url
        .as_deref()
        .map(|url| RemoteLocation::parse(url).context("Invalid remote.bucket_url"))
        .transpose()
}

fn orchestrator(cfg: &ResolvedConfig, with_remote: bool) -> Result<Orchestrator> {
    let stages = Arc::new(CommandStages::new(cfg.stages.clone()));
    let mut orchestrator = Orchestrator::new(OrchestratorConfig::from_resolved(cfg), stages);

    if with_remote {
        if let Some(location) = remote_location(cfg)? {
            let mirror = mirror_for(&location, &cfg.remote)?;
            orchestrator = orchestrator.with_remote(mirror, location);
        }
    }

    Ok(orchestrator)
}

/// Run the pipeline once, refusing if another process is already training
async fn train(cfg: &ResolvedConfig, no_mirror: bool) -> Result<()> {
    cfg.stages.validate()?;

    let Some(_lock) = RunLock::try_acquire(&cfg.lock_path())? else {
        anyhow::bail!("Training pipeline is already running");
    };

    let orchestrator = orchestrator(cfg, !no_mirror)?;

    match orchestrator.run_pipeline().await {
        Ok(report) => match report.outcome {
            RunOutcome::Published(artifact) => {
                println!("Published version {}", artifact.version);
                println!("  Model:       {}", artifact.saved_model_path.display());
                println!("  Transformer: {}", artifact.saved_transformer_path.display());
                eprintln!("\n[Run {} completed]", report.run.dir_name());
            }
            RunOutcome::Rejected { reason, .. } => {
                println!("Model not accepted: {}", reason);
                eprintln!("\n[Run {} completed without publishing]", report.run.dir_name());
            }
        },
        Err(e) => {
            eprintln!("\n[Run failed ({:?}): {}]", e.kind(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Print the latest model and transformer paths
fn resolve(cfg: &ResolvedConfig) -> Result<()> {
    let resolver = OrchestratorConfig::from_resolved(cfg).resolver();

    if resolver.is_model_exists() {
        println!("Model:       {}", resolver.get_best_model_path()?.display());
    } else {
        println!("Model:       (not available)");
    }

    if resolver.is_transformer_exists() {
        println!("Transformer: {}", resolver.get_best_transformer_path()?.display());
    } else {
        println!("Transformer: (not available)");
    }

    Ok(())
}

fn state_label(record: Option<&RunRecord>) -> String {
    match record.map(|r| &r.state) {
        None => "no events".to_string(),
        Some(RunState::Running) => "running".to_string(),
        Some(RunState::Published) => "published".to_string(),
        Some(RunState::Rejected { .. }) => "rejected".to_string(),
        Some(RunState::Failed { .. }) => "failed".to_string(),
    }
}

/// List recent runs
async fn list_runs(cfg: &ResolvedConfig, limit: usize) -> Result<()> {
    let runs = orchestrator(cfg, false)?.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("{:<22} {:<12} {:<25}", "RUN", "STATE", "STARTED");
    println!("{}", "-".repeat(60));

    for (name, record) in runs {
        let started = record
            .as_ref()
            .map(|r| r.started_at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!("{:<22} {:<12} {:<25}", name, state_label(record.as_ref()), started);
    }

    Ok(())
}

/// Show the replayed state of one run
async fn show_status(cfg: &ResolvedConfig, run: &str) -> Result<()> {
    let record = orchestrator(cfg, false)?
        .get_run_status(run)
        .await?
        .with_context(|| format!("Run {} has no journal events", run))?;

    println!("Run: {}", run);
    println!("Run ID: {}", record.run_id);
    println!("State: {}", state_label(Some(&record)));
    match &record.state {
        RunState::Rejected { reason } => println!("Reason: {}", reason),
        RunState::Failed { error } => println!("Error: {}", error),
        _ => {}
    }
    println!("Started: {}", record.started_at);
    if let Some(completed) = record.completed_at {
        println!("Completed: {}", completed);
    }
    if record.mirror_failures > 0 {
        println!("Mirror failures: {}", record.mirror_failures);
    }
    println!("\nStage statuses:");
    for (stage, status) in &record.stages {
        let status = match status {
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        };
        println!("  {}: {}", stage, status);
    }

    Ok(())
}

/// Mirror the remote registry into the local saved roots
async fn pull(cfg: &ResolvedConfig) -> Result<()> {
    let location = remote_location(cfg)?
        .context("No remote configured (set remote.bucket_url or TRAINCTL_BUCKET)")?;
    let mirror = mirror_for(&location, &cfg.remote)?;

    for (segment, local) in [
        (paths::SAVED_MODEL_DIR, &cfg.saved_models),
        (paths::SAVED_TRANSFORMER_DIR, &cfg.saved_transformers),
    ] {
        let remote = location.join(segment);
        mirror
            .mirror_from_remote(&remote, local)
            .await
            .with_context(|| format!("Failed to pull {}", remote))?;
        println!("Pulled {} -> {}", remote, local.display());
    }

    Ok(())
}

/// Show resolved configuration
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("trainctl configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:               {}", cfg.home.display());
    println!("  Artifacts:          {}", cfg.artifact_dir.display());
    println!("  Saved models:       {}", cfg.saved_models.display());
    println!("  Saved transformers: {}", cfg.saved_transformers.display());
    println!("  Lock file:          {}", cfg.lock_path().display());
    println!();
    println!("Remote:");
    println!(
        "  Bucket:  {}",
        cfg.remote.bucket_url.as_deref().unwrap_or("(not configured)")
    );
    println!("  Timeout: {}s", cfg.remote.timeout_seconds);
    if !cfg.remote.exclude.is_empty() {
        println!("  Exclude: {}", cfg.remote.exclude.join(", "));
    }
    println!();
    println!("Training:");
    println!("  Collection:             {}", cfg.training.collection_name);
    println!("  Train/test split:       {}", cfg.training.train_test_split_ratio);
    println!("  Expected score:         {}", cfg.training.expected_score);
    println!("  Overfitting threshold:  {}", cfg.training.overfitting_threshold);
    println!("  Model change threshold: {}", cfg.training.model_change_threshold);
    println!();
    println!("Stages (default timeout {}s):", cfg.stages.default_timeout_seconds);
    for stage in crate::domain::StageName::ORDER {
        match cfg.stages.get(stage) {
            Some(command) => println!("  {}: {} {}", stage, command.program, command.args.join(" ")),
            None if stage == crate::domain::StageName::ModelPusher => {
                println!("  {}: (built in)", stage)
            }
            None => println!("  {}: (not configured)", stage),
        }
    }

    Ok(())
}
