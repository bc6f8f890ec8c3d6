//! trainctl - Training pipeline orchestrator
//!
//! Runs a fixed sequence of training stages, publishes accepted models
//! into a versioned registry and mirrors artifacts to a remote store.
//!
//! # Architecture
//!
//! - Each run gets a timestamped artifact directory and a JSONL journal
//! - Stages are external collaborators behind the `TrainingStages` trait
//! - Accepted models become `<root>/<version>/` directories, created by
//!   a single atomic rename
//! - The latest version is whichever directory name is numerically largest
//!
//! # Modules
//!
//! - `adapters`: Stage and remote store integrations
//! - `core`: Orchestration logic (ArtifactStore, RunGuard, Orchestrator)
//! - `domain`: Data structures (artifacts, events, runs)
//! - `registry`: Model resolution and publishing
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the pipeline once
//! trainctl train
//!
//! # Show the model currently served
//! trainctl resolve
//!
//! # Inspect a run
//! trainctl status 05_01_2024_10_00_00
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod registry;

// Re-export main types at crate root for convenience
pub use core::{Orchestrator, RunOutcome, RunReport};
pub use domain::{PipelineRun, RunRecord, RunState, StageName};
pub use error::{ErrorKind, PipelineError};
pub use registry::{ArtifactPublisher, ModelResolver};
