//! Core orchestration logic.
//!
//! This module contains:
//! - ArtifactStore: Per-run directory layout and append-only journal
//! - StageCommands: Stage command definitions and loading
//! - RunGuard: Single-run enforcement
//! - Orchestrator: Main execution engine

pub mod artifact_store;
pub mod orchestrator;
pub mod pipeline;
pub mod run_guard;

// Re-export commonly used types
pub use artifact_store::ArtifactStore;
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunOutcome, RunReport};
pub use pipeline::{StageCommand, StageCommands};
pub use run_guard::{GuardState, RunGuard, RunLock, RunTicket};
