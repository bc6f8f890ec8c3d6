//! Journal events recorded during a training run.
//!
//! Every run appends its events to `events.jsonl` inside the run directory.
//! The journal travels with the run artifacts when they are mirrored, so a
//! failed run can be inspected remotely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::StageName;

/// A single entry in a run journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Stage the event refers to (if applicable)
    pub stage: Option<StageName>,

    /// Type of event
    pub event_type: EventType,

    /// Human-readable summary
    pub summary: String,

    /// Time taken in milliseconds (for finished stages)
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl PipelineEvent {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        stage: Option<StageName>,
        event_type: EventType,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            stage,
            event_type,
            summary: summary.into(),
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Types of events that can occur during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    StageStarted,
    StageCompleted,
    StageFailed,
    /// Evaluation ran but the candidate did not beat the incumbent
    ModelRejected,
    ModelPublished,
    /// Best-effort mirror attempt failed and was swallowed
    MirrorFailed,
    RunCompleted,
    RunFailed,
}
