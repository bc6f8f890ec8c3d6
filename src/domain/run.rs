//! Run identity and state reconstruction from the journal.
//!
//! A `PipelineRun` is the timestamp-scoped identity shared by all artifacts
//! of one orchestrator invocation. It is never reused.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::StageName;
use super::events::{EventType, PipelineEvent};

/// Format of per-run artifact directory names
pub const RUN_DIR_FORMAT: &str = "%m_%d_%Y_%H_%M_%S";

/// Identity of a single training run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,

    /// Disambiguates runs stamped in the same second; 0 for the first
    #[serde(default)]
    pub seq: u32,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRun {
    /// Create a run stamped with the current time
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Create a run stamped with a specific time
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            seq: 0,
        }
    }

    /// The same run moved to the next free sequence slot
    pub fn next_seq(&self) -> Self {
        Self {
            seq: self.seq + 1,
            ..self.clone()
        }
    }

    /// Name of the per-run artifact directory
    ///
    /// `05_01_2024_10_00_00` for the first run of a second, then
    /// `05_01_2024_10_00_00_1`, `05_01_2024_10_00_00_2` and so on.
    pub fn dir_name(&self) -> String {
        let stamp = self.timestamp.format(RUN_DIR_FORMAT);
        match self.seq {
            0 => stamp.to_string(),
            seq => format!("{}_{}", stamp, seq),
        }
    }

    /// Parse a run directory name back into its timestamp and sequence
    pub fn parse_dir_name(name: &str) -> Option<(NaiveDateTime, u32)> {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(name, RUN_DIR_FORMAT) {
            return Some((stamp, 0));
        }
        let (stamp, seq) = name.rsplit_once('_')?;
        let seq = seq.parse::<u32>().ok().filter(|s| *s > 0)?;
        let stamp = NaiveDateTime::parse_from_str(stamp, RUN_DIR_FORMAT).ok()?;
        Some((stamp, seq))
    }

    /// Version number used for published model/transformer directories
    pub fn version(&self) -> u64 {
        self.timestamp.timestamp().max(0) as u64
    }
}

/// Terminal or in-progress state of a run, derived from its journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    Running,
    Published,
    Rejected { reason: String },
    Failed { error: String },
}

impl Default for RunState {
    fn default() -> Self {
        Self::Running
    }
}

/// Status of one stage inside a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Running,
    Completed,
    Failed,
}

/// A run as reconstructed by replaying its journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stages: BTreeMap<StageName, StageStatus>,
    /// Number of best-effort mirror attempts that failed
    pub mirror_failures: u32,
}

impl RunRecord {
    /// Reconstruct run state from a sequence of events
    pub fn from_events(events: &[PipelineEvent]) -> Option<Self> {
        let first = events.first()?;

        let mut record = Self {
            run_id: first.run_id,
            state: RunState::Running,
            started_at: first.timestamp,
            completed_at: None,
            stages: BTreeMap::new(),
            mirror_failures: 0,
        };

        for event in events {
            record.apply_event(event);
        }

        Some(record)
    }

    /// Apply a single event to update run state
    pub fn apply_event(&mut self, event: &PipelineEvent) {
        match event.event_type {
            EventType::RunStarted => {
                self.state = RunState::Running;
                self.started_at = event.timestamp;
            }
            EventType::StageStarted => self.set_stage(event, StageStatus::Running),
            EventType::StageCompleted => self.set_stage(event, StageStatus::Completed),
            EventType::StageFailed => self.set_stage(event, StageStatus::Failed),
            EventType::ModelRejected => {
                self.state = RunState::Rejected {
                    reason: event.error.clone().unwrap_or_default(),
                };
            }
            EventType::ModelPublished => self.state = RunState::Published,
            EventType::MirrorFailed => self.mirror_failures += 1,
            EventType::RunCompleted => self.completed_at = Some(event.timestamp),
            EventType::RunFailed => {
                self.state = RunState::Failed {
                    error: event.error.clone().unwrap_or_default(),
                };
                self.completed_at = Some(event.timestamp);
            }
        }
    }

    fn set_stage(&mut self, event: &PipelineEvent, status: StageStatus) {
        if let Some(stage) = event.stage {
            self.stages.insert(stage, status);
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running)
    }

    pub fn is_stage_completed(&self, stage: StageName) -> bool {
        self.stages.get(&stage) == Some(&StageStatus::Completed)
    }
}
