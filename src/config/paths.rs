//! Canonical file and directory names of the training layout.
//!
//! Single source of truth - import this instead of hardcoding names.
//!
//! ## Layout
//!
//! | Location | Owner | Purpose |
//! |----------|-------|---------|
//! | `<artifact_dir>/<run>/` | Orchestrator | Per-run stage artifacts and journal |
//! | `<saved_models>/<version>/model.pkl` | Publisher | Versioned models polled by serving |
//! | `<saved_transformers>/<version>/preprocessing.pkl` | Publisher | Versioned transformers |

/// Default artifact root directory name
pub const ARTIFACT_DIR: &str = "artifact";

/// Default model version root
pub const SAVED_MODEL_DIR: &str = "saved_models";

/// Default transformer version root
pub const SAVED_TRANSFORMER_DIR: &str = "saved_transformers";

/// Trained model file name (inside trainer, pusher and version directories)
pub const MODEL_FILE_NAME: &str = "model.pkl";

/// Fitted transformer file name
pub const PREPROCESSING_OBJECT_FILE_NAME: &str = "preprocessing.pkl";

/// Run journal file name
pub const EVENTS_FILE_NAME: &str = "events.jsonl";

/// Run identity file name
pub const RUN_FILE_NAME: &str = "run.json";

/// Stage artifact record file name (one per stage directory)
pub const ARTIFACT_RECORD_FILE_NAME: &str = "artifact.json";

/// Cross-process run lock file name (inside home)
pub const LOCK_FILE_NAME: &str = "pipeline.lock";

// ============================================================================
// Stage layout
// ============================================================================

pub const TRAIN_FILE_NAME: &str = "train.csv";
pub const TEST_FILE_NAME: &str = "test.csv";
pub const TRANSFORMED_TRAIN_FILE_NAME: &str = "train.npy";
pub const TRANSFORMED_TEST_FILE_NAME: &str = "test.npy";

pub const DATA_INGESTION_FEATURE_STORE_DIR: &str = "feature_store";
pub const DATA_INGESTION_INGESTED_DIR: &str = "ingested";

pub const DATA_VALIDATION_VALID_DIR: &str = "validated";
pub const DATA_VALIDATION_INVALID_DIR: &str = "invalid";
pub const DATA_VALIDATION_DRIFT_REPORT_DIR: &str = "drift_report";
pub const DATA_VALIDATION_DRIFT_REPORT_FILE_NAME: &str = "report.yaml";

pub const DATA_TRANSFORMATION_TRANSFORMED_DATA_DIR: &str = "transformed";
pub const DATA_TRANSFORMATION_TRANSFORMED_OBJECT_DIR: &str = "transformed_object";

pub const MODEL_TRAINER_TRAINED_MODEL_DIR: &str = "trained_model";

pub const MODEL_EVALUATION_REPORT_NAME: &str = "report.yaml";

// ============================================================================
// Remote layout
// ============================================================================

/// Remote prefix for per-run artifact directories
pub const REMOTE_ARTIFACT_PREFIX: &str = "artifact";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_files_have_distinct_names() {
        assert_ne!(MODEL_FILE_NAME, PREPROCESSING_OBJECT_FILE_NAME);
    }

    #[test]
    fn test_roots_are_relative_names() {
        for name in [ARTIFACT_DIR, SAVED_MODEL_DIR, SAVED_TRANSFORMER_DIR] {
            assert!(!name.contains('/'), "{name} should be a bare directory name");
        }
    }
}
