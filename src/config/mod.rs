//! Configuration for trainctl paths, remote mirroring and stages.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (TRAINCTL_HOME, TRAINCTL_BUCKET)
//! 2. Config file (.trainctl/config.yaml)
//! 3. Defaults (~/.trainctl)
//!
//! Config file discovery:
//! - Searches current directory and parents for .trainctl/config.yaml
//! - Paths in config file are relative to the project root (parent of .trainctl/)

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::StageCommands;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub stages: StageCommands,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .trainctl/)
    pub home: Option<String>,
    /// Per-run artifact root
    pub artifact_dir: Option<String>,
    /// Model version root polled by serving
    pub saved_models: Option<String>,
    /// Transformer version root polled by serving
    pub saved_transformers: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// `scheme://bucket/prefix` of the remote store
    pub bucket_url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub aws_binary: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Thresholds handed to the stage collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Source collection/table the ingestion stage exports
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Feature store file name written by ingestion
    #[serde(default = "default_data_file_name")]
    pub data_file_name: String,

    #[serde(default = "default_split_ratio")]
    pub train_test_split_ratio: f64,

    /// Minimum score a trained model must reach
    #[serde(default = "default_expected_score")]
    pub expected_score: f64,

    /// Maximum train/test score gap before the model counts as over/underfit
    #[serde(default = "default_overfitting_threshold")]
    pub overfitting_threshold: f64,

    /// Minimum improvement over the production model for acceptance
    #[serde(default = "default_change_threshold")]
    pub model_change_threshold: f64,
}

fn default_collection_name() -> String {
    "sensor".to_string()
}
fn default_data_file_name() -> String {
    "sensor.csv".to_string()
}
fn default_split_ratio() -> f64 {
    0.2
}
fn default_expected_score() -> f64 {
    0.6
}
fn default_overfitting_threshold() -> f64 {
    0.05
}
fn default_change_threshold() -> f64 {
    0.02
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            collection_name: default_collection_name(),
            data_file_name: default_data_file_name(),
            train_test_split_ratio: default_split_ratio(),
            expected_score: default_expected_score(),
            overfitting_threshold: default_overfitting_threshold(),
            model_change_threshold: default_change_threshold(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub bucket_url: Option<String>,
    pub timeout_seconds: u64,
    pub aws_binary: String,
    pub exclude: Vec<String>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            bucket_url: None,
            timeout_seconds: 900,
            aws_binary: "aws".to_string(),
            exclude: Vec::new(),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to trainctl home (lock file, defaults)
    pub home: PathBuf,
    pub artifact_dir: PathBuf,
    pub saved_models: PathBuf,
    pub saved_transformers: PathBuf,
    pub remote: RemoteSettings,
    pub training: TrainingSettings,
    pub stages: StageCommands,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Configuration rooted entirely under `home`
    pub fn with_home(home: PathBuf) -> Self {
        Self {
            artifact_dir: home.join(paths::ARTIFACT_DIR),
            saved_models: home.join(paths::SAVED_MODEL_DIR),
            saved_transformers: home.join(paths::SAVED_TRANSFORMER_DIR),
            home,
            remote: RemoteSettings::default(),
            training: TrainingSettings::default(),
            stages: StageCommands::default(),
            config_file: None,
        }
    }

    /// Path of the cross-process run lock
    pub fn lock_path(&self) -> PathBuf {
        self.home.join(paths::LOCK_FILE_NAME)
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".trainctl").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Build the resolved config from a parsed file located at `config_path`
fn resolve_config_file(
    config: ConfigFile,
    config_path: &Path,
    default_home: PathBuf,
) -> ResolvedConfig {
    // .trainctl/ and the project root above it
    let trainctl_dir = config_path.parent().unwrap_or(Path::new("."));
    let base_dir = trainctl_dir.parent().unwrap_or(Path::new("."));

    let home = match config.paths.home {
        Some(ref home_path) => resolve_path(trainctl_dir, home_path),
        None => default_home,
    };

    let mut resolved = ResolvedConfig::with_home(home);

    if let Some(ref dir) = config.paths.artifact_dir {
        resolved.artifact_dir = resolve_path(base_dir, dir);
    }
    if let Some(ref dir) = config.paths.saved_models {
        resolved.saved_models = resolve_path(base_dir, dir);
    }
    if let Some(ref dir) = config.paths.saved_transformers {
        resolved.saved_transformers = resolve_path(base_dir, dir);
    }

    if let Some(remote) = config.remote {
        let defaults = RemoteSettings::default();
        resolved.remote = RemoteSettings {
            bucket_url: remote.bucket_url,
            timeout_seconds: remote.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            aws_binary: remote.aws_binary.unwrap_or(defaults.aws_binary),
            exclude: remote.exclude,
        };
    }

    resolved.training = config.training;
    resolved.stages = config.stages;
    resolved.config_file = Some(config_path.to_path_buf());
    resolved
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".trainctl");

    let mut resolved = match find_config_file() {
        Some(config_path) => {
            let config = load_config_file(&config_path)?;
            resolve_config_file(config, &config_path, default_home)
        }
        None => ResolvedConfig::with_home(default_home),
    };

    // Environment overrides apply on top of file and defaults
    if let Ok(env_home) = std::env::var("TRAINCTL_HOME") {
        let home = PathBuf::from(env_home);
        if resolved.config_file.is_none() {
            let remote = resolved.remote.clone();
            resolved = ResolvedConfig {
                remote,
                ..ResolvedConfig::with_home(home)
            };
        } else {
            resolved.home = home;
        }
    }
    if let Ok(bucket) = std::env::var("TRAINCTL_BUCKET") {
        resolved.remote.bucket_url = Some(bucket);
    }

    Ok(resolved)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StageName;
    use std::io::Write;
    use tempfile::TempDir;

    const CONFIG_YAML: &str = r#"
version: "1.0"
paths:
  home: ./state
  artifact_dir: ./artifact
  saved_models: ./serving/models
remote:
  bucket_url: s3://sensor-training
  timeout_seconds: 60
  exclude:
    - "*.tmp"
training:
  model_change_threshold: 0.05
stages:
  data_ingestion:
    program: python
    args: ["-m", "sensor.stages.ingest"]
"#;

    #[test]
    fn test_config_file_parsing() {
        let config: ConfigFile = serde_yaml::from_str(CONFIG_YAML).unwrap();

        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.saved_models.as_deref(), Some("./serving/models"));
        assert_eq!(config.training.model_change_threshold, 0.05);
        // Unset thresholds keep their defaults
        assert_eq!(config.training.expected_score, 0.6);
        assert_eq!(
            config
                .stages
                .get(StageName::DataIngestion)
                .map(|c| c.program.as_str()),
            Some("python")
        );
    }

    #[test]
    fn test_resolve_config_file_paths() {
        let temp = TempDir::new().unwrap();
        let trainctl_dir = temp.path().join(".trainctl");
        std::fs::create_dir_all(&trainctl_dir).unwrap();

        let config_path = trainctl_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        write!(file, "{}", CONFIG_YAML).unwrap();

        let config = load_config_file(&config_path).unwrap();
        let resolved = resolve_config_file(config, &config_path, PathBuf::from("/unused"));

        assert_eq!(resolved.home, trainctl_dir.join("./state"));
        assert_eq!(resolved.artifact_dir, temp.path().join("./artifact"));
        assert_eq!(resolved.saved_models, temp.path().join("./serving/models"));
        // Not set in the file: derived from home
        assert_eq!(
            resolved.saved_transformers,
            resolved.home.join(paths::SAVED_TRANSFORMER_DIR)
        );
        assert_eq!(
            resolved.remote.bucket_url.as_deref(),
            Some("s3://sensor-training")
        );
        assert_eq!(resolved.remote.timeout_seconds, 60);
        assert_eq!(resolved.remote.aws_binary, "aws");
        assert_eq!(resolved.config_file, Some(config_path));
    }

    #[test]
    fn test_with_home_layout() {
        let config = ResolvedConfig::with_home(PathBuf::from("/srv/trainctl"));

        assert_eq!(config.artifact_dir, PathBuf::from("/srv/trainctl/artifact"));
        assert_eq!(config.saved_models, PathBuf::from("/srv/trainctl/saved_models"));
        assert_eq!(config.lock_path(), PathBuf::from("/srv/trainctl/pipeline.lock"));
        assert!(config.remote.bucket_url.is_none());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
