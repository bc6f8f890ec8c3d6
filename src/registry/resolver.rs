//! Latest-version lookup over a version root.
//!
//! A version root holds one subdirectory per published version, named by a
//! non-negative integer. The numerically largest name is the latest version.
//! Hidden entries (leading `.`) are in-flight staging directories of the
//! publisher and are never considered.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::paths;
use crate::error::RegistryError;

/// List the versions under `root` in ascending numeric order
pub fn list_versions(root: &Path) -> Result<Vec<u64>, RegistryError> {
    scan_versions(root, true)
}

fn scan_versions(root: &Path, strict: bool) -> Result<Vec<u64>, RegistryError> {
    if !root.exists() {
        return Err(RegistryError::MissingRoot(root.to_path_buf()));
    }

    let io_err = |source| RegistryError::Io {
        path: root.to_path_buf(),
        source,
    };

    let mut versions = Vec::new();
    for entry in std::fs::read_dir(root).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_type().map_err(io_err)?.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }

        match name.parse::<u64>() {
            Ok(version) => versions.push(version),
            Err(_) if strict => {
                return Err(RegistryError::MalformedVersion {
                    root: root.to_path_buf(),
                    name,
                })
            }
            Err(_) => debug!(root = %root.display(), %name, "Skipping non-version entry"),
        }
    }

    versions.sort_unstable();
    Ok(versions)
}

/// Version number for the next publish across `roots`
///
/// At least `floor` (the run's own version) and strictly above every
/// integer version already present in any root, so two runs stamped in the
/// same second still publish distinct, increasing versions. Missing roots
/// and non-integer entries do not block a publish.
pub fn next_publish_version(roots: &[&Path], floor: u64) -> Result<u64, RegistryError> {
    let mut next = floor;
    for root in roots {
        if !root.exists() {
            continue;
        }
        if let Some(latest) = scan_versions(root, false)?.last() {
            next = next.max(latest.saturating_add(1));
        }
    }
    Ok(next)
}

/// Numerically largest version under `root`
pub fn latest_version(root: &Path) -> Result<u64, RegistryError> {
    list_versions(root)?
        .last()
        .copied()
        .ok_or_else(|| RegistryError::NoVersions(root.to_path_buf()))
}

/// Resolves the current model and transformer for serving and evaluation
#[derive(Debug, Clone)]
pub struct ModelResolver {
    model_dir: PathBuf,
    transformer_dir: PathBuf,
    model_file_name: String,
    transformer_file_name: String,
}

impl ModelResolver {
    pub fn new(model_dir: impl Into<PathBuf>, transformer_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            transformer_dir: transformer_dir.into(),
            model_file_name: paths::MODEL_FILE_NAME.to_string(),
            transformer_file_name: paths::PREPROCESSING_OBJECT_FILE_NAME.to_string(),
        }
    }

    /// Override the artifact file names expected inside version directories
    pub fn with_file_names(
        mut self,
        model_file_name: impl Into<String>,
        transformer_file_name: impl Into<String>,
    ) -> Self {
        self.model_file_name = model_file_name.into();
        self.transformer_file_name = transformer_file_name.into();
        self
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn transformer_dir(&self) -> &Path {
        &self.transformer_dir
    }

    /// Path of the model in the latest version directory.
    ///
    /// Fails if the root is missing, empty, or holds a non-integer name;
    /// check [`is_model_exists`](Self::is_model_exists) first.
    pub fn get_best_model_path(&self) -> Result<PathBuf, RegistryError> {
        best_path(&self.model_dir, &self.model_file_name)
    }

    /// Path of the transformer in the latest version directory
    pub fn get_best_transformer_path(&self) -> Result<PathBuf, RegistryError> {
        best_path(&self.transformer_dir, &self.transformer_file_name)
    }

    /// Whether a complete latest model exists. Never fails.
    pub fn is_model_exists(&self) -> bool {
        exists(&self.model_dir, &self.model_file_name)
    }

    /// Whether a complete latest transformer exists. Never fails.
    pub fn is_transformer_exists(&self) -> bool {
        exists(&self.transformer_dir, &self.transformer_file_name)
    }
}

fn best_path(root: &Path, file_name: &str) -> Result<PathBuf, RegistryError> {
    let version = latest_version(root)?;
    Ok(root.join(version.to_string()).join(file_name))
}

fn exists(root: &Path, file_name: &str) -> bool {
    match best_path(root, file_name) {
        Ok(path) => path.is_file(),
        Err(e) => {
            debug!(root = %root.display(), error = %e, "No resolvable version");
            false
        }
    }
}
