//! Content digests for published files.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs;

/// Compute SHA256 of a byte slice as "sha256:<hex>"
pub fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Digest of a file's contents
pub async fn file_digest(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path).await?;
    Ok(compute_hash(&bytes))
}
