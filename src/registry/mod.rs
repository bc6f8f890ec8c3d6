//! Versioned model registry.
//!
//! - Resolver: finds the latest published model/transformer
//! - Publisher: writes a run's accepted artifacts as a new version
//! - Digest: content hashes recorded for published files

pub mod digest;
pub mod publisher;
pub mod resolver;

pub use digest::{compute_hash, file_digest};
pub use publisher::ArtifactPublisher;
pub use resolver::{latest_version, list_versions, next_publish_version, ModelResolver};
