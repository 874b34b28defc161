//! Target hashing for change detection.
//!
//! The fingerprint of a [`DeploymentTarget`] is attached to the container as a
//! label so a later run can tell whether the instance it replaces was built
//! from the same target.

use sha2::{Digest, Sha256};

use super::spec::DeploymentTarget;

/// Hasher for computing target fingerprints.
#[derive(Debug, Default, Clone, Copy)]
pub struct TargetHasher;

impl TargetHasher {
    /// Creates a new target hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of a deployment target.
    ///
    /// Every field of the target takes part, each followed by a separator so
    /// that adjacent fields cannot run into each other.
    #[must_use]
    pub fn hash_target(&self, target: &DeploymentTarget) -> String {
        let mut hasher = Sha256::new();

        for field in [
            target.name.as_bytes(),
            target.image.as_bytes(),
            target.upstream_host.as_bytes(),
        ] {
            hasher.update(field);
            hasher.update([0u8]);
        }

        hasher.update(target.upstream_port.to_be_bytes());
        hasher.update(target.host_port.to_be_bytes());

        hasher.update(target.config_file.as_os_str().as_encoded_bytes());
        hasher.update([0u8]);
        hasher.update(target.templates_dir.as_os_str().as_encoded_bytes());

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}
