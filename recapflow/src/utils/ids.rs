//! Identifier generation.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generates a fresh run identifier.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::new_v4()
}

/// Derives a short, filesystem-safe identifier from the given parts.
///
/// The same parts always produce the same id.
#[must_use]
pub fn stable_reference_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..12])
}
