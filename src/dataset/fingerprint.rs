//! Content fingerprints for dataset snapshots
//!
//! A fingerprint is a deterministic digest over a canonical serialization of
//! a snapshot's rows and schema. Rows are sorted by their canonical row key
//! before hashing, so the fingerprint is invariant under row reordering in
//! the source file. Used for new-content detection and idempotent re-runs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{row_key, Row, Schema};

/// Deterministic content identity for a dataset snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a schema + row set
    pub fn compute(schema: &Schema, rows: &[Row]) -> Self {
        let mut keys: Vec<String> = rows.iter().map(row_key).collect();
        keys.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(schema.canonical_token().as_bytes());
        for key in &keys {
            hasher.update([0x1e]); // record separator
            hasher.update(key.as_bytes());
        }
        let result = hasher.finalize();
        Self(format!("sha256-{}", hex::encode(&result[..16])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for run ids and log lines: first 12 hex chars of the digest
    pub fn short(&self) -> &str {
        let hex = self.0.strip_prefix("sha256-").unwrap_or(&self.0);
        &hex[..hex.len().min(12)]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
