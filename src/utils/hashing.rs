//! Stable hashing for evidence ids and cache keys

use crate::domain::{ProviderType, Signal};
use sha2::{Digest, Sha256};

/// Stable id for an evidence item: same category, path and line range hash alike.
pub fn evidence_id(category: &str, path: &str, start_line: usize, end_line: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{category}:{path}:{start_line}-{end_line}").as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Order-independent fingerprint over a signal set and the provider querying it.
pub fn signal_fingerprint(provider: ProviderType, scope: &str, signals: &[Signal]) -> String {
    let mut keys: Vec<String> =
        signals.iter().map(|s| format!("{}\u{1f}{}", s.kind.as_str(), s.value)).collect();
    keys.sort();
    keys.dedup();

    let mut hasher = Sha256::new();
    hasher.update(provider.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(scope.as_bytes());
    for key in keys {
        hasher.update([0u8]);
        hasher.update(key.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
