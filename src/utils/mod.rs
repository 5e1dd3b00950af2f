//! Shared helpers

pub mod classify;
pub mod encoding;
pub mod hashing;
pub mod paths;
pub mod tokens;

pub use classify::should_skip_for_search;
pub use encoding::{is_binary_file, read_file_safe};
pub use hashing::{evidence_id, signal_fingerprint};
pub use paths::{normalize_path, paths_match};
pub use tokens::estimate_tokens;
