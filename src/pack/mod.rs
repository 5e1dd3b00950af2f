//! Pack assembly: the pipeline and the façade that owns live weights

pub mod builder;
pub mod system;

pub use builder::{BuildRequest, PackBuilder};
pub use system::EvidencePackSystem;
