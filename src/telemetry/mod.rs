//! Build telemetry, outcome labels and their on-disk mirror

pub mod persist;
pub mod service;

pub use service::{EvidenceTelemetryService, ProviderStats, TelemetryRecord, TelemetryStats};
