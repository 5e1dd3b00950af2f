//! Core data model shared across the pipeline

mod evidence;
mod input;
mod pack;
mod signal;
mod weights;

pub use evidence::{Evidence, EvidenceCategory, EvidenceMetadata, ProviderType};
pub use input::{ChangeType, DiffFile, ErrorInput, EvidenceInput, GitDiff};
pub use pack::{
    DiffSummary, EvidencePack, EvidenceTelemetry, Outcome, PackSummary, ProviderTiming,
    RankedEvidence, TaskIntent,
};
pub use signal::{Signal, SignalMetadata, SignalSource, SignalType};
pub use weights::{
    clamp_decay, clamp_weight, BudgetRatios, RatioBounds, RerankerWeights, WeightKey, MAX_WEIGHT,
    MIN_WEIGHT,
};
