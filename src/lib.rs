//! evidence-pack: token-bounded evidence packs of code context
//!
//! Turns a user message, recent errors, a working set and a git diff into a
//! ranked, budget-trimmed bundle of code evidence for a language model, and
//! tunes its ranking weights from task outcomes.
//!
//! ```no_run
//! use evidence_pack::{AdaptiveBuildOptions, AdaptiveEvidenceSystem, EvidenceConfig, EvidenceInput};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let system = AdaptiveEvidenceSystem::new(&EvidenceConfig::default())?;
//! let input = EvidenceInput::from_message("Fix handleClick in Button.tsx");
//! let result = system.build(input, AdaptiveBuildOptions::default()).await;
//! println!("{}", result.pack.summary.describe());
//! system.feedback(&result.session_id, true);
//! # Ok(())
//! # }
//! ```

pub mod adaptive;
pub mod budget;
pub mod config;
pub mod domain;
pub mod error;
pub mod intent;
pub mod learning;
pub mod pack;
pub mod providers;
pub mod rerank;
pub mod services;
pub mod signals;
pub mod telemetry;
pub mod utils;

pub use adaptive::{AdaptiveBuildOptions, AdaptiveBuildResult, AdaptiveEvidenceSystem, FeedbackOutcome};
pub use budget::{Allocation, BudgetAllocator};
pub use config::{load_config, EvidenceConfig};
pub use domain::{
    BudgetRatios, ChangeType, DiffFile, ErrorInput, Evidence, EvidenceCategory, EvidenceInput,
    EvidencePack, GitDiff, Outcome, ProviderType, RankedEvidence, RerankerWeights, Signal,
    SignalType, TaskIntent, WeightKey,
};
pub use error::{ConfigError, ProviderError};
pub use intent::{
    ClassificationContext, ClassificationResult, IntentAwareProviderStrategy, TaskIntentClassifier,
};
pub use learning::{OptimizationResult, WeightOptimizer};
pub use pack::{BuildRequest, EvidencePackSystem, PackBuilder};
pub use providers::{EvidenceCache, EvidenceProvider};
pub use rerank::{Reranker, WeightedReranker};
pub use services::{GitService, LspHub};
pub use signals::SignalExtractor;
pub use telemetry::{EvidenceTelemetryService, TelemetryRecord, TelemetryStats};
