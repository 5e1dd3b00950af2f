//! Intent-aware, self-tuning front door to the evidence pipeline
//!
//! `build` classifies the task, biases the weights for that build only,
//! delegates to [`EvidencePackSystem`] and records telemetry under a fresh
//! session id. `feedback` labels a session and, every
//! `auto_optimize_threshold` builds, runs [`AdaptiveEvidenceSystem::optimize`].
//! Optimization consumes only records labelled since the last applied run.
//!
//! When telemetry is persisted, the learning state (live weights, session
//! counter and watermark) is mirrored to `<telemetry>.learning.json` so that
//! separate processes share one feedback loop.

use crate::config::{AdaptiveConfig, EvidenceConfig};
use crate::domain::{EvidenceInput, EvidencePack, Outcome, RerankerWeights, TaskIntent};
use crate::error::ConfigError;
use crate::intent::{
    ClassificationContext, ClassificationResult, IntentAwareProviderStrategy, TaskIntentClassifier,
};
use crate::learning::{OptimizationResult, OptimizerConfig, WeightOptimizer};
use crate::pack::{BuildRequest, EvidencePackSystem};
use crate::telemetry::{persist, EvidenceTelemetryService, TelemetryStats};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct AdaptiveBuildOptions {
    pub token_budget: Option<usize>,
    /// Skip classification and use this intent.
    pub force_intent: Option<TaskIntent>,
    /// Intent of the previous turn, if the caller tracks it.
    pub recent_intent: Option<TaskIntent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveBuildResult {
    pub session_id: String,
    pub intent: ClassificationResult,
    pub strategy_applied: bool,
    pub pack: EvidencePack,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackOutcome {
    pub session_id: String,
    pub outcome: Outcome,
    /// False when the session is unknown or already evicted.
    pub recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization: Option<OptimizationResult>,
}

#[derive(Debug, Default)]
struct LearningState {
    sessions_since_optimize: usize,
    /// Label sequence consumed by the last applied optimization.
    watermark: u64,
}

/// On-disk form of [`LearningState`] plus the live weights.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedLearning {
    weights: RerankerWeights,
    sessions_since_optimize: usize,
    watermark: u64,
}

/// Learning state file kept beside a telemetry file:
/// `telemetry.json` becomes `telemetry.learning.json`.
pub fn learning_state_path(telemetry_path: &Path) -> PathBuf {
    telemetry_path.with_extension("learning.json")
}

pub struct AdaptiveEvidenceSystem {
    system: Arc<EvidencePackSystem>,
    telemetry: Arc<EvidenceTelemetryService>,
    classifier: TaskIntentClassifier,
    strategy: IntentAwareProviderStrategy,
    optimizer: WeightOptimizer,
    config: AdaptiveConfig,
    state: Mutex<LearningState>,
    state_path: Option<PathBuf>,
}

impl AdaptiveEvidenceSystem {
    pub fn new(config: &EvidenceConfig) -> Result<Self, ConfigError> {
        let system = Arc::new(EvidencePackSystem::new(config)?);
        let telemetry = Arc::new(EvidenceTelemetryService::new(&config.telemetry)?);
        let optimizer = WeightOptimizer::new(OptimizerConfig::from(&config.optimizer));
        Ok(Self::from_parts(system, telemetry, optimizer, config.adaptive.clone()))
    }

    pub fn from_parts(
        system: Arc<EvidencePackSystem>,
        telemetry: Arc<EvidenceTelemetryService>,
        optimizer: WeightOptimizer,
        config: AdaptiveConfig,
    ) -> Self {
        let state_path = telemetry.path().map(learning_state_path);
        let state = match &state_path {
            Some(path) => restore_state(path, &system, &telemetry),
            None => LearningState::default(),
        };
        Self {
            system,
            telemetry,
            classifier: TaskIntentClassifier::new(),
            strategy: IntentAwareProviderStrategy::new(),
            optimizer,
            config,
            state: Mutex::new(state),
            state_path,
        }
    }

    pub fn with_strategy(mut self, strategy: IntentAwareProviderStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    fn state(&self) -> MutexGuard<'_, LearningState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn system(&self) -> &EvidencePackSystem {
        &self.system
    }

    pub fn telemetry(&self) -> &EvidenceTelemetryService {
        &self.telemetry
    }

    pub fn optimizer(&self) -> &WeightOptimizer {
        &self.optimizer
    }

    pub fn sessions_since_optimize(&self) -> usize {
        self.state().sessions_since_optimize
    }

    /// Where the learning state is mirrored, if telemetry is persisted.
    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    /// Write the learning state. Callers hold the state lock so writes land
    /// in order.
    fn save_state(&self, state: &LearningState) {
        let Some(path) = &self.state_path else { return };
        let saved = SavedLearning {
            weights: self.system.weights(),
            sessions_since_optimize: state.sessions_since_optimize,
            watermark: state.watermark,
        };
        if let Err(e) = persist::save_json(path, &saved) {
            warn!(path = %path.display(), error = %e, "learning state was not saved");
        }
    }

    pub fn classify(&self, input: &EvidenceInput, recent_intent: Option<TaskIntent>) -> ClassificationResult {
        let mut context = ClassificationContext::from_input(input);
        context.recent_intent = recent_intent;
        self.classifier.classify_with_context(input.message(), &context)
    }

    pub async fn build(&self, input: EvidenceInput, options: AdaptiveBuildOptions) -> AdaptiveBuildResult {
        let session_id = Uuid::new_v4().to_string();
        let forced = options.force_intent.is_some();
        let classification = match options.force_intent {
            Some(intent) => ClassificationResult::forced(intent),
            None => self.classify(&input, options.recent_intent),
        };

        let mut request = BuildRequest::new(input).with_intent(classification.intent);
        if let Some(budget) = options.token_budget {
            request = request.with_token_budget(budget);
        }

        let confident = forced || classification.confidence >= self.config.min_strategy_confidence;
        let strategy = self.strategy.get_strategy(classification.intent);
        let strategy_applied = self.config.enable_strategies && confident && !strategy.is_neutral();
        if strategy_applied {
            request = request.with_weights(strategy.apply(self.system.weights()));
            if !strategy.budget_ratios.is_empty() {
                request = request.with_ratios(strategy.budget_ratios.clone());
            }
        }

        let pack = self.system.build_with(request).await;
        self.telemetry.record(session_id.clone(), pack.telemetry.clone());
        {
            let mut state = self.state();
            state.sessions_since_optimize += 1;
            self.save_state(&state);
        }

        info!(
            session = %session_id,
            intent = %classification.intent,
            confidence = classification.confidence,
            strategy_applied,
            evidence = pack.len(),
            "adaptive build finished"
        );

        AdaptiveBuildResult { session_id, intent: classification, strategy_applied, pack }
    }

    /// Report whether the task behind `session_id` succeeded.
    pub fn feedback(&self, session_id: &str, success: bool) -> FeedbackOutcome {
        self.label(session_id, Outcome::from_success(success))
    }

    /// Mark a session as abandoned. Abandoned sessions never train the optimizer.
    pub fn abandon(&self, session_id: &str) -> FeedbackOutcome {
        self.label(session_id, Outcome::Abandoned)
    }

    fn label(&self, session_id: &str, outcome: Outcome) -> FeedbackOutcome {
        let record = self.telemetry.mark_outcome(session_id, outcome);
        let recorded = record.is_some();
        match (&record, outcome) {
            (Some(record), Outcome::Success | Outcome::Failure) => {
                let intent = record.data.intent.unwrap_or(TaskIntent::General);
                self.optimizer.record_outcome(intent, record.data.weights, outcome == Outcome::Success);
            }
            (Some(_), Outcome::Abandoned) => {}
            (None, _) => warn!(session = %session_id, "feedback for unknown session"),
        }

        let due = self.sessions_since_optimize() >= self.config.auto_optimize_threshold;
        let optimization = if due {
            debug!(threshold = self.config.auto_optimize_threshold, "auto-optimizing weights");
            Some(self.optimize())
        } else {
            None
        };

        FeedbackOutcome { session_id: session_id.to_string(), outcome, recorded, optimization }
    }

    /// Run the optimizer over records labelled since the last applied run.
    /// New weights replace the live ones only when `improvement > 0`.
    pub fn optimize(&self) -> OptimizationResult {
        let watermark = self.state().watermark;
        let records = self.telemetry.labeled_since(watermark);
        let newest_label = records.iter().filter_map(|r| r.label_seq).max().unwrap_or(watermark);

        let current = self.system.weights();
        let result = self.optimizer.optimize(&current, &records);

        if result.improvement > 0.0 {
            let applied = self.system.update_weights(result.weights);
            let mut state = self.state();
            state.sessions_since_optimize = 0;
            state.watermark = state.watermark.max(newest_label);
            self.save_state(&state);
            info!(
                samples = result.sample_count,
                improvement = result.improvement,
                diff = applied.diff,
                "applied optimized weights"
            );
        } else {
            debug!(samples = result.sample_count, "optimization left weights unchanged");
        }
        result
    }

    pub fn recommended_weights(&self, intent: TaskIntent) -> Option<RerankerWeights> {
        self.optimizer.get_recommended_weights(intent)
    }

    pub fn stats(&self) -> TelemetryStats {
        self.telemetry.stats()
    }

    pub fn flush(&self) -> anyhow::Result<()> {
        self.telemetry.flush()
    }
}

/// Load saved learning state and apply its weights to `system`. A missing
/// or unreadable file starts fresh. The watermark never exceeds the labels
/// the telemetry actually holds.
fn restore_state(
    path: &Path,
    system: &EvidencePackSystem,
    telemetry: &EvidenceTelemetryService,
) -> LearningState {
    match persist::load_json::<SavedLearning>(path) {
        Ok(Some(saved)) => {
            let weights = system.update_weights(saved.weights);
            debug!(path = %path.display(), diff = weights.diff, "restored learning state");
            LearningState {
                sessions_since_optimize: saved.sessions_since_optimize,
                watermark: saved.watermark.min(telemetry.last_label()),
            }
        }
        Ok(None) => LearningState::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable learning state");
            LearningState::default()
        }
    }
}
