//! Bounded gradient-style weight optimizer
//!
//! Each weight key is tied to the provider producing most of its evidence.
//! A record's "contribution" for a key is that provider's latency over
//! `latency_norm_ms`, capped at 1. The gradient for a key is the mean
//! contribution over successful records minus the mean over failed ones;
//! the step is `gradient * learning_rate * weight`, capped at `max_delta`.
//! `stack_depth_decay` is never stepped.

use crate::config::OptimizerSettings;
use crate::domain::{clamp_decay, clamp_weight, Outcome, RerankerWeights, TaskIntent, WeightKey};
use crate::telemetry::TelemetryRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub min_samples: usize,
    pub learning_rate: f64,
    pub max_delta: f64,
    pub latency_norm_ms: f64,
    pub convergence_threshold: f64,
    pub history_capacity: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::from(&OptimizerSettings::default())
    }
}

impl From<&OptimizerSettings> for OptimizerConfig {
    fn from(settings: &OptimizerSettings) -> Self {
        Self {
            min_samples: settings.min_samples,
            learning_rate: settings.learning_rate,
            max_delta: settings.max_delta,
            latency_norm_ms: settings.latency_norm_ms,
            convergence_threshold: settings.convergence_threshold,
            history_capacity: settings.history_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub weights: RerankerWeights,
    /// Mean absolute gradient across weight keys.
    pub improvement: f64,
    pub sample_count: usize,
    pub converged: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub gradients: BTreeMap<WeightKey, f64>,
}

/// One reported task outcome and the weights that produced its pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeEntry {
    pub intent: TaskIntent,
    pub weights: RerankerWeights,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

pub struct WeightOptimizer {
    config: OptimizerConfig,
    history: Mutex<VecDeque<OutcomeEntry>>,
}

impl Default for WeightOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl WeightOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config, history: Mutex::new(VecDeque::new()) }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<OutcomeEntry>> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run one optimization pass. Only success and failure records count as
    /// samples; with fewer than `min_samples` the current weights come back
    /// unchanged with zero improvement.
    pub fn optimize(&self, current: &RerankerWeights, records: &[TelemetryRecord]) -> OptimizationResult {
        let successes: Vec<&TelemetryRecord> =
            records.iter().filter(|r| r.outcome == Some(Outcome::Success)).collect();
        let failures: Vec<&TelemetryRecord> =
            records.iter().filter(|r| r.outcome == Some(Outcome::Failure)).collect();
        let sample_count = successes.len() + failures.len();

        if sample_count < self.config.min_samples {
            debug!(
                samples = sample_count,
                min_samples = self.config.min_samples,
                "not enough labelled records, skipping optimization"
            );
            return OptimizationResult {
                weights: *current,
                improvement: 0.0,
                sample_count,
                converged: false,
                gradients: BTreeMap::new(),
            };
        }

        let mut weights = *current;
        let mut gradients = BTreeMap::new();
        for key in WeightKey::ALL {
            let gradient = self.mean_contribution(&successes, key) - self.mean_contribution(&failures, key);
            let value = current.get(key);
            let delta = (gradient * self.config.learning_rate * value)
                .clamp(-self.config.max_delta, self.config.max_delta);
            weights = weights.with(key, clamp_weight(value + delta));
            gradients.insert(key, gradient);
        }
        weights.stack_depth_decay = clamp_decay(current.stack_depth_decay);

        let improvement = gradients.values().map(|g| g.abs()).sum::<f64>() / gradients.len() as f64;
        let converged = improvement < self.config.convergence_threshold;
        info!(
            samples = sample_count,
            improvement,
            converged,
            "weight optimization finished"
        );

        OptimizationResult { weights, improvement, sample_count, converged, gradients }
    }

    fn mean_contribution(&self, group: &[&TelemetryRecord], key: WeightKey) -> f64 {
        if group.is_empty() {
            return 0.0;
        }
        let provider = key.provider();
        let total: f64 = group
            .iter()
            .map(|r| (r.data.provider_latency_ms(provider) as f64 / self.config.latency_norm_ms).min(1.0))
            .sum();
        total / group.len() as f64
    }

    pub fn record_outcome(&self, intent: TaskIntent, weights: RerankerWeights, success: bool) {
        let mut history = self.history();
        history.push_back(OutcomeEntry { intent, weights, success, timestamp: Utc::now() });
        while history.len() > self.config.history_capacity {
            history.pop_front();
        }
    }

    /// Mean of the weights behind past successes for `intent`.
    pub fn get_recommended_weights(&self, intent: TaskIntent) -> Option<RerankerWeights> {
        let history = self.history();
        let winners: Vec<&RerankerWeights> = history
            .iter()
            .filter(|e| e.success && e.intent == intent)
            .map(|e| &e.weights)
            .collect();
        if winners.is_empty() {
            return None;
        }

        let n = winners.len() as f64;
        let mean = |f: fn(&RerankerWeights) -> f64| winners.iter().map(|w| f(w)).sum::<f64>() / n;
        Some(
            RerankerWeights {
                diff: mean(|w| w.diff),
                definition: mean(|w| w.definition),
                reference: mean(|w| w.reference),
                keyword: mean(|w| w.keyword),
                stack_frame: mean(|w| w.stack_frame),
                working_set: mean(|w| w.working_set),
                stack_depth_decay: mean(|w| w.stack_depth_decay),
            }
            .clamped(),
        )
    }

    pub fn history_len(&self) -> usize {
        self.history().len()
    }

    pub fn history_snapshot(&self) -> Vec<OutcomeEntry> {
        self.history().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EvidenceTelemetry, ProviderTiming, ProviderType};

    fn labelled(outcome: Outcome, latencies: &[(ProviderType, u64)]) -> TelemetryRecord {
        let mut data = EvidenceTelemetry::default();
        for (provider, ms) in latencies {
            data.provider_timings
                .insert(*provider, ProviderTiming { duration_ms: *ms, ..Default::default() });
        }
        let mut record = TelemetryRecord::new(uuid::Uuid::new_v4().to_string(), data);
        record.outcome = Some(outcome);
        record
    }

    #[test]
    fn test_insufficient_samples() {
        let optimizer = WeightOptimizer::default();
        let records: Vec<TelemetryRecord> =
            (0..5).map(|_| labelled(Outcome::Success, &[(ProviderType::Diff, 500)])).collect();
        let current = RerankerWeights::default();
        let result = optimizer.optimize(&current, &records);

        assert_eq!(result.improvement, 0.0);
        assert_eq!(result.sample_count, 5);
        assert!(!result.converged);
        assert_eq!(result.weights, current);
    }

    #[test]
    fn test_abandoned_and_unlabelled_are_not_samples() {
        let optimizer = WeightOptimizer::default();
        let mut records: Vec<TelemetryRecord> =
            (0..9).map(|_| labelled(Outcome::Abandoned, &[])).collect();
        records.push(TelemetryRecord::new("unlabelled", EvidenceTelemetry::default()));
        assert_eq!(optimizer.optimize(&RerankerWeights::default(), &records).sample_count, 0);
    }

    #[test]
    fn test_failures_on_diff_do_not_raise_diff() {
        let optimizer = WeightOptimizer::default();
        let records: Vec<TelemetryRecord> = (0..50)
            .map(|_| labelled(Outcome::Failure, &[(ProviderType::Diff, 800), (ProviderType::Search, 50)]))
            .collect();
        let current = RerankerWeights::default();
        let result = optimizer.optimize(&current, &records);

        assert!(result.gradients[&WeightKey::Diff] <= 0.0);
        assert!(result.weights.diff <= current.diff);
        assert!((result.weights.diff - 46.0).abs() < 1e-9);
        assert!(result.improvement > 0.0);
    }

    #[test]
    fn test_success_raises_weight_with_capped_step() {
        let config = OptimizerConfig { learning_rate: 1.0, max_delta: 20.0, ..Default::default() };
        let optimizer = WeightOptimizer::new(config);
        let mut records: Vec<TelemetryRecord> = (0..10)
            .map(|_| labelled(Outcome::Success, &[(ProviderType::Lsp, 5_000)]))
            .collect();
        records.extend((0..10).map(|_| labelled(Outcome::Failure, &[])));

        let current = RerankerWeights::default();
        let result = optimizer.optimize(&current, &records);

        // gradient 1.0 * lr 1.0 * 40 = 40, capped to 20.
        assert_eq!(result.weights.definition, 60.0);
        assert_eq!(result.weights.reference, 45.0);
        assert_eq!(result.weights.diff, current.diff);
        assert_eq!(result.weights.stack_depth_decay, current.stack_depth_decay);
        assert!(result.weights.is_within_bounds());
    }

    #[test]
    fn test_identical_groups_converge() {
        let optimizer = WeightOptimizer::default();
        let mut records: Vec<TelemetryRecord> =
            (0..6).map(|_| labelled(Outcome::Success, &[(ProviderType::Search, 300)])).collect();
        records.extend((0..6).map(|_| labelled(Outcome::Failure, &[(ProviderType::Search, 300)])));

        let result = optimizer.optimize(&RerankerWeights::default(), &records);
        assert_eq!(result.improvement, 0.0);
        assert!(result.converged);
        assert_eq!(result.weights, RerankerWeights::default());
    }

    #[test]
    fn test_recommended_weights_average_successes() {
        let optimizer = WeightOptimizer::default();
        assert!(optimizer.get_recommended_weights(TaskIntent::Debug).is_none());

        let low = RerankerWeights::default().with(WeightKey::Diff, 40.0);
        let high = RerankerWeights::default().with(WeightKey::Diff, 80.0);
        optimizer.record_outcome(TaskIntent::Debug, low, true);
        optimizer.record_outcome(TaskIntent::Debug, high, true);
        optimizer.record_outcome(TaskIntent::Debug, RerankerWeights::default().with(WeightKey::Diff, 200.0), false);
        optimizer.record_outcome(TaskIntent::Review, high, true);

        let recommended = optimizer.get_recommended_weights(TaskIntent::Debug).unwrap();
        assert_eq!(recommended.diff, 60.0);
        assert!(optimizer.get_recommended_weights(TaskIntent::Explain).is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let config = OptimizerConfig { history_capacity: 3, ..Default::default() };
        let optimizer = WeightOptimizer::new(config);
        for _ in 0..10 {
            optimizer.record_outcome(TaskIntent::General, RerankerWeights::default(), true);
        }
        assert_eq!(optimizer.history_len(), 3);
    }
}
