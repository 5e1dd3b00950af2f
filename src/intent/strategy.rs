//! Intent strategies: a priori weight modifiers and budget ratios per intent

use crate::domain::{BudgetRatios, ProviderType, RerankerWeights, TaskIntent, WeightKey};
use serde::Serialize;
use std::collections::BTreeMap;

/// `weight * multiplier + offset` for one key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightModifier {
    pub key: WeightKey,
    pub multiplier: f64,
    pub offset: f64,
}

impl WeightModifier {
    pub const fn scale(key: WeightKey, multiplier: f64) -> Self {
        Self { key, multiplier, offset: 0.0 }
    }

    pub const fn shift(key: WeightKey, offset: f64) -> Self {
        Self { key, multiplier: 1.0, offset }
    }

    pub fn apply(&self, value: f64) -> f64 {
        value * self.multiplier + self.offset
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentStrategy {
    pub intent: TaskIntent,
    pub description: String,
    pub modifiers: Vec<WeightModifier>,
    /// Replaces `stack_depth_decay` when set.
    pub stack_depth_decay: Option<f64>,
    pub budget_ratios: BudgetRatios,
}

impl IntentStrategy {
    /// A strategy that changes nothing.
    pub fn neutral(intent: TaskIntent) -> Self {
        Self {
            intent,
            description: "no bias".to_string(),
            modifiers: Vec::new(),
            stack_depth_decay: None,
            budget_ratios: BudgetRatios::new(),
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.modifiers.is_empty() && self.stack_depth_decay.is_none() && self.budget_ratios.is_empty()
    }

    /// Apply the modifiers; the result is clamped into bounds.
    pub fn apply(&self, weights: RerankerWeights) -> RerankerWeights {
        let mut adjusted = weights;
        for modifier in &self.modifiers {
            adjusted = adjusted.with(modifier.key, modifier.apply(adjusted.get(modifier.key)));
        }
        if let Some(decay) = self.stack_depth_decay {
            adjusted = adjusted.with_decay(decay);
        }
        adjusted.clamped()
    }
}

/// Static strategy table. Never reads telemetry.
#[derive(Debug, Clone)]
pub struct IntentAwareProviderStrategy {
    strategies: BTreeMap<TaskIntent, IntentStrategy>,
}

impl Default for IntentAwareProviderStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentAwareProviderStrategy {
    pub fn new() -> Self {
        let strategies = default_strategies().into_iter().map(|s| (s.intent, s)).collect();
        Self { strategies }
    }

    /// Replace the strategy for its intent.
    pub fn with_strategy(mut self, strategy: IntentStrategy) -> Self {
        self.strategies.insert(strategy.intent, strategy);
        self
    }

    pub fn get_strategy(&self, intent: TaskIntent) -> IntentStrategy {
        self.strategies.get(&intent).cloned().unwrap_or_else(|| IntentStrategy::neutral(intent))
    }

    pub fn apply_weight_modifiers(&self, weights: RerankerWeights, intent: TaskIntent) -> RerankerWeights {
        match self.strategies.get(&intent) {
            Some(strategy) => strategy.apply(weights),
            None => weights.clamped(),
        }
    }
}

fn default_strategies() -> Vec<IntentStrategy> {
    use WeightKey::*;
    let strategy = |intent, description: &str, modifiers: Vec<WeightModifier>, decay, ratios| {
        IntentStrategy {
            intent,
            description: description.to_string(),
            modifiers,
            stack_depth_decay: decay,
            budget_ratios: ratios,
        }
    };

    vec![
        strategy(
            TaskIntent::Debug,
            "favour stack frames and recent changes",
            vec![
                WeightModifier::scale(StackFrame, 1.6),
                WeightModifier::scale(Diff, 1.3),
                WeightModifier::scale(Keyword, 1.1),
            ],
            Some(0.9),
            BudgetRatios::new().with(ProviderType::Search, 0.3, 0.8).with(ProviderType::Diff, 0.1, 0.5),
        ),
        strategy(
            TaskIntent::Refactor,
            "favour definitions and every reference",
            vec![
                WeightModifier::scale(Definition, 1.5),
                WeightModifier::scale(Reference, 1.6),
                WeightModifier::scale(WorkingSet, 1.2),
                WeightModifier::scale(StackFrame, 0.7),
            ],
            None,
            BudgetRatios::new().with(ProviderType::Lsp, 0.3, 0.8),
        ),
        strategy(
            TaskIntent::Implement,
            "favour the working set and the APIs it builds on",
            vec![
                WeightModifier::scale(WorkingSet, 1.4),
                WeightModifier::scale(Definition, 1.3),
                WeightModifier::scale(Keyword, 1.2),
            ],
            None,
            BudgetRatios::new().with(ProviderType::Search, 0.2, 0.7).with(ProviderType::Lsp, 0.1, 0.6),
        ),
        strategy(
            TaskIntent::Test,
            "favour code under test and existing test usages",
            vec![
                WeightModifier::scale(WorkingSet, 1.3),
                WeightModifier::scale(Definition, 1.3),
                WeightModifier::scale(Reference, 1.2),
                WeightModifier::shift(Keyword, 10.0),
            ],
            None,
            BudgetRatios::new().with(ProviderType::Search, 0.2, 0.8),
        ),
        strategy(
            TaskIntent::Review,
            "favour the diff",
            vec![
                WeightModifier::scale(Diff, 1.8),
                WeightModifier::scale(WorkingSet, 1.1),
                WeightModifier::scale(Keyword, 0.8),
            ],
            None,
            BudgetRatios::new().with(ProviderType::Diff, 0.4, 0.9),
        ),
        strategy(
            TaskIntent::Explain,
            "favour definitions over recent edits",
            vec![
                WeightModifier::scale(Definition, 1.5),
                WeightModifier::scale(Reference, 1.3),
                WeightModifier::scale(Keyword, 1.1),
                WeightModifier::scale(Diff, 0.7),
            ],
            None,
            BudgetRatios::new().with(ProviderType::Lsp, 0.2, 0.8),
        ),
        IntentStrategy::neutral(TaskIntent::General),
    ]
}
