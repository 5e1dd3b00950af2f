//! Reranker weights and per-provider budget ratios.

use super::evidence::ProviderType;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const MIN_WEIGHT: f64 = 1.0;
pub const MAX_WEIGHT: f64 = 200.0;

/// The six provider-category weights (`stack_depth_decay` is handled apart).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WeightKey {
    Diff,
    Definition,
    Reference,
    Keyword,
    StackFrame,
    WorkingSet,
}

impl WeightKey {
    pub const ALL: [WeightKey; 6] = [
        WeightKey::Diff,
        WeightKey::Definition,
        WeightKey::Reference,
        WeightKey::Keyword,
        WeightKey::StackFrame,
        WeightKey::WorkingSet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WeightKey::Diff => "diff",
            WeightKey::Definition => "definition",
            WeightKey::Reference => "reference",
            WeightKey::Keyword => "keyword",
            WeightKey::StackFrame => "stackFrame",
            WeightKey::WorkingSet => "workingSet",
        }
    }

    /// Provider whose evidence this weight mostly governs.
    pub fn provider(&self) -> ProviderType {
        match self {
            WeightKey::Diff => ProviderType::Diff,
            WeightKey::Definition | WeightKey::Reference => ProviderType::Lsp,
            WeightKey::Keyword | WeightKey::StackFrame | WeightKey::WorkingSet => {
                ProviderType::Search
            }
        }
    }
}

impl fmt::Display for WeightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunable scoring coefficients. Provider weights live in `[1, 200]`,
/// `stack_depth_decay` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RerankerWeights {
    pub diff: f64,
    pub definition: f64,
    pub reference: f64,
    pub keyword: f64,
    pub stack_frame: f64,
    pub working_set: f64,
    pub stack_depth_decay: f64,
}

impl Default for RerankerWeights {
    fn default() -> Self {
        Self {
            diff: 50.0,
            definition: 40.0,
            reference: 25.0,
            keyword: 15.0,
            stack_frame: 45.0,
            working_set: 35.0,
            stack_depth_decay: 0.85,
        }
    }
}

impl RerankerWeights {
    pub fn get(&self, key: WeightKey) -> f64 {
        match key {
            WeightKey::Diff => self.diff,
            WeightKey::Definition => self.definition,
            WeightKey::Reference => self.reference,
            WeightKey::Keyword => self.keyword,
            WeightKey::StackFrame => self.stack_frame,
            WeightKey::WorkingSet => self.working_set,
        }
    }

    /// Returns a copy with `key` replaced; the result is re-clamped.
    pub fn with(mut self, key: WeightKey, value: f64) -> Self {
        let slot = match key {
            WeightKey::Diff => &mut self.diff,
            WeightKey::Definition => &mut self.definition,
            WeightKey::Reference => &mut self.reference,
            WeightKey::Keyword => &mut self.keyword,
            WeightKey::StackFrame => &mut self.stack_frame,
            WeightKey::WorkingSet => &mut self.working_set,
        };
        *slot = value;
        self.clamped()
    }

    pub fn with_decay(mut self, decay: f64) -> Self {
        self.stack_depth_decay = decay;
        self.clamped()
    }

    /// Clamp every field into its bound. Non-finite values fall back to the
    /// lower bound.
    pub fn clamped(self) -> Self {
        Self {
            diff: clamp_weight(self.diff),
            definition: clamp_weight(self.definition),
            reference: clamp_weight(self.reference),
            keyword: clamp_weight(self.keyword),
            stack_frame: clamp_weight(self.stack_frame),
            working_set: clamp_weight(self.working_set),
            stack_depth_decay: clamp_decay(self.stack_depth_decay),
        }
    }

    pub fn is_within_bounds(&self) -> bool {
        WeightKey::ALL.iter().all(|k| (MIN_WEIGHT..=MAX_WEIGHT).contains(&self.get(*k)))
            && (0.0..=1.0).contains(&self.stack_depth_decay)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for key in WeightKey::ALL {
            let value = self.get(key);
            if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field: format!("weights.{}", key.as_str()),
                    value,
                    min: MIN_WEIGHT,
                    max: MAX_WEIGHT,
                });
            }
        }
        if !(0.0..=1.0).contains(&self.stack_depth_decay) {
            return Err(ConfigError::OutOfRange {
                field: "weights.stackDepthDecay".to_string(),
                value: self.stack_depth_decay,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }
}

pub fn clamp_weight(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(MIN_WEIGHT, MAX_WEIGHT)
    } else {
        MIN_WEIGHT
    }
}

pub fn clamp_decay(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Share of the token budget a provider must get (`min`) or may take (`max`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioBounds {
    pub min: f64,
    pub max: f64,
}

impl RatioBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl Default for RatioBounds {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

/// Per-provider budget ratios. Providers without an entry are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BudgetRatios {
    bounds: BTreeMap<ProviderType, RatioBounds>,
}

impl BudgetRatios {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: ProviderType, min: f64, max: f64) -> Self {
        self.bounds.insert(provider, RatioBounds::new(min, max));
        self
    }

    pub fn bounds(&self, provider: ProviderType) -> RatioBounds {
        self.bounds.get(&provider).copied().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProviderType, &RatioBounds)> {
        self.bounds.iter()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut min_total = 0.0;
        for (provider, bounds) in &self.bounds {
            let valid = (0.0..=1.0).contains(&bounds.min)
                && (0.0..=1.0).contains(&bounds.max)
                && bounds.min <= bounds.max;
            if !valid {
                return Err(ConfigError::InvalidRatios(format!(
                    "{provider}: min {} / max {} must satisfy 0 <= min <= max <= 1",
                    bounds.min, bounds.max
                )));
            }
            min_total += bounds.min;
        }
        if min_total > 1.0 + f64::EPSILON {
            return Err(ConfigError::InvalidRatios(format!(
                "minimum ratios sum to {min_total:.2}, exceeding the whole budget"
            )));
        }
        Ok(())
    }
}
