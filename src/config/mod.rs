//! Configuration loading and validation
//!
//! Settings come from an optional TOML/YAML file, then CLI flags (which also
//! read environment variables) override them. Validation happens once, when a
//! system is constructed.

pub mod loader;

pub use loader::load_config;

use crate::domain::RerankerWeights;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    pub extractor: ExtractorConfig,
    pub cache: CacheConfig,
    pub providers: ProvidersConfig,
    pub budget: BudgetConfig,
    pub telemetry: TelemetryConfig,
    pub optimizer: OptimizerSettings,
    pub adaptive: AdaptiveConfig,
    pub weights: RerankerWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub min_confidence: f64,
    pub max_signals_per_type: usize,
    /// Extra regexes matched against the user message (confidence 0.5).
    pub custom_patterns: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self { min_confidence: 0.3, max_signals_per_type: 25, custom_patterns: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 256, ttl_secs: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Project root the providers resolve paths against.
    pub root: PathBuf,
    pub timeout_ms: u64,
    pub max_results: usize,
    /// Lines of context either side of a stack frame or match.
    pub context_lines: usize,
    /// Upper bound on lines in any single snippet.
    pub max_snippet_lines: usize,
    pub enable_diff: bool,
    pub enable_lsp: bool,
    pub enable_search: bool,
    pub search: SearchConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            timeout_ms: 5_000,
            max_results: 40,
            context_lines: 8,
            max_snippet_lines: 60,
            enable_diff: true,
            enable_lsp: true,
            enable_search: true,
            search: SearchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_files: usize,
    pub max_file_bytes: u64,
    pub respect_gitignore: bool,
    pub exclude_globs: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_files: 5_000,
            max_file_bytes: 512 * 1024,
            respect_gitignore: true,
            exclude_globs: vec!["**/*.map".to_string(), "**/*.snap".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub token_budget: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self { token_budget: 8_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub max_records: usize,
    /// JSON mirror of the telemetry buffer; in-memory only when unset.
    pub path: Option<PathBuf>,
    /// Flush to disk after this many mutations (0 disables periodic flushes).
    pub persist_every: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { max_records: 1_000, path: None, persist_every: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub min_samples: usize,
    pub learning_rate: f64,
    pub max_delta: f64,
    /// Provider latency (ms) that counts as a full contribution of 1.0.
    pub latency_norm_ms: f64,
    pub convergence_threshold: f64,
    pub history_capacity: usize,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            min_samples: 10,
            learning_rate: 0.1,
            max_delta: 20.0,
            latency_norm_ms: 1_000.0,
            convergence_threshold: 0.01,
            history_capacity: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub auto_optimize_threshold: usize,
    pub min_strategy_confidence: f64,
    pub enable_strategies: bool,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self { auto_optimize_threshold: 50, min_strategy_confidence: 0.3, enable_strategies: true }
    }
}

impl EvidenceConfig {
    /// Fail fast on settings that would make per-call behaviour meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("extractor.min_confidence", self.extractor.min_confidence)?;
        check_positive("extractor.max_signals_per_type", self.extractor.max_signals_per_type)?;
        for pattern in &self.extractor.custom_patterns {
            regex::Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }

        check_positive("cache.capacity", self.cache.capacity)?;
        check_positive("providers.timeout_ms", self.providers.timeout_ms as usize)?;
        check_positive("providers.max_results", self.providers.max_results)?;
        check_positive("providers.max_snippet_lines", self.providers.max_snippet_lines)?;

        if self.budget.token_budget == 0 {
            return Err(ConfigError::InvalidTokenBudget);
        }

        check_positive("telemetry.max_records", self.telemetry.max_records)?;

        let optimizer = &self.optimizer;
        check_positive("optimizer.min_samples", optimizer.min_samples)?;
        check_positive("optimizer.history_capacity", optimizer.history_capacity)?;
        if !(optimizer.learning_rate > 0.0 && optimizer.learning_rate <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "optimizer.learning_rate".to_string(),
                value: optimizer.learning_rate,
                min: f64::EPSILON,
                max: 1.0,
            });
        }
        if !(optimizer.max_delta > 0.0 && optimizer.max_delta.is_finite()) {
            return Err(ConfigError::ZeroValue("optimizer.max_delta"));
        }
        if !(optimizer.latency_norm_ms > 0.0 && optimizer.latency_norm_ms.is_finite()) {
            return Err(ConfigError::ZeroValue("optimizer.latency_norm_ms"));
        }

        check_unit("adaptive.min_strategy_confidence", self.adaptive.min_strategy_confidence)?;
        check_positive("adaptive.auto_optimize_threshold", self.adaptive.auto_optimize_threshold)?;

        self.weights.validate()
    }
}

fn check_positive(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::ZeroValue(field));
    }
    Ok(())
}

fn check_unit(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange { field: field.to_string(), value, min: 0.0, max: 1.0 });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EvidenceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_budget_fails_fast() {
        let mut config = EvidenceConfig::default();
        config.budget.token_budget = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTokenBudget)));
    }

    #[test]
    fn test_invalid_custom_pattern_fails_fast() {
        let mut config = EvidenceConfig::default();
        config.extractor.custom_patterns = vec!["([unclosed".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPattern { .. })));
    }

    #[test]
    fn test_out_of_range_confidence_and_rate() {
        let mut config = EvidenceConfig::default();
        config.extractor.min_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = EvidenceConfig::default();
        config.optimizer.learning_rate = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_cache_capacity_rejected() {
        let mut config = EvidenceConfig::default();
        config.cache.capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroValue("cache.capacity"))));
    }
}
