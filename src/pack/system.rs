//! Façade over the pack builder
//!
//! Owns the live reranker weights and the provider cache, and exposes the
//! binding points for the optional LSP and git services. Weights are
//! replaced wholesale; each build ranks with the copy it read on entry.

use super::builder::{BuildRequest, PackBuilder};
use crate::config::EvidenceConfig;
use crate::domain::{EvidenceInput, EvidencePack, RerankerWeights, Signal};
use crate::error::ConfigError;
use crate::providers::{
    CacheStats, DiffProvider, EvidenceCache, LspProvider, ProviderOptions, SearchProvider,
};
use crate::rerank::WeightedReranker;
use crate::services::{GitService, LspHub, ServiceSlot};
use crate::signals::{ExtractorOptions, SignalExtractor};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

pub struct EvidencePackSystem {
    builder: PackBuilder,
    weights: RwLock<RerankerWeights>,
    lsp: ServiceSlot<dyn LspHub>,
    git: ServiceSlot<dyn GitService>,
}

impl EvidencePackSystem {
    pub fn new(config: &EvidenceConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let extractor = SignalExtractor::new(ExtractorOptions::try_from(&config.extractor)?);
        let cache = Arc::new(EvidenceCache::from_config(&config.cache)?);
        let lsp: ServiceSlot<dyn LspHub> = ServiceSlot::empty();
        let git: ServiceSlot<dyn GitService> = ServiceSlot::empty();

        let providers = &config.providers;
        let mut builder = PackBuilder::new(
            extractor,
            cache,
            Box::new(WeightedReranker::new()),
            ProviderOptions::from(providers),
        )
        .with_timeout(Duration::from_millis(providers.timeout_ms))
        .with_default_budget(config.budget.token_budget);

        if providers.enable_diff {
            builder = builder.with_provider(Arc::new(DiffProvider::new(git.clone())));
        }
        if providers.enable_lsp {
            builder = builder.with_provider(Arc::new(LspProvider::new(lsp.clone())));
        }
        if providers.enable_search {
            builder = builder.with_provider(Arc::new(SearchProvider::new()));
        }

        info!(
            root = %providers.root.display(),
            budget = config.budget.token_budget,
            "evidence pack system ready"
        );

        Ok(Self { builder, weights: RwLock::new(config.weights.clamped()), lsp, git })
    }

    /// Snapshot of the live weights.
    pub fn weights(&self) -> RerankerWeights {
        *self.weights.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the live weights. Values are clamped into bounds; the stored
    /// vector is returned.
    pub fn update_weights(&self, weights: RerankerWeights) -> RerankerWeights {
        let weights = weights.clamped();
        *self.weights.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = weights;
        debug!(?weights, "reranker weights replaced");
        weights
    }

    pub fn set_lsp_hub(&self, hub: Option<Arc<dyn LspHub>>) {
        self.lsp.set(hub);
        self.builder.cache().clear();
    }

    pub fn set_git_service(&self, git: Option<Arc<dyn GitService>>) {
        self.git.set(git);
        self.builder.cache().clear();
    }

    pub fn has_lsp_hub(&self) -> bool {
        self.lsp.is_bound()
    }

    pub fn has_git_service(&self) -> bool {
        self.git.is_bound()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.builder.cache().stats()
    }

    pub fn clear_cache(&self) {
        self.builder.cache().clear();
    }

    pub fn default_budget(&self) -> usize {
        self.builder.default_budget()
    }

    pub fn extract_signals(&self, input: &EvidenceInput) -> Vec<Signal> {
        self.builder.extractor().extract(input)
    }

    pub async fn build(&self, input: EvidenceInput) -> EvidencePack {
        self.build_with(BuildRequest::new(input)).await
    }

    pub async fn build_with(&self, request: BuildRequest) -> EvidencePack {
        let weights = match request.weights {
            Some(weights) => weights.clamped(),
            None => self.weights(),
        };
        self.builder.build(request, weights).await
    }
}
