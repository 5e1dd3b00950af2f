//! The evidence pipeline: extract, fan out, merge, rerank, trim.

use crate::budget::BudgetAllocator;
use crate::domain::{
    BudgetRatios, DiffSummary, Evidence, EvidenceCategory, EvidenceInput, EvidencePack,
    EvidenceTelemetry, PackSummary, ProviderTiming, ProviderType, RankedEvidence, RerankerWeights,
    Signal, SignalType, TaskIntent,
};
use crate::error::ProviderError;
use crate::providers::{EvidenceCache, EvidenceProvider, ProviderOptions};
use crate::rerank::{dedupe_evidence, Reranker};
use crate::signals::SignalExtractor;
use crate::utils::signal_fingerprint;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// One build's inputs beyond the raw task text.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub input: EvidenceInput,
    /// Overrides the configured budget for this build.
    pub token_budget: Option<usize>,
    pub budget_ratios: Option<BudgetRatios>,
    /// Weights to rank with instead of the live ones.
    pub weights: Option<RerankerWeights>,
    /// Intent recorded in the build telemetry.
    pub intent: Option<TaskIntent>,
}

impl BuildRequest {
    pub fn new(input: EvidenceInput) -> Self {
        Self { input, ..Default::default() }
    }

    pub fn with_token_budget(mut self, budget: usize) -> Self {
        self.token_budget = Some(budget);
        self
    }

    pub fn with_ratios(mut self, ratios: BudgetRatios) -> Self {
        self.budget_ratios = Some(ratios);
        self
    }

    pub fn with_weights(mut self, weights: RerankerWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_intent(mut self, intent: TaskIntent) -> Self {
        self.intent = Some(intent);
        self
    }
}

type ProviderOutcome = (Result<Vec<Evidence>, ProviderError>, Duration);

pub struct PackBuilder {
    extractor: SignalExtractor,
    providers: Vec<Arc<dyn EvidenceProvider>>,
    cache: Arc<EvidenceCache>,
    reranker: Box<dyn Reranker + Send + Sync>,
    allocator: BudgetAllocator,
    options: ProviderOptions,
    timeout: Duration,
    default_budget: usize,
}

impl PackBuilder {
    pub fn new(
        extractor: SignalExtractor,
        cache: Arc<EvidenceCache>,
        reranker: Box<dyn Reranker + Send + Sync>,
        options: ProviderOptions,
    ) -> Self {
        Self {
            extractor,
            providers: Vec::new(),
            cache,
            reranker,
            allocator: BudgetAllocator::new(),
            options,
            timeout: Duration::from_secs(5),
            default_budget: 8_000,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn EvidenceProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_budget(mut self, budget: usize) -> Self {
        self.default_budget = budget;
        self
    }

    pub fn extractor(&self) -> &SignalExtractor {
        &self.extractor
    }

    pub fn cache(&self) -> &EvidenceCache {
        &self.cache
    }

    pub fn default_budget(&self) -> usize {
        self.default_budget
    }

    /// Run the full pipeline with an already snapshotted weight vector.
    ///
    /// Provider queries are spawned onto the ambient Tokio runtime, so the
    /// future must be polled inside one. Dropping it aborts queries that are
    /// still in flight.
    pub async fn build(&self, request: BuildRequest, weights: RerankerWeights) -> EvidencePack {
        let started = Instant::now();
        let token_budget = request.token_budget.unwrap_or(self.default_budget);
        let signals = self.extractor.extract(&request.input);
        debug!(signals = signals.len(), budget = token_budget, "building evidence pack");

        let (merged, provider_timings) = self.gather(&signals).await;
        let merged = dedupe_evidence(merged);
        let evidence_before_budget = merged.len();

        let ranked = self.reranker.rank(merged, &weights);
        let allocation =
            self.allocator.allocate(ranked, token_budget, request.budget_ratios.as_ref());

        let summary = summarize(
            &signals,
            &allocation.items,
            &request.input,
            allocation.tokens_used,
            token_budget,
        );
        let telemetry = EvidenceTelemetry {
            provider_timings,
            total_duration_ms: elapsed_ms(started.elapsed()),
            signal_count: signals.len(),
            evidence_before_budget,
            evidence_after_budget: allocation.items.len(),
            tokens_used: allocation.tokens_used,
            tokens_saved: allocation.tokens_saved,
            token_budget,
            intent: request.intent,
            weights,
        };

        debug!(
            kept = telemetry.evidence_after_budget,
            candidates = evidence_before_budget,
            elapsed_ms = telemetry.total_duration_ms,
            "evidence pack built"
        );

        EvidencePack { items: allocation.items, summary, telemetry }
    }

    /// Query every provider concurrently, consulting the cache first. Results
    /// are merged in provider order.
    async fn gather(
        &self,
        signals: &[Signal],
    ) -> (Vec<Evidence>, BTreeMap<ProviderType, ProviderTiming>) {
        let scope = self.options.root.to_string_lossy().into_owned();
        let mut timings = BTreeMap::new();
        let mut slots: Vec<Option<Vec<Evidence>>> = vec![None; self.providers.len()];
        let mut pending = Vec::new();
        let mut in_flight = AbortOnDrop::default();

        for (idx, provider) in self.providers.iter().enumerate() {
            let kind = provider.provider_type();
            let relevant: Vec<Signal> = signals.iter().filter(|s| provider.accepts(s)).cloned().collect();
            if relevant.is_empty() {
                timings.insert(kind, ProviderTiming::default());
                slots[idx] = Some(Vec::new());
                continue;
            }

            let key = signal_fingerprint(kind, &scope, &relevant);
            if let Some(hit) = self.cache.get(&key) {
                debug!(provider = %kind, evidence = hit.len(), "provider cache hit");
                timings.insert(
                    kind,
                    ProviderTiming { evidence_count: hit.len(), cache_hit: true, ..Default::default() },
                );
                slots[idx] = Some(hit.as_ref().clone());
                continue;
            }

            let provider = Arc::clone(provider);
            let options = self.options.clone();
            let timeout = self.timeout;
            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let result = match tokio::time::timeout(timeout, provider.query(&relevant, &options)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(elapsed_ms(timeout))),
                };
                (result, started.elapsed())
            });
            in_flight.0.push(handle.abort_handle());
            pending.push((idx, kind, key, handle));
        }

        for (idx, kind, key, handle) in pending {
            let (result, elapsed): ProviderOutcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => (Err(ProviderError::Join(e.to_string())), Duration::ZERO),
            };
            let mut timing = ProviderTiming { duration_ms: elapsed_ms(elapsed), ..Default::default() };

            match result {
                Ok(evidence) => {
                    timing.evidence_count = evidence.len();
                    debug!(provider = %kind, evidence = evidence.len(), elapsed_ms = timing.duration_ms, "provider finished");
                    let stored = self.cache.insert(key, evidence);
                    slots[idx] = Some(stored.as_ref().clone());
                }
                Err(e) => {
                    timing.failed = true;
                    timing.timed_out = matches!(e, ProviderError::Timeout(_));
                    warn!(provider = %kind, error = %e, "provider failed, continuing without its evidence");
                }
            }
            timings.insert(kind, timing);
        }

        (slots.into_iter().flatten().flatten().collect(), timings)
    }
}

/// Aborts spawned provider queries when the build is dropped mid-flight.
/// Aborting a finished task is a no-op.
#[derive(Default)]
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

fn elapsed_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn summarize(
    signals: &[Signal],
    items: &[RankedEvidence],
    input: &EvidenceInput,
    tokens_used: usize,
    token_budget: usize,
) -> PackSummary {
    let mut signals_by_type: BTreeMap<SignalType, usize> = BTreeMap::new();
    for signal in signals {
        *signals_by_type.entry(signal.kind).or_insert(0) += 1;
    }
    let mut evidence_by_category: BTreeMap<EvidenceCategory, usize> = BTreeMap::new();
    for item in items {
        *evidence_by_category.entry(item.evidence.category).or_insert(0) += 1;
    }
    PackSummary {
        signals_by_type,
        evidence_by_category,
        diff: input.git_diff.as_ref().filter(|d| !d.files.is_empty()).map(DiffSummary::from_diff),
        tokens_used,
        token_budget,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rerank::WeightedReranker;
    use async_trait::async_trait;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticProvider {
        kind: ProviderType,
        calls: AtomicUsize,
        completed: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
    }

    impl StaticProvider {
        fn new(kind: ProviderType) -> Self {
            Self { kind, calls: AtomicUsize::new(0), completed: AtomicUsize::new(0), delay: None, fail: false }
        }
    }

    #[async_trait]
    impl EvidenceProvider for StaticProvider {
        fn provider_type(&self) -> ProviderType {
            self.kind
        }

        fn accepts(&self, signal: &Signal) -> bool {
            signal.kind == SignalType::Symbol
        }

        async fn query(
            &self,
            signals: &[Signal],
            _options: &ProviderOptions,
        ) -> Result<Vec<Evidence>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Service(anyhow::anyhow!("backend down")));
            }
            let category = match self.kind {
                ProviderType::Diff => EvidenceCategory::Diff,
                ProviderType::Lsp => EvidenceCategory::Definition,
                ProviderType::Search => EvidenceCategory::Keyword,
            };
            Ok(signals
                .iter()
                .map(|s| Evidence::new(self.kind, category, format!("{}.rs", s.value), 1, 3, "fn x() {}", s.confidence))
                .collect())
        }
    }

    fn builder(providers: Vec<Arc<dyn EvidenceProvider>>) -> PackBuilder {
        let cache = Arc::new(EvidenceCache::new(NonZeroUsize::new(8).unwrap(), Duration::from_secs(60)));
        let mut builder = PackBuilder::new(
            SignalExtractor::default(),
            cache,
            Box::new(WeightedReranker::new()),
            ProviderOptions::default(),
        )
        .with_timeout(Duration::from_millis(100));
        for provider in providers {
            builder = builder.with_provider(provider);
        }
        builder
    }

    fn request() -> BuildRequest {
        BuildRequest::new(EvidenceInput::from_message("Why does getUser return null?"))
    }

    #[tokio::test]
    async fn test_merges_and_ranks_provider_output() {
        let builder = builder(vec![
            Arc::new(StaticProvider::new(ProviderType::Search)),
            Arc::new(StaticProvider::new(ProviderType::Lsp)),
        ]);
        let pack = builder.build(request(), RerankerWeights::default()).await;

        assert_eq!(pack.len(), 2);
        assert_eq!(pack.items[0].evidence.category, EvidenceCategory::Definition);
        assert!(pack.items[0].score >= pack.items[1].score);
        assert_eq!(pack.telemetry.evidence_before_budget, 2);
        assert_eq!(pack.summary.signals_by_type.get(&SignalType::Symbol), Some(&1));
    }

    #[tokio::test]
    async fn test_second_build_hits_cache() {
        let provider = Arc::new(StaticProvider::new(ProviderType::Search));
        let builder = builder(vec![provider.clone()]);

        builder.build(request(), RerankerWeights::default()).await;
        let pack = builder.build(request(), RerankerWeights::default()).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(pack.telemetry.provider_timings[&ProviderType::Search].cache_hit);
        assert_eq!(pack.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_provider_is_contained() {
        let mut failing = StaticProvider::new(ProviderType::Lsp);
        failing.fail = true;
        let builder = builder(vec![Arc::new(failing), Arc::new(StaticProvider::new(ProviderType::Search))]);

        let pack = builder.build(request(), RerankerWeights::default()).await;
        assert_eq!(pack.len(), 1);
        assert!(pack.telemetry.provider_timings[&ProviderType::Lsp].failed);
        assert_eq!(builder.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let mut slow = StaticProvider::new(ProviderType::Lsp);
        slow.delay = Some(Duration::from_secs(5));
        let builder = builder(vec![Arc::new(slow), Arc::new(StaticProvider::new(ProviderType::Search))]);

        let pack = builder.build(request(), RerankerWeights::default()).await;
        let timing = &pack.telemetry.provider_timings[&ProviderType::Lsp];
        assert!(timing.failed && timing.timed_out);
        assert_eq!(pack.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_build_aborts_provider_queries() {
        let mut slow = StaticProvider::new(ProviderType::Lsp);
        slow.delay = Some(Duration::from_millis(200));
        let slow = Arc::new(slow);
        let builder = builder(vec![slow.clone()]).with_timeout(Duration::from_secs(5));

        let build = builder.build(request(), RerankerWeights::default());
        assert!(tokio::time::timeout(Duration::from_millis(20), build).await.is_err());
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
        assert_eq!(slow.completed.load(Ordering::SeqCst), 0);
        assert!(builder.cache().is_empty());
    }

    #[tokio::test]
    async fn test_budget_override_trims_pack() {
        let builder = builder(vec![Arc::new(StaticProvider::new(ProviderType::Search))]);
        let pack = builder.build(request().with_token_budget(1), RerankerWeights::default()).await;
        assert!(pack.is_empty());
        assert_eq!(pack.telemetry.token_budget, 1);
        assert!(pack.telemetry.tokens_saved > 0);
    }
}
