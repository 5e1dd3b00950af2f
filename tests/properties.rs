//! Property tests for ranking, budgeting and learning invariants

use evidence_pack::domain::{
    BudgetRatios, EvidenceMetadata, EvidenceTelemetry, ProviderTiming, MAX_WEIGHT, MIN_WEIGHT,
};
use evidence_pack::learning::{OptimizerConfig, WeightOptimizer};
use evidence_pack::rerank::dedupe_evidence;
use evidence_pack::{
    BudgetAllocator, ErrorInput, Evidence, EvidenceCategory, EvidenceInput,
    IntentAwareProviderStrategy, Outcome, ProviderType, Reranker, RerankerWeights, SignalExtractor,
    TaskIntent, TelemetryRecord, WeightKey, WeightedReranker,
};
use proptest::prelude::*;
use std::collections::HashSet;

const CATEGORIES: [EvidenceCategory; 6] = [
    EvidenceCategory::Diff,
    EvidenceCategory::Definition,
    EvidenceCategory::Reference,
    EvidenceCategory::Keyword,
    EvidenceCategory::StackFrame,
    EvidenceCategory::WorkingSet,
];

fn provider_for(category: EvidenceCategory) -> ProviderType {
    match category {
        EvidenceCategory::Diff => ProviderType::Diff,
        EvidenceCategory::Definition | EvidenceCategory::Reference => ProviderType::Lsp,
        _ => ProviderType::Search,
    }
}

fn arb_weights() -> impl Strategy<Value = RerankerWeights> {
    (
        proptest::collection::vec(MIN_WEIGHT..=MAX_WEIGHT, 6),
        0.0f64..=1.0,
    )
        .prop_map(|(values, decay)| {
            WeightKey::ALL
                .iter()
                .zip(values)
                .fold(RerankerWeights::default(), |weights, (key, value)| weights.with(*key, value))
                .with_decay(decay)
        })
}

fn arb_evidence() -> impl Strategy<Value = Evidence> {
    (0usize..CATEGORIES.len(), 1usize..500, 0.0f64..=1.0, 1usize..400, proptest::option::of(0usize..8))
        .prop_map(|(category, line, relevance, chars, depth)| {
            let category = CATEGORIES[category];
            let metadata = EvidenceMetadata {
                stack_depth: depth.filter(|_| category == EvidenceCategory::StackFrame),
                ..Default::default()
            };
            Evidence::new(
                provider_for(category),
                category,
                format!("src/file_{}.rs", line % 7),
                line,
                line + 3,
                "x".repeat(chars),
                relevance,
            )
            .with_metadata(metadata)
        })
}

fn arb_records() -> impl Strategy<Value = Vec<TelemetryRecord>> {
    proptest::collection::vec((0u64..5_000, 0u64..5_000, 0u64..5_000, 0u8..3), 0..40).prop_map(
        |rows| {
            rows.into_iter()
                .enumerate()
                .map(|(idx, (diff, lsp, search, label))| {
                    let mut data = EvidenceTelemetry::default();
                    for (provider, latency) in
                        [(ProviderType::Diff, diff), (ProviderType::Lsp, lsp), (ProviderType::Search, search)]
                    {
                        data.provider_timings.insert(
                            provider,
                            ProviderTiming { duration_ms: latency, ..Default::default() },
                        );
                    }
                    let mut record = TelemetryRecord::new(format!("s{idx}"), data);
                    record.outcome = match label {
                        0 => Some(Outcome::Success),
                        1 => Some(Outcome::Failure),
                        _ => Some(Outcome::Abandoned),
                    };
                    record
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn prop_optimized_weights_stay_in_bounds(current in arb_weights(), records in arb_records()) {
        let optimizer = WeightOptimizer::new(OptimizerConfig { min_samples: 1, ..Default::default() });
        let result = optimizer.optimize(&current, &records);

        prop_assert!(result.weights.is_within_bounds());
        prop_assert!((0.0..=1.0).contains(&result.weights.stack_depth_decay));
        prop_assert!(result.improvement >= 0.0);
        prop_assert!(result.sample_count <= records.len());
    }

    #[test]
    fn prop_strategies_keep_weights_in_bounds(current in arb_weights(), intent in 0usize..TaskIntent::ALL.len()) {
        let strategy = IntentAwareProviderStrategy::new();
        let adjusted = strategy.apply_weight_modifiers(current, TaskIntent::ALL[intent]);

        prop_assert!(adjusted.is_within_bounds());
        prop_assert!((0.0..=1.0).contains(&adjusted.stack_depth_decay));
    }

    #[test]
    fn prop_rank_scores_are_non_increasing(
        evidence in proptest::collection::vec(arb_evidence(), 0..30),
        weights in arb_weights(),
    ) {
        let count = evidence.len();
        let ranked = WeightedReranker::new().rank(evidence, &weights);

        prop_assert_eq!(ranked.len(), count);
        prop_assert!(ranked.iter().all(|item| item.score.is_finite() && item.score >= 0.0));
        prop_assert!(ranked.windows(2).all(|pair| pair[0].score >= pair[1].score));
    }

    #[test]
    fn prop_allocation_never_exceeds_budget(
        evidence in proptest::collection::vec(arb_evidence(), 0..30),
        budget in 0usize..600,
        search_min in 0.0f64..0.5,
        diff_max in 0.0f64..=1.0,
    ) {
        let ranked = WeightedReranker::new().rank(dedupe_evidence(evidence), &RerankerWeights::default());
        let ratios = BudgetRatios::new()
            .with(ProviderType::Search, search_min, 1.0)
            .with(ProviderType::Diff, 0.0, diff_max);

        for ratios in [None, Some(&ratios)] {
            let allocation = BudgetAllocator::new().allocate(ranked.clone(), budget, ratios);
            let used: usize = allocation.items.iter().map(|item| item.evidence.token_estimate).sum();

            prop_assert_eq!(used, allocation.tokens_used);
            prop_assert!(used <= budget);
            prop_assert_eq!(allocation.items.len() + allocation.dropped, ranked.len());

            let order: Vec<&str> = ranked.iter().map(|item| item.evidence.id.as_str()).collect();
            let positions: Vec<usize> = allocation
                .items
                .iter()
                .filter_map(|item| order.iter().position(|id| *id == item.evidence.id))
                .collect();
            prop_assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn prop_extracted_signals_are_unique(
        message in "[A-Za-z_./:() 0-9]{0,120}",
        error in "[A-Za-z_./:() 0-9\n]{0,160}",
        working_set in proptest::collection::vec("[a-z]{1,8}/[a-z_]{1,8}\\.(rs|ts|py)", 0..6),
    ) {
        let input = EvidenceInput::from_message(message)
            .with_error(ErrorInput::new("failure").with_stack(error))
            .with_working_set(working_set);
        let signals = SignalExtractor::default().extract(&input);

        let mut seen = HashSet::new();
        for signal in &signals {
            prop_assert!(seen.insert(signal.key()), "duplicate signal {:?}", signal.key());
            prop_assert!((0.0..=1.0).contains(&signal.confidence));
        }
    }
}
