//! Token-budget allocation over ranked evidence
//!
//! Selection runs in two phases:
//! 1. Each provider with a minimum ratio gets its reservation filled from its
//!    own best-ranked items.
//! 2. The remaining budget is walked in rank order. Items that do not fit are
//!    skipped, not treated as the end of the walk, and a provider never grows
//!    past its maximum ratio.
//!
//! Selected items keep their rank order. Allocation never fails; an
//! undersized budget just yields fewer items.

use crate::domain::{BudgetRatios, ProviderType, RankedEvidence};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    pub items: Vec<RankedEvidence>,
    pub tokens_used: usize,
    /// Candidate tokens left out of the pack.
    pub tokens_saved: usize,
    /// Budget left over after selection.
    pub tokens_unused: usize,
    pub dropped: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BudgetAllocator;

impl BudgetAllocator {
    pub fn new() -> Self {
        Self
    }

    pub fn allocate(
        &self,
        ranked: Vec<RankedEvidence>,
        token_budget: usize,
        ratios: Option<&BudgetRatios>,
    ) -> Allocation {
        let total_tokens: usize = ranked.iter().map(|r| r.evidence.token_estimate).sum();
        let mut selected = vec![false; ranked.len()];
        let mut used_by: BTreeMap<ProviderType, usize> = BTreeMap::new();
        let mut used = 0usize;

        let share = |ratio: f64| (ratio.clamp(0.0, 1.0) * token_budget as f64).floor() as usize;
        let cap_for = |provider: ProviderType| match ratios {
            Some(r) => share(r.bounds(provider).max),
            None => token_budget,
        };

        // Phase 1: minimum reservations.
        if let Some(ratios) = ratios {
            for (provider, bounds) in ratios.iter() {
                let reserve = share(bounds.min).min(cap_for(*provider));
                if reserve == 0 {
                    continue;
                }
                for (idx, item) in ranked.iter().enumerate() {
                    if selected[idx] || item.evidence.provider_type != *provider {
                        continue;
                    }
                    let cost = item.evidence.token_estimate;
                    let provider_used = used_by.get(provider).copied().unwrap_or(0);
                    if provider_used + cost <= reserve && used + cost <= token_budget {
                        selected[idx] = true;
                        used += cost;
                        *used_by.entry(*provider).or_insert(0) += cost;
                    }
                }
            }
        }

        // Phase 2: greedy fill in rank order.
        for (idx, item) in ranked.iter().enumerate() {
            if selected[idx] {
                continue;
            }
            let provider = item.evidence.provider_type;
            let cost = item.evidence.token_estimate;
            let provider_used = used_by.get(&provider).copied().unwrap_or(0);
            if used + cost <= token_budget && provider_used + cost <= cap_for(provider) {
                selected[idx] = true;
                used += cost;
                *used_by.entry(provider).or_insert(0) += cost;
            }
        }

        let candidates = ranked.len();
        let items: Vec<RankedEvidence> = ranked
            .into_iter()
            .zip(selected)
            .filter_map(|(item, keep)| keep.then_some(item))
            .collect();
        let dropped = candidates - items.len();

        debug!(
            budget = token_budget,
            used,
            kept = items.len(),
            dropped,
            "budget allocation finished"
        );

        Allocation {
            items,
            tokens_used: used,
            tokens_saved: total_tokens.saturating_sub(used),
            tokens_unused: token_budget.saturating_sub(used),
            dropped,
        }
    }
}
