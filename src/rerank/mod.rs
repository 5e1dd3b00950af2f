//! Weighted reranking of merged evidence.

use crate::domain::{Evidence, RankedEvidence, RerankerWeights};
use std::cmp::Ordering;
use std::collections::HashSet;

pub trait Reranker {
    fn name(&self) -> &'static str;
    fn rank(&self, evidence: Vec<Evidence>, weights: &RerankerWeights) -> Vec<RankedEvidence>;
}

/// Scores each item as `weight(category) * relevance`, attenuated by
/// `stack_depth_decay ^ depth` for evidence carrying a stack depth.
///
/// Output is sorted by descending score. The sort is stable, so equal scores
/// keep their input (provider) order.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedReranker;

impl WeightedReranker {
    pub fn new() -> Self {
        Self
    }

    pub fn score(evidence: &Evidence, weights: &RerankerWeights) -> f64 {
        let base = weights.get(evidence.category.weight_key()) * evidence.relevance;
        let score = match evidence.stack_depth() {
            Some(depth) => base * weights.stack_depth_decay.powi(depth.min(i32::MAX as usize) as i32),
            None => base,
        };
        if score.is_finite() {
            score.max(0.0)
        } else {
            0.0
        }
    }
}

impl Reranker for WeightedReranker {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn rank(&self, evidence: Vec<Evidence>, weights: &RerankerWeights) -> Vec<RankedEvidence> {
        let mut ranked: Vec<RankedEvidence> = evidence
            .into_iter()
            .map(|evidence| {
                let score = Self::score(&evidence, weights);
                RankedEvidence { evidence, score }
            })
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked
    }
}

/// Drop evidence whose id was already seen, keeping the first occurrence.
pub fn dedupe_evidence(evidence: Vec<Evidence>) -> Vec<Evidence> {
    let mut seen = HashSet::new();
    evidence.into_iter().filter(|e| seen.insert(e.id.clone())).collect()
}
