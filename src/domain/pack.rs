//! Assembled evidence packs and their build telemetry.

use super::evidence::{Evidence, EvidenceCategory, ProviderType};
use super::input::{ChangeType, GitDiff};
use super::signal::SignalType;
use super::weights::RerankerWeights;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Coarse task category used to bias weights before retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskIntent {
    Debug,
    Refactor,
    Implement,
    Test,
    Review,
    Explain,
    General,
}

impl TaskIntent {
    pub const ALL: [TaskIntent; 7] = [
        TaskIntent::Debug,
        TaskIntent::Refactor,
        TaskIntent::Implement,
        TaskIntent::Test,
        TaskIntent::Review,
        TaskIntent::Explain,
        TaskIntent::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskIntent::Debug => "debug",
            TaskIntent::Refactor => "refactor",
            TaskIntent::Implement => "implement",
            TaskIntent::Test => "test",
            TaskIntent::Review => "review",
            TaskIntent::Explain => "explain",
            TaskIntent::General => "general",
        }
    }
}

impl fmt::Display for TaskIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        TaskIntent::ALL
            .into_iter()
            .find(|intent| intent.as_str() == lower)
            .ok_or_else(|| format!("Unknown intent '{s}'"))
    }
}

/// Task outcome reported through the feedback channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Abandoned,
}

impl Outcome {
    pub fn from_success(success: bool) -> Self {
        if success {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

/// Evidence together with the score the reranker gave it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEvidence {
    pub evidence: Evidence,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTiming {
    pub duration_ms: u64,
    pub evidence_count: usize,
    pub cache_hit: bool,
    pub failed: bool,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvidenceTelemetry {
    pub provider_timings: BTreeMap<ProviderType, ProviderTiming>,
    pub total_duration_ms: u64,
    pub signal_count: usize,
    pub evidence_before_budget: usize,
    pub evidence_after_budget: usize,
    pub tokens_used: usize,
    pub tokens_saved: usize,
    pub token_budget: usize,
    pub intent: Option<TaskIntent>,
    pub weights: RerankerWeights,
}

impl EvidenceTelemetry {
    pub fn provider_latency_ms(&self, provider: ProviderType) -> u64 {
        self.provider_timings.get(&provider).map(|t| t.duration_ms).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub files: Vec<String>,
}

impl DiffSummary {
    pub fn from_diff(diff: &GitDiff) -> Self {
        let mut summary = DiffSummary::default();
        for file in &diff.files {
            match file.change_type {
                ChangeType::Added => summary.added += 1,
                ChangeType::Modified => summary.modified += 1,
                ChangeType::Deleted => summary.deleted += 1,
            }
            summary.files.push(file.path.clone());
        }
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackSummary {
    pub signals_by_type: BTreeMap<SignalType, usize>,
    pub evidence_by_category: BTreeMap<EvidenceCategory, usize>,
    pub diff: Option<DiffSummary>,
    pub tokens_used: usize,
    pub token_budget: usize,
}

impl PackSummary {
    /// One-line human readable description.
    pub fn describe(&self) -> String {
        let signals: usize = self.signals_by_type.values().sum();
        let evidence: usize = self.evidence_by_category.values().sum();
        let mut line = format!(
            "{evidence} evidence items from {signals} signals, {}/{} tokens",
            self.tokens_used, self.token_budget
        );
        if let Some(diff) = &self.diff {
            line.push_str(&format!(
                "; diff +{} ~{} -{}",
                diff.added, diff.modified, diff.deleted
            ));
        }
        line
    }
}

/// Token-bounded bundle handed to prompt assembly. Created once per build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidencePack {
    pub items: Vec<RankedEvidence>,
    pub summary: PackSummary,
    pub telemetry: EvidenceTelemetry,
}

impl EvidencePack {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn evidence(&self) -> impl Iterator<Item = &Evidence> {
        self.items.iter().map(|item| &item.evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DiffFile;

    #[test]
    fn test_intent_from_str() {
        assert_eq!("Debug".parse::<TaskIntent>().expect("intent"), TaskIntent::Debug);
        assert!("nonsense".parse::<TaskIntent>().is_err());
    }

    #[test]
    fn test_diff_summary_counts_change_types() {
        let diff = GitDiff {
            files: vec![
                DiffFile::new("a.rs", ChangeType::Added),
                DiffFile::new("b.rs", ChangeType::Modified),
                DiffFile::new("c.rs", ChangeType::Modified),
                DiffFile::new("d.rs", ChangeType::Deleted),
            ],
        };
        let summary = DiffSummary::from_diff(&diff);
        assert_eq!((summary.added, summary.modified, summary.deleted), (1, 2, 1));
        assert_eq!(summary.files.len(), 4);
    }
}
