//! Retrieved context items produced by providers.

use super::input::ChangeType;
use super::weights::WeightKey;
use crate::utils::{estimate_tokens, evidence_id};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source an evidence item was retrieved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Diff,
    Lsp,
    Search,
}

impl ProviderType {
    pub const ALL: [ProviderType; 3] = [ProviderType::Diff, ProviderType::Lsp, ProviderType::Search];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Diff => "diff",
            ProviderType::Lsp => "lsp",
            ProviderType::Search => "search",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic category, selects which reranker weight applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceCategory {
    Diff,
    Definition,
    Reference,
    Keyword,
    StackFrame,
    WorkingSet,
}

impl EvidenceCategory {
    pub fn weight_key(&self) -> WeightKey {
        match self {
            EvidenceCategory::Diff => WeightKey::Diff,
            EvidenceCategory::Definition => WeightKey::Definition,
            EvidenceCategory::Reference => WeightKey::Reference,
            EvidenceCategory::Keyword => WeightKey::Keyword,
            EvidenceCategory::StackFrame => WeightKey::StackFrame,
            EvidenceCategory::WorkingSet => WeightKey::WorkingSet,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceCategory::Diff => "diff",
            EvidenceCategory::Definition => "definition",
            EvidenceCategory::Reference => "reference",
            EvidenceCategory::Keyword => "keyword",
            EvidenceCategory::StackFrame => "stack_frame",
            EvidenceCategory::WorkingSet => "working_set",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_type: Option<ChangeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_count: Option<usize>,
}

/// One retrieved context item. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub id: String,
    pub provider_type: ProviderType,
    pub category: EvidenceCategory,
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    /// Intrinsic relevance in `[0, 1]` before weighting.
    pub relevance: f64,
    pub token_estimate: usize,
    #[serde(default)]
    pub metadata: EvidenceMetadata,
}

impl Evidence {
    pub fn new(
        provider_type: ProviderType,
        category: EvidenceCategory,
        path: impl Into<String>,
        start_line: usize,
        end_line: usize,
        content: impl Into<String>,
        relevance: f64,
    ) -> Self {
        let path = path.into();
        let content = content.into();
        let relevance = if relevance.is_finite() { relevance.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            id: evidence_id(category.as_str(), &path, start_line, end_line),
            provider_type,
            category,
            token_estimate: estimate_tokens(&content).max(1),
            path,
            start_line,
            end_line,
            content,
            relevance,
            metadata: EvidenceMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: EvidenceMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn stack_depth(&self) -> Option<usize> {
        self.metadata.stack_depth
    }
}
