//! Evidence providers and their response cache
//!
//! Each provider turns the signals it understands into evidence from one
//! source. Providers may fail; the pack builder contains the failure.

pub mod cache;
pub mod diff;
pub mod lsp;
pub mod search;

pub use cache::{CacheStats, EvidenceCache};
pub use diff::DiffProvider;
pub use lsp::LspProvider;
pub use search::SearchProvider;

use crate::config::{ProvidersConfig, SearchConfig};
use crate::domain::{Evidence, ProviderType, Signal};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::path::PathBuf;

/// Per-query options shared by all providers.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub root: PathBuf,
    pub max_results: usize,
    pub context_lines: usize,
    pub max_snippet_lines: usize,
    pub search: SearchConfig,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self::from(&ProvidersConfig::default())
    }
}

impl From<&ProvidersConfig> for ProviderOptions {
    fn from(config: &ProvidersConfig) -> Self {
        Self {
            root: config.root.clone(),
            max_results: config.max_results,
            context_lines: config.context_lines,
            max_snippet_lines: config.max_snippet_lines,
            search: config.search.clone(),
        }
    }
}

impl ProviderOptions {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }
}

#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    /// Whether this provider can do anything with `signal`.
    fn accepts(&self, signal: &Signal) -> bool;

    async fn query(
        &self,
        signals: &[Signal],
        options: &ProviderOptions,
    ) -> Result<Vec<Evidence>, ProviderError>;
}

/// Keep only the first `max_lines` lines of a snippet.
pub(crate) fn clip_lines(text: &str, max_lines: usize) -> String {
    let mut lines = text.lines();
    let mut out: Vec<&str> = lines.by_ref().take(max_lines.max(1)).collect();
    if lines.next().is_some() {
        out.push("...");
    }
    let mut joined = out.join("\n");
    joined.push('\n');
    joined
}

pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, ProviderError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ProviderError> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| ProviderError::Join(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_lines_marks_truncation() {
        assert_eq!(clip_lines("a\nb\nc\n", 2), "a\nb\n...\n");
        assert_eq!(clip_lines("a\nb\n", 5), "a\nb\n");
    }
}
