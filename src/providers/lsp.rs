//! LSP provider: definitions and references for symbols

use super::{clip_lines, run_blocking, EvidenceProvider, ProviderOptions};
use crate::domain::{Evidence, EvidenceCategory, EvidenceMetadata, ProviderType, Signal, SignalType};
use crate::error::ProviderError;
use crate::services::{LspHub, ServiceSlot, SymbolLocation};
use crate::utils::encoding::{line_window, LineWindow};
use crate::utils::read_file_safe;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// References are worth less than the definition of the same symbol.
const REFERENCE_FACTOR: f64 = 0.8;

pub struct LspProvider {
    hub: ServiceSlot<dyn LspHub>,
}

impl LspProvider {
    pub fn new(hub: ServiceSlot<dyn LspHub>) -> Self {
        Self { hub }
    }
}

/// Symbol name an LSP query should resolve for this signal.
fn query_symbol(signal: &Signal) -> Option<&str> {
    match signal.kind {
        SignalType::Symbol => Some(signal.value.as_str()),
        SignalType::StackFrame => signal.metadata.function.as_deref(),
        _ => None,
    }
}

struct Located {
    location: SymbolLocation,
    category: EvidenceCategory,
    symbol: String,
    relevance: f64,
}

#[async_trait]
impl EvidenceProvider for LspProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Lsp
    }

    fn accepts(&self, signal: &Signal) -> bool {
        query_symbol(signal).is_some_and(|s| !s.is_empty())
    }

    async fn query(
        &self,
        signals: &[Signal],
        options: &ProviderOptions,
    ) -> Result<Vec<Evidence>, ProviderError> {
        let Some(hub) = self.hub.get() else {
            debug!("no LSP hub bound, LSP provider returns nothing");
            return Ok(Vec::new());
        };

        let mut located = Vec::new();
        let mut seen = HashSet::new();
        let reference_limit = (options.max_results / 4).max(1);

        for signal in signals {
            let Some(symbol) = query_symbol(signal) else { continue };
            if !seen.insert(symbol.to_string()) {
                continue;
            }

            for location in hub.definitions(symbol).await? {
                located.push(Located {
                    location,
                    category: EvidenceCategory::Definition,
                    symbol: symbol.to_string(),
                    relevance: signal.confidence,
                });
            }
            for location in hub.references(symbol, reference_limit).await? {
                located.push(Located {
                    location,
                    category: EvidenceCategory::Reference,
                    symbol: symbol.to_string(),
                    relevance: signal.confidence * REFERENCE_FACTOR,
                });
            }

            if located.len() >= options.max_results {
                break;
            }
        }
        located.truncate(options.max_results);

        let options = options.clone();
        run_blocking(move || Ok(materialize(located, &options))).await
    }
}

/// Turn locations into evidence, reading source text for any location the
/// server returned without a snippet.
fn materialize(located: Vec<Located>, options: &ProviderOptions) -> Vec<Evidence> {
    located
        .into_iter()
        .filter_map(|item| {
            let Located { location, category, symbol, relevance } = item;
            let (start, end, content) = match location.snippet {
                Some(snippet) if !snippet.trim().is_empty() => {
                    let end = location.end_line.unwrap_or(location.line).max(location.line);
                    (location.line, end, clip_lines(&snippet, options.max_snippet_lines))
                }
                _ => {
                    let window = read_window(&options.root, &location, options.context_lines)?;
                    (window.start_line, window.end_line, window.content)
                }
            };
            let metadata = EvidenceMetadata { symbol: Some(symbol), ..Default::default() };
            Some(
                Evidence::new(
                    ProviderType::Lsp,
                    category,
                    location.path,
                    start,
                    end,
                    content,
                    relevance,
                )
                .with_metadata(metadata),
            )
        })
        .collect()
}

fn read_window(
    root: &Path,
    location: &SymbolLocation,
    context: usize,
) -> Option<LineWindow> {
    let path = root.join(&location.path);
    match read_file_safe(&path, None) {
        Ok(content) => line_window(&content, location.line, context),
        Err(e) => {
            warn!(path = %location.path, error = %e, "could not read LSP location");
            None
        }
    }
}
