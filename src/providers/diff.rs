//! Diff provider: uncommitted hunks for changed files

use super::{clip_lines, run_blocking, EvidenceProvider, ProviderOptions};
use crate::domain::{
    ChangeType, Evidence, EvidenceCategory, EvidenceMetadata, ProviderType, Signal, SignalType,
};
use crate::error::ProviderError;
use crate::services::{GitService, ServiceSlot};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct DiffProvider {
    git: ServiceSlot<dyn GitService>,
}

impl DiffProvider {
    pub fn new(git: ServiceSlot<dyn GitService>) -> Self {
        Self { git }
    }
}

#[async_trait]
impl EvidenceProvider for DiffProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Diff
    }

    fn accepts(&self, signal: &Signal) -> bool {
        signal.kind == SignalType::Path && signal.metadata.change_type.is_some()
    }

    async fn query(
        &self,
        signals: &[Signal],
        options: &ProviderOptions,
    ) -> Result<Vec<Evidence>, ProviderError> {
        let Some(git) = self.git.get() else {
            debug!("no git service bound, diff provider returns nothing");
            return Ok(Vec::new());
        };

        let changed: Vec<Signal> = signals.iter().filter(|s| self.accepts(s)).cloned().collect();
        if changed.is_empty() {
            return Ok(Vec::new());
        }

        let options = options.clone();
        run_blocking(move || collect_diff_evidence(git, &changed, &options)).await
    }
}

fn collect_diff_evidence(
    git: Arc<dyn GitService>,
    signals: &[Signal],
    options: &ProviderOptions,
) -> Result<Vec<Evidence>, ProviderError> {
    let mut evidence = Vec::new();

    for signal in signals {
        let change_type = signal.metadata.change_type;
        let metadata = EvidenceMetadata { change_type, ..Default::default() };
        let hunks = git.diff_hunks(&signal.value)?;

        if hunks.is_empty() {
            // Deleted files have nothing left in the worktree to show.
            if change_type == Some(ChangeType::Deleted) {
                let note = format!("File deleted: {}\n", signal.value);
                evidence.push(
                    Evidence::new(
                        ProviderType::Diff,
                        EvidenceCategory::Diff,
                        signal.value.clone(),
                        0,
                        0,
                        note,
                        signal.confidence,
                    )
                    .with_metadata(metadata),
                );
            }
            continue;
        }

        for hunk in hunks {
            let start = hunk.new_start.max(1);
            let end = start + hunk.new_lines.saturating_sub(1);
            let body = format!("{}\n{}", hunk.header, hunk.content);
            evidence.push(
                Evidence::new(
                    ProviderType::Diff,
                    EvidenceCategory::Diff,
                    hunk.path,
                    start,
                    end,
                    clip_lines(&body, options.max_snippet_lines),
                    signal.confidence,
                )
                .with_metadata(metadata.clone()),
            );
        }

        if evidence.len() >= options.max_results {
            break;
        }
    }

    evidence.truncate(options.max_results);
    debug!(hunks = evidence.len(), "diff provider collected hunks");
    Ok(evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SignalMetadata, SignalSource};
    use crate::services::DiffHunk;

    struct FakeGit;

    impl GitService for FakeGit {
        fn diff_hunks(&self, path: &str) -> anyhow::Result<Vec<DiffHunk>> {
            if path == "src/auth.ts" {
                Ok(vec![DiffHunk {
                    path: path.to_string(),
                    header: "@@ -10,3 +10,4 @@".to_string(),
                    new_start: 10,
                    new_lines: 4,
                    content: "+const token = refresh();\n context\n".to_string(),
                }])
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn changed(path: &str, change_type: ChangeType) -> Signal {
        Signal::new(SignalType::Path, path, SignalSource::GitDiff, 1.0).with_metadata(
            SignalMetadata { change_type: Some(change_type), ..Default::default() },
        )
    }

    #[tokio::test]
    async fn test_no_git_service_yields_nothing() {
        let provider = DiffProvider::new(ServiceSlot::empty());
        let signals = vec![changed("src/auth.ts", ChangeType::Modified)];
        let evidence = provider.query(&signals, &ProviderOptions::default()).await.unwrap();
        assert!(evidence.is_empty());
    }

    #[tokio::test]
    async fn test_hunks_become_diff_evidence() {
        let slot: ServiceSlot<dyn GitService> = ServiceSlot::empty();
        slot.set(Some(Arc::new(FakeGit)));
        let provider = DiffProvider::new(slot);

        let signals = vec![
            changed("src/auth.ts", ChangeType::Modified),
            changed("src/old.ts", ChangeType::Deleted),
            Signal::new(SignalType::Path, "README.md", SignalSource::UserMessage, 0.8),
        ];
        let evidence = provider.query(&signals, &ProviderOptions::default()).await.unwrap();

        assert_eq!(evidence.len(), 2);
        let hunk = &evidence[0];
        assert_eq!(hunk.category, EvidenceCategory::Diff);
        assert_eq!((hunk.start_line, hunk.end_line), (10, 13));
        assert!(hunk.content.starts_with("@@ -10,3 +10,4 @@"));
        assert_eq!(hunk.metadata.change_type, Some(ChangeType::Modified));
        assert!(evidence[1].content.contains("File deleted"));
    }

    #[test]
    fn test_accepts_only_changed_paths() {
        let provider = DiffProvider::new(ServiceSlot::empty());
        assert!(provider.accepts(&changed("a.rs", ChangeType::Added)));
        let plain = Signal::new(SignalType::Path, "a.rs", SignalSource::UserMessage, 0.8);
        assert!(!provider.accepts(&plain));
    }
}
