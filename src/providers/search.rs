//! Search provider: keyword, stack-frame and working-set evidence read
//! straight from the project tree.
//!
//! The tree is walked at most once per query and only when a signal cannot
//! be resolved by a direct path lookup or keywords need scanning. Keyword
//! scanning runs in parallel with rayon.

use super::{run_blocking, EvidenceProvider, ProviderOptions};
use crate::config::SearchConfig;
use crate::domain::{
    ChangeType, Evidence, EvidenceCategory, EvidenceMetadata, ProviderType, Signal, SignalType,
};
use crate::error::ProviderError;
use crate::utils::classify::looks_generated;
use crate::utils::encoding::{head_window, line_window, DEFAULT_SAMPLE_SIZE};
use crate::utils::{is_binary_file, normalize_path, paths_match, read_file_safe, should_skip_for_search};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Match count at which keyword density saturates.
const DENSITY_SATURATION: f64 = 5.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct SearchProvider;

impl SearchProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EvidenceProvider for SearchProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Search
    }

    fn accepts(&self, signal: &Signal) -> bool {
        match signal.kind {
            SignalType::Symbol | SignalType::ErrorToken => !signal.value.is_empty(),
            SignalType::StackFrame => signal.file().is_some(),
            SignalType::Path => signal.metadata.change_type != Some(ChangeType::Deleted),
        }
    }

    async fn query(
        &self,
        signals: &[Signal],
        options: &ProviderOptions,
    ) -> Result<Vec<Evidence>, ProviderError> {
        let signals: Vec<Signal> = signals.iter().filter(|s| self.accepts(s)).cloned().collect();
        if signals.is_empty() {
            return Ok(Vec::new());
        }
        let options = options.clone();
        run_blocking(move || Ok(search(&signals, &options))).await
    }
}

fn search(signals: &[Signal], options: &ProviderOptions) -> Vec<Evidence> {
    let mut index = FileIndex::new(&options.root, &options.search);
    let mut evidence = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |item: Evidence, evidence: &mut Vec<Evidence>| {
        if seen.insert(item.id.clone()) {
            evidence.push(item);
        }
    };

    for signal in signals.iter().filter(|s| s.kind == SignalType::StackFrame) {
        if let Some(item) = frame_evidence(&mut index, signal, options) {
            push(item, &mut evidence);
        }
    }

    for signal in signals.iter().filter(|s| s.kind == SignalType::Path) {
        if let Some(item) = working_set_evidence(&mut index, signal, options) {
            push(item, &mut evidence);
        }
    }

    for item in keyword_evidence(&mut index, signals, options) {
        push(item, &mut evidence);
    }

    evidence.truncate(options.max_results);
    debug!(items = evidence.len(), walked = index.walked(), "search provider finished");
    evidence
}

fn frame_evidence(index: &mut FileIndex, signal: &Signal, options: &ProviderOptions) -> Option<Evidence> {
    let file = signal.file()?;
    let (path, relative) = index.resolve(file)?;
    let content = read_text(&path)?;
    let line = signal.metadata.line.unwrap_or(1) as usize;
    let window = line_window(&content, line, options.context_lines)?;

    let metadata = EvidenceMetadata {
        stack_depth: signal.metadata.depth,
        symbol: signal.metadata.function.clone(),
        ..Default::default()
    };
    Some(
        Evidence::new(
            ProviderType::Search,
            EvidenceCategory::StackFrame,
            relative,
            window.start_line,
            window.end_line,
            window.content,
            signal.confidence,
        )
        .with_metadata(metadata),
    )
}

fn working_set_evidence(
    index: &mut FileIndex,
    signal: &Signal,
    options: &ProviderOptions,
) -> Option<Evidence> {
    let (path, relative) = index.resolve(&signal.value)?;
    let content = read_text(&path)?;
    let window = head_window(&content, options.max_snippet_lines)?;
    let metadata = EvidenceMetadata { change_type: signal.metadata.change_type, ..Default::default() };
    Some(
        Evidence::new(
            ProviderType::Search,
            EvidenceCategory::WorkingSet,
            relative,
            window.start_line,
            window.end_line,
            window.content,
            signal.confidence,
        )
        .with_metadata(metadata),
    )
}

struct Term<'a> {
    text: &'a str,
    confidence: f64,
}

struct KeywordHit {
    relative: String,
    content: String,
    first_line: usize,
    match_count: usize,
    best_term: String,
    relevance: f64,
}

fn keyword_evidence(
    index: &mut FileIndex,
    signals: &[Signal],
    options: &ProviderOptions,
) -> Vec<Evidence> {
    let mut terms: Vec<Term<'_>> = Vec::new();
    for signal in signals {
        if !matches!(signal.kind, SignalType::Symbol | SignalType::ErrorToken) {
            continue;
        }
        if terms.iter().any(|t| t.text == signal.value) {
            continue;
        }
        terms.push(Term { text: &signal.value, confidence: signal.confidence });
    }
    if terms.is_empty() {
        return Vec::new();
    }

    let files = index.files();
    let mut hits: Vec<KeywordHit> = files
        .par_iter()
        .filter_map(|(path, relative)| scan_file(path, relative, &terms))
        .collect();

    hits.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.match_count.cmp(&a.match_count))
            .then_with(|| a.relative.cmp(&b.relative))
    });
    hits.truncate(options.max_results);

    hits.into_iter()
        .filter_map(|hit| {
            let window = line_window(&hit.content, hit.first_line, options.context_lines)?;
            let metadata = EvidenceMetadata {
                symbol: Some(hit.best_term),
                match_count: Some(hit.match_count),
                ..Default::default()
            };
            Some(
                Evidence::new(
                    ProviderType::Search,
                    EvidenceCategory::Keyword,
                    hit.relative,
                    window.start_line,
                    window.end_line,
                    window.content,
                    hit.relevance,
                )
                .with_metadata(metadata),
            )
        })
        .collect()
}

fn scan_file(path: &Path, relative: &str, terms: &[Term<'_>]) -> Option<KeywordHit> {
    let content = read_text(path)?;

    let mut match_count = 0;
    let mut matched = vec![false; terms.len()];
    let mut best: Option<(usize, usize)> = None; // (term index, line)

    for (line_idx, line) in content.lines().enumerate() {
        for (term_idx, term) in terms.iter().enumerate() {
            let count = count_word_matches(line, term.text);
            if count == 0 {
                continue;
            }
            match_count += count;
            matched[term_idx] = true;
            let better = match best {
                None => true,
                Some((current, _)) => term.confidence > terms[current].confidence,
            };
            if better {
                best = Some((term_idx, line_idx + 1));
            }
        }
    }

    let (best_idx, first_line) = best?;
    let coverage = matched.iter().filter(|m| **m).count() as f64 / terms.len() as f64;
    let density = (match_count as f64 / DENSITY_SATURATION).min(1.0);
    let relevance = terms[best_idx].confidence * (0.6 * coverage + 0.4 * density);

    Some(KeywordHit {
        relative: relative.to_string(),
        content,
        first_line,
        match_count,
        best_term: terms[best_idx].text.to_string(),
        relevance,
    })
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Occurrences of `term` in `line` not embedded in a longer identifier.
fn count_word_matches(line: &str, term: &str) -> usize {
    if term.is_empty() {
        return 0;
    }
    line.match_indices(term)
        .filter(|(start, _)| {
            let before = line[..*start].chars().next_back();
            let after = line[start + term.len()..].chars().next();
            !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
        })
        .count()
}

fn read_text(path: &Path) -> Option<String> {
    match read_file_safe(path, None) {
        Ok(content) if !looks_generated(&content) => Some(content),
        Ok(_) => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "search provider could not read file");
            None
        }
    }
}

/// Searchable files under the root, walked lazily.
struct FileIndex<'a> {
    root: &'a Path,
    /// Canonical root; direct lookups must land inside it.
    canonical_root: Option<PathBuf>,
    config: &'a SearchConfig,
    files: Option<Vec<(PathBuf, String)>>,
}

impl<'a> FileIndex<'a> {
    fn new(root: &'a Path, config: &'a SearchConfig) -> Self {
        Self { root, canonical_root: root.canonicalize().ok(), config, files: None }
    }

    fn walked(&self) -> bool {
        self.files.is_some()
    }

    fn files(&mut self) -> &[(PathBuf, String)] {
        if self.files.is_none() {
            self.files = Some(walk(self.root, self.config));
        }
        self.files.as_deref().unwrap_or_default()
    }

    /// Resolve a path hint to `(absolute, relative)`. Exact paths under the
    /// root win; otherwise the first indexed file whose path ends with the
    /// hint's segments. Nothing outside the root is ever returned.
    fn resolve(&mut self, hint: &str) -> Option<(PathBuf, String)> {
        let hint = normalize_path(hint);
        if hint.is_empty() {
            return None;
        }

        if let Some((path, relative)) = self.inside_root(&hint) {
            if path.metadata().map(|m| m.len() > self.config.max_file_bytes).unwrap_or(true) {
                debug!(path = %relative, "skipping oversized file");
                return None;
            }
            if is_binary_file(&path, DEFAULT_SAMPLE_SIZE) {
                return None;
            }
            return Some((path, relative));
        }

        self.files().iter().find(|(_, relative)| paths_match(&hint, relative)).cloned()
    }

    /// The hint as an existing file under the canonical root, symlinks and
    /// `..` segments resolved.
    fn inside_root(&self, hint: &str) -> Option<(PathBuf, String)> {
        let root = self.canonical_root.as_ref()?;
        let hinted = Path::new(hint);
        let direct = if hinted.is_absolute() { hinted.to_path_buf() } else { self.root.join(hinted) };
        let canonical = direct.canonicalize().ok()?;
        if !canonical.is_file() {
            return None;
        }
        let Ok(relative) = canonical.strip_prefix(root) else {
            debug!(hint = %hint, "path hint points outside the project root");
            return None;
        };
        let relative = normalize_path(&relative.to_string_lossy());
        Some((canonical, relative))
    }
}

fn build_exclude_globset(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!(pattern = %pattern, error = %e, "ignoring invalid exclude glob"),
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// Walk the tree in sorted order, applying ignore rules, exclude globs,
/// size limits and skip heuristics.
fn walk(root: &Path, config: &SearchConfig) -> Vec<(PathBuf, String)> {
    let excludes = build_exclude_globset(&config.exclude_globs);

    let dir_filter = |entry: &ignore::DirEntry| -> bool {
        if entry.file_type().is_some_and(|t| t.is_dir()) {
            if let Some(name) = entry.file_name().to_str() {
                if matches!(name, "node_modules" | "__pycache__" | ".git" | ".venv" | "venv") {
                    return false;
                }
                if name.starts_with('.') && name != ".github" && entry.depth() > 0 {
                    return false;
                }
            }
        }
        true
    };

    let mut builder = WalkBuilder::new(root);
    builder
        .git_ignore(config.respect_gitignore)
        .git_global(config.respect_gitignore)
        .git_exclude(config.respect_gitignore)
        .require_git(false)
        .hidden(false)
        .parents(true)
        .sort_by_file_path(|a, b| a.cmp(b))
        .filter_entry(dir_filter);

    let mut files = Vec::new();
    for entry in builder.build().flatten() {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let relative = match path.strip_prefix(root) {
            Ok(p) => normalize_path(&p.to_string_lossy()),
            Err(_) => continue,
        };

        if excludes.is_match(&relative) || should_skip_for_search(path, &relative) {
            continue;
        }
        if path.metadata().map(|m| m.len() > config.max_file_bytes).unwrap_or(true) {
            continue;
        }
        if is_binary_file(path, DEFAULT_SAMPLE_SIZE) {
            continue;
        }

        files.push((path.to_path_buf(), relative));
        if files.len() >= config.max_files {
            debug!(max_files = config.max_files, "search walk hit file cap");
            break;
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SignalMetadata, SignalSource};
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/services")).unwrap();
        fs::create_dir_all(root.join("node_modules/lib")).unwrap();
        fs::write(
            root.join("src/services/user.ts"),
            "import { db } from './db';\n\nexport function getUser(id) {\n  const user = db.find(id);\n  return user.name;\n}\n",
        )
        .unwrap();
        fs::write(root.join("src/main.ts"), "import { getUser } from './services/user';\ngetUser(1);\n")
            .unwrap();
        fs::write(root.join("src/other.ts"), "const getUserName = 1;\n").unwrap();
        fs::write(root.join("node_modules/lib/index.js"), "getUser()\n").unwrap();
        dir
    }

    fn options(dir: &TempDir) -> ProviderOptions {
        let mut options = ProviderOptions::default().with_root(dir.path());
        options.context_lines = 1;
        options
    }

    #[test]
    fn test_count_word_matches_respects_boundaries() {
        assert_eq!(count_word_matches("getUser(getUser)", "getUser"), 2);
        assert_eq!(count_word_matches("getUserName", "getUser"), 0);
        assert_eq!(count_word_matches("_getUser", "getUser"), 0);
        assert_eq!(count_word_matches("", "getUser"), 0);
    }

    #[tokio::test]
    async fn test_keyword_search_ranks_by_relevance() {
        let dir = project();
        let signals = vec![Signal::new(SignalType::Symbol, "getUser", SignalSource::UserMessage, 0.6)];
        let evidence = SearchProvider::new().query(&signals, &options(&dir)).await.unwrap();

        let paths: Vec<&str> = evidence.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["src/main.ts", "src/services/user.ts"]);
        assert!(evidence.iter().all(|e| e.category == EvidenceCategory::Keyword));
        assert_eq!(evidence[0].metadata.match_count, Some(2));
        assert!(evidence[0].relevance > evidence[1].relevance);
    }

    #[tokio::test]
    async fn test_stack_frame_window() {
        let dir = project();
        let frame = Signal::new(
            SignalType::StackFrame,
            "src/services/user.ts:5",
            SignalSource::ErrorOutput,
            0.9,
        )
        .with_metadata(SignalMetadata {
            file: Some("src/services/user.ts".into()),
            line: Some(5),
            function: Some("getUser".into()),
            depth: Some(1),
            ..Default::default()
        });
        let evidence = SearchProvider::new().query(&[frame], &options(&dir)).await.unwrap();

        assert_eq!(evidence.len(), 1);
        let item = &evidence[0];
        assert_eq!(item.category, EvidenceCategory::StackFrame);
        assert_eq!((item.start_line, item.end_line), (4, 6));
        assert!(item.content.contains("return user.name;"));
        assert_eq!(item.stack_depth(), Some(1));
    }

    #[tokio::test]
    async fn test_partial_path_resolves_through_walk() {
        let dir = project();
        let signals = vec![Signal::new(SignalType::Path, "services/user.ts", SignalSource::WorkingSet, 1.0)];
        let evidence = SearchProvider::new().query(&signals, &options(&dir)).await.unwrap();

        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].path, "src/services/user.ts");
        assert_eq!(evidence[0].category, EvidenceCategory::WorkingSet);
        assert_eq!(evidence[0].start_line, 1);
    }

    #[tokio::test]
    async fn test_missing_files_yield_nothing() {
        let dir = project();
        let signals = vec![
            Signal::new(SignalType::Path, "nope/missing.ts", SignalSource::UserMessage, 0.8),
            Signal::new(SignalType::Symbol, "neverMentioned", SignalSource::UserMessage, 0.6),
        ];
        let evidence = SearchProvider::new().query(&signals, &options(&dir)).await.unwrap();
        assert!(evidence.is_empty());
    }

    #[test]
    fn test_walk_skips_vendored_and_excluded() {
        let dir = project();
        fs::write(dir.path().join("src/app.js.map"), "{}").unwrap();
        let files = walk(dir.path(), &SearchConfig::default());
        let relative: Vec<&str> = files.iter().map(|(_, r)| r.as_str()).collect();
        assert_eq!(relative, vec!["src/main.ts", "src/other.ts", "src/services/user.ts"]);
    }

    #[tokio::test]
    async fn test_paths_outside_root_are_not_read() {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("proj");
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/app.ts"), "run();\n").unwrap();
        let secret = outer.path().join("secret.json");
        fs::write(&secret, "{\"token\": \"hunter2\"}\n").unwrap();

        let signals = vec![
            Signal::new(SignalType::Path, "../secret.json", SignalSource::UserMessage, 0.8),
            Signal::new(SignalType::Path, secret.to_string_lossy(), SignalSource::UserMessage, 0.8),
            Signal::new(SignalType::StackFrame, "../secret.json:1", SignalSource::ErrorOutput, 0.9)
                .with_metadata(SignalMetadata {
                    file: Some("../secret.json".into()),
                    line: Some(1),
                    depth: Some(0),
                    ..Default::default()
                }),
        ];
        let options = ProviderOptions::default().with_root(&root);
        let evidence = SearchProvider::new().query(&signals, &options).await.unwrap();

        assert!(evidence.iter().all(|e| !e.content.contains("hunter2")), "{evidence:?}");
    }

    #[tokio::test]
    async fn test_dotted_path_inside_root_still_resolves() {
        let dir = project();
        let signals = vec![Signal::new(
            SignalType::Path,
            "src/services/../main.ts",
            SignalSource::WorkingSet,
            1.0,
        )];
        let evidence = SearchProvider::new().query(&signals, &options(&dir)).await.unwrap();

        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].path, "src/main.ts");
    }

    #[tokio::test]
    async fn test_direct_paths_respect_size_limit() {
        let dir = project();
        fs::write(dir.path().join("src/huge.ts"), "let a = 1;\n".repeat(200)).unwrap();
        let mut options = options(&dir);
        options.search.max_file_bytes = 1024;

        let signals = vec![
            Signal::new(SignalType::Path, "src/huge.ts", SignalSource::WorkingSet, 1.0),
            Signal::new(SignalType::Path, "src/main.ts", SignalSource::WorkingSet, 1.0),
        ];
        let evidence = SearchProvider::new().query(&signals, &options).await.unwrap();

        let paths: Vec<&str> = evidence.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["src/main.ts"]);
    }

    #[test]
    fn test_deleted_paths_not_accepted() {
        let signal = Signal::new(SignalType::Path, "a.ts", SignalSource::GitDiff, 1.0).with_metadata(
            SignalMetadata { change_type: Some(ChangeType::Deleted), ..Default::default() },
        );
        assert!(!SearchProvider::new().accepts(&signal));
    }
}
