//! Heuristic signal extraction.
//!
//! Turns the raw build input into typed, confidence-scored [`Signal`]s. This
//! is pure: malformed input simply produces fewer signals.

use super::dialects::{StackDialect, StackFrame, DEFAULT_DIALECTS};
use crate::config::ExtractorConfig;
use crate::domain::{
    ErrorInput, EvidenceInput, Signal, SignalMetadata, SignalSource, SignalType,
};
use crate::error::ConfigError;
use crate::utils::normalize_path;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

const SYMBOL_CONFIDENCE: f64 = 0.6;
const MESSAGE_PATH_CONFIDENCE: f64 = 0.8;
const CUSTOM_PATTERN_CONFIDENCE: f64 = 0.5;
const ERROR_TOKEN_CONFIDENCE: f64 = 0.7;
const ERROR_MESSAGE_PATH_CONFIDENCE: f64 = 0.9;
const ERROR_STACK_PATH_CONFIDENCE: f64 = 0.85;
const EXPLICIT_PATH_CONFIDENCE: f64 = 1.0;
const FRAME_DECAY_PER_DEPTH: f64 = 0.1;
const FRAME_CONFIDENCE_FLOOR: f64 = 0.1;

static PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:\.{1,2}/|/)?(?:[\w@.\-]+/)*[\w@\-]+(?:\.[\w\-]+)*\.(?:tsx|ts|jsx|js|mjs|cjs|py|rs|go|java|kt|kts|rb|php|cs|cpp|cc|hpp|c|h|swift|scala|vue|svelte|json|toml|yaml|yml|md|sql|sh)\b",
    )
    .expect("valid regex")
});

static SYMBOL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // camelCase
        Regex::new(r"\b[a-z][a-z0-9]*(?:[A-Z][a-z0-9]*)+\b").expect("valid regex"),
        // PascalCase with at least two humps
        Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+\b").expect("valid regex"),
        // snake_case
        Regex::new(r"\b[a-z][a-z0-9]*(?:_[a-z0-9]+)+\b").expect("valid regex"),
    ]
});

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").expect("valid regex"));

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "not", "but", "are", "was", "were", "has", "have", "had", "this",
        "that", "with", "from", "into", "onto", "when", "then", "than", "there", "their", "which",
        "while", "can", "cannot", "could", "should", "would", "will", "does", "did", "doesn",
        "isn", "wasn", "you", "your", "our", "its", "all", "any", "some", "none", "null", "nil",
        "undefined", "true", "false", "error", "errors", "exception", "failed", "fail", "failure",
        "unable", "expected", "found", "got", "line", "file", "column", "function", "object",
        "type", "value", "property", "reading", "read", "call", "called", "calling", "module",
        "returned", "return", "new", "see", "use", "used", "using", "been", "being", "also",
        "only", "other", "such", "must", "may", "might", "more", "most", "at", "in", "of",
        "to", "is", "it", "on", "by", "an", "be",
    ]
    .into_iter()
    .collect()
});

/// Tuning knobs for [`SignalExtractor`].
#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    pub min_confidence: f64,
    pub max_signals_per_type: usize,
    pub custom_patterns: Vec<Regex>,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        let config = ExtractorConfig::default();
        Self {
            min_confidence: config.min_confidence,
            max_signals_per_type: config.max_signals_per_type,
            custom_patterns: Vec::new(),
        }
    }
}

impl TryFrom<&ExtractorConfig> for ExtractorOptions {
    type Error = ConfigError;

    fn try_from(config: &ExtractorConfig) -> Result<Self, Self::Error> {
        let custom_patterns = config
            .custom_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            min_confidence: config.min_confidence,
            max_signals_per_type: config.max_signals_per_type,
            custom_patterns,
        })
    }
}

pub struct SignalExtractor {
    options: ExtractorOptions,
    dialects: &'static [StackDialect],
}

impl Default for SignalExtractor {
    fn default() -> Self {
        Self::new(ExtractorOptions::default())
    }
}

impl SignalExtractor {
    pub fn new(options: ExtractorOptions) -> Self {
        Self { options, dialects: DEFAULT_DIALECTS.as_slice() }
    }

    /// Use a different stack-dialect table, tried in order.
    pub fn with_dialects(mut self, dialects: &'static [StackDialect]) -> Self {
        self.dialects = dialects;
        self
    }

    pub fn options(&self) -> &ExtractorOptions {
        &self.options
    }

    pub fn extract(&self, input: &EvidenceInput) -> Vec<Signal> {
        let mut signals = Vec::new();

        if let Some(message) = input.user_message.as_deref() {
            self.extract_from_message(message, &mut signals);
        }
        for error in &input.errors {
            self.extract_from_error(error, &mut signals);
        }
        for path in &input.working_set {
            let path = normalize_path(path);
            if !path.is_empty() {
                signals.push(Signal::new(
                    SignalType::Path,
                    path,
                    SignalSource::WorkingSet,
                    EXPLICIT_PATH_CONFIDENCE,
                ));
            }
        }
        if let Some(diff) = &input.git_diff {
            for file in &diff.files {
                let path = normalize_path(&file.path);
                if path.is_empty() {
                    continue;
                }
                signals.push(
                    Signal::new(
                        SignalType::Path,
                        path,
                        SignalSource::GitDiff,
                        EXPLICIT_PATH_CONFIDENCE,
                    )
                    .with_metadata(SignalMetadata {
                        change_type: Some(file.change_type),
                        ..SignalMetadata::default()
                    }),
                );
            }
        }

        self.finalize(signals)
    }

    fn extract_from_message(&self, message: &str, out: &mut Vec<Signal>) {
        for path in find_paths(message) {
            out.push(Signal::new(
                SignalType::Path,
                path,
                SignalSource::UserMessage,
                MESSAGE_PATH_CONFIDENCE,
            ));
        }

        let masked = mask_paths(message);
        for pattern in SYMBOL_PATTERNS.iter() {
            for m in pattern.find_iter(&masked) {
                out.push(Signal::new(
                    SignalType::Symbol,
                    m.as_str(),
                    SignalSource::UserMessage,
                    SYMBOL_CONFIDENCE,
                ));
            }
        }

        for pattern in &self.options.custom_patterns {
            for caps in pattern.captures_iter(message) {
                let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                    continue;
                };
                if m.as_str().trim().is_empty() {
                    continue;
                }
                out.push(
                    Signal::new(
                        SignalType::Symbol,
                        m.as_str().trim(),
                        SignalSource::UserMessage,
                        CUSTOM_PATTERN_CONFIDENCE,
                    )
                    .with_metadata(SignalMetadata {
                        pattern: Some(pattern.as_str().to_string()),
                        ..SignalMetadata::default()
                    }),
                );
            }
        }
    }

    fn extract_from_error(&self, error: &ErrorInput, out: &mut Vec<Signal>) {
        let stack = error.stack.as_deref().filter(|s| !s.trim().is_empty());
        let trace_text = stack.unwrap_or(error.message.as_str());

        for (depth, frame) in self.parse_frames(trace_text).into_iter().enumerate() {
            let confidence =
                (1.0 - depth as f64 * FRAME_DECAY_PER_DEPTH).max(FRAME_CONFIDENCE_FLOOR);
            let file = normalize_path(&frame.file);
            out.push(
                Signal::new(
                    SignalType::StackFrame,
                    format!("{}:{}", file, frame.line),
                    SignalSource::ErrorOutput,
                    confidence,
                )
                .with_metadata(SignalMetadata {
                    file: Some(file),
                    line: Some(frame.line),
                    column: frame.column,
                    function: frame.function,
                    depth: Some(depth),
                    ..SignalMetadata::default()
                }),
            );
        }

        let masked = mask_paths(&error.message);
        for m in IDENTIFIER_RE.find_iter(&masked) {
            let token = m.as_str();
            if token.len() <= 2 || STOP_WORDS.contains(token.to_ascii_lowercase().as_str()) {
                continue;
            }
            out.push(Signal::new(
                SignalType::ErrorToken,
                token,
                SignalSource::ErrorOutput,
                ERROR_TOKEN_CONFIDENCE,
            ));
        }
        if let Some(code) = error.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            out.push(Signal::new(
                SignalType::ErrorToken,
                code,
                SignalSource::ErrorOutput,
                ERROR_TOKEN_CONFIDENCE,
            ));
        }

        for path in find_paths(&error.message) {
            out.push(Signal::new(
                SignalType::Path,
                path,
                SignalSource::ErrorOutput,
                ERROR_MESSAGE_PATH_CONFIDENCE,
            ));
        }
        if let Some(stack) = stack {
            for path in find_paths(stack) {
                out.push(Signal::new(
                    SignalType::Path,
                    path,
                    SignalSource::ErrorOutput,
                    ERROR_STACK_PATH_CONFIDENCE,
                ));
            }
        }
    }

    /// Frames from the first dialect that recognises anything.
    fn parse_frames(&self, text: &str) -> Vec<StackFrame> {
        for dialect in self.dialects {
            let frames = dialect.frames(text);
            if !frames.is_empty() {
                tracing::trace!(dialect = dialect.name, frames = frames.len(), "parsed stack");
                return frames;
            }
        }
        Vec::new()
    }

    /// Deduplicate by `(type, value)` keeping the highest confidence, drop weak
    /// signals and cap the total.
    fn finalize(&self, signals: Vec<Signal>) -> Vec<Signal> {
        let mut index: HashMap<(SignalType, String), usize> = HashMap::new();
        let mut unique: Vec<Signal> = Vec::with_capacity(signals.len());

        for signal in signals {
            let key = (signal.kind, signal.value.clone());
            match index.get(&key) {
                Some(&pos) => {
                    let existing = &mut unique[pos];
                    if signal.confidence > existing.confidence {
                        let previous = std::mem::replace(existing, signal);
                        merge_metadata(&mut existing.metadata, previous.metadata);
                    } else {
                        merge_metadata(&mut existing.metadata, signal.metadata);
                    }
                }
                None => {
                    index.insert(key, unique.len());
                    unique.push(signal);
                }
            }
        }

        unique.retain(|s| s.confidence >= self.options.min_confidence);
        unique.sort_by(|a, b| {
            b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal)
        });
        unique.truncate(self.options.max_signals_per_type * SignalType::ALL.len());
        unique
    }
}

/// Fill fields missing on `target` from `other`.
fn merge_metadata(target: &mut SignalMetadata, other: SignalMetadata) {
    target.file = target.file.take().or(other.file);
    target.line = target.line.or(other.line);
    target.column = target.column.or(other.column);
    target.function = target.function.take().or(other.function);
    target.depth = target.depth.or(other.depth);
    target.change_type = target.change_type.or(other.change_type);
    target.pattern = target.pattern.take().or(other.pattern);
}

fn find_paths(text: &str) -> Vec<String> {
    PATH_RE.find_iter(text).map(|m| normalize_path(m.as_str())).collect()
}

/// Blank out path matches so file stems are not re-read as symbols.
fn mask_paths(text: &str) -> String {
    PATH_RE.replace_all(text, |caps: &regex::Captures<'_>| " ".repeat(caps[0].len())).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChangeType, DiffFile, GitDiff};

    fn find<'a>(signals: &'a [Signal], kind: SignalType, value: &str) -> Option<&'a Signal> {
        signals.iter().find(|s| s.kind == kind && s.value == value)
    }

    #[test]
    fn test_user_message_symbol_and_path() {
        let extractor = SignalExtractor::default();
        let signals = extractor.extract(&EvidenceInput::from_message("Fix handleClick in Button.tsx"));

        let symbol = find(&signals, SignalType::Symbol, "handleClick").expect("symbol");
        assert_eq!(symbol.confidence, 0.6);
        assert_eq!(symbol.source, SignalSource::UserMessage);

        let path = find(&signals, SignalType::Path, "Button.tsx").expect("path");
        assert_eq!(path.confidence, 0.8);
    }

    #[test]
    fn test_path_stems_are_not_symbols() {
        let extractor = SignalExtractor::default();
        let signals =
            extractor.extract(&EvidenceInput::from_message("look at src/token_store.rs please"));
        assert!(find(&signals, SignalType::Path, "src/token_store.rs").is_some());
        assert!(find(&signals, SignalType::Symbol, "token_store").is_none());
    }

    #[test]
    fn test_snake_and_pascal_symbols() {
        let extractor = SignalExtractor::default();
        let signals = extractor
            .extract(&EvidenceInput::from_message("refresh_token breaks the HttpClient retry"));
        assert!(find(&signals, SignalType::Symbol, "refresh_token").is_some());
        assert!(find(&signals, SignalType::Symbol, "HttpClient").is_some());
        assert!(find(&signals, SignalType::Symbol, "retry").is_none());
    }

    #[test]
    fn test_stack_frames_decay_with_depth() {
        let extractor = SignalExtractor::default();
        let input = EvidenceInput::default().with_error(
            ErrorInput::new("TypeError: x is not a function")
                .with_stack("at foo (src/a.ts:10:3)\n at bar (src/b.ts:20:1)"),
        );
        let signals = extractor.extract(&input);

        let frames: Vec<&Signal> =
            signals.iter().filter(|s| s.kind == SignalType::StackFrame).collect();
        assert_eq!(frames.len(), 2);

        let first = find(&signals, SignalType::StackFrame, "src/a.ts:10").expect("frame 0");
        assert_eq!(first.confidence, 1.0);
        assert_eq!(first.metadata.depth, Some(0));
        assert_eq!(first.metadata.function.as_deref(), Some("foo"));

        let second = find(&signals, SignalType::StackFrame, "src/b.ts:20").expect("frame 1");
        assert!((second.confidence - 0.9).abs() < 1e-9);
        assert_eq!(second.metadata.depth, Some(1));

        let token = find(&signals, SignalType::ErrorToken, "TypeError").expect("error token");
        assert_eq!(token.confidence, 0.7);
        assert!(find(&signals, SignalType::ErrorToken, "not").is_none());
        assert!(find(&signals, SignalType::ErrorToken, "function").is_none());

        let stack_path = find(&signals, SignalType::Path, "src/a.ts").expect("stack path");
        assert_eq!(stack_path.confidence, 0.85);
    }

    #[test]
    fn test_frame_confidence_floor() {
        let stack: String =
            (0..15).map(|i| format!("    at f{i} (src/m{i}.ts:{}:1)\n", i + 1)).collect();
        let options = ExtractorOptions { min_confidence: 0.0, ..ExtractorOptions::default() };
        let extractor = SignalExtractor::new(options);
        let input =
            EvidenceInput::default().with_error(ErrorInput::new("boom").with_stack(stack));
        let signals = extractor.extract(&input);

        let deepest = find(&signals, SignalType::StackFrame, "src/m14.ts:15").expect("deep frame");
        assert_eq!(deepest.confidence, 0.1);
        assert!(signals.iter().all(|s| s.confidence >= 0.1));
    }

    #[test]
    fn test_first_matching_dialect_wins() {
        let extractor = SignalExtractor::default();
        // Bracketed frames present: the trailing bare reference must be ignored.
        let input = EvidenceInput::default().with_error(
            ErrorInput::new("boom").with_stack("at run (lib/x.js:3:4)\nsee also other.py:9"),
        );
        let signals = extractor.extract(&input);
        let frames: Vec<&str> = signals
            .iter()
            .filter(|s| s.kind == SignalType::StackFrame)
            .map(|s| s.value.as_str())
            .collect();
        assert_eq!(frames, vec!["lib/x.js:3"]);
    }

    #[test]
    fn test_python_traceback_and_message_path() {
        let extractor = SignalExtractor::default();
        let input = EvidenceInput::default().with_error(
            ErrorInput::new("KeyError raised in app/db.py")
                .with_stack("File \"app/main.py\", line 12, in run\nFile \"app/db.py\", line 40, in connect")
                .with_code("E42"),
        );
        let signals = extractor.extract(&input);
        assert!(find(&signals, SignalType::StackFrame, "app/main.py:12").is_some());
        assert!(find(&signals, SignalType::ErrorToken, "E42").is_some());
        assert!(find(&signals, SignalType::ErrorToken, "KeyError").is_some());
        let message_path = find(&signals, SignalType::Path, "app/db.py").expect("path");
        assert_eq!(message_path.confidence, 0.9);
    }

    #[test]
    fn test_working_set_and_diff_paths() {
        let extractor = SignalExtractor::default();
        let input = EvidenceInput::default()
            .with_working_set(["src/lib.rs", "./src/main.rs"])
            .with_git_diff(GitDiff {
                files: vec![
                    DiffFile::new("src/lib.rs", ChangeType::Modified),
                    DiffFile::new("src/new.rs", ChangeType::Added),
                ],
            });
        let signals = extractor.extract(&input);

        let lib = find(&signals, SignalType::Path, "src/lib.rs").expect("lib");
        assert_eq!(lib.confidence, 1.0);
        assert_eq!(lib.metadata.change_type, Some(ChangeType::Modified));
        assert!(find(&signals, SignalType::Path, "src/main.rs").is_some());
        let added = find(&signals, SignalType::Path, "src/new.rs").expect("added");
        assert_eq!(added.source, SignalSource::GitDiff);
    }

    #[test]
    fn test_dedup_keeps_max_confidence() {
        let extractor = SignalExtractor::default();
        let input = EvidenceInput::from_message("check src/a.ts")
            .with_working_set(["src/a.ts"]);
        let signals = extractor.extract(&input);
        let matches: Vec<&Signal> = signals
            .iter()
            .filter(|s| s.kind == SignalType::Path && s.value == "src/a.ts")
            .collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 1.0);
        assert_eq!(matches[0].source, SignalSource::WorkingSet);
    }

    #[test]
    fn test_custom_patterns_and_min_confidence() {
        let options = ExtractorOptions {
            custom_patterns: vec![Regex::new(r"ticket-(\d+)").expect("regex")],
            ..ExtractorOptions::default()
        };
        let extractor = SignalExtractor::new(options);
        let signals = extractor.extract(&EvidenceInput::from_message("see ticket-123"));
        let custom = find(&signals, SignalType::Symbol, "123").expect("custom");
        assert_eq!(custom.confidence, 0.5);
        assert!(custom.metadata.pattern.is_some());

        let strict = SignalExtractor::new(ExtractorOptions {
            min_confidence: 0.65,
            custom_patterns: vec![Regex::new(r"ticket-(\d+)").expect("regex")],
            ..ExtractorOptions::default()
        });
        let signals = strict.extract(&EvidenceInput::from_message("handleClick ticket-123"));
        assert!(find(&signals, SignalType::Symbol, "123").is_none());
        assert!(find(&signals, SignalType::Symbol, "handleClick").is_none());
    }

    #[test]
    fn test_total_signal_cap() {
        let options = ExtractorOptions { max_signals_per_type: 2, ..ExtractorOptions::default() };
        let extractor = SignalExtractor::new(options);
        let paths: Vec<String> = (0..20).map(|i| format!("src/f{i}.rs")).collect();
        let signals = extractor.extract(&EvidenceInput::default().with_working_set(paths));
        assert_eq!(signals.len(), 8);
    }

    #[test]
    fn test_empty_and_garbage_input_yields_nothing_harmful() {
        let extractor = SignalExtractor::default();
        assert!(extractor.extract(&EvidenceInput::default()).is_empty());
        let input = EvidenceInput::default().with_error(ErrorInput::new(":::(((\n\n"));
        assert!(extractor.extract(&input).is_empty());
    }
}
