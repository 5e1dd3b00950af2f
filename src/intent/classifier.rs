//! Rule-based task intent classifier.
//!
//! Each intent has single-word triggers (worth 1) and phrase triggers (worth
//! 2). Words of four or more letters match as prefixes, so `refactor` also
//! catches `refactoring`; shorter ones must match exactly. The best scoring
//! intent wins, ties going to the earlier rule.

use crate::domain::{EvidenceInput, TaskIntent};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const BASE_CONFIDENCE: f64 = 0.3;
const CONFIDENCE_PER_POINT: f64 = 0.15;
const MAX_CONFIDENCE: f64 = 0.95;
const GENERAL_CONFIDENCE: f64 = 0.2;

const PHRASE_POINTS: f64 = 2.0;
const ERROR_BOOST: f64 = 2.0;
const DIFF_BOOST: f64 = 0.5;
const RECENT_BOOST: f64 = 1.0;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9']+").expect("valid regex"));

struct IntentRule {
    intent: TaskIntent,
    keywords: &'static [&'static str],
    phrases: &'static [&'static str],
}

static RULES: &[IntentRule] = &[
    IntentRule {
        intent: TaskIntent::Debug,
        keywords: &[
            "fix", "bug", "debug", "error", "crash", "fail", "broken", "exception", "issue",
            "traceback", "panic", "wrong", "regression",
        ],
        phrases: &["not working", "doesn't work", "stack trace", "why does", "throws an"],
    },
    IntentRule {
        intent: TaskIntent::Refactor,
        keywords: &[
            "refactor", "rename", "extract", "cleanup", "simplify", "restructure", "reorganize",
            "dedupe", "modularize", "decouple",
        ],
        phrases: &["clean up", "split into", "get rid of", "move to"],
    },
    IntentRule {
        intent: TaskIntent::Implement,
        keywords: &["implement", "add", "create", "build", "support", "feature", "introduce", "new"],
        phrases: &["add support", "new feature", "make it possible"],
    },
    IntentRule {
        intent: TaskIntent::Test,
        keywords: &["test", "coverage", "mock", "assert", "fixture", "pytest", "jest"],
        phrases: &["unit test", "write test", "test case", "integration test"],
    },
    IntentRule {
        intent: TaskIntent::Review,
        keywords: &["review", "audit", "inspect", "critique", "pr"],
        phrases: &["code review", "pull request", "look over", "what changed"],
    },
    IntentRule {
        intent: TaskIntent::Explain,
        keywords: &["explain", "understand", "how", "what", "describe", "clarify", "meaning"],
        phrases: &["how does", "what is", "walk me through", "what does"],
    },
];

/// Hints from the surrounding session that shift the scores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassificationContext {
    pub has_errors: bool,
    pub has_diff: bool,
    pub recent_intent: Option<TaskIntent>,
}

impl ClassificationContext {
    pub fn from_input(input: &EvidenceInput) -> Self {
        Self { has_errors: input.has_errors(), has_diff: input.has_diff(), recent_intent: None }
    }

    pub fn with_recent_intent(mut self, intent: TaskIntent) -> Self {
        self.recent_intent = Some(intent);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: TaskIntent,
    pub confidence: f64,
}

impl ClassificationResult {
    pub fn general() -> Self {
        Self { intent: TaskIntent::General, confidence: GENERAL_CONFIDENCE }
    }

    /// An intent chosen by the caller rather than inferred.
    pub fn forced(intent: TaskIntent) -> Self {
        Self { intent, confidence: 1.0 }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TaskIntentClassifier;

impl TaskIntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> ClassificationResult {
        self.classify_with_context(text, &ClassificationContext::default())
    }

    pub fn classify_with_context(
        &self,
        text: &str,
        context: &ClassificationContext,
    ) -> ClassificationResult {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = WORD_RE.find_iter(&lowered).map(|m| m.as_str()).collect();
        let joined = words.join(" ");

        let mut best: Option<(TaskIntent, f64)> = None;
        for rule in RULES {
            let mut score = keyword_points(&words, rule.keywords)
                + phrase_points(&joined, rule.phrases);
            if context.has_errors && rule.intent == TaskIntent::Debug {
                score += ERROR_BOOST;
            }
            if context.has_diff && rule.intent == TaskIntent::Review {
                score += DIFF_BOOST;
            }
            if context.recent_intent == Some(rule.intent) {
                score += RECENT_BOOST;
            }
            if score > 0.0 && best.map_or(true, |(_, top)| score > top) {
                best = Some((rule.intent, score));
            }
        }

        match best {
            Some((intent, score)) => ClassificationResult {
                intent,
                confidence: (BASE_CONFIDENCE + CONFIDENCE_PER_POINT * score).min(MAX_CONFIDENCE),
            },
            None => ClassificationResult::general(),
        }
    }
}

fn keyword_points(words: &[&str], keywords: &[&str]) -> f64 {
    words
        .iter()
        .filter(|word| {
            keywords.iter().any(|kw| {
                if kw.len() >= 4 {
                    word.starts_with(kw)
                } else {
                    *word == kw
                }
            })
        })
        .count() as f64
}

fn phrase_points(joined: &str, phrases: &[&str]) -> f64 {
    let padded = format!(" {joined} ");
    phrases.iter().filter(|phrase| padded.contains(&format!(" {phrase}"))).count() as f64
        * PHRASE_POINTS
}
