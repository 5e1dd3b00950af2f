//! Typed, confidence-scored hints extracted from raw input.

use super::input::ChangeType;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Symbol,
    Path,
    ErrorToken,
    StackFrame,
}

impl SignalType {
    pub const ALL: [SignalType; 4] =
        [SignalType::Symbol, SignalType::Path, SignalType::ErrorToken, SignalType::StackFrame];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Symbol => "symbol",
            SignalType::Path => "path",
            SignalType::ErrorToken => "error_token",
            SignalType::StackFrame => "stack_frame",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    UserMessage,
    ErrorOutput,
    WorkingSet,
    GitDiff,
}

/// Optional typed details attached to a signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Position in the stack trace, 0 being the frame closest to the failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_type: Option<ChangeType>,
    /// Source of the caller-supplied pattern that produced the match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl SignalMetadata {
    pub fn is_empty(&self) -> bool {
        *self == SignalMetadata::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(rename = "type")]
    pub kind: SignalType,
    pub value: String,
    pub source: SignalSource,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "SignalMetadata::is_empty")]
    pub metadata: SignalMetadata,
}

impl Signal {
    pub fn new(
        kind: SignalType,
        value: impl Into<String>,
        source: SignalSource,
        confidence: f64,
    ) -> Self {
        Self {
            kind,
            value: value.into(),
            source,
            confidence: confidence.clamp(0.0, 1.0),
            metadata: SignalMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: SignalMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Deduplication key: `(type, value)`.
    pub fn key(&self) -> (SignalType, &str) {
        (self.kind, self.value.as_str())
    }

    /// File a path or stack-frame signal points at.
    pub fn file(&self) -> Option<&str> {
        match self.kind {
            SignalType::Path => Some(self.value.as_str()),
            SignalType::StackFrame => self.metadata.file.as_deref(),
            _ => None,
        }
    }
}
