//! Raw input handed over by the calling session layer.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub working_set: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_diff: Option<GitDiff>,
}

impl EvidenceInput {
    pub fn from_message(message: impl Into<String>) -> Self {
        Self { user_message: Some(message.into()), ..Self::default() }
    }

    pub fn with_error(mut self, error: ErrorInput) -> Self {
        self.errors.push(error);
        self
    }

    pub fn with_working_set<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.working_set.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_git_diff(mut self, diff: GitDiff) -> Self {
        self.git_diff = Some(diff);
        self
    }

    pub fn message(&self) -> &str {
        self.user_message.as_deref().unwrap_or("")
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_diff(&self) -> bool {
        self.git_diff.as_ref().is_some_and(|d| !d.files.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorInput {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorInput {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), stack: None, code: None }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitDiff {
    #[serde(default)]
    pub files: Vec<DiffFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffFile {
    pub path: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
}

impl DiffFile {
    pub fn new(path: impl Into<String>, change_type: ChangeType) -> Self {
        Self { path: path.into(), change_type }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
