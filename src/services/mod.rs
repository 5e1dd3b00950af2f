//! Narrow interfaces to external collaborators (LSP, git)
//!
//! The core never depends on concrete services. Both are bound at runtime
//! through a [`ServiceSlot`] and either may be absent, in which case the
//! providers that need them return no evidence.

pub mod git;

pub use git::Git2Service;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// A symbol location reported by a language server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolLocation {
    pub path: String,
    /// 1-indexed line.
    pub line: usize,
    pub end_line: Option<usize>,
    /// Source text around the location, when the server provides it.
    pub snippet: Option<String>,
}

/// Query surface the LSP provider needs from a language-server hub.
#[async_trait]
pub trait LspHub: Send + Sync {
    async fn definitions(&self, symbol: &str) -> Result<Vec<SymbolLocation>>;
    async fn references(&self, symbol: &str, limit: usize) -> Result<Vec<SymbolLocation>>;
}

/// One unified-diff hunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    pub path: String,
    pub header: String,
    pub new_start: usize,
    pub new_lines: usize,
    pub content: String,
}

/// Query surface the diff provider needs from a git snapshot service.
pub trait GitService: Send + Sync {
    /// Uncommitted hunks touching `path` (staged and unstaged).
    fn diff_hunks(&self, path: &str) -> Result<Vec<DiffHunk>>;
}

/// Late-bound, optional handle to a shared service.
pub struct ServiceSlot<T: ?Sized> {
    inner: Arc<RwLock<Option<Arc<T>>>>,
}

impl<T: ?Sized> ServiceSlot<T> {
    pub fn empty() -> Self {
        Self { inner: Arc::new(RwLock::new(None)) }
    }

    pub fn set(&self, service: Option<Arc<T>>) {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = service;
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn is_bound(&self) -> bool {
        self.get().is_some()
    }
}

impl<T: ?Sized> Clone for ServiceSlot<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: ?Sized> Default for ServiceSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}
