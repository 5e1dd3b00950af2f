//! Stack-trace dialects.
//!
//! ORDER MATTERS: the extractor uses the first dialect that yields any frame,
//! so the most specific shapes come first and the bare `file:line` catch-all
//! comes last. New dialects are added here without touching the extractor.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// One parsed stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
    pub column: Option<u32>,
    pub function: Option<String>,
}

pub struct StackDialect {
    pub name: &'static str,
    pub pattern: Regex,
    pub parse: fn(&Captures<'_>) -> Option<StackFrame>,
}

impl StackDialect {
    pub fn frames(&self, text: &str) -> Vec<StackFrame> {
        self.pattern.captures_iter(text).filter_map(|caps| (self.parse)(&caps)).collect()
    }
}

fn named_frame(caps: &Captures<'_>) -> Option<StackFrame> {
    let file = caps.name("file")?.as_str().trim();
    if file.is_empty() {
        return None;
    }
    let line = caps.name("line")?.as_str().parse().ok()?;
    Some(StackFrame {
        file: file.to_string(),
        line,
        column: caps.name("col").and_then(|m| m.as_str().parse().ok()),
        function: caps
            .name("func")
            .map(|m| m.as_str().trim().to_string())
            .filter(|f| !f.is_empty() && f != "<module>" && f != "<anonymous>"),
    })
}

pub static DEFAULT_DIALECTS: Lazy<Vec<StackDialect>> = Lazy::new(|| {
    vec![
        // ── V8 / Node: "at fn (file:line:col)" or "at file:line:col" ────────────
        StackDialect {
            name: "bracketed",
            pattern: Regex::new(
                r"\bat\s+(?:(?P<func>[^\s()]+(?:\s\[as\s[^\]]+\])?)\s+\()?(?P<file>[^\s():]+(?:\.[A-Za-z0-9]+)):(?P<line>\d+):(?P<col>\d+)\)?",
            )
            .expect("valid regex"),
            parse: named_frame,
        },
        // ── Python: File "path", line N, in fn ───────────────────────────────────
        StackDialect {
            name: "python",
            pattern: Regex::new(
                r#"File "(?P<file>[^"]+)", line (?P<line>\d+)(?:, in (?P<func>\S+))?"#,
            )
            .expect("valid regex"),
            parse: named_frame,
        },
        // ── Bare file:line[:col] (rustc, Go, gcc, ...) ───────────────────────────
        StackDialect {
            name: "bare",
            pattern: Regex::new(
                r"(?P<file>[A-Za-z0-9_\-./\\]*[A-Za-z0-9_\-]\.[A-Za-z][A-Za-z0-9]{0,5}):(?P<line>\d+)(?::(?P<col>\d+))?",
            )
            .expect("valid regex"),
            parse: named_frame,
        },
    ]
});
