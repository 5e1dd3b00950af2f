//! Heuristics for files the search provider should not read.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Header markers of generated sources.
static GENERATED_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(auto-generated|@generated|do not edit|machine generated)")
        .expect("valid regex")
});

const MINIFIED_INDICATORS: &[&str] = &[".min.", ".bundle.", ".packed."];

const VENDOR_DIRS: &[&str] = &[
    "vendor/",
    "vendors/",
    "third_party/",
    "third-party/",
    "node_modules/",
    "target/",
    "dist/",
    ".git/",
];

/// Whether a file is a dependency lock file.
pub fn is_lock_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_lowercase();
    matches!(
        name.as_str(),
        "package-lock.json"
            | "yarn.lock"
            | "pnpm-lock.yaml"
            | "poetry.lock"
            | "pipfile.lock"
            | "cargo.lock"
            | "gemfile.lock"
            | "composer.lock"
            | "go.sum"
    )
}

/// Whether a path sits inside vendored or build-output directories.
pub fn is_vendored(relative_path: &str) -> bool {
    let normalized = format!("/{}", relative_path.replace('\\', "/").to_lowercase());
    VENDOR_DIRS.iter().any(|dir| normalized.contains(&format!("/{dir}")))
}

/// Whether the file name says it is minified.
pub fn is_minified_name(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_lowercase();
    MINIFIED_INDICATORS.iter().any(|indicator| name.contains(indicator))
}

/// Whether a content sample looks generated or minified.
pub fn looks_generated(content_sample: &str) -> bool {
    let head: String = content_sample.chars().take(2000).collect();
    if GENERATED_MARKERS.is_match(&head) {
        return true;
    }
    content_sample.lines().next().is_some_and(|line| line.len() > 1000)
}

/// Combined name-based filter applied before any file is opened.
pub fn should_skip_for_search(path: &Path, relative_path: &str) -> bool {
    is_lock_file(path) || is_vendored(relative_path) || is_minified_name(path)
}
