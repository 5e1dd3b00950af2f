//! Path normalization

pub fn normalize_path(path: &str) -> String {
    // Convert backslashes to forward slashes and strip a leading "./"
    let normalized = path.trim().replace('\\', "/");
    normalized.strip_prefix("./").map(str::to_string).unwrap_or(normalized)
}

/// Whether a (possibly partial) path hint refers to `candidate`.
///
/// `Button.tsx` matches `src/components/Button.tsx`; matching is done on whole
/// path segments so `ton.tsx` does not.
pub fn paths_match(hint: &str, candidate: &str) -> bool {
    let hint = normalize_path(hint);
    let candidate = normalize_path(candidate);
    if hint.is_empty() {
        return false;
    }
    if hint == candidate {
        return true;
    }
    candidate.ends_with(&format!("/{hint}")) || hint.ends_with(&format!("/{candidate}"))
}
