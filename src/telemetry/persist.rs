//! JSON persistence for telemetry records and learning state.
//!
//! Every helper returns errors; callers decide whether to log and continue.

use super::service::TelemetryRecord;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Load records from `path`. A missing or blank file is an empty history.
pub fn load_records(path: &Path) -> Result<Vec<TelemetryRecord>> {
    Ok(load_json(path)?.unwrap_or_default())
}

/// Write records as a JSON array.
pub fn save_records(path: &Path, records: &[TelemetryRecord]) -> Result<()> {
    save_json(path, records)
}

/// Load a JSON document. `None` for a missing or blank file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&text)
        .map(Some)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write `value` as pretty JSON. The file is replaced atomically through a
/// sibling temp file.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("telemetry.json");
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));
    let json = serde_json::to_string_pretty(value)?;

    fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
    }
    Ok(())
}
