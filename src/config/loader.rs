//! Config file loading

use super::EvidenceConfig;
use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

const SECTION: &str = "evidence-pack";

const CANDIDATES: [&str; 5] = [
    "evidence-pack.toml",
    ".evidence-pack.toml",
    "evidence-pack.yml",
    "evidence-pack.yaml",
    ".evidence-pack.yml",
];

/// Load configuration for a project root.
///
/// An explicit `config_path` must exist and parse. Auto-discovered files that
/// fail to parse are reported with a warning and defaults are used instead.
pub fn load_config(root: &Path, config_path: Option<&Path>) -> Result<EvidenceConfig, ConfigError> {
    let explicit = config_path.is_some();
    let discovered = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config(root),
    };

    let Some(config_file) = discovered else {
        return Ok(EvidenceConfig::default());
    };

    match parse_config_file(&config_file) {
        Ok(config) => {
            tracing::debug!(path = %config_file.display(), "loaded config");
            Ok(config)
        }
        Err(e) if explicit => Err(e),
        Err(e) => {
            tracing::warn!(
                "Failed to parse auto-discovered config {}: {}",
                config_file.display(),
                e
            );
            Ok(EvidenceConfig::default())
        }
    }
}

fn parse_config_file(config_file: &Path) -> Result<EvidenceConfig, ConfigError> {
    let content = fs::read_to_string(config_file)
        .map_err(|source| ConfigError::Read { path: config_file.to_path_buf(), source })?;
    let ext = config_file.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();

    match ext.as_str() {
        "toml" => parse_toml_config(&content, config_file),
        "yaml" | "yml" => parse_yaml_config(&content, config_file),
        other => Err(ConfigError::UnsupportedExtension {
            extension: other.to_string(),
            path: config_file.to_path_buf(),
        }),
    }
}

/// Parse TOML config, supporting a nested `[evidence-pack]` section.
fn parse_toml_config(content: &str, config_file: &Path) -> Result<EvidenceConfig, ConfigError> {
    let parse_err =
        |message: String| ConfigError::Parse { path: config_file.to_path_buf(), message };

    let raw: toml::Value = toml::from_str(content).map_err(|e| parse_err(e.to_string()))?;
    let value = raw.get(SECTION).cloned().unwrap_or(raw);
    value.try_into().map_err(|e: toml::de::Error| parse_err(e.to_string()))
}

/// Parse YAML config, supporting a nested `evidence-pack:` mapping.
fn parse_yaml_config(content: &str, config_file: &Path) -> Result<EvidenceConfig, ConfigError> {
    let parse_err =
        |message: String| ConfigError::Parse { path: config_file.to_path_buf(), message };

    let raw: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))?;
    let value = raw.get(SECTION).cloned().unwrap_or(raw);
    serde_yaml::from_value(value).map_err(|e| parse_err(e.to_string()))
}

fn discover_config(root: &Path) -> Option<PathBuf> {
    CANDIDATES.iter().map(|candidate| root.join(candidate)).find(|path| path.exists())
}
