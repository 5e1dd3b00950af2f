//! Arguments and setup shared by the subcommands.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};

use evidence_pack::config::load_config;
use evidence_pack::EvidenceConfig;

/// Telemetry file used when neither the config nor `--telemetry` names one.
pub const DEFAULT_TELEMETRY_PATH: &str = ".evidence-pack/telemetry.json";

#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project root the providers search
    #[arg(long, value_name = "PATH", default_value = ".", env = "EVIDENCE_PACK_ROOT")]
    pub root: PathBuf,

    /// Path to config file (evidence-pack.toml or evidence-pack.yml)
    #[arg(short = 'c', long, value_name = "FILE", env = "EVIDENCE_PACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Telemetry JSON file [default: <root>/.evidence-pack/telemetry.json]
    #[arg(long, value_name = "FILE", env = "EVIDENCE_PACK_TELEMETRY")]
    pub telemetry: Option<PathBuf>,
}

impl ProjectArgs {
    /// Load and merge the configuration: file values first, flags on top.
    pub fn load(&self) -> Result<EvidenceConfig> {
        let root = self
            .root
            .canonicalize()
            .with_context(|| format!("Project root not found: {}", self.root.display()))?;
        if !root.is_dir() {
            anyhow::bail!("Path is not a directory: {}", root.display());
        }

        let mut config = load_config(&root, self.config.as_deref())?;
        config.telemetry.path = Some(telemetry_path(&root, self.telemetry.as_deref(), &config));
        config.providers.root = root;
        Ok(config)
    }
}

fn telemetry_path(root: &Path, flag: Option<&Path>, config: &EvidenceConfig) -> PathBuf {
    let chosen = flag
        .map(Path::to_path_buf)
        .or_else(|| config.telemetry.path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TELEMETRY_PATH));
    if chosen.is_absolute() {
        chosen
    } else {
        root.join(chosen)
    }
}

pub fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text =
        if pretty { serde_json::to_string_pretty(value)? } else { serde_json::to_string(value)? };
    println!("{text}");
    Ok(())
}
