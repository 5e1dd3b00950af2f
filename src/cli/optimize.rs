//! Optimize command implementation

use anyhow::Result;
use clap::Args;

use super::common::{print_json, ProjectArgs};
use evidence_pack::AdaptiveEvidenceSystem;

#[derive(Args)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Override the minimum number of labelled sessions
    #[arg(long, value_name = "N")]
    pub min_samples: Option<usize>,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

/// Dry run: report what the optimizer would do to the live weights.
pub fn run(args: OptimizeArgs) -> Result<()> {
    let mut config = args.project.load()?;
    if let Some(min_samples) = args.min_samples {
        config.optimizer.min_samples = min_samples;
    }

    let system = AdaptiveEvidenceSystem::new(&config)?;
    let records = system.telemetry().labeled_since(0);
    let result = system.optimizer().optimize(&system.system().weights(), &records);
    print_json(&result, args.pretty)
}
