//! Feedback command implementation

use anyhow::Result;
use clap::Args;

use super::common::{print_json, ProjectArgs};
use evidence_pack::AdaptiveEvidenceSystem;

#[derive(Args)]
pub struct FeedbackArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Session id printed by `build`
    #[arg(value_name = "SESSION_ID")]
    pub session_id: String,

    /// The task succeeded
    #[arg(long, conflicts_with_all = ["failure", "abandoned"], required_unless_present_any = ["failure", "abandoned"])]
    pub success: bool,

    /// The task failed
    #[arg(long, conflicts_with = "abandoned")]
    pub failure: bool,

    /// The task was dropped without an outcome
    #[arg(long)]
    pub abandoned: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

pub fn run(args: FeedbackArgs) -> Result<()> {
    let config = args.project.load()?;
    let system = AdaptiveEvidenceSystem::new(&config)?;

    let outcome = if args.abandoned {
        system.abandon(&args.session_id)
    } else {
        system.feedback(&args.session_id, args.success)
    };
    if !outcome.recorded {
        anyhow::bail!("Unknown session: {}", args.session_id);
    }

    system.flush()?;
    print_json(&outcome, args.pretty)
}
