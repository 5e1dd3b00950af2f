//! Stats command implementation

use anyhow::Result;
use clap::Args;

use super::common::{print_json, ProjectArgs};
use evidence_pack::telemetry::EvidenceTelemetryService;

#[derive(Args)]
pub struct StatsArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: StatsArgs) -> Result<()> {
    let config = args.project.load()?;
    let telemetry = EvidenceTelemetryService::new(&config.telemetry)?;
    let stats = telemetry.stats();

    if args.json {
        return print_json(&stats, true);
    }

    if let Some(path) = telemetry.path() {
        println!("Telemetry: {}", path.display());
    }
    println!("Sessions: {}", stats.total_records);
    println!(
        "Outcomes: {} success, {} failure, {} abandoned, {} unlabeled",
        stats.successes, stats.failures, stats.abandoned, stats.unlabeled
    );
    match stats.success_rate {
        Some(rate) => println!("Success rate: {:.1}%", rate * 100.0),
        None => println!("Success rate: n/a"),
    }
    if stats.total_records == 0 {
        return Ok(());
    }

    println!("Averages per build:");
    println!("  Duration: {:.1} ms", stats.avg_duration_ms);
    println!("  Evidence before budget: {:.1}", stats.avg_evidence_before_budget);
    println!("  Evidence after budget: {:.1}", stats.avg_evidence_after_budget);
    println!("  Tokens saved: {:.0}", stats.avg_tokens_saved);
    if !stats.providers.is_empty() {
        println!("Providers:");
        for (provider, p) in &stats.providers {
            println!(
                "  {}: {:.1} ms avg, {:.0}% failed, {:.0}% cached ({} calls)",
                provider,
                p.avg_latency_ms,
                p.failure_rate * 100.0,
                p.cache_hit_rate * 100.0,
                p.calls
            );
        }
    }
    Ok(())
}
