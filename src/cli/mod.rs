//! Command-line interface for evidence-pack
//!
//! Provides `build`, `feedback`, `stats`, `optimize` and `classify`
//! subcommands over a project root and its persisted telemetry.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod build;
mod classify;
mod common;
mod feedback;
mod optimize;
mod stats;

/// Assemble ranked, token-bounded code evidence for LLM prompts
#[derive(Parser)]
#[command(name = "evidence-pack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an evidence pack for a task and print it as JSON
    Build(Box<build::BuildArgs>),

    /// Report the outcome of a previously built session
    Feedback(feedback::FeedbackArgs),

    /// Summarize recorded telemetry
    Stats(stats::StatsArgs),

    /// Run the weight optimizer over labelled telemetry (dry run)
    Optimize(optimize::OptimizeArgs),

    /// Classify the intent of a task description
    Classify(classify::ClassifyArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG in the environment always takes precedence; --verbose falls back to DEBUG.
    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    match cli.command {
        Commands::Build(args) => build::run(*args),
        Commands::Feedback(args) => feedback::run(args),
        Commands::Stats(args) => stats::run(args),
        Commands::Optimize(args) => optimize::run(args),
        Commands::Classify(args) => classify::run(args),
    }
}
