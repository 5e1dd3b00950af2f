//! Build command implementation

use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use super::common::{print_json, ProjectArgs};
use evidence_pack::services::Git2Service;
use evidence_pack::{AdaptiveBuildOptions, AdaptiveEvidenceSystem, ErrorInput, EvidenceInput, TaskIntent};

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// JSON input file ({userMessage, errors, workingSet, gitDiff}); '-' reads stdin
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Task description (replaces userMessage from --input)
    #[arg(short, long, value_name = "TEXT")]
    pub message: Option<String>,

    /// Error message to include (repeatable)
    #[arg(long = "error", value_name = "TEXT")]
    pub errors: Vec<String>,

    /// Stack trace attached to the last --error
    #[arg(long, value_name = "TEXT", requires = "errors")]
    pub stack: Option<String>,

    /// Working-set paths (repeatable or comma-separated)
    #[arg(short = 'w', long, value_name = "PATHS", value_delimiter = ',', num_args = 1..)]
    pub working_set: Vec<String>,

    /// Maximum tokens in the pack
    #[arg(short = 't', long, value_name = "TOKENS", env = "EVIDENCE_PACK_BUDGET")]
    pub budget: Option<usize>,

    /// Skip classification and use this intent
    #[arg(long, value_name = "INTENT")]
    pub intent: Option<TaskIntent>,

    /// Intent of the previous turn
    #[arg(long, value_name = "INTENT")]
    pub recent_intent: Option<TaskIntent>,

    /// Do not read uncommitted changes from git
    #[arg(long)]
    pub no_git: bool,

    /// Write the result here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

pub fn run(args: BuildArgs) -> Result<()> {
    let mut config = args.project.load()?;
    if let Some(budget) = args.budget {
        config.budget.token_budget = budget;
    }
    let root = config.providers.root.clone();

    let mut input = read_input(&args)?;
    let git = if args.no_git { None } else { Git2Service::discover(&root) };
    if let Some(git) = &git {
        if input.git_diff.is_none() {
            match git.changed_files() {
                Ok(diff) if !diff.files.is_empty() => input.git_diff = Some(diff),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "could not read git status"),
            }
        }
    }

    let system = AdaptiveEvidenceSystem::new(&config)?;
    if let Some(git) = git {
        debug!(root = %root.display(), "binding git service");
        system.system().set_git_service(Some(Arc::new(git)));
    }

    let options = AdaptiveBuildOptions {
        token_budget: None,
        force_intent: args.intent,
        recent_intent: args.recent_intent,
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(system.build(input, options));

    if let Err(e) = system.flush() {
        warn!(error = %e, "telemetry was not saved");
    }
    // Let fire-and-forget writes finish before the runtime is torn down.
    runtime.shutdown_timeout(std::time::Duration::from_secs(2));

    match &args.output {
        Some(path) => {
            let json = if args.pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{}", result.pack.summary.describe());
            eprintln!("Session: {}", result.session_id);
            Ok(())
        }
        None => print_json(&result, args.pretty),
    }
}

fn read_input(args: &BuildArgs) -> Result<EvidenceInput> {
    let mut input = match &args.input {
        Some(path) if path.as_os_str() == "-" => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text).context("Failed to read stdin")?;
            parse_input(&text, "stdin")?
        }
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read input file: {}", path.display()))?;
            parse_input(&text, &path.display().to_string())?
        }
        None => EvidenceInput::default(),
    };

    if let Some(message) = &args.message {
        input.user_message = Some(message.clone());
    }
    let mut errors: Vec<ErrorInput> = args.errors.iter().map(ErrorInput::new).collect();
    if let (Some(stack), Some(last)) = (&args.stack, errors.last_mut()) {
        last.stack = Some(stack.clone());
    }
    input.errors.extend(errors);
    input.working_set.extend(args.working_set.iter().cloned());

    if input == EvidenceInput::default() {
        anyhow::bail!("Nothing to build from: pass --message, --error, --working-set or --input");
    }
    Ok(input)
}

fn parse_input(text: &str, source: &str) -> Result<EvidenceInput> {
    serde_json::from_str(text).with_context(|| format!("Invalid input JSON from {source}"))
}
