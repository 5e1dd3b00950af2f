//! Classify command implementation

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::common::print_json;
use evidence_pack::intent::{IntentStrategy, WeightModifier};
use evidence_pack::{
    ClassificationContext, ClassificationResult, IntentAwareProviderStrategy, RerankerWeights,
    TaskIntent, TaskIntentClassifier,
};

#[derive(Args)]
pub struct ClassifyArgs {
    /// Task description
    #[arg(value_name = "TEXT")]
    pub text: String,

    /// The session has recent errors
    #[arg(long)]
    pub errors: bool,

    /// The session has uncommitted changes
    #[arg(long)]
    pub diff: bool,

    /// Intent of the previous turn
    #[arg(long, value_name = "INTENT")]
    pub recent_intent: Option<TaskIntent>,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyOutput {
    #[serde(flatten)]
    result: ClassificationResult,
    description: String,
    modifiers: Vec<WeightModifier>,
    weights: RerankerWeights,
}

pub fn run(args: ClassifyArgs) -> Result<()> {
    let context = ClassificationContext {
        has_errors: args.errors,
        has_diff: args.diff,
        recent_intent: args.recent_intent,
    };
    let result = TaskIntentClassifier::new().classify_with_context(&args.text, &context);
    let strategy: IntentStrategy = IntentAwareProviderStrategy::new().get_strategy(result.intent);

    let output = ClassifyOutput {
        weights: strategy.apply(RerankerWeights::default()),
        description: strategy.description,
        modifiers: strategy.modifiers,
        result,
    };
    print_json(&output, args.pretty)
}
