//! Closed-loop weight tuning from labelled telemetry

pub mod optimizer;

pub use optimizer::{OptimizationResult, OptimizerConfig, OutcomeEntry, WeightOptimizer};
