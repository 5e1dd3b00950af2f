//! Task-intent classification and the weight strategies keyed on it

pub mod classifier;
pub mod strategy;

pub use classifier::{ClassificationContext, ClassificationResult, TaskIntentClassifier};
pub use strategy::{IntentAwareProviderStrategy, IntentStrategy, WeightModifier};
