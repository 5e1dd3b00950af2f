//! Signal extraction from free text, errors, working set and diffs

mod dialects;
mod extractor;

pub use dialects::{StackDialect, StackFrame, DEFAULT_DIALECTS};
pub use extractor::{ExtractorOptions, SignalExtractor};
