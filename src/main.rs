//! evidence-pack: assemble ranked, token-bounded code evidence for LLM prompts
//!
//! Thin command-line wrapper around the `evidence_pack` library.

use anyhow::Result;

mod cli;

fn main() -> Result<()> {
    cli::run()
}
