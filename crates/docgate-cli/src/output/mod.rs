//! Output formatters

pub mod json;
pub mod terminal;

use crate::app::OutputFormat;
use anyhow::Result;
use docgate_core::AnswerEnvelope;

/// Format options
pub struct FormatOptions {
    /// Show source previews
    pub full: bool,
}

/// Print an answer envelope to stdout
pub fn print_answer(
    envelope: &AnswerEnvelope,
    format: OutputFormat,
    options: &FormatOptions,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print!("{}", json::format_answer(envelope)?);
            Ok(())
        }
        OutputFormat::Cli => Ok(terminal::print_answer(envelope, options)?),
    }
}
