//! Audit command

use crate::app::{AuditArgs, OutputFormat};
use crate::output::terminal;
use anyhow::Result;
use docgate_core::{Config, Database};

pub fn run(args: AuditArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let path = config
        .audit
        .path
        .clone()
        .unwrap_or_else(|| config.index.database_path());
    let db = Database::open_initialized(&path)?;
    let events = db.list_audit_events(args.limit)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&events)?),
        OutputFormat::Cli => {
            if events.is_empty() {
                println!("No audit events");
            }
            for event in &events {
                println!("{}", terminal::format_audit_event(event));
            }
        }
    }
    Ok(())
}
