//! Import command

use crate::app::{ImportArgs, OutputFormat};
use anyhow::{Context, Result};
use docgate_core::{import_jsonl, Config, Embedder, HttpEmbedder};
use std::fs::File;
use std::io::BufReader;

pub async fn run(args: ImportArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let file = File::open(&args.file)
        .with_context(|| format!("cannot open {}", args.file.display()))?;
    let db = super::open_database(config)?;

    let embedder = if args.no_embed {
        None
    } else {
        Some(HttpEmbedder::from_config(config.llm_service.clone())?)
    };

    let stats = import_jsonl(
        &db,
        BufReader::new(file),
        embedder.as_ref().map(|e| e as &dyn Embedder),
    )
    .await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Cli => {
            println!("Imported:           {}", stats.imported);
            println!("  Embedded now:     {}", stats.embedded);
            println!("Skipped:            {}", stats.skipped);
            if stats.malformed_metadata > 0 {
                println!(
                    "Malformed metadata: {} (stored, never served)",
                    stats.malformed_metadata
                );
            }
        }
    }
    Ok(())
}
