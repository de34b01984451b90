//! Status command

use crate::app::OutputFormat;
use anyhow::Result;
use docgate_core::Config;

pub fn run(config: &Config, format: OutputFormat) -> Result<()> {
    let db = super::open_database(config)?;
    let stats = db.get_stats()?;
    let model = db.embedding_model()?;
    let llm = &config.llm_service;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "database": config.index.database_path(),
                "index": config.index.kind,
                "stats": stats,
                "embedding_model": model,
                "services": {
                    "generator": { "url": llm.url, "model": llm.model },
                    "embedder": { "url": llm.embeddings_url(), "model": llm.embedding_model },
                    "reranker": { "url": llm.reranker_url(), "model": llm.rerank_model },
                },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Cli => {
            println!("Database:        {}", config.index.database_path().display());
            println!("Chunks:          {}", stats.chunk_count);
            println!("  Embedded:      {}", stats.embedded_count);
            if let Some(model) = model {
                println!("  Model:         {}", model);
            }
            println!("Audit events:    {}", stats.audit_event_count);
            println!();
            println!("Partitions:");
            for partition in &stats.partitions {
                println!(
                    "  {:<28} {}",
                    format!("{}/{}", partition.department, partition.classification),
                    partition.chunks
                );
            }
            println!();
            println!("Services:");
            println!("  Generator:     {} ({})", llm.url, llm.model);
            println!("  Embedder:      {} ({})", llm.embeddings_url(), llm.embedding_model);
            println!("  Reranker:      {} ({})", llm.reranker_url(), llm.rerank_model);
        }
    }
    Ok(())
}
