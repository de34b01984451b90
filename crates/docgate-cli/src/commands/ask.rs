//! Ask command: the composition root for one request

use crate::app::{AskArgs, OutputFormat};
use crate::output::{print_answer, FormatOptions};
use anyhow::Result;
use docgate_core::{
    AnnIndex, AskRequest, AuditEmitter, AuditSink, AuditSinkKind, Collaborators, Config,
    HttpCrossEncoder, HttpEmbedder, HttpGenerator, IndexKind, LLMClient, NullAuditSink,
    Orchestrator, SqliteAuditSink, SqliteIndex, TracingAuditSink, VLLMClient, VectorIndex,
};
use std::sync::Arc;

pub async fn run(args: AskArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let query = args.query.join(" ");
    let resolver = super::load_resolver(config)?;

    let client: Arc<dyn LLMClient> = Arc::new(VLLMClient::new(config.llm_service.clone())?);
    let collaborators = Collaborators {
        embedder: Arc::new(HttpEmbedder::new(client.clone())),
        index: build_index(config)?,
        cross_encoder: Arc::new(HttpCrossEncoder::new(
            client.clone(),
            config.llm_service.rerank_scale,
        )),
        generator: Arc::new(HttpGenerator::new(client)),
    };

    let (audit, worker) =
        AuditEmitter::spawn_with_capacity(build_audit_sink(config)?, config.audit.queue_capacity);
    let orchestrator = Orchestrator::new(resolver, collaborators, audit, config)
        .with_normalizer(super::load_normalizer(config)?);

    let request = AskRequest::new(args.role, query)
        .with_username(args.user)
        .with_top_k(args.top_k);
    let envelope = orchestrator.ask(request).await;

    // Release the last emitter so the worker drains and exits
    drop(orchestrator);
    worker.join().await;

    let options = FormatOptions { full: args.full };
    print_answer(&envelope, format, &options)
}

fn build_index(config: &Config) -> Result<Arc<dyn VectorIndex>> {
    let db = super::open_database(config)?;
    let index: Arc<dyn VectorIndex> = match config.index.kind {
        IndexKind::Sqlite => Arc::new(SqliteIndex::new(db)),
        IndexKind::Hnsw => {
            let entries = db.all_embedded_chunks()?;
            tracing::info!("Loading {} embeddings into memory", entries.len());
            Arc::new(AnnIndex::build(entries))
        }
    };
    Ok(index)
}

fn build_audit_sink(config: &Config) -> Result<Arc<dyn AuditSink>> {
    let sink: Arc<dyn AuditSink> = match config.audit.sink {
        AuditSinkKind::Sqlite => {
            let path = config
                .audit
                .path
                .clone()
                .unwrap_or_else(|| config.index.database_path());
            Arc::new(SqliteAuditSink::open(path)?)
        }
        AuditSinkKind::Tracing => Arc::new(TracingAuditSink),
        AuditSinkKind::None => Arc::new(NullAuditSink),
    };
    Ok(sink)
}
