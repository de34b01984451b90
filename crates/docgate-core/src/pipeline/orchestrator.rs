//! The `Ask` state machine

use super::{AskRequest, PipelineError, PipelineState};
use crate::access::AccessFilter;
use crate::audit::{AuditAction, AuditContext, AuditDecision, AuditEmitter};
use crate::confidence::ConfidenceScorer;
use crate::config::{Config, PipelineConfig};
use crate::generation::GenerationService;
use crate::llm::{CrossEncoder, Embedder, Generator};
use crate::prompt::PromptBuilder;
use crate::query::QueryNormalizer;
use crate::rbac::RoleResolver;
use crate::rerank::ReRanker;
use crate::response::{AnswerEnvelope, AnswerStatus, ResponseFormatter};
use crate::retrieval::{VectorIndex, VectorRetriever};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// External services the pipeline consumes
pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub cross_encoder: Arc<dyn CrossEncoder>,
    pub generator: Arc<dyn Generator>,
}

/// Composition of every pipeline component; shared read-only across requests
pub struct Orchestrator {
    resolver: RoleResolver,
    normalizer: QueryNormalizer,
    retriever: VectorRetriever,
    access: AccessFilter,
    reranker: ReRanker,
    prompts: PromptBuilder,
    generation: GenerationService,
    formatter: ResponseFormatter,
    scorer: ConfidenceScorer,
    audit: AuditEmitter,
    pipeline: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        resolver: RoleResolver,
        collaborators: Collaborators,
        audit: AuditEmitter,
        config: &Config,
    ) -> Self {
        let pipeline = &config.pipeline;
        let llm = &config.llm_service;

        let retriever = VectorRetriever::new(collaborators.embedder, collaborators.index)
            .with_over_fetch_factor(pipeline.over_fetch_factor)
            .with_timeout(Duration::from_secs(pipeline.retrieval_timeout_secs));
        let reranker = ReRanker::new(collaborators.cross_encoder)
            .with_timeout(Duration::from_secs(llm.rerank_timeout_secs))
            .with_dedup_threshold(pipeline.dedup_threshold);
        let generation = GenerationService::new(collaborators.generator)
            .with_timeout(Duration::from_secs(llm.generation_timeout_secs))
            .with_max_tokens(llm.max_tokens);

        let normalizer = QueryNormalizer::builtin()
            .unwrap_or_else(|e| {
                tracing::error!("Built-in query vocabulary is invalid: {}", e);
                QueryNormalizer::default()
            })
            .with_max_variants(config.query.max_variants);

        Self {
            resolver,
            normalizer,
            retriever,
            access: AccessFilter::new(),
            reranker,
            prompts: PromptBuilder::new(),
            generation,
            formatter: ResponseFormatter::new(pipeline.preview_chars),
            scorer: ConfidenceScorer::new(),
            audit,
            pipeline: pipeline.clone(),
        }
    }

    /// Replace the built-in query normalizer
    pub fn with_normalizer(mut self, normalizer: QueryNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn resolver(&self) -> &RoleResolver {
        &self.resolver
    }

    pub fn audit(&self) -> &AuditEmitter {
        &self.audit
    }

    /// Answer one request; never fails and never panics outward
    pub async fn ask(&self, request: AskRequest) -> AnswerEnvelope {
        let started = Instant::now();
        let ctx = AuditContext {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            username: request.username.clone(),
            role: request.role.clone(),
            query: request.query.clone(),
        };

        let outcome = AssertUnwindSafe(self.run(&request, &ctx))
            .catch_unwind()
            .await;

        let envelope = match outcome {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(err)) => self.early_exit(&ctx, err),
            Err(_) => self.early_exit(
                &ctx,
                PipelineError::Internal("pipeline task panicked".to_string()),
            ),
        };

        tracing::info!(
            correlation_id = %ctx.correlation_id,
            role = %request.role,
            status = envelope.status.as_str(),
            sources = envelope.sources.len(),
            confidence = envelope.confidence.overall,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ask finished"
        );
        envelope
    }

    fn early_exit(&self, ctx: &AuditContext, err: PipelineError) -> AnswerEnvelope {
        let state = err.state();
        let status = err.status();

        let decision = match status {
            AnswerStatus::Error => {
                tracing::error!(correlation_id = %ctx.correlation_id, "{}", err);
                AuditDecision::Error
            }
            AnswerStatus::RetrievalFailed | AnswerStatus::GenerationFailed => {
                tracing::warn!(correlation_id = %ctx.correlation_id, "{}", err);
                AuditDecision::Failed
            }
            _ => {
                tracing::debug!(correlation_id = %ctx.correlation_id, %state, "Early exit");
                AuditDecision::Empty
            }
        };
        self.audit.emit(
            ctx.event(AuditAction::Response, decision)
                .with_detail(format!("{}: {}", state, err)),
        );

        let envelope = AnswerEnvelope::message(status, err.user_message());
        if status == AnswerStatus::Error {
            envelope.with_correlation_id(ctx.correlation_id.clone())
        } else {
            envelope
        }
    }

    async fn run(
        &self,
        request: &AskRequest,
        ctx: &AuditContext,
    ) -> Result<AnswerEnvelope, PipelineError> {
        let mut state = PipelineState::Start;

        let permissions = self.resolver.resolve(&request.role);
        let canonical_role = self
            .resolver
            .table()
            .canonical(&request.role)
            .unwrap_or_default()
            .to_string();

        if !permissions.can_search() {
            self.audit.emit(
                ctx.event(AuditAction::RoleResolution, AuditDecision::Denied)
                    .with_detail("role has no searchable partitions"),
            );
            return Err(PipelineError::NoAuthorizedContent);
        }
        self.audit.emit(
            ctx.event(AuditAction::RoleResolution, AuditDecision::Granted).with_detail(format!(
                "{} partitions",
                permissions.accessible_partitions.len()
            )),
        );

        let query = request.query.trim();
        let normalized = self.normalizer.normalize(query);
        if normalized.is_empty() {
            return Err(PipelineError::BelowRelevanceThreshold);
        }
        tracing::debug!(
            correlation_id = %ctx.correlation_id,
            normalized = %normalized.text,
            variants = normalized.variants.len(),
            "Normalized query"
        );

        let top_k = self.pipeline.effective_top_k(request.top_k);
        let pool = top_k.saturating_mul(self.pipeline.candidate_pool_factor);

        let retrieval = self
            .retriever
            .retrieve_for_variants(&normalized.variants, &permissions.accessible_partitions, pool)
            .await;
        if retrieval.is_failed() {
            self.audit.emit(
                ctx.event(AuditAction::Retrieval, AuditDecision::Failed)
                    .with_detail("retrieval unavailable"),
            );
            return Err(PipelineError::RetrievalUnavailable(
                retrieval.failure.unwrap_or_default(),
            ));
        }
        let retrieved_ids: Vec<String> =
            retrieval.candidates.iter().map(|c| c.chunk.id.clone()).collect();
        let decision = if retrieved_ids.is_empty() {
            AuditDecision::Empty
        } else {
            AuditDecision::Granted
        };
        self.audit
            .emit(ctx.event(AuditAction::Retrieval, decision).with_chunks(retrieved_ids));
        state = advance(ctx, state, PipelineState::Retrieved);

        let filtered = self
            .access
            .filter(retrieval.candidates, &permissions, &canonical_role);
        for (chunk_id, reason) in &filtered.report.malformed {
            let err = PipelineError::MalformedMetadata {
                chunk_id: chunk_id.clone(),
                reason: reason.clone(),
            };
            tracing::warn!(correlation_id = %ctx.correlation_id, "{}", err);
        }
        for event in filtered.report.audit_events(ctx) {
            self.audit.emit(event);
        }
        if filtered.candidates.is_empty() {
            return Err(PipelineError::NoAuthorizedContent);
        }
        state = advance(ctx, state, PipelineState::Filtered);

        let reranked = self
            .reranker
            .rerank(query, filtered.candidates, top_k, self.pipeline.relevance_floor)
            .await;
        let decision = if reranked.degraded {
            AuditDecision::Degraded
        } else if reranked.candidates.is_empty() {
            AuditDecision::Empty
        } else {
            AuditDecision::Completed
        };
        self.audit.emit(
            ctx.event(AuditAction::Rerank, decision)
                .with_chunks(reranked.candidates.iter().map(|c| c.chunk.id.clone())),
        );
        if reranked.candidates.is_empty() {
            return Err(PipelineError::BelowRelevanceThreshold);
        }
        state = advance(ctx, state, PipelineState::Reranked);

        let prompt = self.prompts.build(
            query,
            &reranked.candidates,
            &canonical_role,
            &permissions.accessible_partitions,
        );

        let answer = match self.generation.generate(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                self.audit.emit(
                    ctx.event(AuditAction::Generation, AuditDecision::Failed)
                        .with_detail(self.generation.model_name().to_string()),
                );
                return Err(PipelineError::GenerationUnavailable(e.to_string()));
            }
        };
        self.audit.emit(
            ctx.event(AuditAction::Generation, AuditDecision::Completed)
                .with_chunks(reranked.candidates.iter().map(|c| c.chunk.id.clone())),
        );
        state = advance(ctx, state, PipelineState::Generated);

        let formatted = self.formatter.format(&answer, &reranked.candidates);
        state = advance(ctx, state, PipelineState::Formatted);

        let confidence = self.scorer.score(&answer, &reranked.candidates, query);
        let envelope = formatted.into_envelope(confidence, reranked.degraded);

        self.audit.emit(
            ctx.event(AuditAction::Response, AuditDecision::Completed)
                .with_chunks(envelope.sources.iter().map(|s| s.id.clone())),
        );
        advance(ctx, state, PipelineState::Done);

        Ok(envelope)
    }
}

fn advance(ctx: &AuditContext, from: PipelineState, to: PipelineState) -> PipelineState {
    tracing::debug!(correlation_id = %ctx.correlation_id, %from, %to, "Pipeline transition");
    to
}
