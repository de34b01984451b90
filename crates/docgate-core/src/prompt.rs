//! Grounded, citation-enforcing prompt assembly

use crate::rbac::PartitionKey;
use crate::retrieval::Candidate;
use std::collections::BTreeSet;

/// Exact sentence the model must give when the context cannot answer
pub const NOT_AVAILABLE_ANSWER: &str =
    "I don't have enough information in the accessible documents to answer this question.";

const SYSTEM_TEMPLATE: &str = r#"You are an internal company assistant with role-based access control.

RULES:
1. Answer ONLY from the context chunks supplied in the user message. Do not use outside knowledge.
2. Every factual sentence must end with a citation marker naming the chunk it came from, written as [chunk_id] using an id from the context.
3. If no chunk answers the question, reply with exactly this sentence and nothing else:
{not_available}
4. Never guess, speculate or combine facts into claims the chunks do not make.
5. Be concise and professional.

CALLER:
- Role: {role}
- Readable partitions: {partitions}"#;

/// System and user prompt for one generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the prompt pair; chunks appear in the order given
    pub fn build(
        &self,
        query: &str,
        candidates: &[Candidate],
        role: &str,
        accessible_partitions: &BTreeSet<PartitionKey>,
    ) -> Prompt {
        let partitions = if accessible_partitions.is_empty() {
            "none".to_string()
        } else {
            accessible_partitions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };

        let system = SYSTEM_TEMPLATE
            .replace("{not_available}", NOT_AVAILABLE_ANSWER)
            .replace("{role}", role)
            .replace("{partitions}", &partitions);

        Prompt {
            system,
            user: build_user_prompt(query, candidates),
        }
    }
}

fn build_user_prompt(query: &str, candidates: &[Candidate]) -> String {
    let mut parts = Vec::with_capacity(candidates.len() + 2);
    parts.push(format!("CONTEXT ({} chunks):", candidates.len()));

    for candidate in candidates {
        let chunk = &candidate.chunk;
        parts.push(format!(
            "---\nchunk_id: {}\npartition: {}/{}\nsource: {}\n\n{}",
            chunk.id,
            chunk.access.department,
            chunk.access.classification,
            chunk.source_document,
            chunk.text.trim()
        ));
    }

    parts.push(format!(
        "---\n\nQUESTION: {}\n\nAnswer using only the chunks above and cite each fact as [chunk_id].",
        query.trim()
    ));

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{AccessMetadata, Chunk};

    fn candidate(id: &str, text: &str) -> Candidate {
        let partition: PartitionKey = "finance/internal".parse().unwrap();
        Candidate::new(
            Chunk {
                id: id.to_string(),
                text: text.to_string(),
                embedding_ref: None,
                access: AccessMetadata::new(&partition, &[]),
                source_document: "quarterly_report.md".to_string(),
                source_offset: Some(0),
            },
            0.9,
        )
    }

    #[test]
    fn test_system_prompt_rules() {
        let partitions: BTreeSet<PartitionKey> =
            ["finance/internal".parse().unwrap()].into_iter().collect();
        let prompt = PromptBuilder::new().build("q", &[], "finance_employee", &partitions);
        assert!(prompt.system.contains(NOT_AVAILABLE_ANSWER));
        assert!(prompt.system.contains("[chunk_id]"));
        assert!(prompt.system.contains("finance_employee"));
        assert!(prompt.system.contains("finance/internal"));
        assert!(!prompt.system.contains("{role}"));
    }

    #[test]
    fn test_user_prompt_keeps_order() {
        let prompt = PromptBuilder::new().build(
            "What was Q4 revenue?",
            &[candidate("fin-002", "second"), candidate("fin-001", "first")],
            "finance_employee",
            &BTreeSet::new(),
        );
        let second = prompt.user.find("chunk_id: fin-002").unwrap();
        let first = prompt.user.find("chunk_id: fin-001").unwrap();
        assert!(second < first);
        assert!(prompt.user.contains("partition: finance/internal"));
        assert!(prompt.user.contains("source: quarterly_report.md"));
        assert!(prompt.user.contains("QUESTION: What was Q4 revenue?"));
        assert!(prompt.system.contains("Readable partitions: none"));
    }
}
