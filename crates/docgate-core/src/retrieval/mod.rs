//! Chunk retrieval
//!
//! Provides:
//! - Chunk and candidate types shared by every pipeline stage
//! - The `VectorIndex` collaborator interface with in-memory and HNSW indexes
//! - `VectorRetriever`, the partition-constrained similarity search

mod ann_index;
mod index;
mod retriever;

pub use ann_index::AnnIndex;
pub use index::{cosine_similarity, IndexHit, MemoryIndex, VectorIndex};
pub(crate) use index::rank_by_similarity;
pub use retriever::{Retrieval, RetrievalStatus, VectorRetriever};

use crate::llm::ScoreScale;
use crate::rbac::{is_identifier, normalize_role, PartitionKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Access metadata as stored next to a chunk
///
/// Kept in its raw string form so the access check can treat anything it
/// cannot parse as a denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessMetadata {
    pub department: String,
    pub classification: String,
    /// Comma-separated allow-list; absent or blank means everyone in the partition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permitted_roles: Option<String>,
}

/// Parsed form of [`AccessMetadata`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAccess {
    pub partition: PartitionKey,
    pub permitted_roles: BTreeSet<String>,
}

impl AccessMetadata {
    /// Metadata for a partition with an optional role allow-list
    pub fn new(partition: &PartitionKey, permitted_roles: &[&str]) -> Self {
        Self {
            department: partition.department.clone(),
            classification: partition.classification.to_string(),
            permitted_roles: if permitted_roles.is_empty() {
                None
            } else {
                Some(permitted_roles.join(","))
            },
        }
    }

    pub fn parse(&self) -> std::result::Result<ParsedAccess, String> {
        let partition = PartitionKey::parse(&self.department, &self.classification)?;

        let mut permitted_roles = BTreeSet::new();
        if let Some(raw) = self.permitted_roles.as_deref() {
            if !raw.trim().is_empty() {
                for entry in raw.split(',') {
                    let role = normalize_role(entry);
                    if !is_identifier(&role) {
                        return Err(format!("invalid role '{}' in permitted_roles", entry.trim()));
                    }
                    permitted_roles.insert(role);
                }
            }
        }

        Ok(ParsedAccess {
            partition,
            permitted_roles,
        })
    }

    /// Partition when it parses; `None` for malformed metadata
    pub fn partition(&self) -> Option<PartitionKey> {
        PartitionKey::parse(&self.department, &self.classification).ok()
    }
}

/// A retrievable unit of source text with its access metadata
///
/// Created at ingestion time and never mutated by the query path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_ref: Option<String>,
    #[serde(flatten)]
    pub access: AccessMetadata,
    pub source_document: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_offset: Option<u64>,
}

/// Cross-encoder score with the scale it was produced on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceScore {
    pub raw: f64,
    pub scale: ScoreScale,
}

impl RelevanceScore {
    pub fn normalized(&self) -> f64 {
        self.scale.normalize(self.raw)
    }
}

/// A chunk considered for one query
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Chunk,
    /// Cosine similarity from the vector index
    pub similarity_score: f64,
    /// Set by the reranker when the relevance model answered
    pub rerank_score: Option<RelevanceScore>,
}

impl Candidate {
    pub fn new(chunk: Chunk, similarity_score: f64) -> Self {
        Self {
            chunk,
            similarity_score,
            rerank_score: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.chunk.id
    }

    /// Best available relevance on a 0.0 - 1.0 scale
    pub fn relevance(&self) -> f64 {
        match self.rerank_score {
            Some(score) => score.normalized(),
            None => ScoreScale::Probability.normalize(self.similarity_score),
        }
    }
}

/// Order by descending similarity, ties broken by chunk id; NaN sorts last
pub fn sort_by_similarity(candidates: &mut [Candidate]) {
    fn key(score: f64) -> f64 {
        if score.is_nan() {
            f64::NEG_INFINITY
        } else {
            score
        }
    }
    candidates.sort_by(|a, b| {
        key(b.similarity_score)
            .total_cmp(&key(a.similarity_score))
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::Classification;

    fn meta(department: &str, classification: &str, roles: Option<&str>) -> AccessMetadata {
        AccessMetadata {
            department: department.to_string(),
            classification: classification.to_string(),
            permitted_roles: roles.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_well_formed() {
        let parsed = meta("Finance", "confidential", Some("finance_manager, c_level"))
            .parse()
            .unwrap();
        assert_eq!(parsed.partition.department, "finance");
        assert_eq!(parsed.partition.classification, Classification::Confidential);
        assert_eq!(parsed.permitted_roles.len(), 2);
        assert!(parsed.permitted_roles.contains("c_level"));
    }

    #[test]
    fn test_blank_allow_list_means_partition_wide() {
        assert!(meta("hr", "internal", Some("   ")).parse().unwrap().permitted_roles.is_empty());
        assert!(meta("hr", "internal", None).parse().unwrap().permitted_roles.is_empty());
    }

    #[test]
    fn test_malformed_metadata() {
        assert!(meta("", "internal", None).parse().is_err());
        assert!(meta("hr", "top-secret", None).parse().is_err());
        assert!(meta("hr", "internal", Some("hr_manager,,admin")).parse().is_err());
        assert!(meta("hr", "internal", Some("{\"role\": 1}")).parse().is_err());
        assert_eq!(meta("hr", "unknown", None).partition(), None);
    }

    #[test]
    fn test_chunk_json_shape() {
        let json = r#"{
            "id": "fin-001",
            "text": "Q4 revenue was $5.2M",
            "department": "finance",
            "classification": "internal",
            "source_document": "quarterly_report.md"
        }"#;
        let chunk: Chunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.access.permitted_roles, None);
        assert_eq!(chunk.source_offset, None);
        assert!(chunk.access.partition().is_some());
    }

    #[test]
    fn test_sort_is_deterministic_on_ties() {
        let make = |id: &str, score: f64| {
            Candidate::new(
                Chunk {
                    id: id.to_string(),
                    text: String::new(),
                    embedding_ref: None,
                    access: meta("general", "public", None),
                    source_document: "doc".to_string(),
                    source_offset: None,
                },
                score,
            )
        };
        let mut candidates = vec![make("b", 0.5), make("c", 0.9), make("a", 0.5)];
        sort_by_similarity(&mut candidates);
        let ids: Vec<&str> = candidates.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        let mut with_nan = vec![make("n", f64::NAN), make("b", 0.1), make("a", f64::NAN)];
        sort_by_similarity(&mut with_nan);
        let ids: Vec<&str> = with_nan.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["b", "a", "n"]);
    }
}
