//! Post-retrieval scoring benchmarks
//!
//! Measures performance of:
//! - Near-duplicate detection over candidate texts
//! - Confidence scoring of a cited answer

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use docgate_core::rerank::{overlap_coefficient, token_set};
use docgate_core::{AccessMetadata, Candidate, Chunk, ConfidenceScorer, PartitionKey};

fn chunk_text(i: usize) -> String {
    format!(
        "Section {} of the quarterly finance review covers revenue, operating costs, \
         headcount changes and the hiring plan for region {} during fiscal year {}.",
        i,
        i % 7,
        2020 + i % 5
    )
}

fn candidates(n: usize) -> Vec<Candidate> {
    let key: PartitionKey = "finance/internal".parse().unwrap();
    (0..n)
        .map(|i| {
            let chunk = Chunk {
                id: format!("fin-{:03}", i),
                text: chunk_text(i),
                embedding_ref: None,
                access: AccessMetadata::new(&key, &[]),
                source_document: "review.md".to_string(),
                source_offset: Some(i as u64 * 512),
            };
            Candidate::new(chunk, 0.95 - i as f64 * 0.01)
        })
        .collect()
}

fn bench_dedup(c: &mut Criterion) {
    let mut group = c.benchmark_group("dedup");

    for size in [10, 20, 50] {
        let texts: Vec<String> = (0..size).map(chunk_text).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &texts, |b, texts| {
            b.iter(|| {
                let sets: Vec<_> = texts.iter().map(|t| token_set(t)).collect();
                let mut duplicates = 0;
                for i in 0..sets.len() {
                    for j in 0..i {
                        if overlap_coefficient(&sets[j], &sets[i]) >= 0.95 {
                            duplicates += 1;
                            break;
                        }
                    }
                }
                black_box(duplicates)
            });
        });
    }

    group.finish();
}

fn bench_confidence(c: &mut Criterion) {
    let scorer = ConfidenceScorer::new();
    let pool = candidates(5);
    let answer = "Revenue rose 12% in Q4 [fin-000]. Operating costs were flat [fin-001]. \
                  Headcount grew by forty people across two regions [fin-002, fin-003].";

    c.bench_function("confidence_score", |b| {
        b.iter(|| {
            scorer.score(
                black_box(answer),
                black_box(&pool),
                black_box("How did revenue and costs change in Q4?"),
            )
        });
    });
}

criterion_group!(benches, bench_dedup, bench_confidence);
criterion_main!(benches);
