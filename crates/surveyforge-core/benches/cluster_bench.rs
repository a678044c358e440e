//! Benchmarks for note clustering and keyword extraction.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use surveyforge_core::model::{NoteKind, ResearchNote};
use surveyforge_core::workflow::themes::{cluster_notes, extract_keywords};

fn note_corpus(size: usize) -> Vec<ResearchNote> {
    let contents = [
        "Transformer pruning keeps accuracy while removing attention heads",
        "Sparsity schedules interact with retraining budgets during pruning",
        "Benchmark contamination inflates reported evaluation accuracy",
        "Retrieval augmentation improves long document question answering",
        "Quantization below four bits degrades reasoning benchmarks sharply",
    ];
    (0..size)
        .map(|i| {
            ResearchNote::new(
                &format!("paper_{}", i / 4),
                i % 4,
                format!("{} variant {}", contents[i % contents.len()], i),
                NoteKind::KeyFinding,
                0.7,
                Utc::now(),
            )
        })
        .collect()
}

fn bench_clustering(c: &mut Criterion) {
    let notes = note_corpus(200);

    c.bench_function("extract_keywords", |b| {
        b.iter(|| {
            extract_keywords(
                black_box("Transformer pruning keeps accuracy while removing attention heads"),
                20,
            )
        })
    });
    c.bench_function("cluster_200_notes", |b| {
        b.iter(|| cluster_notes(black_box(&notes), 0.2))
    });
}

criterion_group!(benches, bench_clustering);
criterion_main!(benches);
