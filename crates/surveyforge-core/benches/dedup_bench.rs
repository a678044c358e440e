//! Benchmarks for paper deduplication over multi-source result sets.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use surveyforge_core::dedup::dedup_papers;
use surveyforge_core::model::Paper;

fn paper(id: usize, title: &str, author: &str) -> Paper {
    Paper {
        id: format!("bench_{id}"),
        title: title.to_string(),
        authors: vec![author.to_string()],
        abstract_text: "A benchmark abstract with a reasonable amount of text in it.".to_string(),
        url: format!("https://example.org/{id}"),
        published_date: None,
        venue: None,
        citations: (id % 100) as u32,
        doi: None,
        arxiv_id: None,
        keywords: vec![],
        full_text: None,
        source: None,
        created_at: Utc::now(),
    }
}

fn result_set(size: usize) -> Vec<Paper> {
    let titles = [
        "Neural scaling laws for language models",
        "Vision transformers at resolution extremes",
        "Benchmark contamination in evaluation suites",
        "Structured pruning of attention heads",
        "Retrieval augmentation for long documents",
    ];
    (0..size)
        .map(|i| {
            let title = titles[i % titles.len()];
            // Every third paper is a near-duplicate of an earlier one.
            if i % 3 == 0 {
                paper(i, title, "Grace Hopper")
            } else {
                paper(i, &format!("{title} revisited {i}"), &format!("Author {i}"))
            }
        })
        .collect()
}

fn bench_dedup(c: &mut Criterion) {
    let small = result_set(50);
    let large = result_set(300);

    c.bench_function("dedup_50_papers", |b| {
        b.iter(|| dedup_papers(black_box(small.clone())))
    });
    c.bench_function("dedup_300_papers", |b| {
        b.iter(|| dedup_papers(black_box(large.clone())))
    });
}

criterion_group!(benches, bench_dedup);
criterion_main!(benches);
