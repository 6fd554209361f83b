//! Retrieval performance benchmarks
//!
//! Measures performance of:
//! - Exact similarity search over small knowledge bases
//! - HNSW candidate search with exact re-scoring on large ones
//! - Summary encoding with the hash encoder

use clinrag_core::{HashEmbedder, KnowledgeCase, VectorIndex};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const SYMPTOMS: &[&str] = &[
    "chest pain",
    "shortness of breath",
    "fever",
    "productive cough",
    "headache",
    "photophobia",
    "abdominal pain",
    "nausea",
    "vomiting",
    "diaphoresis",
    "syncope",
    "palpitations",
    "confusion",
    "dysuria",
    "flank pain",
    "wheezing",
];

fn narrative(i: usize) -> String {
    let a = SYMPTOMS[i % SYMPTOMS.len()];
    let b = SYMPTOMS[(i * 7 + 3) % SYMPTOMS.len()];
    let c = SYMPTOMS[(i * 13 + 5) % SYMPTOMS.len()];
    format!(
        "{} year old presenting with {}, {} and {}",
        20 + i % 70,
        a,
        b,
        c
    )
}

fn cases(embedder: &HashEmbedder, n: usize) -> Vec<KnowledgeCase> {
    (0..n)
        .map(|i| {
            let text = narrative(i);
            KnowledgeCase {
                id: format!("BENCH-{:05}", i),
                embedding: embedder.encode(&text).unwrap(),
                narrative: text,
                diagnosis: format!("Diagnosis {}", i % 40),
                outcome: None,
            }
        })
        .collect()
}

fn bench_index_search(c: &mut Criterion) {
    let embedder = HashEmbedder::default();
    let query = embedder
        .encode("Chief Complaint: chest pain\nKey Symptoms: diaphoresis, palpitations")
        .unwrap();

    let mut group = c.benchmark_group("index_search");
    for size in [100usize, 1_000, 5_000] {
        let index = VectorIndex::new();
        index.build(cases(&embedder, size)).unwrap();

        group.bench_with_input(BenchmarkId::new("top5", size), &size, |b, _| {
            b.iter(|| index.search(black_box(&query), 5).unwrap())
        });
    }
    group.finish();
}

fn bench_exact_vs_ann(c: &mut Criterion) {
    let embedder = HashEmbedder::default();
    let query = embedder.encode("fever, productive cough, confusion").unwrap();
    let data = cases(&embedder, 5_000);

    let exact = VectorIndex::with_ann_threshold(usize::MAX);
    exact.build(data.clone()).unwrap();
    let ann = VectorIndex::new();
    ann.build(data).unwrap();

    let mut group = c.benchmark_group("exact_vs_ann");
    group.bench_function("exact", |b| {
        b.iter(|| exact.search(black_box(&query), 10).unwrap())
    });
    group.bench_function("hnsw", |b| {
        b.iter(|| ann.search(black_box(&query), 10).unwrap())
    });
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let embedder = HashEmbedder::default();
    let summary = "Chief Complaint: Chest pain\n\
                   Key Symptoms: crushing chest pain radiating to left arm, diaphoresis\n\
                   Abnormal Vitals: HR 112, BP 165/98\n\
                   Critical Lab Findings: Troponin I 2.1 ng/mL\n\
                   Relevant Medical History: Hypertension, smoking\n\
                   Demographics: 61 year old M\n\
                   Current Medications: Lisinopril";

    c.bench_function("hash_encode_summary", |b| {
        b.iter(|| embedder.encode(black_box(summary)).unwrap())
    });
}

criterion_group!(benches, bench_index_search, bench_exact_vs_ann, bench_encode);
criterion_main!(benches);
