//! Switchboard Benchmark Suite
//!
//! The classifier and the cache normalization sit on the hot path of
//! every routed request, before any network call; they must stay well
//! under a millisecond so routing overhead is invisible next to backend
//! latency:
//!   classify_short_prompt ......... < 50μs
//!   classify_long_prompt .......... < 200μs
//!   normalize_and_hash ............ < 20μs
//!   topic_heuristic ............... < 20μs

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use switchboard_core::cache::{normalize_prompt, prompt_hash};
use switchboard_core::classifier::Classifier;
use switchboard_core::memory::topic::detect_heuristic;
use switchboard_llm::BackendId;

fn classifier() -> Classifier {
    let all: Vec<BackendId> = ["gemini", "mistral", "deepseek", "gpt"]
        .iter()
        .map(|s| BackendId::new(*s))
        .collect();
    Classifier::new(all.clone(), all, BackendId::new("gemini"))
}

const LONG_PROMPT: &str = "Analise profundamente as implicações filosóficas da \
inteligência artificial na sociedade moderna. Discuta o impacto sobre o trabalho, \
a educação e as relações humanas. Compare as diferentes perspectivas acadêmicas \
sobre o tema e avalie as consequências de longo prazo para as próximas gerações, \
considerando aspectos técnicos, econômicos e éticos de cada cenário possível.";

/// Benchmark: classify a short conversational prompt (target: < 50μs).
fn bench_classify_short(c: &mut Criterion) {
    let classifier = classifier();
    c.bench_function("classify_short_prompt", |b| {
        b.iter(|| {
            let result = classifier.classify(black_box("Oi, tudo bem?"));
            black_box(result);
        });
    });
}

/// Benchmark: classify a long analytical prompt (target: < 200μs).
fn bench_classify_long(c: &mut Criterion) {
    let classifier = classifier();
    c.bench_function("classify_long_prompt", |b| {
        b.iter(|| {
            let result = classifier.classify(black_box(LONG_PROMPT));
            black_box(result);
        });
    });
}

/// Benchmark: cache-key derivation (target: < 20μs).
fn bench_normalize_and_hash(c: &mut Criterion) {
    c.bench_function("normalize_and_hash", |b| {
        b.iter(|| {
            let normalized = normalize_prompt(black_box("Qual é a capital do Brasil?"));
            let hash = prompt_hash(&normalized);
            black_box(hash);
        });
    });
}

/// Benchmark: deterministic topic detection (target: < 20μs).
fn bench_topic_heuristic(c: &mut Criterion) {
    c.bench_function("topic_heuristic", |b| {
        b.iter(|| {
            let decision = detect_heuristic(
                black_box(Some("capital do Brasil")),
                black_box("Me fale sobre as linguagens de programação mais populares."),
            );
            black_box(decision);
        });
    });
}

criterion_group!(
    benches,
    bench_classify_short,
    bench_classify_long,
    bench_normalize_and_hash,
    bench_topic_heuristic,
);
criterion_main!(benches);
