//! # Moodify Performance Benchmarks
//!
//! Benchmarks for the hot per-turn paths: preference extraction, candidate
//! filtering and ranking, and a full conversation turn.
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Run specific benchmark group
//! cargo bench extraction
//! cargo bench engine
//! cargo bench dialogue
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use moodify::catalog::{Catalog, CatalogEntry, FeatureVector, TempoCategory};
use moodify::dialogue::DialogueController;
use moodify::engine::{Preferences, RecommendationEngine};
use moodify::extractor::{KnownVocab, PreferenceExtractor};
use moodify::llm::{NullClassifier, TableMoodResolver, TemplateReplyGenerator};
use moodify::session::History;
use std::hint::black_box;

/// Build a synthetic catalog of `size` songs spread over a handful of
/// genres, moods, and tempo buckets.
fn synthetic_catalog(size: u32) -> Catalog {
    let genres = ["rock", "pop", "jazz", "classical", "electronic"];
    let moods = ["energetic", "happy", "sad", "calm", "groovy"];

    let entries: Vec<CatalogEntry> = (0..size)
        .map(|i| {
            let bpm = 60.0 + f64::from(i % 120);
            CatalogEntry {
                id: i + 1,
                title: format!("Song {i}"),
                artist: format!("Artist {}", i % 40),
                genre: genres[(i as usize) % genres.len()].to_string(),
                mood_key: moods[(i as usize) % moods.len()].to_string(),
                tempo_category: TempoCategory::from_bpm(bpm),
                bpm,
                popularity: f64::from(i % 100),
                features: FeatureVector([
                    f64::from(i % 10) / 10.0,
                    f64::from(i % 7) / 7.0,
                    f64::from(i % 5) / 5.0,
                    f64::from(i % 3) / 3.0,
                    f64::from(i % 11) / 11.0,
                ]),
            }
        })
        .collect();
    Catalog::new(entries)
}

fn bench_extraction(c: &mut Criterion) {
    let catalog = synthetic_catalog(500);
    let vocab = KnownVocab::from_catalog(&catalog);
    let classifier = NullClassifier;
    let extractor = PreferenceExtractor::new(&classifier);

    let mut group = c.benchmark_group("extraction");

    group.bench_function("exact_vocabulary_hit", |b| {
        b.iter(|| black_box(extractor.extract(black_box("some happy rock please"), &vocab)))
    });

    group.bench_function("fuzzy_typo_correction", |b| {
        b.iter(|| black_box(extractor.extract(black_box("something jazzzy and melancholi"), &vocab)))
    });

    group.bench_function("artist_name_scan", |b| {
        b.iter(|| black_box(extractor.extract(black_box("anything by artist 17 works"), &vocab)))
    });

    group.finish();
}

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");

    for size in [100_u32, 1_000, 10_000] {
        let engine =
            RecommendationEngine::new(synthetic_catalog(size), Box::new(TableMoodResolver::local()));
        let prefs = Preferences {
            genre: Some("rock".to_string()),
            mood: Some("energetic".to_string()),
            tempo: Some(TempoCategory::Fast),
            artist_or_song: None,
        };

        group.bench_with_input(BenchmarkId::new("filtered_recommendation", size), &size, |b, _| {
            b.iter(|| {
                let mut history = History::default();
                black_box(engine.recommend(black_box(&prefs), &mut history))
            })
        });

        group.bench_with_input(BenchmarkId::new("popularity_fallback", size), &size, |b, _| {
            b.iter(|| {
                let mut history = History::default();
                black_box(engine.recommend(black_box(&Preferences::default()), &mut history))
            })
        });
    }

    group.finish();
}

fn bench_dialogue(c: &mut Criterion) {
    let catalog = synthetic_catalog(1_000);
    let engine = RecommendationEngine::new(catalog.clone(), Box::new(TableMoodResolver::local()));
    let controller = DialogueController::new(
        catalog,
        engine,
        Box::new(NullClassifier),
        Box::new(TemplateReplyGenerator),
    );

    let mut group = c.benchmark_group("dialogue");

    group.bench_function("collecting_turn", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            // Fresh session id per iteration so state never accumulates.
            black_box(controller.handle_turn(&format!("bench-{i}"), "something happy and fast"))
        })
    });

    group.bench_function("full_conversation", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            let id = format!("conv-{i}");
            controller.handle_turn(&id, "rock");
            controller.handle_turn(&id, "happy");
            controller.handle_turn(&id, "fast");
            black_box(controller.handle_turn(&id, "no preference"))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_extraction, bench_engine, bench_dialogue);
criterion_main!(benches);
