//! Conversational song recommender over a local catalog.
//!
//! Core modules:
//! - [`dialogue`] - The per-turn conversation state machine
//! - [`engine`] - Candidate filtering, scoring, and selection
//! - [`extractor`] - Free-text preference extraction
//! - [`session`] - Per-conversation state and the concurrent store
//! - [`catalog`] - Song records, tempo categories, feature vectors
//!
//! ### Supporting Modules
//!
//! - [`db`] - SQLite catalog storage and JSON import
//! - [`llm`] - External classifier/resolver/generator contracts plus the
//!   deterministic offline fallbacks
//! - [`config`] - Configuration and data directory management
//! - [`cli`] - Command-line interface definitions with clap integration
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use moodify::catalog::Catalog;
//! use moodify::dialogue::DialogueController;
//! use moodify::engine::RecommendationEngine;
//! use moodify::llm::{NullClassifier, TableMoodResolver, TemplateReplyGenerator};
//! use moodify::db;
//!
//! // Load the catalog once at startup
//! let db_path = moodify::config::get_db_path()?;
//! let conn = db::connect(&db_path)?;
//! let catalog = db::load_catalog(&conn)?;
//!
//! // Fully offline wiring: local fallbacks for every external contract
//! let engine = RecommendationEngine::new(catalog.clone(), Box::new(TableMoodResolver::local()));
//! let controller = DialogueController::new(
//!     catalog,
//!     engine,
//!     Box::new(NullClassifier),
//!     Box::new(TemplateReplyGenerator),
//! );
//!
//! // One turn per user message; the controller tracks state per session id
//! let outcome = controller.handle_turn("alice", "something happy and fast");
//! println!("{}", outcome.reply);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## How a Turn Works
//!
//! Each inbound utterance runs through three layers:
//!
//! 1. **Extraction** — no-preference phrases, vague-phrase mood mapping, and
//!    vocabulary fuzzy matching resolve what they can locally; an external
//!    semantic classifier (when configured) fills the rest, with failures
//!    degrading to "unresolved" rather than erroring.
//! 2. **State machine** — while collecting, the controller asks for exactly
//!    one missing field per turn (genre, mood, tempo, artist — in that
//!    order). Once all four are resolved it serves a song and switches to
//!    the feedback phase, where "another", "change genre", "reset", and
//!    positive/negative feedback are classified in a fixed priority order.
//! 3. **Engine** — candidates are filtered by artist, genre, and tempo,
//!    then ranked by mood-vector cosine similarity. Filters relax one by
//!    one until candidates remain, so a non-empty catalog always yields a
//!    song. Already-served songs are excluded until every candidate has
//!    been heard.
//!
//! ## Error Handling
//!
//! All fallible public functions return `Result<T, anyhow::Error>`.
//! External-service failures never surface to the user: classification
//! degrades to local matching, mood lookup falls back to a fixed table,
//! and reply phrasing falls back to a template sentence.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod engine;
pub mod extractor;
pub mod llm;
pub mod session;
