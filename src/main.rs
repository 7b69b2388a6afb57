//! # Moodify - Conversational Song Recommender
//!
//! Moodify collects four preferences (genre, mood, tempo, artist-or-song)
//! over a short conversation, then serves the best-matching song from a
//! local catalog, iterating on feedback ("another", "change genre", ...).
//!
//! ## Architecture
//!
//! - `cli`: Command-line interface definitions
//! - `db`: SQLite catalog storage
//! - `catalog`: Song records and feature vectors
//! - `extractor`: Free-text preference extraction
//! - `engine`: Filtering, scoring, and selection
//! - `dialogue`: The per-turn conversation state machine
//! - `llm`: External classifier/generator contracts and the offline fallbacks
//! - `config`: Configuration and data directory management
//!
//! ## Usage
//!
//! ```bash
//! # Load a catalog
//! moodify import songs.json
//!
//! # Talk to it
//! moodify chat
//!
//! # One scripted turn
//! moodify turn "something happy and fast"
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use moodify::catalog::Catalog;
use moodify::cli::{Args, Command};
use moodify::config::RuntimeConfig;
use moodify::dialogue::DialogueController;
use moodify::engine::RecommendationEngine;
use moodify::extractor::MOODS;
use moodify::llm::{
    NullClassifier, OpenAiClassifier, OpenAiClient, OpenAiReplyGenerator, ReplyGenerator,
    SemanticClassifier, TableMoodResolver, TemplateReplyGenerator,
};
use moodify::{db, llm};
use std::io::{self, BufRead, Write};

/// Wire the controller from configuration: catalog from the database, and
/// either the OpenAI-backed services or the deterministic offline fallbacks
/// depending on whether an API key is present.
fn build_controller(config: &RuntimeConfig) -> Result<DialogueController> {
    let conn = db::connect(&config.db_path)?;
    let catalog = db::load_catalog(&conn)?;
    info!("Loaded {} songs from {}", catalog.len(), config.db_path.display());

    let (classifier, resolver, reply): (
        Box<dyn SemanticClassifier>,
        Box<dyn llm::MoodVectorResolver>,
        Box<dyn ReplyGenerator>,
    ) = match &config.api_key {
        Some(key) => {
            let client = OpenAiClient::new(key.clone(), config.request_timeout())
                .with_model(config.model.clone());
            let moods = MOODS.iter().map(|m| (*m).to_string()).collect();
            (
                Box::new(OpenAiClassifier::new(client.clone(), moods)),
                Box::new(TableMoodResolver::with_client(client.clone())),
                Box::new(OpenAiReplyGenerator::new(client)),
            )
        }
        None => {
            info!("No OPENAI_API_KEY set, running fully offline");
            (
                Box::new(NullClassifier),
                Box::new(TableMoodResolver::local()),
                Box::new(TemplateReplyGenerator),
            )
        }
    };

    let engine = RecommendationEngine::new(catalog.clone(), resolver);
    Ok(DialogueController::new(catalog, engine, classifier, reply))
}

fn print_catalog(catalog: &Catalog) {
    println!("{} songs in catalog:", catalog.len());
    for song in catalog.iter() {
        println!(
            "  [{}] {} - {} ({}, {}, {} BPM, popularity {})",
            song.id,
            song.artist,
            song.title,
            song.genre,
            song.mood_key,
            song.bpm,
            song.popularity
        );
    }
}

/// Read-eval-print conversation loop until EOF or "quit".
fn chat_loop(controller: &DialogueController, session: &str) -> Result<()> {
    println!("Hi! Tell me what you'd like to hear (\"quit\" to leave).");
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush().context("Failed to flush stdout")?;

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .context("Failed to read from stdin")?;
        if read == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            println!("Bye! Enjoy the music.");
            break;
        }

        let outcome = controller.handle_turn(session, line);
        println!("{}", outcome.reply);
    }
    Ok(())
}

/// Main entry point for the Moodify application.
///
/// Initializes logging, parses command-line arguments, and routes commands
/// to the appropriate module functions.
///
/// # Logging
///
/// Initializes environment logger which can be controlled via `RUST_LOG`:
/// - `RUST_LOG=debug moodify chat` - Enable debug logging
/// - `RUST_LOG=moodify::engine=trace moodify chat` - Module-specific logging
fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let mut config = RuntimeConfig::from_env()?;
    if let Some(db_path) = args.db {
        config = config.with_db_path(db_path);
    }

    match args.command {
        Command::Import { path } => {
            info!("Importing catalog from: {}", path.display());
            let count = db::import_json(&path, &config.db_path)?;
            println!("Imported {} songs into {}", count, config.db_path.display());
        }
        Command::List => {
            let conn = db::connect(&config.db_path)?;
            let catalog = db::load_catalog(&conn)?;
            print_catalog(&catalog);
        }
        Command::Chat { session } => {
            let controller = build_controller(&config)?;
            chat_loop(&controller, &session)?;
        }
        Command::Turn { session, message } => {
            let controller = build_controller(&config)?;
            let outcome = controller.handle_turn(&session, &message);
            println!("{}", outcome.reply);
        }
        Command::Reset { session } => {
            let controller = build_controller(&config)?;
            controller.reset(&session);
            println!("Session '{session}' cleared.");
        }
        Command::Snapshot { session } => {
            let controller = build_controller(&config)?;
            let snapshot = controller.session_snapshot(&session);
            let json = serde_json::to_string_pretty(&snapshot)
                .context("Failed to serialize session snapshot")?;
            println!("{json}");
        }
    }

    Ok(())
}
