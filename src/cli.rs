//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for Moodify using Clap
//! derive macros. It provides a type-safe way to parse command-line arguments
//! and route them to appropriate functionality.
//!
//! ## Commands
//!
//! - `import`: Load a JSON song catalog into the database
//! - `list`: Display all catalogued songs
//! - `chat`: Interactive conversation loop on stdin/stdout
//! - `turn`: Process a single utterance for a session and print the reply
//! - `reset`: Clear a session's state
//! - `snapshot`: Print a session's diagnostic state
//!
//! ## Examples
//!
//! ```bash
//! moodify import songs.json
//! moodify chat
//! moodify turn --session alice "something happy and fast"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main application arguments structure.
///
/// Uses Clap derive macros to automatically generate argument parsing,
/// help text, and validation. All functionality is accessed through
/// subcommands.
#[derive(Parser)]
#[command(name = "moodify")]
#[command(about = "Moodify - conversational song recommendations from your catalog")]
#[command(version)]
pub struct Args {
    /// Override the catalog database location
    ///
    /// Defaults to the platform data directory
    /// (e.g. ~/.local/share/moodify/catalog.db on Linux).
    #[arg(long, env = "MOODIFY_DB", global = true)]
    pub db: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
///
/// Command arguments are embedded directly in the enum variants for
/// type safety and automatic validation.
#[derive(Subcommand)]
pub enum Command {
    /// Import a song catalog from a JSON file
    ///
    /// Reads a JSON array of song records (title, artist, genre, mood,
    /// BPM, popularity, feature vector) and replaces the database content
    /// with it. The array order becomes the catalog order, which the
    /// engine uses as its stable tie-break.
    Import {
        /// Path to the JSON catalog file
        path: PathBuf,
    },

    /// List all songs in the database
    ///
    /// Displays every catalogued song with its genre, mood key, tempo
    /// category, and popularity, in catalog order.
    List,

    /// Start an interactive recommendation conversation
    ///
    /// Reads utterances from stdin and answers on stdout until EOF or
    /// "quit". The whole conversation shares one session.
    Chat {
        /// Session identifier to converse under
        #[arg(long, default_value = "local")]
        session: String,
    },

    /// Process one utterance and print the reply
    ///
    /// Useful for scripting and for testing: session state persists only
    /// for the lifetime of the process, so consecutive `turn` invocations
    /// each start fresh.
    Turn {
        /// Session identifier
        #[arg(long, default_value = "local")]
        session: String,

        /// The user's message
        message: String,
    },

    /// Clear a session back to empty defaults
    Reset {
        /// Session identifier
        #[arg(long, default_value = "local")]
        session: String,
    },

    /// Print a session's diagnostic state as JSON
    Snapshot {
        /// Session identifier
        #[arg(long, default_value = "local")]
        session: String,
    },
}
