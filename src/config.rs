//! # Configuration Module
//!
//! This module handles configuration management and data directory setup for
//! Moodify. It provides platform-appropriate data storage locations and reads
//! the optional OpenAI credentials from the environment.
//!
//! ## Data Storage
//!
//! Moodify stores its catalog database in the platform-standard data directory:
//! - Linux: `~/.local/share/moodify/`
//! - macOS: `~/Library/Application Support/moodify/`
//! - Windows: `%APPDATA%\moodify\`
//!
//! ## External Services
//!
//! When `OPENAI_API_KEY` is set, free-text understanding and reply phrasing
//! are delegated to the OpenAI API; without it, every turn is handled by the
//! deterministic local fallbacks.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Returns the platform-appropriate catalog database file path.
///
/// Locates the standard data directory for the current platform and creates
/// the `moodify` subdirectory if it doesn't exist. The database file is named
/// `catalog.db` and stores the song catalog.
///
/// # Errors
///
/// Returns an error if the system data directory cannot be determined or the
/// subdirectory cannot be created.
pub fn get_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let moodify_dir = data_dir.join("moodify");
    fs::create_dir_all(&moodify_dir).with_context(|| {
        format!(
            "Failed to create Moodify data directory at {}. Please check file permissions.",
            moodify_dir.display()
        )
    })?;

    Ok(moodify_dir.join("catalog.db"))
}

/// Configuration for runtime behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path to the catalog database file.
    pub db_path: PathBuf,
    /// OpenAI API key. `None` disables every external call.
    pub api_key: Option<String>,
    /// Chat model used for classification and reply phrasing.
    pub model: String,
    /// Per-request timeout for external calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            db_path: get_db_path().unwrap_or_else(|_| PathBuf::from("catalog.db")),
            api_key: None,
            model: "gpt-4o".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl RuntimeConfig {
    /// Build a configuration from the platform data directory and the
    /// process environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            db_path: get_db_path()?,
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            ..Self::default()
        })
    }

    /// Configuration with an explicit database path.
    #[must_use]
    pub fn with_db_path(mut self, db_path: PathBuf) -> Self {
        self.db_path = db_path;
        self
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
