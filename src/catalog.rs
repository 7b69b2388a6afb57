//! Catalog types: the immutable set of songs the engine recommends from.
//!
//! The catalog is loaded once at startup (see [`crate::db`]) and never
//! mutated afterwards, so it can be shared between sessions without
//! synchronization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Audio feature vector in the order used throughout the crate:
/// valence, energy, danceability, acousticness, tempo — each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; 5]);

impl FeatureVector {
    /// Cosine similarity against another vector. Returns 0.0 when either
    /// vector is all zeros, so degenerate entries rank last instead of
    /// producing NaN.
    #[must_use]
    pub fn cosine_similarity(&self, other: &FeatureVector) -> f64 {
        let dot: f64 = self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum();
        let norm_a: f64 = self.0.iter().map(|a| a * a).sum::<f64>().sqrt();
        let norm_b: f64 = other.0.iter().map(|b| b * b).sum::<f64>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.2}, {:.2}, {:.2}, {:.2}, {:.2}]",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4]
        )
    }
}

/// Coarse tempo buckets. BPM boundaries follow the catalog's convention:
/// slow is below 90 BPM, medium is 90–120, fast is above 120.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempoCategory {
    Slow,
    Medium,
    Fast,
}

impl TempoCategory {
    /// Classify a raw BPM value.
    #[must_use]
    pub fn from_bpm(bpm: f64) -> Self {
        if bpm < 90.0 {
            Self::Slow
        } else if bpm <= 120.0 {
            Self::Medium
        } else {
            Self::Fast
        }
    }

    /// Inclusive-exclusive BPM window for filtering.
    #[must_use]
    pub fn bpm_range(self) -> (f64, f64) {
        match self {
            Self::Slow => (0.0, 90.0),
            Self::Medium => (90.0, 121.0),
            Self::Fast => (121.0, 400.0),
        }
    }

    /// Parse a user-facing tempo word. Only the three canonical words are
    /// accepted; fuzzy correction happens in the extractor before this.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "slow" => Some(Self::Slow),
            "medium" => Some(Self::Medium),
            "fast" => Some(Self::Fast),
            _ => None,
        }
    }

    /// Slow and fast are opposite poles; medium opposes neither.
    #[must_use]
    pub fn is_opposite(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Slow, Self::Fast) | (Self::Fast, Self::Slow)
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slow => "slow",
            Self::Medium => "medium",
            Self::Fast => "fast",
        }
    }
}

impl fmt::Display for TempoCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One song as stored in the catalog. Read-only to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u32,
    pub title: String,
    pub artist: String,
    /// Genre tag, lowercase by convention (e.g. "rock", "hip hop").
    pub genre: String,
    /// Mood/energy classification key (e.g. "happy energetic").
    pub mood_key: String,
    pub tempo_category: TempoCategory,
    /// Beats per minute.
    pub bpm: f64,
    /// Popularity score in `[0, 100]`.
    pub popularity: f64,
    pub features: FeatureVector,
}

impl CatalogEntry {
    /// The (title, artist) pair used for history bookkeeping.
    #[must_use]
    pub fn pair(&self) -> (String, String) {
        (self.title.clone(), self.artist.clone())
    }
}

/// Immutable, insertion-ordered song collection.
///
/// Iteration order is the load order; the engine relies on it as the
/// stable tie-break for equal scores.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Arc<Vec<CatalogEntry>>,
}

impl Catalog {
    #[must_use]
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// All distinct genre tags, in catalog order. Used as the closed
    /// vocabulary for genre extraction.
    #[must_use]
    pub fn genres(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for entry in self.entries.iter() {
            let genre = entry.genre.to_lowercase();
            if !seen.contains(&genre) {
                seen.push(genre);
            }
        }
        seen
    }
}
