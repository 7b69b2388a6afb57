//! Candidate filtering, scoring, and selection.
//!
//! The engine applies a relaxation ladder: filters are dropped one by one
//! until a non-empty candidate set remains, so a non-empty catalog always
//! yields exactly one song. History exclusion happens inside the final
//! ranked list; a repeat is allowed only as the last resort.

use crate::catalog::{Catalog, CatalogEntry, TempoCategory};
use crate::llm::MoodVectorResolver;
use crate::session::{History, PrefField, Session};
use log::{debug, trace};

lazy_static::lazy_static! {
    /// Sad-like mood polarity set. A preference in this set matches any
    /// entry whose mood key carries another member, and clashes with the
    /// happy-like set.
    static ref SAD_LIKE: Vec<&'static str> = vec![
        "sad", "melancholy", "melancholic", "bittersweet", "moody", "dark",
        "nostalgic", "anxious", "mellow",
    ];

    /// Happy-like mood polarity set, symmetric with [`SAD_LIKE`].
    static ref HAPPY_LIKE: Vec<&'static str> = vec![
        "happy", "uplifting", "energetic", "bright", "playful", "hopeful",
        "funky", "groovy",
    ];
}

/// Additive score contributions. Empirical tuning values carried as
/// configuration defaults rather than fixed law.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub genre_match: f64,
    pub mood_match: f64,
    pub mood_mismatch_penalty: f64,
    pub tempo_match: f64,
    pub tempo_mismatch_penalty: f64,
    pub identity_match: f64,
    /// Popularity is divided by this before being added, so a 0–100
    /// popularity contributes at most +1.
    pub popularity_divisor: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            genre_match: 8.0,
            mood_match: 8.0,
            mood_mismatch_penalty: -10.0,
            tempo_match: 8.0,
            tempo_mismatch_penalty: -5.0,
            identity_match: 10.0,
            popularity_divisor: 100.0,
        }
    }
}

/// Engine policy knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub weights: ScoringWeights,
    /// When every ranked candidate is already in history, serve the
    /// top-ranked one again instead of refusing. Default true.
    pub repeat_when_exhausted: bool,
    /// Fuzzy cutoff for the artist/title candidate filter.
    pub identity_cutoff: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            repeat_when_exhausted: true,
            identity_cutoff: 0.85,
        }
    }
}

/// Resolved preference view the engine consumes. `None` covers both
/// unresolved and explicit no-preference — the engine does not distinguish.
#[derive(Debug, Clone, Default)]
pub struct Preferences {
    pub genre: Option<String>,
    pub mood: Option<String>,
    pub tempo: Option<TempoCategory>,
    pub artist_or_song: Option<String>,
}

impl Preferences {
    /// Project a session's tri-state fields down to concrete values.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        let value = |field: &PrefField| field.value().map(str::to_lowercase);
        Self {
            genre: value(&session.genre),
            mood: value(&session.mood),
            tempo: session.tempo.value().and_then(TempoCategory::parse),
            artist_or_song: value(&session.artist_or_song),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.genre.is_none()
            && self.mood.is_none()
            && self.tempo.is_none()
            && self.artist_or_song.is_none()
    }
}

/// Filters, scores, and selects one song per request.
pub struct RecommendationEngine {
    catalog: Catalog,
    mood_resolver: Box<dyn MoodVectorResolver>,
    config: EngineConfig,
}

impl RecommendationEngine {
    #[must_use]
    pub fn new(catalog: Catalog, mood_resolver: Box<dyn MoodVectorResolver>) -> Self {
        Self {
            catalog,
            mood_resolver,
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Select the best-fitting song for `prefs`, avoiding entries already in
    /// `history`. The selected (title, artist) pair is appended to the
    /// caller's history. Returns `None` only when the catalog is empty.
    pub fn recommend(&self, prefs: &Preferences, history: &mut History) -> Option<CatalogEntry> {
        if self.catalog.is_empty() {
            return None;
        }

        let ranked = if prefs.is_empty() {
            self.rank_by_popularity()
        } else {
            self.run_ladder(prefs)
        };

        let selected = self.pick_novel(&ranked, history)?;
        history.push(selected.pair());
        Some(selected)
    }

    /// Relaxation ladder: drop the tempo filter, then genre, then fall back
    /// to a weighted ranking of the whole catalog. The first rung with
    /// candidates wins.
    fn run_ladder(&self, prefs: &Preferences) -> Vec<&CatalogEntry> {
        let rungs: [(bool, bool); 3] = [(true, true), (false, true), (false, false)];

        for (use_tempo, use_genre) in rungs {
            let candidates = self.filter(prefs, use_tempo, use_genre);
            if !candidates.is_empty() {
                trace!(
                    "Ladder rung tempo={use_tempo} genre={use_genre} kept {} candidates",
                    candidates.len()
                );
                return self.rank(candidates, prefs);
            }
        }

        debug!("All filter rungs empty, ranking full catalog by weighted score");
        let all: Vec<&CatalogEntry> = self.catalog.iter().collect();
        self.rank_weighted(all, prefs)
    }

    fn filter(&self, prefs: &Preferences, use_tempo: bool, use_genre: bool) -> Vec<&CatalogEntry> {
        let mut candidates: Vec<&CatalogEntry> = self.catalog.iter().collect();

        if let Some(query) = &prefs.artist_or_song {
            candidates = filter_identity(candidates, query, self.config.identity_cutoff);
        }
        if use_genre {
            if let Some(genre) = &prefs.genre {
                candidates.retain(|e| e.genre.eq_ignore_ascii_case(genre));
            }
        }
        if use_tempo {
            if let Some(tempo) = prefs.tempo {
                let (lo, hi) = tempo.bpm_range();
                candidates.retain(|e| e.bpm >= lo && e.bpm < hi);
            }
        }
        candidates
    }

    /// Rank candidates: cosine similarity against the mood vector when a
    /// mood is given, weighted score otherwise. Sorting is stable, so equal
    /// scores keep catalog order.
    fn rank<'a>(&self, candidates: Vec<&'a CatalogEntry>, prefs: &Preferences) -> Vec<&'a CatalogEntry> {
        match &prefs.mood {
            Some(mood) => {
                let target = self.mood_resolver.resolve(mood);
                let mut scored: Vec<(&CatalogEntry, f64)> = candidates
                    .into_iter()
                    .map(|e| (e, e.features.cosine_similarity(&target)))
                    .collect();
                scored.sort_by(|(_, a), (_, b)| {
                    b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal)
                });
                scored.into_iter().map(|(e, _)| e).collect()
            }
            None => self.rank_weighted(candidates, prefs),
        }
    }

    fn rank_weighted<'a>(
        &self,
        candidates: Vec<&'a CatalogEntry>,
        prefs: &Preferences,
    ) -> Vec<&'a CatalogEntry> {
        let mut scored: Vec<(&CatalogEntry, f64)> = candidates
            .into_iter()
            .map(|e| (e, weighted_score(e, prefs, &self.config.weights)))
            .collect();
        scored.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(e, _)| e).collect()
    }

    /// Global fallback ordering when no preference was given at all.
    fn rank_by_popularity(&self) -> Vec<&CatalogEntry> {
        let mut entries: Vec<&CatalogEntry> = self.catalog.iter().collect();
        entries.sort_by(|a, b| {
            b.popularity
                .partial_cmp(&a.popularity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries
    }

    /// First ranked candidate not yet served; the top candidate again when
    /// every one has been (policy-gated).
    fn pick_novel(&self, ranked: &[&CatalogEntry], history: &History) -> Option<CatalogEntry> {
        for entry in ranked {
            if !history.contains(&entry.title, &entry.artist) {
                return Some((*entry).clone());
            }
        }
        if self.config.repeat_when_exhausted {
            debug!("All ranked candidates already served, repeating the top entry");
            ranked.first().map(|e| (*e).clone())
        } else {
            None
        }
    }
}

/// Artist/title candidate filter: exact matches preferred, fuzzy fallback,
/// substring containment in between.
fn filter_identity<'a>(
    candidates: Vec<&'a CatalogEntry>,
    query: &str,
    cutoff: f64,
) -> Vec<&'a CatalogEntry> {
    let query = query.to_lowercase();

    let exact: Vec<&CatalogEntry> = candidates
        .iter()
        .copied()
        .filter(|e| {
            e.artist.eq_ignore_ascii_case(&query) || e.title.eq_ignore_ascii_case(&query)
        })
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    let containing: Vec<&CatalogEntry> = candidates
        .iter()
        .copied()
        .filter(|e| {
            e.artist.to_lowercase().contains(&query) || e.title.to_lowercase().contains(&query)
        })
        .collect();
    if !containing.is_empty() {
        return containing;
    }

    candidates
        .into_iter()
        .filter(|e| {
            strsim::jaro_winkler(&e.artist.to_lowercase(), &query) >= cutoff
                || strsim::jaro_winkler(&e.title.to_lowercase(), &query) >= cutoff
        })
        .collect()
}

/// Additive heuristic score combining attribute matches and popularity.
#[must_use]
fn weighted_score(entry: &CatalogEntry, prefs: &Preferences, weights: &ScoringWeights) -> f64 {
    let mut score = 0.0;

    if let Some(genre) = &prefs.genre {
        if entry.genre.to_lowercase().contains(genre) {
            score += weights.genre_match;
        }
    }

    if let Some(mood) = &prefs.mood {
        score += mood_contribution(mood, &entry.mood_key, weights);
    }

    if let Some(tempo) = prefs.tempo {
        if entry.tempo_category == tempo {
            score += weights.tempo_match;
        } else if entry.tempo_category.is_opposite(tempo) {
            score += weights.tempo_mismatch_penalty;
        }
    }

    if let Some(query) = &prefs.artist_or_song {
        if entry.artist.to_lowercase().contains(query) || entry.title.to_lowercase().contains(query)
        {
            score += weights.identity_match;
        }
    }

    score + entry.popularity / weights.popularity_divisor
}

/// Mood scoring with polarity sets: a direct (substring) match or a
/// same-polarity match earns the full bonus; opposite polarity is penalized.
fn mood_contribution(pref_mood: &str, entry_mood_key: &str, weights: &ScoringWeights) -> f64 {
    let key = entry_mood_key.to_lowercase();
    if key.contains(pref_mood) {
        return weights.mood_match;
    }

    let pref_sad = SAD_LIKE.contains(&pref_mood);
    let pref_happy = HAPPY_LIKE.contains(&pref_mood);
    let key_sad = SAD_LIKE.iter().any(|m| key.contains(m));
    let key_happy = HAPPY_LIKE.iter().any(|m| key.contains(m));

    if (pref_sad && key_sad) || (pref_happy && key_happy) {
        weights.mood_match
    } else if (pref_sad && key_happy) || (pref_happy && key_sad) {
        weights.mood_mismatch_penalty
    } else {
        0.0
    }
}
