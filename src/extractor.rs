//! Free-text preference extraction.
//!
//! A pure function of the message text plus the known vocabulary: the caller
//! applies the result to the session. Local signals (no-preference phrases,
//! vague-phrase mood mapping, vocabulary fuzzy matching) run first; the
//! external classifier is consulted only for what remains, and its failure
//! leaves fields unresolved instead of erroring.

use crate::catalog::{Catalog, TempoCategory};
use crate::llm::SemanticClassifier;
use crate::session::PrefField;
use log::{debug, warn};
use std::collections::HashSet;

lazy_static::lazy_static! {
    /// Closed genre vocabulary. Classifier output is corrected against this
    /// set; anything outside it is dropped.
    pub static ref GENRES: HashSet<&'static str> = [
        "pop", "rock", "classical", "jazz", "metal", "electronic", "hip hop",
        "rap", "r&b", "lofi", "latin", "folk", "reggae", "country", "blues",
        "indie",
    ]
    .into_iter()
    .collect();

    /// Closed mood vocabulary.
    pub static ref MOODS: HashSet<&'static str> = [
        "happy", "sad", "energetic", "calm", "nostalgic", "romantic", "angry",
        "hopeful", "mellow", "funky", "anxious", "relaxed", "bittersweet",
        "uplifting", "melancholy", "dreamy", "groovy", "chilled", "moody",
        "dark", "powerful", "rebellious", "relaxing", "intense", "soulful",
        "epic", "bright", "mysterious", "passionate", "sensual", "tropical",
        "atmospheric", "playful", "fierce", "gritty", "peaceful", "chill",
        "smooth", "melancholic",
    ]
    .into_iter()
    .collect();

    /// Phrases that signal "no preference" for whatever is being asked.
    /// "no prefernce" catches a frequent typo.
    static ref NO_PREF_PHRASES: Vec<&'static str> = vec![
        "no preference", "no specific preference", "no prefernce",
        "doesn't matter", "does not matter", "doesn't matter to me",
        "anything is fine", "i don't care", "i don't mind", "up to you",
        "whatever works", "whatever", "all good", "not really",
        "anything", "nothing", "any", "none", "nah", "no",
    ];

    /// Vague phrasings mapped straight to a mood (and sometimes a tempo)
    /// before any fuzzy matching or classification runs.
    static ref VAGUE_TO_MOOD: Vec<(&'static str, &'static str)> = vec![
        ("something good", "happy"),
        ("something fun", "happy"),
        ("something sad", "sad"),
        ("more energy", "energetic"),
        ("positive", "happy"),
        ("uplifting", "uplifting"),
        ("energetic", "energetic"),
        ("energy", "energetic"),
        ("chill", "chill"),
        ("calm", "calm"),
    ];
}

/// Similarity cutoffs for vocabulary-constrained matching. Artist and title
/// matches use a stricter bar because a false positive locks the engine onto
/// the wrong discography.
#[derive(Debug, Clone, Copy)]
pub struct MatchThresholds {
    pub vocab: f64,
    pub identity: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            vocab: 0.72,
            identity: 0.85,
        }
    }
}

/// The names the extractor may match artist/song input against, taken from
/// the loaded catalog.
#[derive(Debug, Clone, Default)]
pub struct KnownVocab {
    pub genres: Vec<String>,
    pub artists: Vec<String>,
    pub titles: Vec<String>,
}

impl KnownVocab {
    /// Collect the distinct genres, artists, and titles of a catalog, in
    /// catalog order.
    #[must_use]
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut artists: Vec<String> = Vec::new();
        let mut titles: Vec<String> = Vec::new();
        for entry in catalog.iter() {
            if !artists.contains(&entry.artist) {
                artists.push(entry.artist.clone());
            }
            if !titles.contains(&entry.title) {
                titles.push(entry.title.clone());
            }
        }
        Self {
            genres: catalog.genres(),
            artists,
            titles,
        }
    }
}

/// Result of one extraction pass. Field semantics mirror the session's
/// tri-state; the caller applies values to unresolved fields only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub genre: PrefField,
    pub mood: PrefField,
    pub tempo: PrefField,
    pub artist_or_song: PrefField,
    pub not_target_language: bool,
    pub off_topic: bool,
}

impl Extraction {
    /// True when any field carries a concrete value (not just no-preference).
    #[must_use]
    pub fn has_any_value(&self) -> bool {
        [&self.genre, &self.mood, &self.tempo, &self.artist_or_song]
            .iter()
            .any(|f| f.value().is_some())
    }

    fn undetermined(&self) -> bool {
        [&self.genre, &self.mood, &self.tempo, &self.artist_or_song]
            .iter()
            .any(|f| !f.resolved())
    }
}

/// Maps a free-text utterance to a partial, normalized preference update.
pub struct PreferenceExtractor<'a> {
    classifier: &'a dyn SemanticClassifier,
    thresholds: MatchThresholds,
}

impl<'a> PreferenceExtractor<'a> {
    #[must_use]
    pub fn new(classifier: &'a dyn SemanticClassifier) -> Self {
        Self {
            classifier,
            thresholds: MatchThresholds::default(),
        }
    }

    #[must_use]
    pub fn with_thresholds(mut self, thresholds: MatchThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Extract preferences from `text`. Pure with respect to session state;
    /// never fails — classifier errors degrade to unresolved fields.
    #[must_use]
    pub fn extract(&self, text: &str, vocab: &KnownVocab) -> Extraction {
        let msg = text.trim().to_lowercase();
        let mut extraction = Extraction::default();

        if msg.is_empty() {
            return extraction;
        }

        // 1. Detect the no-preference signal up front. Concrete values still
        //    win per field; the signal covers whatever stays open after the
        //    local pass, and suppresses the classifier entirely.
        let no_pref = is_no_pref_message(&msg);
        if no_pref {
            debug!("Message carries a no-preference signal: {msg:?}");
        }

        // 2a. Vague phrasings map straight to a mood.
        for (phrase, mood) in VAGUE_TO_MOOD.iter() {
            if msg.contains(phrase) {
                extraction.mood = PrefField::Value((*mood).to_string());
                if *mood == "energetic" {
                    extraction.tempo = PrefField::Value("fast".to_string());
                }
                break;
            }
        }

        // 2b. Vocabulary-constrained matching for the closed vocabularies.
        if !extraction.genre.resolved() {
            if let Some(genre) = match_genre(&msg, self.thresholds.vocab) {
                extraction.genre = PrefField::Value(genre);
            }
        }
        if !extraction.mood.resolved() {
            if let Some(mood) = match_vocab_word(&msg, &MOODS, self.thresholds.vocab) {
                extraction.mood = PrefField::Value(mood);
            }
        }
        if !extraction.tempo.resolved() {
            if let Some(tempo) = match_tempo(&msg, self.thresholds.vocab) {
                extraction.tempo = PrefField::Value(tempo.as_str().to_string());
            }
        }
        if !extraction.artist_or_song.resolved() {
            if let Some(name) = match_identity(&msg, vocab, self.thresholds.identity) {
                extraction.artist_or_song = PrefField::Value(name);
            }
        }

        // No-preference fills the fields local matching left open; the
        // classifier is not consulted for a message already flagged this way.
        if no_pref {
            for field in [
                &mut extraction.genre,
                &mut extraction.mood,
                &mut extraction.tempo,
                &mut extraction.artist_or_song,
            ] {
                if !field.resolved() {
                    *field = PrefField::NoPreference;
                }
            }
            return extraction;
        }

        // 3. Classifier pass for whatever local matching left open.
        if extraction.undetermined() {
            match self.classifier.classify(text) {
                Ok(classified) => {
                    if classified.not_target_language {
                        extraction.not_target_language = true;
                        return extraction;
                    }
                    if classified.off_topic {
                        extraction.off_topic = true;
                        return extraction;
                    }

                    if !extraction.genre.resolved() {
                        if let Some(genre) =
                            classified.genre.and_then(|g| correct_genre(&g, self.thresholds.vocab))
                        {
                            extraction.genre = PrefField::Value(genre);
                        }
                    }
                    if !extraction.mood.resolved() {
                        if let Some(mood) = classified
                            .mood
                            .and_then(|m| correct_word(&m, &MOODS, self.thresholds.vocab))
                        {
                            extraction.mood = PrefField::Value(mood);
                        }
                    }
                    if !extraction.tempo.resolved() {
                        if let Some(tempo) = classified.tempo.and_then(|t| TempoCategory::parse(&t))
                        {
                            extraction.tempo = PrefField::Value(tempo.as_str().to_string());
                        }
                    }
                    if !extraction.artist_or_song.resolved() {
                        if let Some(name) = classified.artist_or_song.filter(|s| !s.is_empty()) {
                            extraction.artist_or_song = PrefField::Value(name);
                        }
                    }
                }
                Err(err) => {
                    // Degrade: undetermined fields stay unresolved.
                    warn!("Semantic classifier unavailable, using local signals only: {err:#}");
                }
            }
        }

        extraction
    }
}

/// Word-boundary containment check over the fixed no-preference phrase set.
/// Punctuation is flattened so "no, not really" still matches "no".
fn is_no_pref_message(msg: &str) -> bool {
    let flattened: String = msg
        .chars()
        .map(|c| if matches!(c, ',' | '.' | '!' | '?' | ';' | ':') { ' ' } else { c })
        .collect();
    let padded = format!(" {flattened} ");
    NO_PREF_PHRASES
        .iter()
        .any(|phrase| padded.contains(&format!(" {phrase} ")))
}

/// Match one word of the message against a closed vocabulary using
/// normalized Levenshtein similarity. Exact containment wins first so
/// multi-word entries ("hip hop") are found.
fn match_vocab_word(msg: &str, vocab: &HashSet<&'static str>, cutoff: f64) -> Option<String> {
    let padded = format!(" {msg} ");
    for entry in vocab.iter() {
        if padded.contains(&format!(" {entry} ")) {
            return Some((*entry).to_string());
        }
    }

    // Fuzzy pass over individual words for typos ("jaz", "meloncholy").
    let mut best: Option<(f64, &str)> = None;
    for word in msg.split_whitespace() {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '&');
        if word.len() < 3 {
            continue;
        }
        for entry in vocab.iter() {
            let similarity = strsim::normalized_levenshtein(word, entry);
            if similarity >= cutoff && best.map_or(true, |(b, _)| similarity > b) {
                best = Some((similarity, entry));
            }
        }
    }
    best.map(|(_, entry)| entry.to_string())
}

fn match_genre(msg: &str, cutoff: f64) -> Option<String> {
    match_vocab_word(msg, &GENRES, cutoff)
}

fn match_tempo(msg: &str, cutoff: f64) -> Option<TempoCategory> {
    match_vocab_word(
        msg,
        &["slow", "medium", "fast"].into_iter().collect(),
        cutoff,
    )
    .and_then(|word| TempoCategory::parse(&word))
}

/// Correct a classifier-supplied word against a closed vocabulary; values
/// outside the vocabulary (even after fuzzing) are dropped.
fn correct_word(raw: &str, vocab: &HashSet<&'static str>, cutoff: f64) -> Option<String> {
    let raw = raw.trim().to_lowercase();
    if vocab.contains(raw.as_str()) {
        return Some(raw);
    }
    vocab
        .iter()
        .map(|entry| (strsim::normalized_levenshtein(&raw, entry), *entry))
        .filter(|(similarity, _)| *similarity >= cutoff)
        .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, entry)| entry.to_string())
}

fn correct_genre(raw: &str, cutoff: f64) -> Option<String> {
    correct_word(raw, &GENRES, cutoff)
}

/// Artist/title matching against the catalog's names. Containment of a full
/// name wins; otherwise the whole message is compared with Jaro-Winkler at
/// the strict identity cutoff, for turns that are just a name ("dua lipa").
fn match_identity(msg: &str, vocab: &KnownVocab, cutoff: f64) -> Option<String> {
    for name in vocab.artists.iter().chain(vocab.titles.iter()) {
        let lowered = name.to_lowercase();
        if lowered.len() >= 3 && msg.contains(&lowered) {
            return Some(name.clone());
        }
    }

    let mut best: Option<(f64, &String)> = None;
    for name in vocab.artists.iter().chain(vocab.titles.iter()) {
        let similarity = strsim::jaro_winkler(msg, &name.to_lowercase());
        if similarity >= cutoff && best.map_or(true, |(b, _)| similarity > b) {
            best = Some((similarity, name));
        }
    }
    best.map(|(_, name)| name.clone())
}
