//! Per-conversation state: preference fields, feedback phase, and the
//! bounded history of already-served songs.
//!
//! Sessions are created lazily on first use and live only for the process
//! lifetime. The store hands out one lock per session id, so turns for the
//! same conversation serialize while different conversations never block
//! each other beyond the map lookup.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Default cap on remembered (title, artist) pairs per session.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Tri-state preference field. The invalid "value set and no-preference at
/// the same time" state cannot be constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum PrefField {
    #[default]
    Unresolved,
    NoPreference,
    Value(String),
}

impl PrefField {
    /// A field counts as resolved with either a concrete value or an
    /// explicit no-preference marker.
    #[must_use]
    pub fn resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// The four preference fields, in the fixed order follow-up questions use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefKind {
    Genre,
    Mood,
    Tempo,
    ArtistOrSong,
}

impl PrefKind {
    /// Question order: genre, mood, tempo, artist/song. First unresolved
    /// wins when the controller picks what to ask next.
    pub const ALL: [PrefKind; 4] = [
        PrefKind::Genre,
        PrefKind::Mood,
        PrefKind::Tempo,
        PrefKind::ArtistOrSong,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Genre => "genre",
            Self::Mood => "mood",
            Self::Tempo => "tempo",
            Self::ArtistOrSong => "artist or song",
        }
    }

    /// Map a command word to a field. "artist" and "song" both address the
    /// combined artist-or-song field.
    #[must_use]
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "genre" => Some(Self::Genre),
            "mood" => Some(Self::Mood),
            "tempo" => Some(Self::Tempo),
            "artist" | "song" => Some(Self::ArtistOrSong),
            _ => None,
        }
    }
}

impl fmt::Display for PrefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insertion-ordered, de-duplicated, capacity-bounded record of served
/// (title, artist) pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    pairs: VecDeque<(String, String)>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl History {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pairs: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Idempotent append: a pair already present is left where it first
    /// appeared. Oldest entries are evicted once the capacity is exceeded.
    pub fn push(&mut self, pair: (String, String)) {
        if self.pairs.contains(&pair) {
            return;
        }
        self.pairs.push_back(pair);
        while self.pairs.len() > self.capacity {
            self.pairs.pop_front();
        }
    }

    #[must_use]
    pub fn contains(&self, title: &str, artist: &str) -> bool {
        self.pairs
            .iter()
            .any(|(t, a)| t == title && a == artist)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.pairs.iter()
    }
}

/// One conversation's mutable state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub genre: PrefField,
    pub mood: PrefField,
    pub tempo: PrefField,
    pub artist_or_song: PrefField,
    /// True exactly while the last served recommendation awaits feedback.
    pub awaiting_feedback: bool,
    /// Number of follow-up questions asked in the current collection phase.
    pub followup_count: u32,
    pub history: History,
    pub last_song: Option<String>,
    pub last_artist: Option<String>,
}

impl Session {
    #[must_use]
    pub fn field(&self, kind: PrefKind) -> &PrefField {
        match kind {
            PrefKind::Genre => &self.genre,
            PrefKind::Mood => &self.mood,
            PrefKind::Tempo => &self.tempo,
            PrefKind::ArtistOrSong => &self.artist_or_song,
        }
    }

    pub fn field_mut(&mut self, kind: PrefKind) -> &mut PrefField {
        match kind {
            PrefKind::Genre => &mut self.genre,
            PrefKind::Mood => &mut self.mood,
            PrefKind::Tempo => &mut self.tempo,
            PrefKind::ArtistOrSong => &mut self.artist_or_song,
        }
    }

    /// All four fields resolved is the precondition for recommending.
    #[must_use]
    pub fn all_resolved(&self) -> bool {
        PrefKind::ALL.iter().all(|&k| self.field(k).resolved())
    }

    /// First unresolved field in question order, if any.
    #[must_use]
    pub fn first_unresolved(&self) -> Option<PrefKind> {
        PrefKind::ALL
            .into_iter()
            .find(|&k| !self.field(k).resolved())
    }

    /// Clear one field back to unresolved (both value and no-preference).
    pub fn clear_field(&mut self, kind: PrefKind) {
        *self.field_mut(kind) = PrefField::Unresolved;
    }

    /// Remember the just-served song for feedback-driven re-exclusion.
    pub fn set_last_served(&mut self, title: &str, artist: &str) {
        self.last_song = Some(title.to_string());
        self.last_artist = Some(artist.to_string());
    }
}

/// Concurrency-safe keyed session storage with per-id locking.
///
/// The outer map lock is held only long enough to fetch or insert the
/// per-session handle; turn processing locks the individual session.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the handle for `id`, inserting empty defaults on first use.
    /// Never fails.
    pub fn get_or_create(&self, id: &str) -> Arc<Mutex<Session>> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::default())))
            .clone()
    }

    /// Apply a single atomic mutation to the session for `id`.
    pub fn update<F>(&self, id: &str, mutate: F)
    where
        F: FnOnce(&mut Session),
    {
        let handle = self.get_or_create(id);
        let mut session = handle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        mutate(&mut session);
    }

    /// Replace the session for `id` wholesale.
    pub fn replace(&self, id: &str, session: Session) {
        let handle = self.get_or_create(id);
        *handle.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = session;
    }

    /// Reset the session for `id` back to empty defaults. Idempotent.
    pub fn reset(&self, id: &str) {
        self.replace(id, Session::default());
    }

    /// Read-only diagnostic copy of the session for `id`.
    #[must_use]
    pub fn snapshot(&self, id: &str) -> Session {
        let handle = self.get_or_create(id);
        let session = handle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        session.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pref_field_resolution() {
        assert!(!PrefField::Unresolved.resolved());
        assert!(PrefField::NoPreference.resolved());
        assert!(PrefField::Value("rock".to_string()).resolved());
        assert_eq!(PrefField::Value("rock".to_string()).value(), Some("rock"));
        assert_eq!(PrefField::NoPreference.value(), None);
    }

    #[test]
    fn test_first_unresolved_follows_question_order() {
        let mut session = Session::default();
        assert_eq!(session.first_unresolved(), Some(PrefKind::Genre));

        session.genre = PrefField::Value("rock".to_string());
        assert_eq!(session.first_unresolved(), Some(PrefKind::Mood));

        session.mood = PrefField::NoPreference;
        session.tempo = PrefField::Value("fast".to_string());
        assert_eq!(session.first_unresolved(), Some(PrefKind::ArtistOrSong));

        session.artist_or_song = PrefField::NoPreference;
        assert_eq!(session.first_unresolved(), None);
        assert!(session.all_resolved());
    }

    #[test]
    fn test_history_deduplicates() {
        let mut history = History::default();
        let pair = ("Song".to_string(), "Artist".to_string());
        history.push(pair.clone());
        history.push(pair.clone());
        history.push(pair);

        assert_eq!(history.len(), 1, "Duplicate pairs must not be re-added");
        assert!(history.contains("Song", "Artist"));
    }

    #[test]
    fn test_history_evicts_oldest_at_capacity() {
        let mut history = History::with_capacity(3);
        for i in 0..5 {
            history.push((format!("Song {i}"), "Artist".to_string()));
        }

        assert_eq!(history.len(), 3);
        assert!(!history.contains("Song 0", "Artist"), "Oldest entry should be evicted");
        assert!(!history.contains("Song 1", "Artist"));
        assert!(history.contains("Song 4", "Artist"));

        // Order of first occurrence is preserved for the survivors.
        let titles: Vec<&str> = history.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(titles, vec!["Song 2", "Song 3", "Song 4"]);
    }

    #[test]
    fn test_store_get_or_create_is_lazy_and_stable() {
        let store = SessionStore::new();
        let a = store.get_or_create("abc");
        let b = store.get_or_create("abc");
        assert!(Arc::ptr_eq(&a, &b), "Same id must map to the same session handle");

        let other = store.get_or_create("xyz");
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn test_store_reset_is_idempotent() {
        let store = SessionStore::new();
        store.update("abc", |s| {
            s.genre = PrefField::Value("jazz".to_string());
            s.awaiting_feedback = true;
            s.followup_count = 3;
        });

        store.reset("abc");
        let once = store.snapshot("abc");
        store.reset("abc");
        let twice = store.snapshot("abc");

        assert_eq!(once.genre, PrefField::Unresolved);
        assert!(!once.awaiting_feedback);
        assert_eq!(once.followup_count, 0);
        assert_eq!(format!("{once:?}"), format!("{twice:?}"), "Double reset equals single reset");
    }

    #[test]
    fn test_concurrent_sessions_do_not_interfere() {
        use std::thread;

        let store = Arc::new(SessionStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                let id = format!("session-{i}");
                for _ in 0..100 {
                    store.update(&id, |s| s.followup_count += 1);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }

        for i in 0..8 {
            let snapshot = store.snapshot(&format!("session-{i}"));
            assert_eq!(snapshot.followup_count, 100);
        }
    }
}
