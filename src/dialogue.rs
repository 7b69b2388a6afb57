//! Turn-by-turn conversation state machine.
//!
//! Each session is either collecting preferences or awaiting feedback on a
//! served song. Feedback commands are classified against an ordered
//! predicate table so that a message matching several patterns resolves the
//! same way every time.

use crate::catalog::{Catalog, CatalogEntry};
use crate::engine::{Preferences, RecommendationEngine};
use crate::extractor::{Extraction, KnownVocab, MatchThresholds, PreferenceExtractor};
use crate::llm::{template_reply, ReplyGenerator, SemanticClassifier};
use crate::session::{PrefField, PrefKind, Session, SessionStore};
use log::{debug, info, warn};

lazy_static::lazy_static! {
    static ref ANOTHER_PHRASES: Vec<&'static str> = vec![
        "another", "again", "next", "next one", "something else",
        "different song", "one more", "skip",
    ];

    static ref NEGATIVE_PHRASES: Vec<&'static str> = vec![
        "no", "nope", "nah", "not really", "try again", "dont like",
        "don't like", "not a fan", "not my thing", "meh",
    ];

    static ref POSITIVE_PHRASES: Vec<&'static str> = vec![
        "yes", "yep", "yeah", "love it", "love this", "great", "perfect",
        "awesome", "nice", "good one", "thanks", "thank you", "i like it",
    ];

    static ref RESET_PHRASES: Vec<&'static str> = vec![
        "reset", "start over", "start again", "from scratch", "clear everything",
    ];
}

/// What one processed turn produced, in the shape the transport layer
/// forwards to the user.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub recommendation: Option<CatalogEntry>,
    pub session: Session,
}

/// Feedback-phase commands in classification priority order. A message that
/// names a field to change wins even when it also carries a reset phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    ChangeField(PrefKind),
    Reset,
    Another,
    Negative,
    Positive,
    Unrecognized,
}

/// Orchestrates extraction, state transitions, and the engine for every
/// inbound turn. One instance serves all sessions.
pub struct DialogueController {
    store: SessionStore,
    engine: RecommendationEngine,
    classifier: Box<dyn SemanticClassifier>,
    reply_generator: Box<dyn ReplyGenerator>,
    vocab: KnownVocab,
    thresholds: MatchThresholds,
}

impl DialogueController {
    #[must_use]
    pub fn new(
        catalog: Catalog,
        engine: RecommendationEngine,
        classifier: Box<dyn SemanticClassifier>,
        reply_generator: Box<dyn ReplyGenerator>,
    ) -> Self {
        Self {
            store: SessionStore::new(),
            engine,
            classifier,
            reply_generator,
            vocab: KnownVocab::from_catalog(&catalog),
            thresholds: MatchThresholds::default(),
        }
    }

    /// Process one free-text turn for `session_id`. The session lock is held
    /// for the whole turn, so turns for the same id are strictly serialized;
    /// the final state is written back only after the decision is complete.
    pub fn handle_turn(&self, session_id: &str, utterance: &str) -> TurnOutcome {
        let handle = self.store.get_or_create(session_id);
        let mut guard = handle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut session = guard.clone();

        let outcome = if session.awaiting_feedback {
            self.feedback_turn(session, utterance)
        } else if contains_any_phrase(utterance, &RESET_PHRASES) {
            session = Session::default();
            info!("Session {session_id} reset on request");
            self.respond(session, fresh_start_text(), None)
        } else {
            self.collecting_turn(session, utterance)
        };

        *guard = outcome.session.clone();
        outcome
    }

    /// Commands share the turn pipeline; the classification table inside
    /// [`handle_turn`] gives them priority over free-text extraction.
    pub fn handle_command(&self, session_id: &str, command_text: &str) -> TurnOutcome {
        self.handle_turn(session_id, command_text)
    }

    /// Drop all state for `session_id`. Idempotent.
    pub fn reset(&self, session_id: &str) {
        self.store.reset(session_id);
    }

    /// Read-only diagnostic view of a session.
    #[must_use]
    pub fn session_snapshot(&self, session_id: &str) -> Session {
        self.store.snapshot(session_id)
    }

    fn collecting_turn(&self, mut session: Session, utterance: &str) -> TurnOutcome {
        let extraction = self.extract(utterance);

        if extraction.not_target_language {
            return self.respond(
                session,
                "I only understand English for now. Could you tell me in English what \
                 you'd like to hear?"
                    .to_string(),
                None,
            );
        }
        if extraction.off_topic && !extraction.has_any_value() {
            return self.respond(
                session,
                "I'm all about music! Tell me a genre, a mood, or an artist and I'll \
                 find you a song."
                    .to_string(),
                None,
            );
        }

        let changed = apply_extraction(&mut session, &extraction);

        if session.all_resolved() {
            session.followup_count = 0;
            return self.recommend_into(session);
        }

        session.followup_count += 1;
        let kind = session
            .first_unresolved()
            .unwrap_or(PrefKind::Genre);
        let mut reply = question_for(kind).to_string();
        if changed == 0 {
            reply = format!("I didn't quite catch that. {reply}");
        }
        self.respond(session, reply, None)
    }

    fn feedback_turn(&self, mut session: Session, utterance: &str) -> TurnOutcome {
        match classify_command(utterance) {
            Command::ChangeField(kind) => {
                session.clear_field(kind);
                session.awaiting_feedback = false;
                debug!("Cleared {} on change command", kind.as_str());
                let reply = format!("Sure, let's pick a new {}. {}", kind.as_str(), question_for(kind));
                self.respond(session, reply, None)
            }
            Command::Reset => {
                info!("Session reset on request");
                self.respond(Session::default(), fresh_start_text(), None)
            }
            Command::Another | Command::Negative => {
                if let (Some(title), Some(artist)) = (&session.last_song, &session.last_artist) {
                    session.history.push((title.clone(), artist.clone()));
                }
                self.recommend_into(session)
            }
            Command::Positive => {
                session.awaiting_feedback = false;
                self.respond(
                    session,
                    "Glad you liked it! Say \"change genre\" (or mood, tempo, artist) to \
                     adjust, or just tell me what you're in the mood for."
                        .to_string(),
                    None,
                )
            }
            Command::Unrecognized => {
                let extraction = self.extract(utterance);
                if extraction.not_target_language {
                    return self.respond(
                        session,
                        "I only understand English for now. Could you tell me in English \
                         what you'd like to change?"
                            .to_string(),
                        None,
                    );
                }
                if extraction.has_any_value() {
                    // Embedded preference: overwrite and re-recommend.
                    apply_embedded_values(&mut session, &extraction);
                    return self.recommend_into(session);
                }
                if extraction.off_topic {
                    return self.respond(
                        session,
                        "I'm all about music! Tell me a genre, a mood, or an artist and \
                         I'll find you a song."
                            .to_string(),
                        None,
                    );
                }
                self.respond(session, help_text(), None)
            }
        }
    }

    fn extract(&self, utterance: &str) -> Extraction {
        PreferenceExtractor::new(self.classifier.as_ref())
            .with_thresholds(self.thresholds)
            .extract(utterance, &self.vocab)
    }

    /// Run the engine against the session's preferences, record the result,
    /// and move to the feedback phase.
    fn recommend_into(&self, mut session: Session) -> TurnOutcome {
        let prefs = Preferences::from_session(&session);
        let mut history = session.history.clone();

        match self.engine.recommend(&prefs, &mut history) {
            Some(song) => {
                session.history = history;
                session.set_last_served(&song.title, &song.artist);
                session.awaiting_feedback = true;
                session.followup_count = 0;

                let reply = self
                    .reply_generator
                    .describe(&song, &session)
                    .unwrap_or_else(|err| {
                        warn!("Reply generation failed, using template: {err:#}");
                        template_reply(&song)
                    });
                self.respond(session, reply, Some(song))
            }
            None => {
                warn!("Recommendation requested against an empty catalog");
                self.respond(
                    session,
                    "I don't have any songs loaded right now, so I can't make a pick."
                        .to_string(),
                    None,
                )
            }
        }
    }

    fn respond(
        &self,
        session: Session,
        reply: String,
        recommendation: Option<CatalogEntry>,
    ) -> TurnOutcome {
        TurnOutcome {
            reply,
            recommendation,
            session,
        }
    }
}

/// Ordered predicate table: change-field, reset, another, negative,
/// positive. Embedded-preference and help fallback are handled by the caller
/// once every pattern here has missed.
fn classify_command(text: &str) -> Command {
    let lowered = text.to_lowercase();

    if lowered.contains("change") || lowered.contains("switch") {
        for word in lowered.split_whitespace() {
            if let Some(kind) = PrefKind::parse(word) {
                return Command::ChangeField(kind);
            }
        }
    }
    if contains_any_phrase(&lowered, &RESET_PHRASES) {
        return Command::Reset;
    }
    if contains_any_phrase(&lowered, &ANOTHER_PHRASES) {
        return Command::Another;
    }
    if contains_any_phrase(&lowered, &NEGATIVE_PHRASES) {
        return Command::Negative;
    }
    if contains_any_phrase(&lowered, &POSITIVE_PHRASES) {
        return Command::Positive;
    }
    Command::Unrecognized
}

/// Padded whole-phrase containment after flattening punctuation, so "no,
/// not really" matches "no" but "nothing" does not.
fn contains_any_phrase(text: &str, phrases: &[&str]) -> bool {
    let flattened: String = text
        .to_lowercase()
        .chars()
        .map(|c| if ",.!?;:".contains(c) { ' ' } else { c })
        .collect();
    let padded = format!(" {flattened} ");
    phrases
        .iter()
        .any(|phrase| padded.contains(&format!(" {phrase} ")))
}

fn question_for(kind: PrefKind) -> &'static str {
    match kind {
        PrefKind::Genre => "What genre are you in the mood for? Rock, pop, jazz, something else?",
        PrefKind::Mood => "How are you feeling right now? Happy, chill, melancholy?",
        PrefKind::Tempo => "Do you want something slow, medium, or fast?",
        PrefKind::ArtistOrSong => {
            "Any particular artist or song I should stay close to? \
             Say \"no preference\" if not."
        }
    }
}

fn fresh_start_text() -> String {
    "Fresh start! What genre are you in the mood for?".to_string()
}

fn help_text() -> String {
    "Here's what you can say: \"another\" for a different song, \"change genre\" \
     (or mood, tempo, artist) to adjust one preference, \"reset\" to start over, \
     or let me know you like this one."
        .to_string()
}

fn extraction_pairs(extraction: &Extraction) -> [(PrefKind, &PrefField); 4] {
    [
        (PrefKind::Genre, &extraction.genre),
        (PrefKind::Mood, &extraction.mood),
        (PrefKind::Tempo, &extraction.tempo),
        (PrefKind::ArtistOrSong, &extraction.artist_or_song),
    ]
}

/// Collecting phase: copy resolved extraction fields into still-open session
/// fields, leaving anything already settled alone. Returns how many fields
/// changed.
fn apply_extraction(session: &mut Session, extraction: &Extraction) -> usize {
    let mut changed = 0;
    for (kind, incoming) in extraction_pairs(extraction) {
        if !incoming.resolved() {
            continue;
        }
        let slot = session.field_mut(kind);
        if !slot.resolved() {
            *slot = incoming.clone();
            changed += 1;
        }
    }
    changed
}

/// Feedback phase: an embedded preference overwrites with concrete values
/// only. A no-preference marker riding along ("any pop") must not clear a
/// field the session already settled.
fn apply_embedded_values(session: &mut Session, extraction: &Extraction) -> usize {
    let mut changed = 0;
    for (kind, incoming) in extraction_pairs(extraction) {
        if let PrefField::Value(_) = incoming {
            *session.field_mut(kind) = incoming.clone();
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, CatalogEntry, FeatureVector, TempoCategory};
    use crate::llm::{Classification, NullClassifier, TableMoodResolver, TemplateReplyGenerator};
    use anyhow::bail;

    struct TimeoutClassifier;

    impl SemanticClassifier for TimeoutClassifier {
        fn classify(&self, _message: &str) -> anyhow::Result<Classification> {
            bail!("request timed out")
        }
    }

    struct OffTopicClassifier;

    impl SemanticClassifier for OffTopicClassifier {
        fn classify(&self, _message: &str) -> anyhow::Result<Classification> {
            Ok(Classification {
                off_topic: true,
                ..Classification::default()
            })
        }
    }

    fn song(
        id: u32,
        title: &str,
        artist: &str,
        genre: &str,
        mood_key: &str,
        bpm: f64,
        popularity: f64,
    ) -> CatalogEntry {
        CatalogEntry {
            id,
            title: title.to_string(),
            artist: artist.to_string(),
            genre: genre.to_string(),
            mood_key: mood_key.to_string(),
            tempo_category: TempoCategory::from_bpm(bpm),
            bpm,
            popularity,
            features: FeatureVector([0.5, 0.8, 0.6, 0.2, 0.7]),
        }
    }

    fn test_catalog() -> Catalog {
        Catalog::new(vec![
            song(1, "Thunderstruck", "AC/DC", "rock", "energetic", 134.0, 82.0),
            song(2, "Back in Black", "AC/DC", "rock", "energetic", 126.0, 85.0),
            song(3, "Someone Like You", "Adele", "pop", "sad", 67.0, 90.0),
            song(4, "Clair de Lune", "Debussy", "classical", "calm", 66.0, 70.0),
        ])
    }

    fn controller_with(classifier: Box<dyn SemanticClassifier>) -> DialogueController {
        let catalog = test_catalog();
        let engine =
            RecommendationEngine::new(catalog.clone(), Box::new(TableMoodResolver::local()));
        DialogueController::new(catalog, engine, classifier, Box::new(TemplateReplyGenerator))
    }

    fn controller() -> DialogueController {
        controller_with(Box::new(NullClassifier))
    }

    fn resolve_all(c: &DialogueController, id: &str) -> TurnOutcome {
        c.handle_turn(id, "rock please");
        c.handle_turn(id, "feeling energetic");
        c.handle_turn(id, "fast");
        c.handle_turn(id, "no preference")
    }

    #[test]
    fn test_partial_extraction_asks_for_first_missing_field() {
        let c = controller();
        let outcome = c.handle_turn("s1", "I want something happy and fast");

        assert_eq!(outcome.session.mood, PrefField::Value("happy".to_string()));
        assert_eq!(outcome.session.tempo, PrefField::Value("fast".to_string()));
        assert!(!outcome.session.genre.resolved());
        assert!(!outcome.session.artist_or_song.resolved());
        assert!(outcome.recommendation.is_none());
        assert!(
            outcome.reply.to_lowercase().contains("genre"),
            "First unresolved field is genre, reply was: {}",
            outcome.reply
        );
    }

    #[test]
    fn test_all_resolved_serves_a_song_and_awaits_feedback() {
        let c = controller();
        let outcome = resolve_all(&c, "s1");

        let rec = outcome.recommendation.expect("all fields resolved must recommend");
        assert_eq!(rec.genre, "rock");
        assert!(outcome.session.awaiting_feedback);
        assert_eq!(outcome.session.followup_count, 0);
        assert!(outcome.session.history.contains(&rec.title, &rec.artist));
    }

    #[test]
    fn test_change_field_clears_and_returns_to_collecting() {
        let c = controller();
        resolve_all(&c, "s1");

        let outcome = c.handle_turn("s1", "change genre");
        assert!(!outcome.session.awaiting_feedback);
        assert!(!outcome.session.genre.resolved());
        assert!(outcome.session.mood.resolved(), "Only the named field clears");
        assert!(outcome.recommendation.is_none());
    }

    #[test]
    fn test_change_field_outranks_reset_in_feedback() {
        let c = controller();
        resolve_all(&c, "s1");

        let outcome = c.handle_turn("s1", "change genre and start over");
        assert!(!outcome.session.genre.resolved(), "Named field clears");
        assert_eq!(
            outcome.session.mood,
            PrefField::Value("energetic".to_string()),
            "The rest of the session must survive a change command"
        );
        assert!(!outcome.session.awaiting_feedback);
        assert!(outcome.recommendation.is_none());
    }

    #[test]
    fn test_another_exhausts_then_repeats() {
        let c = controller();
        let first = resolve_all(&c, "s1").recommendation.expect("first pick");

        let second = c.handle_turn("s1", "another").recommendation.expect("second pick");
        assert_ne!(first.title, second.title);

        // Only two rock songs exist: the next request must repeat, not fail.
        let third = c.handle_turn("s1", "another").recommendation.expect("repeat pick");
        assert!(third.title == first.title || third.title == second.title);
        assert!(c.session_snapshot("s1").awaiting_feedback);
    }

    #[test]
    fn test_negative_feedback_acts_like_another() {
        let c = controller();
        let first = resolve_all(&c, "s1").recommendation.expect("first pick");

        let outcome = c.handle_turn("s1", "no, not really");
        let next = outcome.recommendation.expect("negative feedback re-recommends");
        assert_ne!(first.title, next.title);
    }

    #[test]
    fn test_positive_feedback_acknowledges_without_recommending() {
        let c = controller();
        resolve_all(&c, "s1");

        let outcome = c.handle_turn("s1", "great, thanks!");
        assert!(outcome.recommendation.is_none());
        assert!(!outcome.session.awaiting_feedback);
    }

    #[test]
    fn test_embedded_preference_re_recommends() {
        let c = controller();
        resolve_all(&c, "s1");

        let outcome = c.handle_turn("s1", "make it pop instead");
        assert_eq!(outcome.session.genre, PrefField::Value("pop".to_string()));
        let rec = outcome.recommendation.expect("embedded preference re-recommends");
        assert_eq!(rec.genre, "pop");
        assert!(outcome.session.awaiting_feedback);
    }

    #[test]
    fn test_embedded_no_preference_keeps_settled_fields() {
        let c = controller();
        resolve_all(&c, "s1");

        let outcome = c.handle_turn("s1", "any pop");
        assert_eq!(outcome.session.genre, PrefField::Value("pop".to_string()));
        assert_eq!(
            outcome.session.mood,
            PrefField::Value("energetic".to_string()),
            "A no-preference marker riding along must not clear a settled field"
        );
        assert_eq!(outcome.session.tempo, PrefField::Value("fast".to_string()));
        let rec = outcome.recommendation.expect("embedded preference re-recommends");
        assert_eq!(rec.genre, "pop");
    }

    #[test]
    fn test_off_topic_feedback_redirects_to_music() {
        let c = controller_with(Box::new(OffTopicClassifier));
        resolve_all(&c, "s1");

        let outcome = c.handle_turn("s1", "what is the weather tomorrow");
        assert!(outcome.recommendation.is_none());
        assert!(
            outcome.session.awaiting_feedback,
            "Redirect leaves the state unchanged"
        );
        assert!(
            outcome.reply.to_lowercase().contains("music"),
            "Off-topic input steers back to music, got: {}",
            outcome.reply
        );
    }

    #[test]
    fn test_unrecognized_feedback_gets_help() {
        let c = controller();
        resolve_all(&c, "s1");

        let outcome = c.handle_turn("s1", "quux flurble");
        assert!(outcome.recommendation.is_none());
        assert!(outcome.session.awaiting_feedback, "Help leaves the state unchanged");
        assert!(outcome.reply.contains("another"), "Help lists the commands");
    }

    #[test]
    fn test_reset_is_idempotent() {
        let c = controller();
        resolve_all(&c, "s1");

        let once = c.handle_turn("s1", "reset").session;
        let twice = c.handle_turn("s1", "reset").session;
        assert!(!once.genre.resolved());
        assert_eq!(once.history.len(), 0);
        assert_eq!(format!("{once:?}"), format!("{twice:?}"));
    }

    #[test]
    fn test_classifier_timeout_degrades_to_clarifying_prompt() {
        let c = controller_with(Box::new(TimeoutClassifier));
        let outcome = c.handle_turn("s1", "zorp venk blarg");

        assert!(outcome.recommendation.is_none());
        assert!(!outcome.session.genre.resolved());
        assert!(
            outcome.reply.contains("didn't quite catch"),
            "Unmatched input plus a failing classifier yields a clarifying prompt"
        );
    }

    #[test]
    fn test_one_question_per_turn_in_fixed_order() {
        let c = controller();
        let q1 = c.handle_turn("s1", "rock").reply.to_lowercase();
        assert!(q1.contains("feeling"), "Mood asked after genre, got: {q1}");

        let q2 = c.handle_turn("s1", "happy").reply.to_lowercase();
        assert!(q2.contains("slow, medium, or fast"), "Tempo asked third, got: {q2}");

        let q3 = c.handle_turn("s1", "fast").reply.to_lowercase();
        assert!(q3.contains("artist"), "Artist asked last, got: {q3}");
        assert_eq!(c.session_snapshot("s1").followup_count, 3);
    }

    #[test]
    fn test_sessions_are_independent() {
        let c = controller();
        resolve_all(&c, "a");
        c.handle_turn("b", "jazz");

        assert!(c.session_snapshot("a").awaiting_feedback);
        let b = c.session_snapshot("b");
        assert!(!b.awaiting_feedback);
        assert_eq!(b.genre, PrefField::Value("jazz".to_string()));
    }
}
