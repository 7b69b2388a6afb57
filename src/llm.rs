//! External language-model collaborators, consumed strictly as injected
//! capability interfaces.
//!
//! The core never depends on these calls succeeding: every trait here has a
//! deterministic local fallback, calls run with a bounded timeout, and a
//! failure degrades to "nothing extracted" rather than an error surfacing
//! from a turn.

use crate::catalog::{CatalogEntry, FeatureVector};
use crate::session::Session;
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Sentinel the classifier returns for non-English input.
const NOT_ENGLISH: &str = "__NOT_ENGLISH__";
/// Sentinel the classifier returns for off-topic input.
const NOT_MUSIC: &str = "__NOT_MUSIC__";

/// Result of semantic preference classification. Each field is nullable;
/// the two flags are orthogonal to the fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub genre: Option<String>,
    pub mood: Option<String>,
    pub tempo: Option<String>,
    pub artist_or_song: Option<String>,
    pub not_target_language: bool,
    pub off_topic: bool,
}

/// Free text → nullable preference fields plus language/topic sentinels.
/// Network-bound and fallible; callers degrade to unresolved on error.
pub trait SemanticClassifier: Send + Sync {
    fn classify(&self, message: &str) -> Result<Classification>;
}

/// Mood word → 5-dimensional feature vector. Infallible by contract: every
/// implementation must fall back to a deterministic local table.
pub trait MoodVectorResolver: Send + Sync {
    fn resolve(&self, mood: &str) -> FeatureVector;
}

/// Selected song + preferences → one short presentation sentence.
/// Purely cosmetic; callers substitute a template on failure.
pub trait ReplyGenerator: Send + Sync {
    fn describe(&self, song: &CatalogEntry, session: &Session) -> Result<String>;
}

/// Classifier that extracts nothing. Used when no API key is configured and
/// in deterministic tests; the extractor's local vocabulary matching still
/// runs in front of it.
#[derive(Debug, Default)]
pub struct NullClassifier;

impl SemanticClassifier for NullClassifier {
    fn classify(&self, _message: &str) -> Result<Classification> {
        Ok(Classification::default())
    }
}

lazy_static::lazy_static! {
    /// Deterministic mood → feature vector table for common moods.
    /// Values are (valence, energy, danceability, acousticness, tempo).
    static ref MOOD_VECTOR_TABLE: HashMap<&'static str, FeatureVector> = {
        let mut map = HashMap::new();
        map.insert("happy", FeatureVector([0.90, 0.70, 0.80, 0.30, 0.60]));
        map.insert("sad", FeatureVector([0.20, 0.30, 0.30, 0.70, 0.30]));
        map.insert("energetic", FeatureVector([0.70, 0.95, 0.80, 0.10, 0.80]));
        map.insert("calm", FeatureVector([0.40, 0.20, 0.30, 0.80, 0.20]));
        map.insert("relaxed", FeatureVector([0.50, 0.25, 0.35, 0.70, 0.25]));
        map.insert("romantic", FeatureVector([0.60, 0.40, 0.50, 0.60, 0.40]));
        map.insert("nostalgic", FeatureVector([0.40, 0.40, 0.40, 0.60, 0.40]));
        map.insert("angry", FeatureVector([0.20, 0.90, 0.50, 0.10, 0.70]));
        map.insert("melancholy", FeatureVector([0.25, 0.30, 0.30, 0.65, 0.30]));
        map.insert("melancholic", FeatureVector([0.25, 0.30, 0.30, 0.65, 0.30]));
        map.insert("uplifting", FeatureVector([0.85, 0.75, 0.70, 0.30, 0.65]));
        map.insert("dark", FeatureVector([0.20, 0.60, 0.40, 0.30, 0.50]));
        map.insert("groovy", FeatureVector([0.70, 0.70, 0.90, 0.20, 0.60]));
        map.insert("dreamy", FeatureVector([0.50, 0.35, 0.40, 0.60, 0.35]));
        map.insert("intense", FeatureVector([0.35, 0.90, 0.50, 0.10, 0.75]));
        map.insert("peaceful", FeatureVector([0.45, 0.15, 0.25, 0.85, 0.20]));
        map.insert("chill", FeatureVector([0.45, 0.22, 0.32, 0.75, 0.22]));
        map
    };
}

/// The vector every unknown mood degrades to when no external resolver is
/// available (the "calm" row).
fn default_mood_vector() -> FeatureVector {
    MOOD_VECTOR_TABLE["calm"]
}

/// Table-backed mood resolver with a process-lifetime cache.
///
/// Moods outside the fixed table go to the optional external client once;
/// the answer (or the deterministic default on failure) is cached so every
/// later turn is local.
pub struct TableMoodResolver {
    client: Option<OpenAiClient>,
    cache: Mutex<HashMap<String, FeatureVector>>,
}

impl TableMoodResolver {
    /// Purely local resolver: table hits plus the default vector.
    #[must_use]
    pub fn local() -> Self {
        Self {
            client: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolver that may consult the external model for unknown moods.
    #[must_use]
    pub fn with_client(client: OpenAiClient) -> Self {
        Self {
            client: Some(client),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn lookup_remote(&self, mood: &str) -> Option<FeatureVector> {
        let client = self.client.as_ref()?;
        let prompt = format!(
            "The mood '{mood}' needs to be mapped to a 5-dimensional music feature vector: \
             valence, energy, danceability, acousticness, and tempo, each between 0 and 1. \
             Respond ONLY with a JSON array of 5 numbers, e.g. [0.8, 0.7, 0.9, 0.2, 0.6]."
        );
        match client.chat(
            "You map musical moods to audio feature vectors.",
            &prompt,
            0.2,
        ) {
            Ok(text) => parse_vector(&text),
            Err(err) => {
                warn!("Mood vector lookup for '{mood}' failed, using fallback: {err:#}");
                None
            }
        }
    }
}

impl MoodVectorResolver for TableMoodResolver {
    fn resolve(&self, mood: &str) -> FeatureVector {
        let key = mood.trim().to_lowercase();

        if let Ok(cache) = self.cache.lock() {
            if let Some(vector) = cache.get(&key) {
                return *vector;
            }
        }
        if let Some(vector) = MOOD_VECTOR_TABLE.get(key.as_str()) {
            return *vector;
        }

        let vector = self.lookup_remote(&key).unwrap_or_else(default_mood_vector);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, vector);
        }
        vector
    }
}

/// Parse a `[a, b, c, d, e]` array out of model output, tolerating
/// surrounding prose. All five values must land in [0, 1].
fn parse_vector(text: &str) -> Option<FeatureVector> {
    let start = text.find('[')?;
    let end = text[start..].find(']')? + start;
    let inner = &text[start + 1..end];

    let values: Vec<f64> = inner
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;

    if values.len() == 5 && values.iter().all(|v| (0.0..=1.0).contains(v)) {
        Some(FeatureVector([
            values[0], values[1], values[2], values[3], values[4],
        ]))
    } else {
        None
    }
}

/// Deterministic reply text when no generator is configured or the call
/// fails mid-turn.
#[must_use]
pub fn template_reply(song: &CatalogEntry) -> String {
    format!(
        "Here's a great track: '{}' by {} ({}, {} tempo).",
        song.title, song.artist, song.genre, song.tempo_category
    )
}

/// Generator that always produces the template sentence. Offline default.
#[derive(Debug, Default)]
pub struct TemplateReplyGenerator;

impl ReplyGenerator for TemplateReplyGenerator {
    fn describe(&self, song: &CatalogEntry, _session: &Session) -> Result<String> {
        Ok(template_reply(song))
    }
}

/// Thin synchronous OpenAI chat-completions client with a bounded timeout.
#[derive(Clone)]
pub struct OpenAiClient {
    agent: ureq::Agent,
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenAiClient {
    /// Build a client from an API key. The agent timeout bounds every call
    /// so a slow upstream can never stall a turn indefinitely.
    #[must_use]
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            api_key,
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
        }
    }

    /// Override the API base URL (tests, proxies).
    #[must_use]
    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }

    /// Override the chat model.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// One chat-completions round trip, returning the assistant text.
    pub fn chat(&self, system: &str, user: &str, temperature: f64) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": temperature,
            "max_tokens": 250,
        });

        let response: Value = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json")
            .send_json(payload)
            .context("Chat completion request failed")?
            .into_json()
            .context("Chat completion response was not JSON")?;

        response["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow!("Chat completion response missing message content"))
    }
}

/// OpenAI-backed semantic preference classifier.
pub struct OpenAiClassifier {
    client: OpenAiClient,
    /// Closed mood vocabulary quoted in the prompt so the model never
    /// invents a mood the catalog cannot express.
    moods: Vec<String>,
}

impl OpenAiClassifier {
    #[must_use]
    pub fn new(client: OpenAiClient, moods: Vec<String>) -> Self {
        Self { client, moods }
    }

    fn system_prompt(&self) -> String {
        let mood_list = self
            .moods
            .iter()
            .map(|m| format!("\"{m}\""))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "You extract ONLY music preferences from user input in English.\n\
             For the 'mood' field, only use one of: [{mood_list}]. If the input doesn't \
             clearly match a listed mood, set 'mood' to null.\n\
             If the message is not in English, reply ONLY with: '{NOT_ENGLISH}'.\n\
             If the message is not about music, reply ONLY with: '{NOT_MUSIC}'.\n\
             Respond in valid JSON with exactly these 4 keys: genre, mood, tempo, \
             artist_or_song. Set unclear values to null. Never guess outside the mood list."
        )
    }
}

impl SemanticClassifier for OpenAiClassifier {
    fn classify(&self, message: &str) -> Result<Classification> {
        let user_prompt = format!(
            "Extract the user's music preferences from the following message. \
             If genre, mood, tempo, or artist/song is not mentioned or not clear, set it \
             to null. Reply only with the JSON object, nothing else.\nInput: \"{message}\""
        );

        let text = self.client.chat(&self.system_prompt(), &user_prompt, 0.2)?;
        debug!("Classifier raw output: {text}");
        parse_classification(&text)
    }
}

/// Decode classifier output: sentinel strings, optional code fences, then
/// the JSON object. Malformed output is an error the caller degrades from.
fn parse_classification(text: &str) -> Result<Classification> {
    if text.contains(NOT_ENGLISH) {
        return Ok(Classification {
            not_target_language: true,
            ..Classification::default()
        });
    }
    if text.contains(NOT_MUSIC) {
        return Ok(Classification {
            off_topic: true,
            ..Classification::default()
        });
    }

    let start = text
        .find('{')
        .ok_or_else(|| anyhow!("No JSON object in classifier output"))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| anyhow!("Unterminated JSON object in classifier output"))?;
    let value: Value = serde_json::from_str(&text[start..=end])
        .context("Classifier output was not valid JSON")?;

    let field = |key: &str| -> Option<String> {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty() && s != "null")
    };

    Ok(Classification {
        genre: field("genre"),
        mood: field("mood"),
        tempo: field("tempo"),
        artist_or_song: field("artist_or_song"),
        not_target_language: false,
        off_topic: false,
    })
}

/// OpenAI-backed reply generator. Falls back to the template on any error
/// at the call site, so failures stay invisible to the user.
pub struct OpenAiReplyGenerator {
    client: OpenAiClient,
}

impl OpenAiReplyGenerator {
    #[must_use]
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }
}

impl ReplyGenerator for OpenAiReplyGenerator {
    fn describe(&self, song: &CatalogEntry, session: &Session) -> Result<String> {
        let genre = session.genre.value().unwrap_or("any");
        let mood = session.mood.value().unwrap_or("any");
        let tempo = session.tempo.value().unwrap_or("any");
        let prompt = format!(
            "You are Moodify, a friendly and concise music recommendation assistant. \
             The user wants a song matching genre: {genre}, mood: {mood}, tempo: {tempo}. \
             Recommend only the selected song: \"{}\" by {} ({}, {} tempo). \
             Reply warmly in no more than 1.5 sentences. Mention only this one song.",
            song.title, song.artist, song.genre, song.tempo_category
        );

        self.client.chat(
            "You are a helpful music assistant. Respond in under 1.5 sentences.",
            &prompt,
            0.6,
        )
    }
}
