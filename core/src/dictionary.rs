//! Vocabulary lookup against the Free Dictionary API, with the user's
//! history as a cache: a word already looked up is answered from
//! `vocabulary.csv` without a network call.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::actions::{ActionStore, ApiStore, ApiType};
use crate::config::Config;
use crate::store::FlatStore;
use crate::validators;
use crate::vocab::VocabStore;

/// Dictionary lookups are quick or not worth waiting for.
pub const DICTIONARY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, serde::Serialize)]
pub struct Lookup {
    pub word: String,
    pub meaning: String,
    pub pronunciation: String,
    pub audio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocab_id: Option<u64>,
    pub from_history: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("{0}")]
    Invalid(String),
    #[error("word not found in the dictionary")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct DictionaryService {
    actions: ActionStore,
    apis: ApiStore,
    vocab: VocabStore,
    client: reqwest::Client,
    base_url: String,
}

impl DictionaryService {
    pub fn new(store: Arc<FlatStore>, config: &Config, client: reqwest::Client) -> Self {
        Self {
            actions: ActionStore::new(store.clone()),
            apis: ApiStore::new(store.clone()),
            vocab: VocabStore::new(store),
            client,
            base_url: config.dictionary_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn vocab(&self) -> &VocabStore {
        &self.vocab
    }

    /// Look a word up for a user: validate, answer from history if
    /// possible, otherwise call the dictionary API, log the action, and
    /// save the result to the user's history.
    pub async fn lookup_word(&self, user_id: u64, word: &str) -> Result<Lookup, LookupError> {
        validators::validate_vocab_word(word).map_err(LookupError::Invalid)?;
        let word = word.trim().to_lowercase();

        if let Some(existing) = self.vocab.find_word(user_id, &word) {
            return Ok(Lookup {
                word,
                meaning: existing.meaning,
                pronunciation: existing.pronunciation,
                audio: existing.audio,
                vocab_id: Some(existing.vocab_id),
                from_history: true,
            });
        }

        let action = self
            .actions
            .create(
                self.apis.api_id_for(ApiType::Dictionary),
                &serde_json::json!({ "word": word }),
            )
            .map_err(anyhow::Error::from)?;

        let response = self
            .client
            .get(format!("{}/{}", self.base_url, word))
            .timeout(DICTIONARY_TIMEOUT)
            .send()
            .await
            .context("dictionary request failed")?;
        if !response.status().is_success() {
            return Err(LookupError::NotFound);
        }
        let body: serde_json::Value = response
            .json()
            .await
            .context("dictionary reply was not JSON")?;
        let entry = body
            .get(0)
            .ok_or_else(|| anyhow!("dictionary reply was empty"))?;

        let (meaning, pronunciation, audio) = extract_entry(entry);

        self.actions
            .complete(
                action.action_id,
                &serde_json::json!({
                    "word": word,
                    "meaning": meaning,
                    "pronunciation": pronunciation,
                    "audio": audio,
                }),
            )
            .map_err(anyhow::Error::from)?;

        let saved = self
            .vocab
            .create(user_id, &word, &meaning, &pronunciation, &audio, Some(action.action_id))
            .map_err(anyhow::Error::from)?;

        Ok(Lookup {
            word,
            meaning,
            pronunciation,
            audio,
            vocab_id: Some(saved.vocab_id),
            from_history: false,
        })
    }
}

/// Pull the first definition (plus its example), the phonetic text, and the
/// first non-empty audio URL out of a dictionary entry.
fn extract_entry(entry: &serde_json::Value) -> (String, String, String) {
    let pronunciation = entry
        .get("phonetic")
        .and_then(|p| p.as_str())
        .map(str::to_string)
        .or_else(|| {
            entry
                .pointer("/phonetics/0/text")
                .and_then(|t| t.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default();

    let audio = entry
        .get("phonetics")
        .and_then(|p| p.as_array())
        .and_then(|phonetics| {
            phonetics.iter().find_map(|p| {
                p.get("audio")
                    .and_then(|a| a.as_str())
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
            })
        })
        .unwrap_or_default();

    let mut meaning = entry
        .pointer("/meanings/0/definitions/0/definition")
        .and_then(|d| d.as_str())
        .unwrap_or_default()
        .to_string();
    if let Some(example) = entry
        .pointer("/meanings/0/definitions/0/example")
        .and_then(|e| e.as_str())
        .filter(|e| !e.is_empty())
    {
        meaning.push_str("\nExample: ");
        meaning.push_str(example);
    }

    (meaning, pronunciation, audio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_definition_example_phonetic_and_first_audio() {
        let entry = serde_json::json!({
            "word": "hello",
            "phonetic": "/həˈləʊ/",
            "phonetics": [
                { "text": "/həˈləʊ/", "audio": "" },
                { "text": "/hɛˈləʊ/", "audio": "https://example.com/hello.mp3" }
            ],
            "meanings": [{
                "partOfSpeech": "noun",
                "definitions": [{
                    "definition": "a greeting",
                    "example": "she was met with a warm hello"
                }]
            }]
        });
        let (meaning, pronunciation, audio) = extract_entry(&entry);
        assert_eq!(pronunciation, "/həˈləʊ/");
        assert_eq!(audio, "https://example.com/hello.mp3");
        assert!(meaning.starts_with("a greeting"));
        assert!(meaning.contains("Example: she was met"));
    }

    #[test]
    fn sparse_entries_extract_to_empty_strings() {
        let (meaning, pronunciation, audio) = extract_entry(&serde_json::json!({"word": "x"}));
        assert!(meaning.is_empty());
        assert!(pronunciation.is_empty());
        assert!(audio.is_empty());
    }

    #[tokio::test]
    async fn invalid_word_is_rejected_before_any_network_call() {
        let dir = std::env::temp_dir().join(format!("linguachat-dict-{}", uuid::Uuid::new_v4()));
        let store = Arc::new(FlatStore::new(dir).unwrap());
        let service = DictionaryService::new(
            store,
            &Config::default(),
            reqwest::Client::new(),
        );
        assert!(matches!(
            service.lookup_word(1, "not valid 42").await,
            Err(LookupError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn history_short_circuits_the_network() {
        let dir = std::env::temp_dir().join(format!("linguachat-dict-{}", uuid::Uuid::new_v4()));
        let store = Arc::new(FlatStore::new(dir).unwrap());
        // Point the service at an unroutable URL: if the history hit did not
        // short-circuit, the call would fail rather than succeed.
        let config = Config {
            dictionary_url: "http://127.0.0.1:1/none".into(),
            ..Config::default()
        };
        let service = DictionaryService::new(store, &config, reqwest::Client::new());
        service
            .vocab()
            .create(1, "hello", "a greeting", "/həˈləʊ/", "", None)
            .unwrap();

        let hit = service.lookup_word(1, "Hello").await.unwrap();
        assert!(hit.from_history);
        assert_eq!(hit.meaning, "a greeting");
    }
}
