//! Vocabulary history: one row per word a user has looked up.

use std::sync::Arc;

use crate::store::{now_stamp, FlatStore, Row, StoreError};

const TABLE: &str = "vocabulary.csv";
const COLUMNS: &[&str] = &[
    "VocabID", "ActionID", "UserID", "Word", "Meaning", "Pronunciation", "Audio", "Time",
];

#[derive(Debug, Clone, serde::Serialize)]
pub struct VocabEntry {
    pub vocab_id: u64,
    /// Dictionary API call that produced this entry, if it came from one.
    pub action_id: Option<u64>,
    pub user_id: u64,
    pub word: String,
    pub meaning: String,
    pub pronunciation: String,
    /// Audio URL or file reference from the dictionary provider.
    pub audio: String,
    pub time: String,
}

impl VocabEntry {
    fn to_row(&self) -> Row {
        Row::from([
            ("VocabID".into(), self.vocab_id.to_string()),
            (
                "ActionID".into(),
                self.action_id.map(|id| id.to_string()).unwrap_or_default(),
            ),
            ("UserID".into(), self.user_id.to_string()),
            ("Word".into(), self.word.clone()),
            ("Meaning".into(), self.meaning.clone()),
            ("Pronunciation".into(), self.pronunciation.clone()),
            ("Audio".into(), self.audio.clone()),
            ("Time".into(), self.time.clone()),
        ])
    }

    fn from_row(row: &Row) -> Option<Self> {
        let get = |k: &str| row.get(k).cloned().unwrap_or_default();
        Some(Self {
            vocab_id: get("VocabID").parse().ok()?,
            action_id: get("ActionID").parse().ok(),
            user_id: get("UserID").parse().ok()?,
            word: get("Word"),
            meaning: get("Meaning"),
            pronunciation: get("Pronunciation"),
            audio: get("Audio"),
            time: get("Time"),
        })
    }
}

#[derive(Clone)]
pub struct VocabStore {
    store: Arc<FlatStore>,
}

impl VocabStore {
    pub fn new(store: Arc<FlatStore>) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        user_id: u64,
        word: &str,
        meaning: &str,
        pronunciation: &str,
        audio: &str,
        action_id: Option<u64>,
    ) -> Result<VocabEntry, StoreError> {
        let mut entry = VocabEntry {
            vocab_id: 0,
            action_id,
            user_id,
            word: word.to_string(),
            meaning: meaning.to_string(),
            pronunciation: pronunciation.to_string(),
            audio: audio.to_string(),
            time: now_stamp(),
        };
        let template = entry.clone();
        entry.vocab_id = self
            .store
            .append_with_next_id(TABLE, "VocabID", COLUMNS, move |id| {
                let mut e = template;
                e.vocab_id = id;
                e.to_row()
            })?;
        Ok(entry)
    }

    /// A user's full history, newest first.
    pub fn for_user(&self, user_id: u64) -> Vec<VocabEntry> {
        let mut entries: Vec<VocabEntry> = self
            .store
            .find_all_by_field(TABLE, "UserID", &user_id.to_string())
            .iter()
            .filter_map(VocabEntry::from_row)
            .collect();
        entries.sort_by(|a, b| b.time.cmp(&a.time));
        entries
    }

    /// Case-insensitive substring search over a user's words.
    pub fn search(&self, user_id: u64, term: &str) -> Vec<VocabEntry> {
        let term = term.to_lowercase();
        self.for_user(user_id)
            .into_iter()
            .filter(|entry| entry.word.to_lowercase().contains(&term))
            .collect()
    }

    pub fn by_id(&self, vocab_id: u64) -> Option<VocabEntry> {
        self.store
            .find_by_field(TABLE, "VocabID", &vocab_id.to_string())
            .as_ref()
            .and_then(VocabEntry::from_row)
    }

    /// Case-insensitive exact match: has this user looked the word up
    /// before? Linear scan over the user's history.
    pub fn find_word(&self, user_id: u64, word: &str) -> Option<VocabEntry> {
        self.for_user(user_id)
            .into_iter()
            .find(|entry| entry.word.eq_ignore_ascii_case(word))
    }
}
