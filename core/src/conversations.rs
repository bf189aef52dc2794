//! Conversations and their messages. User-authored and AI-authored
//! messages live in two separate tables with independent MessageID spaces;
//! retrieval merges them into one timeline ordered by timestamp.

use std::sync::Arc;

use crate::store::{now_stamp, FlatStore, Row, StoreError};

const CONVERSATIONS: &str = "conversations.csv";
const CONVERSATION_COLUMNS: &[&str] = &["ConversationID", "UserID", "Mode", "Datetime"];

const USER_MESSAGES: &str = "user_messages.csv";
const USER_MESSAGE_COLUMNS: &[&str] = &["MessageID", "ConversationID", "Message", "Createtime"];

const AI_MESSAGES: &str = "ai_messages.csv";
const AI_MESSAGE_COLUMNS: &[&str] =
    &["MessageID", "ConversationID", "Message", "Createtime", "ActionID"];

/// Conversation mode: plain text chat or continuous (voice) practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Text,
    Continuous,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Text => "text",
            Mode::Continuous => "continuous",
        }
    }

    /// Anything unrecognized falls back to text.
    pub fn parse(s: &str) -> Self {
        match s {
            "continuous" => Mode::Continuous,
            _ => Mode::Text,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Conversation {
    pub conversation_id: u64,
    pub user_id: u64,
    pub mode: Mode,
    pub datetime: String,
}

impl Conversation {
    fn to_row(&self) -> Row {
        Row::from([
            ("ConversationID".into(), self.conversation_id.to_string()),
            ("UserID".into(), self.user_id.to_string()),
            ("Mode".into(), self.mode.as_str().to_string()),
            ("Datetime".into(), self.datetime.clone()),
        ])
    }

    fn from_row(row: &Row) -> Option<Self> {
        let get = |k: &str| row.get(k).cloned().unwrap_or_default();
        Some(Self {
            conversation_id: get("ConversationID").parse().ok()?,
            user_id: get("UserID").parse().ok()?,
            mode: Mode::parse(&get("Mode")),
            datetime: get("Datetime"),
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UserMessage {
    pub message_id: u64,
    pub conversation_id: u64,
    pub message: String,
    pub createtime: String,
}

impl UserMessage {
    fn to_row(&self) -> Row {
        Row::from([
            ("MessageID".into(), self.message_id.to_string()),
            ("ConversationID".into(), self.conversation_id.to_string()),
            ("Message".into(), self.message.clone()),
            ("Createtime".into(), self.createtime.clone()),
        ])
    }

    fn from_row(row: &Row) -> Option<Self> {
        let get = |k: &str| row.get(k).cloned().unwrap_or_default();
        Some(Self {
            message_id: get("MessageID").parse().ok()?,
            conversation_id: get("ConversationID").parse().ok()?,
            message: get("Message"),
            createtime: get("Createtime"),
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AiMessage {
    pub message_id: u64,
    pub conversation_id: u64,
    pub message: String,
    pub createtime: String,
    /// LoggedAction of the LLM call that produced this reply, if any.
    pub action_id: Option<u64>,
}

impl AiMessage {
    fn to_row(&self) -> Row {
        Row::from([
            ("MessageID".into(), self.message_id.to_string()),
            ("ConversationID".into(), self.conversation_id.to_string()),
            ("Message".into(), self.message.clone()),
            ("Createtime".into(), self.createtime.clone()),
            (
                "ActionID".into(),
                self.action_id.map(|id| id.to_string()).unwrap_or_default(),
            ),
        ])
    }

    fn from_row(row: &Row) -> Option<Self> {
        let get = |k: &str| row.get(k).cloned().unwrap_or_default();
        Some(Self {
            message_id: get("MessageID").parse().ok()?,
            conversation_id: get("ConversationID").parse().ok()?,
            message: get("Message"),
            createtime: get("Createtime"),
            action_id: get("ActionID").parse().ok(),
        })
    }
}

/// One entry of the merged conversation timeline.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", content = "message", rename_all = "lowercase")]
pub enum TimelineMessage {
    User(UserMessage),
    Ai(AiMessage),
}

impl TimelineMessage {
    pub fn createtime(&self) -> &str {
        match self {
            TimelineMessage::User(m) => &m.createtime,
            TimelineMessage::Ai(m) => &m.createtime,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            TimelineMessage::User(m) => &m.message,
            TimelineMessage::Ai(m) => &m.message,
        }
    }
}

#[derive(Clone)]
pub struct ConversationStore {
    store: Arc<FlatStore>,
}

impl ConversationStore {
    pub fn new(store: Arc<FlatStore>) -> Self {
        Self { store }
    }

    pub fn create(&self, user_id: u64, mode: Mode) -> Result<Conversation, StoreError> {
        let mut conversation = Conversation {
            conversation_id: 0,
            user_id,
            mode,
            datetime: now_stamp(),
        };
        let template = conversation.clone();
        conversation.conversation_id = self.store.append_with_next_id(
            CONVERSATIONS,
            "ConversationID",
            CONVERSATION_COLUMNS,
            move |id| {
                let mut c = template;
                c.conversation_id = id;
                c.to_row()
            },
        )?;
        Ok(conversation)
    }

    pub fn get(&self, conversation_id: u64) -> Option<Conversation> {
        self.store
            .find_by_field(CONVERSATIONS, "ConversationID", &conversation_id.to_string())
            .as_ref()
            .and_then(Conversation::from_row)
    }

    /// All conversations of a user, newest first.
    pub fn for_user(&self, user_id: u64) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = self
            .store
            .find_all_by_field(CONVERSATIONS, "UserID", &user_id.to_string())
            .iter()
            .filter_map(Conversation::from_row)
            .collect();
        list.sort_by(|a, b| b.datetime.cmp(&a.datetime));
        list
    }

    /// Delete a conversation row. Messages and vocabulary that reference it
    /// are left in place (no cascade).
    pub fn delete(&self, conversation_id: u64) -> Result<bool, StoreError> {
        self.store.delete_by_field(
            CONVERSATIONS,
            "ConversationID",
            &conversation_id.to_string(),
            CONVERSATION_COLUMNS,
        )
    }
}

#[derive(Clone)]
pub struct MessageStore {
    store: Arc<FlatStore>,
}

impl MessageStore {
    pub fn new(store: Arc<FlatStore>) -> Self {
        Self { store }
    }

    pub fn create_user_message(
        &self,
        conversation_id: u64,
        message: &str,
    ) -> Result<UserMessage, StoreError> {
        let mut msg = UserMessage {
            message_id: 0,
            conversation_id,
            message: message.to_string(),
            createtime: now_stamp(),
        };
        let template = msg.clone();
        msg.message_id = self.store.append_with_next_id(
            USER_MESSAGES,
            "MessageID",
            USER_MESSAGE_COLUMNS,
            move |id| {
                let mut m = template;
                m.message_id = id;
                m.to_row()
            },
        )?;
        Ok(msg)
    }

    pub fn create_ai_message(
        &self,
        conversation_id: u64,
        message: &str,
        action_id: Option<u64>,
    ) -> Result<AiMessage, StoreError> {
        let mut msg = AiMessage {
            message_id: 0,
            conversation_id,
            message: message.to_string(),
            createtime: now_stamp(),
            action_id,
        };
        let template = msg.clone();
        msg.message_id = self.store.append_with_next_id(
            AI_MESSAGES,
            "MessageID",
            AI_MESSAGE_COLUMNS,
            move |id| {
                let mut m = template;
                m.message_id = id;
                m.to_row()
            },
        )?;
        Ok(msg)
    }

    pub fn user_message(&self, message_id: u64) -> Option<UserMessage> {
        self.store
            .find_by_field(USER_MESSAGES, "MessageID", &message_id.to_string())
            .as_ref()
            .and_then(UserMessage::from_row)
    }

    pub fn ai_message(&self, message_id: u64) -> Option<AiMessage> {
        self.store
            .find_by_field(AI_MESSAGES, "MessageID", &message_id.to_string())
            .as_ref()
            .and_then(AiMessage::from_row)
    }

    /// Both sides of a conversation merged into one timeline, ascending by
    /// timestamp. Timestamps compare lexicographically, which matches
    /// chronological order for the fixed stamp format; on a tie, user
    /// messages sort before AI messages (stable sort over user-then-ai).
    pub fn conversation_messages(&self, conversation_id: u64) -> Vec<TimelineMessage> {
        let key = conversation_id.to_string();
        let mut timeline: Vec<TimelineMessage> = self
            .store
            .find_all_by_field(USER_MESSAGES, "ConversationID", &key)
            .iter()
            .filter_map(UserMessage::from_row)
            .map(TimelineMessage::User)
            .collect();
        timeline.extend(
            self.store
                .find_all_by_field(AI_MESSAGES, "ConversationID", &key)
                .iter()
                .filter_map(AiMessage::from_row)
                .map(TimelineMessage::Ai),
        );
        timeline.sort_by(|a, b| a.createtime().cmp(b.createtime()));
        timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Row;

    fn stores() -> (Arc<FlatStore>, ConversationStore, MessageStore) {
        let dir = std::env::temp_dir().join(format!("linguachat-conv-{}", uuid::Uuid::new_v4()));
        let store = Arc::new(FlatStore::new(dir).unwrap());
        (
            store.clone(),
            ConversationStore::new(store.clone()),
            MessageStore::new(store),
        )
    }

    fn raw_message(store: &FlatStore, table: &str, columns: &[&str], pairs: &[(&str, &str)]) {
        let row: Row = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        store.append(table, &row, columns).unwrap();
    }

    #[test]
    fn conversations_list_newest_first_and_delete_does_not_cascade() {
        let (_, conversations, messages) = stores();
        let old = conversations.create(1, Mode::Text).unwrap();
        let newer = conversations.create(1, Mode::Continuous).unwrap();
        conversations.create(2, Mode::Text).unwrap();

        let list = conversations.for_user(1);
        assert_eq!(list.len(), 2);
        assert!(list[0].datetime >= list[1].datetime);

        messages.create_user_message(old.conversation_id, "orphan me").unwrap();
        assert!(conversations.delete(old.conversation_id).unwrap());
        assert!(conversations.get(old.conversation_id).is_none());
        assert!(conversations.get(newer.conversation_id).is_some());
        // Messages of the deleted conversation remain on disk.
        assert_eq!(messages.conversation_messages(old.conversation_id).len(), 1);
    }

    #[test]
    fn message_id_spaces_are_per_table() {
        let (_, conversations, messages) = stores();
        let conv = conversations.create(1, Mode::Text).unwrap();
        let user_msg = messages.create_user_message(conv.conversation_id, "hi").unwrap();
        let ai_msg = messages
            .create_ai_message(conv.conversation_id, "hello", None)
            .unwrap();
        // Both start at 1: separate tables, separate ID spaces.
        assert_eq!(user_msg.message_id, 1);
        assert_eq!(ai_msg.message_id, 1);
    }

    #[test]
    fn timeline_interleaves_both_sources_by_timestamp() {
        let (store, _, messages) = stores();
        for (id, time, text) in [
            ("1", "2026-01-01 10:00:00", "u1"),
            ("2", "2026-01-01 10:02:00", "u2"),
        ] {
            raw_message(
                &store,
                USER_MESSAGES,
                USER_MESSAGE_COLUMNS,
                &[
                    ("MessageID", id),
                    ("ConversationID", "7"),
                    ("Message", text),
                    ("Createtime", time),
                ],
            );
        }
        for (id, time, text) in [
            ("1", "2026-01-01 10:01:00", "a1"),
            ("2", "2026-01-01 10:03:00", "a2"),
        ] {
            raw_message(
                &store,
                AI_MESSAGES,
                AI_MESSAGE_COLUMNS,
                &[
                    ("MessageID", id),
                    ("ConversationID", "7"),
                    ("Message", text),
                    ("Createtime", time),
                    ("ActionID", ""),
                ],
            );
        }
        let timeline = messages.conversation_messages(7);
        let texts: Vec<&str> = timeline
            .iter()
            .map(|m| match m {
                TimelineMessage::User(m) => m.message.as_str(),
                TimelineMessage::Ai(m) => m.message.as_str(),
            })
            .collect();
        assert_eq!(texts, ["u1", "a1", "u2", "a2"]);
    }

    #[test]
    fn equal_timestamps_put_user_messages_first() {
        let (store, _, messages) = stores();
        raw_message(
            &store,
            AI_MESSAGES,
            AI_MESSAGE_COLUMNS,
            &[
                ("MessageID", "1"),
                ("ConversationID", "7"),
                ("Message", "ai"),
                ("Createtime", "2026-01-01 10:00:00"),
                ("ActionID", "3"),
            ],
        );
        raw_message(
            &store,
            USER_MESSAGES,
            USER_MESSAGE_COLUMNS,
            &[
                ("MessageID", "1"),
                ("ConversationID", "7"),
                ("Message", "user"),
                ("Createtime", "2026-01-01 10:00:00"),
            ],
        );
        let timeline = messages.conversation_messages(7);
        assert!(matches!(timeline[0], TimelineMessage::User(_)));
        assert!(matches!(timeline[1], TimelineMessage::Ai(_)));
    }
}
