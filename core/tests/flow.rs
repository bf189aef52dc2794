//! End-to-end flow over one shared store: register, login, start a
//! conversation, send a message, read it back.

use std::sync::Arc;

use common::auth::AuthService;
use common::conversations::{ConversationStore, MessageStore, Mode, TimelineMessage};
use common::store::FlatStore;

fn shared_store() -> Arc<FlatStore> {
    let dir = std::env::temp_dir().join(format!("linguachat-flow-{}", uuid::Uuid::new_v4()));
    Arc::new(FlatStore::new(dir).expect("store"))
}

#[test]
fn register_login_chat_and_read_back() {
    let store = shared_store();
    let auth = AuthService::new(store.clone());
    let conversations = ConversationStore::new(store.clone());
    let messages = MessageStore::new(store.clone());

    let alice = auth.register("alice", "secret1", "Alice A").expect("register");
    assert_eq!(alice.user_id, 1);

    let (token, logged_in) = auth.login("alice", "secret1").expect("login");
    assert!(!token.is_empty());
    assert_eq!(logged_in.user_id, alice.user_id);
    assert_eq!(auth.verify(&token).expect("session").user_id, alice.user_id);

    let conversation = conversations
        .create(alice.user_id, Mode::Text)
        .expect("conversation");
    assert_eq!(conversation.mode, Mode::Text);

    messages
        .create_user_message(conversation.conversation_id, "Hello")
        .expect("message");

    let timeline = messages.conversation_messages(conversation.conversation_id);
    assert_eq!(timeline.len(), 1);
    match &timeline[0] {
        TimelineMessage::User(msg) => assert_eq!(msg.message, "Hello"),
        TimelineMessage::Ai(_) => panic!("expected a user message"),
    }
}

#[test]
fn data_survives_reopening_the_store() {
    let dir = std::env::temp_dir().join(format!("linguachat-flow-{}", uuid::Uuid::new_v4()));

    {
        let store = Arc::new(FlatStore::new(&dir).expect("store"));
        let auth = AuthService::new(store);
        auth.register("alice", "secret1", "Alice A").expect("register");
    }

    let store = Arc::new(FlatStore::new(&dir).expect("reopen"));
    let auth = AuthService::new(store);
    // Users persist across processes; sessions do not.
    assert!(auth.login("alice", "secret1").is_ok());
}
