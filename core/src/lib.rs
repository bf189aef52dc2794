//! LinguaChat core: flat CSV record store, entity accessors, auth, and the
//! LLM/speech/dictionary provider services. No HTTP surface.

pub mod actions;
pub mod auth;
pub mod config;
pub mod conversations;
pub mod dictionary;
pub mod llm;
pub mod security;
pub mod store;
pub mod stt;
pub mod tts;
pub mod users;
pub mod validators;
pub mod vocab;
