//! LLM chat wrapper: OpenAI-compatible chat completions endpoint, each
//! call logged through the two-phase Action lifecycle.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::actions::{ActionStore, ApiStore, ApiType};
use crate::config::Config;
use crate::store::FlatStore;

const SYSTEM_PROMPT: &str = "You are a helpful English conversation teacher. \
    Help the user practice English conversation naturally and provide \
    corrections when needed.";

/// One message in the chat transcript sent to the model.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: &str) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: &str) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

#[derive(Debug)]
pub struct ChatReply {
    pub response: String,
    pub action_id: u64,
}

#[derive(Clone)]
pub struct LlmService {
    actions: ActionStore,
    apis: ApiStore,
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl LlmService {
    pub fn new(store: Arc<FlatStore>, config: &Config, client: reqwest::Client) -> Self {
        Self {
            actions: ActionStore::new(store.clone()),
            apis: ApiStore::new(store),
            client,
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Send the system prompt, prior history, and the new user turn to the
    /// model. The request is logged Pending before the call and completed
    /// with the reply text, model, and usage after.
    pub async fn chat_completion(
        &self,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<ChatReply> {
        let mut transcript = vec![ChatMessage::system(SYSTEM_PROMPT)];
        transcript.extend_from_slice(history);
        transcript.push(ChatMessage::user(message));

        let request_body = serde_json::json!({
            "model": self.model,
            "messages": transcript,
        });
        let action = self.actions.create(
            self.apis.api_id_for(ApiType::Llm),
            &request_body,
        )?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .context("LLM request failed")?
            .error_for_status()
            .context("LLM returned an error status")?;
        let body: serde_json::Value = response.json().await.context("LLM reply was not JSON")?;

        let text = body
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("LLM reply had no message content"))?
            .to_string();

        self.actions.complete(
            action.action_id,
            &serde_json::json!({
                "response": text,
                "model": body.get("model").and_then(|m| m.as_str()).unwrap_or(&self.model),
                "usage": body.get("usage").cloned().unwrap_or(serde_json::Value::Null),
            }),
        )?;

        Ok(ChatReply { response: text, action_id: action.action_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_roles_are_wire_compatible() {
        let msg = ChatMessage::assistant("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }
}
