//! Speech-to-text wrapper (ElevenLabs). Uploads the recorded audio as
//! multipart form data and returns the transcript; the call is logged
//! through the Action lifecycle (audio bytes themselves are not stored,
//! only their size and format).

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::actions::{ActionStore, ApiStore, ApiType};
use crate::config::Config;
use crate::store::FlatStore;

#[derive(Debug)]
pub struct Transcript {
    pub text: String,
    pub action_id: u64,
}

#[derive(Clone)]
pub struct SttService {
    actions: ActionStore,
    apis: ApiStore,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model_id: String,
    language: String,
}

impl SttService {
    pub fn new(store: Arc<FlatStore>, config: &Config, client: reqwest::Client) -> Self {
        Self {
            actions: ActionStore::new(store.clone()),
            apis: ApiStore::new(store),
            client,
            api_key: config.elevenlabs_api_key.clone(),
            base_url: config.elevenlabs_base_url.trim_end_matches('/').to_string(),
            model_id: config.elevenlabs_stt_model.clone(),
            language: config.elevenlabs_language.clone(),
        }
    }

    pub async fn transcribe(&self, audio: Vec<u8>, audio_format: &str) -> Result<Transcript> {
        if self.api_key.is_empty() {
            return Err(anyhow!("speech-to-text is not configured (missing api key)"));
        }

        let request_log = serde_json::json!({
            "audio_format": audio_format,
            "audio_size": audio.len(),
            "language": self.language,
            "model": self.model_id,
        });
        let action = self.actions.create(
            self.apis.api_id_for(ApiType::SpeechToText),
            &request_log,
        )?;

        let file_part = reqwest::multipart::Part::bytes(audio)
            .file_name(format!("audio.{}", audio_format))
            .mime_str("application/octet-stream")
            .context("building audio upload part")?;
        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model_id", self.model_id.clone())
            .text("language_code", self.language.clone());

        let response = self
            .client
            .post(format!("{}/v1/speech-to-text", self.base_url))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .context("speech-to-text request failed")?
            .error_for_status()
            .context("speech-to-text returned an error status")?;
        let body: serde_json::Value = response
            .json()
            .await
            .context("speech-to-text reply was not JSON")?;

        let text = body
            .get("text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow!("speech-to-text reply had no transcript"))?
            .to_string();

        self.actions.complete(
            action.action_id,
            &serde_json::json!({ "transcript": text, "model": self.model_id }),
        )?;

        Ok(Transcript { text, action_id: action.action_id })
    }
}
