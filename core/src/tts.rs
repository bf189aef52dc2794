//! Text-to-speech wrapper (ElevenLabs). Synthesized audio is written to
//! `{data_dir}/audio/tts_{sha256}.mp3` and the file path is what callers
//! (and the Action log) carry around.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::actions::{ActionStore, ApiStore, ApiType};
use crate::config::Config;
use crate::security;
use crate::store::FlatStore;

#[derive(Debug)]
pub struct Synthesis {
    pub audio_path: PathBuf,
    pub action_id: u64,
}

#[derive(Clone)]
pub struct TtsService {
    actions: ActionStore,
    apis: ApiStore,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    voice_id: String,
    model_id: String,
    audio_dir: PathBuf,
}

impl TtsService {
    pub fn new(store: Arc<FlatStore>, config: &Config, client: reqwest::Client) -> Self {
        Self {
            actions: ActionStore::new(store.clone()),
            apis: ApiStore::new(store),
            client,
            api_key: config.elevenlabs_api_key.clone(),
            base_url: config.elevenlabs_base_url.trim_end_matches('/').to_string(),
            voice_id: config.elevenlabs_voice_id.clone(),
            model_id: config.elevenlabs_model_id.clone(),
            audio_dir: config.audio_dir(),
        }
    }

    pub async fn synthesize(&self, text: &str) -> Result<Synthesis> {
        if self.api_key.is_empty() {
            return Err(anyhow!("text-to-speech is not configured (missing api key)"));
        }

        let request_log = serde_json::json!({
            "text": text,
            "voice_id": self.voice_id,
            "model_id": self.model_id,
        });
        let action = self.actions.create(
            self.apis.api_id_for(ApiType::TextToSpeech),
            &request_log,
        )?;

        let response = self
            .client
            .post(format!(
                "{}/v1/text-to-speech/{}?output_format=mp3_44100_128",
                self.base_url, self.voice_id
            ))
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({
                "text": text,
                "model_id": self.model_id,
            }))
            .send()
            .await
            .context("text-to-speech request failed")?
            .error_for_status()
            .context("text-to-speech returned an error status")?;
        let audio = response
            .bytes()
            .await
            .context("reading text-to-speech audio")?;

        tokio::fs::create_dir_all(&self.audio_dir)
            .await
            .context("creating audio directory")?;
        // Hash over text + timestamp so repeated synthesis of the same text
        // gets a fresh file.
        let stamp = chrono::Local::now().to_rfc3339();
        let digest = security::content_hash(format!("{}_{}", text, stamp).as_bytes());
        let audio_path = self.audio_dir.join(format!("tts_{}.mp3", digest));
        tokio::fs::write(&audio_path, &audio)
            .await
            .context("writing audio file")?;

        self.actions.complete(
            action.action_id,
            &serde_json::json!({
                "audio_path": audio_path.display().to_string(),
                "audio_size": audio.len(),
                "voice_id": self.voice_id,
                "model_id": self.model_id,
            }),
        )?;

        Ok(Synthesis { audio_path, action_id: action.action_id })
    }

    /// Read a previously synthesized file back; missing file is None.
    pub async fn audio_content(&self, path: &Path) -> Option<Vec<u8>> {
        tokio::fs::read(path).await.ok()
    }
}
