//! Config loaded once from settings.json with per-key environment
//! variable fallback; the first caller of `ensure_loaded()` does the work,
//! later callers get the same instance. Missing file or keys fall back to
//! dev defaults.

use std::path::PathBuf;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_DICTIONARY_URL: &str = "https://api.dictionaryapi.dev/api/v2/entries/en";
pub const DEFAULT_ELEVENLABS_URL: &str = "https://api.elevenlabs.io";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Root for the CSV tables; synthesized audio goes to `{data_dir}/audio`.
    pub data_dir: PathBuf,

    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_base_url: String,

    pub elevenlabs_api_key: String,
    pub elevenlabs_base_url: String,
    pub elevenlabs_voice_id: String,
    pub elevenlabs_model_id: String,
    pub elevenlabs_stt_model: String,
    pub elevenlabs_language: String,

    pub dictionary_url: String,
}

/// Ensure config is loaded (idempotent). Reads settings.json from the
/// working directory on first call; returns the same instance afterwards.
pub fn ensure_loaded() -> &'static Config {
    CONFIG.get_or_init(|| load_settings_from(&PathBuf::from("settings.json")))
}

fn setting(root: &serde_json::Value, path: &[&str], env: &str) -> Option<String> {
    let mut node = Some(root);
    for key in path {
        node = node.and_then(|n| n.get(key));
    }
    node.and_then(|n| n.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var(env).ok().filter(|s| !s.is_empty()))
}

fn load_settings_from(path: &std::path::Path) -> Config {
    let root: serde_json::Value = std::fs::read_to_string(path)
        .ok()
        .and_then(|data| serde_json::from_str(&data).ok())
        .unwrap_or(serde_json::Value::Null);

    let defaults = Config::default();
    let get = |path: &[&str], env: &str| setting(&root, path, env);

    Config {
        host: get(&["host"], "HOST").unwrap_or(defaults.host),
        port: get(&["port"], "PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT),
        data_dir: get(&["data_dir"], "DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir),
        llm_api_key: get(&["llm", "api_key"], "LITELLM_API_KEY").unwrap_or_default(),
        llm_model: get(&["llm", "model"], "LITELLM_MODEL").unwrap_or(defaults.llm_model),
        llm_base_url: get(&["llm", "base_url"], "LITELLM_BASE_URL").unwrap_or(defaults.llm_base_url),
        elevenlabs_api_key: get(&["elevenlabs", "api_key"], "ELEVENLABS_API_KEY")
            .unwrap_or_default(),
        elevenlabs_base_url: get(&["elevenlabs", "base_url"], "ELEVENLABS_BASE_URL")
            .unwrap_or(defaults.elevenlabs_base_url),
        elevenlabs_voice_id: get(&["elevenlabs", "voice_id"], "ELEVENLABS_VOICE_ID")
            .unwrap_or(defaults.elevenlabs_voice_id),
        elevenlabs_model_id: get(&["elevenlabs", "model_id"], "ELEVENLABS_MODEL_ID")
            .unwrap_or(defaults.elevenlabs_model_id),
        elevenlabs_stt_model: get(&["elevenlabs", "stt_model"], "ELEVENLABS_STT_MODEL")
            .unwrap_or(defaults.elevenlabs_stt_model),
        elevenlabs_language: get(&["elevenlabs", "language"], "ELEVENLABS_LANGUAGE")
            .unwrap_or(defaults.elevenlabs_language),
        dictionary_url: get(&["dictionary", "url"], "DICTIONARY_API_URL")
            .unwrap_or(defaults.dictionary_url),
    }
}

impl Config {
    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join("audio")
    }

    /// Startup warnings for keys that are missing but needed by a feature.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.llm_api_key.is_empty() {
            warnings.push("LLM api key not set - chat replies will fail".to_string());
        }
        if self.elevenlabs_api_key.is_empty() {
            warnings.push("ElevenLabs api key not set - speech features will fail".to_string());
        }
        warnings
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from("data"),
            llm_api_key: String::new(),
            llm_model: "gpt-3.5-turbo".to_string(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            elevenlabs_api_key: String::new(),
            elevenlabs_base_url: DEFAULT_ELEVENLABS_URL.to_string(),
            elevenlabs_voice_id: "JBFqnCBsd6RMkjVDRZzb".to_string(),
            elevenlabs_model_id: "eleven_multilingual_v2".to_string(),
            elevenlabs_stt_model: "scribe_v1".to_string(),
            elevenlabs_language: "eng".to_string(),
            dictionary_url: DEFAULT_DICTIONARY_URL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_settings_from(std::path::Path::new("/nonexistent/settings.json"));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.dictionary_url, DEFAULT_DICTIONARY_URL);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = std::env::temp_dir().join(format!("linguachat-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        std::fs::write(
            &path,
            r#"{"port": "8080", "llm": {"model": "gpt-4o-mini", "api_key": "k"}}"#,
        )
        .unwrap();
        let config = load_settings_from(&path);
        assert_eq!(config.port, 8080);
        assert_eq!(config.llm_model, "gpt-4o-mini");
        assert_eq!(config.llm_api_key, "k");
        assert_eq!(config.host, DEFAULT_HOST);
    }
}
