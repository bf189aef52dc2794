//! Logged outbound API calls and the third-party API registry.
//!
//! An `Action` is written in two phases: created Pending (request payload
//! and timestamp, empty response fields), then completed by an update
//! keyed on ActionID that fills the response payload and timestamp. No
//! other table uses this pattern.

use std::sync::Arc;

use crate::config::Config;
use crate::store::{now_stamp, FlatStore, Row, StoreError};

const ACTIONS: &str = "actions.csv";
const ACTION_COLUMNS: &[&str] =
    &["ActionID", "APIID", "Request", "RequestTime", "Response", "ResponseTime"];

const APIS: &str = "third_party_apis.csv";
const API_COLUMNS: &[&str] = &["APIID", "ApiType", "ProviderID", "ProviderName", "Key", "URL"];

/// The four provider kinds the backend calls out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiType {
    Llm,
    SpeechToText,
    TextToSpeech,
    Dictionary,
}

impl ApiType {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiType::Llm => "LLM",
            ApiType::SpeechToText => "speech-to-text",
            ApiType::TextToSpeech => "text-to-speech",
            ApiType::Dictionary => "dictionary",
        }
    }

    /// Fallback APIID when the registry row is missing, matching the
    /// seeding order.
    pub fn default_api_id(self) -> u64 {
        match self {
            ApiType::Llm => 1,
            ApiType::SpeechToText => 2,
            ApiType::TextToSpeech => 3,
            ApiType::Dictionary => 4,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Action {
    pub action_id: u64,
    pub api_id: u64,
    /// Serialized request payload (JSON).
    pub request: String,
    pub request_time: String,
    /// Empty until the call completes.
    pub response: String,
    pub response_time: String,
}

impl Action {
    pub fn is_pending(&self) -> bool {
        self.response.is_empty() && self.response_time.is_empty()
    }

    fn to_row(&self) -> Row {
        Row::from([
            ("ActionID".into(), self.action_id.to_string()),
            ("APIID".into(), self.api_id.to_string()),
            ("Request".into(), self.request.clone()),
            ("RequestTime".into(), self.request_time.clone()),
            ("Response".into(), self.response.clone()),
            ("ResponseTime".into(), self.response_time.clone()),
        ])
    }

    fn from_row(row: &Row) -> Option<Self> {
        let get = |k: &str| row.get(k).cloned().unwrap_or_default();
        Some(Self {
            action_id: get("ActionID").parse().ok()?,
            api_id: get("APIID").parse().ok()?,
            request: get("Request"),
            request_time: get("RequestTime"),
            response: get("Response"),
            response_time: get("ResponseTime"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ThirdPartyApi {
    pub api_id: u64,
    pub api_type: String,
    pub provider_id: String,
    pub provider_name: String,
    pub key: String,
    pub url: String,
}

impl ThirdPartyApi {
    fn to_row(&self) -> Row {
        Row::from([
            ("APIID".into(), self.api_id.to_string()),
            ("ApiType".into(), self.api_type.clone()),
            ("ProviderID".into(), self.provider_id.clone()),
            ("ProviderName".into(), self.provider_name.clone()),
            ("Key".into(), self.key.clone()),
            ("URL".into(), self.url.clone()),
        ])
    }

    fn from_row(row: &Row) -> Option<Self> {
        let get = |k: &str| row.get(k).cloned().unwrap_or_default();
        Some(Self {
            api_id: get("APIID").parse().ok()?,
            api_type: get("ApiType"),
            provider_id: get("ProviderID"),
            provider_name: get("ProviderName"),
            key: get("Key"),
            url: get("URL"),
        })
    }
}

#[derive(Clone)]
pub struct ActionStore {
    store: Arc<FlatStore>,
}

impl ActionStore {
    pub fn new(store: Arc<FlatStore>) -> Self {
        Self { store }
    }

    /// Record an outbound request before it is sent. The action starts
    /// Pending: response fields stay empty until [`ActionStore::complete`].
    pub fn create(&self, api_id: u64, request: &serde_json::Value) -> Result<Action, StoreError> {
        let mut action = Action {
            action_id: 0,
            api_id,
            request: request.to_string(),
            request_time: now_stamp(),
            response: String::new(),
            response_time: String::new(),
        };
        let template = action.clone();
        action.action_id =
            self.store
                .append_with_next_id(ACTIONS, "ActionID", ACTION_COLUMNS, move |id| {
                    let mut a = template;
                    a.action_id = id;
                    a.to_row()
                })?;
        Ok(action)
    }

    /// Transition Pending → Completed: fill the response payload and stamp
    /// the response time. Returns false if the action does not exist.
    pub fn complete(
        &self,
        action_id: u64,
        response: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        let Some(mut action) = self.get(action_id) else {
            return Ok(false);
        };
        action.response = response.to_string();
        action.response_time = now_stamp();
        self.store.update_by_field(
            ACTIONS,
            "ActionID",
            &action_id.to_string(),
            action.to_row(),
            ACTION_COLUMNS,
        )
    }

    pub fn get(&self, action_id: u64) -> Option<Action> {
        self.store
            .find_by_field(ACTIONS, "ActionID", &action_id.to_string())
            .as_ref()
            .and_then(Action::from_row)
    }

    pub fn for_api(&self, api_id: u64) -> Vec<Action> {
        self.store
            .find_all_by_field(ACTIONS, "APIID", &api_id.to_string())
            .iter()
            .filter_map(Action::from_row)
            .collect()
    }
}

#[derive(Clone)]
pub struct ApiStore {
    store: Arc<FlatStore>,
}

impl ApiStore {
    pub fn new(store: Arc<FlatStore>) -> Self {
        Self { store }
    }

    pub fn by_id(&self, api_id: u64) -> Option<ThirdPartyApi> {
        self.store
            .find_by_field(APIS, "APIID", &api_id.to_string())
            .as_ref()
            .and_then(ThirdPartyApi::from_row)
    }

    pub fn by_type(&self, api_type: ApiType) -> Option<ThirdPartyApi> {
        self.store
            .find_by_field(APIS, "ApiType", api_type.as_str())
            .as_ref()
            .and_then(ThirdPartyApi::from_row)
    }

    /// APIID for `api_type`, falling back to the seeded position when the
    /// registry row is missing.
    pub fn api_id_for(&self, api_type: ApiType) -> u64 {
        self.by_type(api_type)
            .map(|api| api.api_id)
            .unwrap_or_else(|| api_type.default_api_id())
    }

    pub fn update_key(&self, api_id: u64, key: &str) -> Result<bool, StoreError> {
        let Some(mut api) = self.by_id(api_id) else {
            return Ok(false);
        };
        api.key = key.to_string();
        self.store.update_by_field(
            APIS,
            "APIID",
            &api_id.to_string(),
            api.to_row(),
            API_COLUMNS,
        )
    }

    pub fn all(&self) -> Vec<ThirdPartyApi> {
        self.store
            .read(APIS)
            .iter()
            .filter_map(ThirdPartyApi::from_row)
            .collect()
    }

    /// Seed one registry row per api type from config when the table is
    /// empty. A populated table is left untouched.
    pub fn ensure_seeded(&self, config: &Config) -> Result<(), StoreError> {
        if !self.all().is_empty() {
            return Ok(());
        }
        let rows = [
            ThirdPartyApi {
                api_id: 1,
                api_type: ApiType::Llm.as_str().into(),
                provider_id: "openai".into(),
                provider_name: "OpenAI-compatible".into(),
                key: config.llm_api_key.clone(),
                url: config.llm_base_url.clone(),
            },
            ThirdPartyApi {
                api_id: 2,
                api_type: ApiType::SpeechToText.as_str().into(),
                provider_id: "elevenlabs".into(),
                provider_name: "ElevenLabs".into(),
                key: config.elevenlabs_api_key.clone(),
                url: config.elevenlabs_base_url.clone(),
            },
            ThirdPartyApi {
                api_id: 3,
                api_type: ApiType::TextToSpeech.as_str().into(),
                provider_id: "elevenlabs".into(),
                provider_name: "ElevenLabs".into(),
                key: config.elevenlabs_api_key.clone(),
                url: config.elevenlabs_base_url.clone(),
            },
            ThirdPartyApi {
                api_id: 4,
                api_type: ApiType::Dictionary.as_str().into(),
                provider_id: "free".into(),
                provider_name: "Free Dictionary API".into(),
                key: String::new(),
                url: config.dictionary_url.clone(),
            },
        ];
        for api in rows {
            self.store.append(APIS, &api.to_row(), API_COLUMNS)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> (ActionStore, ApiStore) {
        let dir = std::env::temp_dir().join(format!("linguachat-actions-{}", uuid::Uuid::new_v4()));
        let store = Arc::new(FlatStore::new(dir).unwrap());
        (ActionStore::new(store.clone()), ApiStore::new(store))
    }

    #[test]
    fn action_lifecycle_pending_then_completed() {
        let (actions, _) = stores();
        let action = actions
            .create(1, &serde_json::json!({"model": "gpt-4o-mini", "q": "hi"}))
            .unwrap();
        assert!(action.is_pending());

        let stored = actions.get(action.action_id).unwrap();
        assert!(stored.response.is_empty());
        assert!(stored.response_time.is_empty());

        let done = actions
            .complete(action.action_id, &serde_json::json!({"reply": "hello"}))
            .unwrap();
        assert!(done);

        let stored = actions.get(action.action_id).unwrap();
        assert_eq!(stored.action_id, action.action_id);
        assert!(!stored.is_pending());
        assert!(stored.response.contains("hello"));
        assert!(!stored.response_time.is_empty());
    }

    #[test]
    fn completing_a_missing_action_reports_false() {
        let (actions, _) = stores();
        assert!(!actions.complete(42, &serde_json::json!({})).unwrap());
    }

    #[test]
    fn registry_seeds_once_and_resolves_by_type() {
        let (_, apis) = stores();
        let config = Config::default();
        apis.ensure_seeded(&config).unwrap();
        apis.ensure_seeded(&config).unwrap();
        assert_eq!(apis.all().len(), 4);

        let dict = apis.by_type(ApiType::Dictionary).unwrap();
        assert_eq!(dict.api_id, 4);
        assert_eq!(apis.api_id_for(ApiType::Llm), 1);
    }

    #[test]
    fn update_key_rewrites_only_that_row() {
        let (_, apis) = stores();
        apis.ensure_seeded(&Config::default()).unwrap();
        assert!(apis.update_key(2, "new-key").unwrap());
        assert_eq!(apis.by_id(2).unwrap().key, "new-key");
        assert_ne!(apis.by_id(3).unwrap().key, "new-key");
        assert!(!apis.update_key(99, "x").unwrap());
    }
}
