//! Axum HTTP API: auth (/api/auth/*), conversations and messages
//! (/api/conversation/*), vocabulary (/api/vocab/*), and a health check.
//! Every response body is JSON carrying a `success` flag; protected routes
//! expect an `Authorization: Bearer <token>` header.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use tower_http::cors::CorsLayer;

use common::actions::ApiStore;
use common::auth::{AuthError, AuthService};
use common::config::Config;
use common::conversations::{ConversationStore, MessageStore, Mode, TimelineMessage};
use common::dictionary::{DictionaryService, LookupError};
use common::llm::{ChatMessage, LlmService};
use common::store::FlatStore;
use common::stt::SttService;
use common::tts::TtsService;
use common::users::{User, UserError};
use common::validators;
use common::vocab::VocabStore;

/// Shared app state: each service holds its own handle to the one store.
#[derive(Clone)]
struct AppState {
    auth: AuthService,
    conversations: ConversationStore,
    messages: MessageStore,
    vocab: VocabStore,
    llm: LlmService,
    stt: SttService,
    tts: TtsService,
    dictionary: DictionaryService,
}

/// POST /api/auth/register body.
#[derive(serde::Deserialize)]
struct RegisterBody {
    username: String,
    password: String,
    full_name: String,
}

/// POST /api/auth/login body.
#[derive(serde::Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

/// POST /api/conversation/new body; mode defaults to text chat.
#[derive(serde::Deserialize, Default)]
struct NewConversationBody {
    #[serde(default)]
    mode: Option<String>,
}

/// POST /api/conversation/message/send body.
#[derive(serde::Deserialize)]
struct SendMessageBody {
    conversation_id: u64,
    message: String,
}

/// POST /api/vocab/lookup body.
#[derive(serde::Deserialize)]
struct LookupBody {
    word: String,
}

fn ok(status: StatusCode, mut value: serde_json::Value) -> Response {
    if let Some(map) = value.as_object_mut() {
        map.insert("success".into(), serde_json::Value::Bool(true));
    }
    (status, Json(value)).into_response()
}

fn fail(status: StatusCode, error: impl std::fmt::Display) -> Response {
    (
        status,
        Json(serde_json::json!({ "success": false, "error": error.to_string() })),
    )
        .into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").or(Some(value))
}

/// Resolve the request's bearer token to an active user, or the 401 reply.
fn current_user(state: &AppState, headers: &HeaderMap) -> Result<User, Response> {
    bearer_token(headers)
        .and_then(|token| state.auth.verify(token))
        .filter(|user| user.active)
        .ok_or_else(|| fail(StatusCode::UNAUTHORIZED, "Unauthorized"))
}

/// Build the store, services, and router, then serve until shutdown.
pub async fn run_web_server(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(FlatStore::new(config.data_dir.clone())?);
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()?;

    // The provider registry is static data; seed it on first boot only.
    ApiStore::new(store.clone()).ensure_seeded(config)?;

    let state = AppState {
        auth: AuthService::new(store.clone()),
        conversations: ConversationStore::new(store.clone()),
        messages: MessageStore::new(store.clone()),
        vocab: VocabStore::new(store.clone()),
        llm: LlmService::new(store.clone(), config, client.clone()),
        stt: SttService::new(store.clone(), config, client.clone()),
        tts: TtsService::new(store.clone(), config, client.clone()),
        dictionary: DictionaryService::new(store, config, client),
    };

    let app = Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/verify", get(verify_handler))
        .route("/api/conversation/new", post(new_conversation_handler))
        .route("/api/conversation/list", get(list_conversations_handler))
        .route("/api/conversation/{id}", get(get_conversation_handler))
        .route("/api/conversation/message/send", post(send_message_handler))
        .route("/api/conversation/message/audio", post(audio_message_handler))
        .route("/api/conversation/message/tts/{message_id}", get(tts_handler))
        .route("/api/vocab/lookup", post(vocab_lookup_handler))
        .route("/api/vocab/history", get(vocab_history_handler))
        .route("/api/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "message": "LinguaChat backend is running" }))
}

async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Response {
    match state
        .auth
        .register(body.username.trim(), &body.password, body.full_name.trim())
    {
        Ok(user) => ok(StatusCode::CREATED, serde_json::json!({ "user": user })),
        Err(e @ AuthError::Invalid(_)) => fail(StatusCode::BAD_REQUEST, e),
        Err(e @ AuthError::User(UserError::DuplicateUsername(_))) => {
            fail(StatusCode::BAD_REQUEST, e)
        }
        Err(e) => {
            tracing::error!("registration failed: {}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn login_handler(State(state): State<AppState>, Json(body): Json<LoginBody>) -> Response {
    match state.auth.login(body.username.trim(), &body.password) {
        Ok((token, user)) => ok(
            StatusCode::OK,
            serde_json::json!({ "token": token, "user": user }),
        ),
        Err(e @ AuthError::BadCredentials) => fail(StatusCode::UNAUTHORIZED, e),
        Err(e) => {
            tracing::error!("login failed: {}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = bearer_token(&headers) {
        state.auth.logout(token);
    }
    ok(StatusCode::OK, serde_json::json!({}))
}

async fn verify_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match current_user(&state, &headers) {
        Ok(user) => ok(StatusCode::OK, serde_json::json!({ "user": user })),
        Err(resp) => resp,
    }
}

async fn new_conversation_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<NewConversationBody>>,
) -> Response {
    let user = match current_user(&state, &headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let mode = Mode::parse(body.and_then(|Json(b)| b.mode).as_deref().unwrap_or("text"));
    match state.conversations.create(user.user_id, mode) {
        Ok(conversation) => ok(
            StatusCode::CREATED,
            serde_json::json!({ "conversation": conversation }),
        ),
        Err(e) => {
            tracing::error!("creating conversation failed: {}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn list_conversations_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match current_user(&state, &headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let conversations = state.conversations.for_user(user.user_id);
    ok(
        StatusCode::OK,
        serde_json::json!({ "conversations": conversations }),
    )
}

async fn get_conversation_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    let user = match current_user(&state, &headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let Some(conversation) = state.conversations.get(id) else {
        return fail(StatusCode::NOT_FOUND, "Conversation not found");
    };
    if conversation.user_id != user.user_id {
        return fail(StatusCode::FORBIDDEN, "Forbidden");
    }
    let messages = state.messages.conversation_messages(id);
    ok(
        StatusCode::OK,
        serde_json::json!({ "conversation": conversation, "messages": messages }),
    )
}

/// Text turn: save the user message, feed the prior timeline to the model,
/// save and return the AI reply.
async fn send_message_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SendMessageBody>,
) -> Response {
    let user = match current_user(&state, &headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let text = body.message.trim();
    if let Err(e) = validators::validate_message(text) {
        return fail(StatusCode::BAD_REQUEST, e);
    }
    let conversation = state.conversations.get(body.conversation_id);
    if !conversation.is_some_and(|c| c.user_id == user.user_id) {
        return fail(StatusCode::FORBIDDEN, "Invalid conversation");
    }

    let user_msg = match state.messages.create_user_message(body.conversation_id, text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::error!("saving user message failed: {}", e);
            return fail(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };

    // The just-saved message is the new turn, not part of the history.
    let history: Vec<ChatMessage> = state
        .messages
        .conversation_messages(body.conversation_id)
        .iter()
        .filter(|entry| {
            !matches!(entry, TimelineMessage::User(m) if m.message_id == user_msg.message_id)
        })
        .map(|entry| match entry {
            TimelineMessage::User(m) => ChatMessage::user(&m.message),
            TimelineMessage::Ai(m) => ChatMessage::assistant(&m.message),
        })
        .collect();

    let reply = match state.llm.chat_completion(text, &history).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!("LLM call failed: {:#}", e);
            return fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get an AI reply");
        }
    };

    let ai_msg = match state.messages.create_ai_message(
        body.conversation_id,
        &reply.response,
        Some(reply.action_id),
    ) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::error!("saving AI message failed: {}", e);
            return fail(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };

    ok(
        StatusCode::OK,
        serde_json::json!({ "user_message": user_msg, "ai_message": ai_msg }),
    )
}

/// Voice input: multipart form with a `conversation_id` field and an
/// `audio` file part. Returns the transcript; the client sends it back
/// through the normal text route.
async fn audio_message_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let user = match current_user(&state, &headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let mut conversation_id: Option<u64> = None;
    let mut audio: Option<(Vec<u8>, String)> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("conversation_id") => {
                conversation_id = field.text().await.ok().and_then(|t| t.parse().ok());
            }
            Some("audio") => {
                let format = field
                    .file_name()
                    .and_then(|name| name.rsplit('.').next())
                    .unwrap_or("wav")
                    .to_string();
                audio = field.bytes().await.ok().map(|bytes| (bytes.to_vec(), format));
            }
            _ => {}
        }
    }
    let (Some(conversation_id), Some((audio, format))) = (conversation_id, audio) else {
        return fail(StatusCode::BAD_REQUEST, "Missing conversation_id or audio");
    };

    let conversation = state.conversations.get(conversation_id);
    if !conversation.is_some_and(|c| c.user_id == user.user_id) {
        return fail(StatusCode::FORBIDDEN, "Invalid conversation");
    }

    match state.stt.transcribe(audio, &format).await {
        Ok(transcript) => ok(
            StatusCode::OK,
            serde_json::json!({
                "transcript": transcript.text,
                "action_id": transcript.action_id,
            }),
        ),
        Err(e) => {
            tracing::error!("transcription failed: {:#}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to transcribe audio")
        }
    }
}

/// Speak an AI reply: synthesize the message text and hand the audio back
/// as base64 so the browser can play it inline.
async fn tts_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<u64>,
) -> Response {
    let user = match current_user(&state, &headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let Some(ai_msg) = state.messages.ai_message(message_id) else {
        return fail(StatusCode::NOT_FOUND, "Message not found");
    };
    let conversation = state.conversations.get(ai_msg.conversation_id);
    if !conversation.is_some_and(|c| c.user_id == user.user_id) {
        return fail(StatusCode::FORBIDDEN, "Forbidden");
    }

    let synthesis = match state.tts.synthesize(&ai_msg.message).await {
        Ok(synthesis) => synthesis,
        Err(e) => {
            tracing::error!("synthesis failed: {:#}", e);
            return fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to synthesize speech");
        }
    };
    let Some(audio) = state.tts.audio_content(&synthesis.audio_path).await else {
        return fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read audio file");
    };

    ok(
        StatusCode::OK,
        serde_json::json!({
            "audio": base64::engine::general_purpose::STANDARD.encode(audio),
            "action_id": synthesis.action_id,
        }),
    )
}

async fn vocab_lookup_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LookupBody>,
) -> Response {
    let user = match current_user(&state, &headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.dictionary.lookup_word(user.user_id, &body.word).await {
        Ok(lookup) => match serde_json::to_value(&lookup) {
            Ok(value) => ok(StatusCode::OK, value),
            Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e),
        },
        Err(e @ (LookupError::Invalid(_) | LookupError::NotFound)) => {
            fail(StatusCode::BAD_REQUEST, e)
        }
        Err(e) => {
            tracing::error!("lookup failed: {:#}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to look the word up")
        }
    }
}

async fn vocab_history_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match current_user(&state, &headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let vocabulary = state.vocab.for_user(user.user_id);
    ok(
        StatusCode::OK,
        serde_json::json!({ "vocabulary": vocabulary }),
    )
}
