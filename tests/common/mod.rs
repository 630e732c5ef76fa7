//! Local stand-ins for the Gemini and Telegram HTTP APIs.
#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use daily_stoic::config::Config;
use serde_json::{Value, json};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use tokio::net::TcpListener;
use url::Url;

pub const API_KEY: &str = "test-key";
pub const BOT_TOKEN: &str = "123:abc";
pub const CHAT_ID: &str = "-1001";
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3];
pub const EXPLANATION: &str = "Breathe, then act on what you control.";
pub const IMAGE_PROMPT: &str = "A weathered marble statue facing a storm at dawn";

pub async fn serve(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/")).unwrap()
}

/// Config pointing every upstream at the given mock servers.
pub fn config(gemini: &Url, telegram: &Url) -> Config {
    Config {
        telegram_bot_token: Some(BOT_TOKEN.to_string()),
        telegram_chat_id: Some(CHAT_ID.to_string()),
        gemini_api_key: Some(API_KEY.to_string()),
        gemini_base_url: gemini.join("v1beta/").unwrap(),
        telegram_base_url: telegram.clone(),
        http_timeout_secs: 10,
        max_retries: 2,
        ..Config::default()
    }
}

#[derive(Debug, Clone)]
pub struct GeminiCall {
    /// `{model}:{method}`
    pub call: String,
    pub body: Value,
}

#[derive(Clone, Default)]
pub struct GeminiMock {
    pub calls: Arc<Mutex<Vec<GeminiCall>>>,
    /// Requests answered with 503 before the mock starts behaving.
    pub transient_failures: Arc<AtomicUsize>,
    pub reject: bool,
    pub blocked: bool,
}

impl GeminiMock {
    pub async fn start(self) -> Url {
        let app = Router::new()
            .route("/v1beta/models/{call}", post(gemini_handler))
            .with_state(self);
        serve(app).await
    }

    pub fn calls(&self) -> Vec<GeminiCall> {
        self.calls.lock().unwrap().clone()
    }
}

fn prompt_text(body: &Value) -> &str {
    body["contents"][0]["parts"][0]["text"]
        .as_str()
        .or_else(|| body["instances"][0]["prompt"].as_str())
        .unwrap_or_default()
}

async fn gemini_handler(
    State(mock): State<GeminiMock>,
    Path(call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": {"code": 403, "message": "bad key", "status": "PERMISSION_DENIED"}})),
        )
            .into_response();
    }
    mock.calls.lock().unwrap().push(GeminiCall {
        call: call.clone(),
        body: body.clone(),
    });

    let pending = mock.transient_failures.load(Ordering::SeqCst);
    if pending > 0 {
        mock.transient_failures.store(pending - 1, Ordering::SeqCst);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": {"code": 503, "message": "overloaded", "status": "UNAVAILABLE"}})),
        )
            .into_response();
    }
    if mock.reject {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}})),
        )
            .into_response();
    }

    let image = STANDARD.encode(PNG_BYTES);
    if call.ends_with(":predict") {
        return Json(json!({
            "predictions": [{"bytesBase64Encoded": image, "mimeType": "image/png"}]
        }))
        .into_response();
    }

    let wants_image = body["generationConfig"]["responseModalities"]
        .as_array()
        .is_some_and(|m| m.iter().any(|v| v == "IMAGE"));
    if wants_image {
        return Json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Here is your image."},
                    {"inlineData": {"mimeType": "image/png", "data": image}}
                ]},
                "finishReason": "STOP"
            }]
        }))
        .into_response();
    }

    if mock.blocked {
        return Json(json!({"promptFeedback": {"blockReason": "SAFETY"}})).into_response();
    }
    let text = if prompt_text(&body).contains("image prompt") {
        IMAGE_PROMPT
    } else {
        EXPLANATION
    };
    Json(json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": format!("  {text}\n")}]},
            "finishReason": "STOP"
        }],
        "modelVersion": "mock"
    }))
    .into_response()
}

#[derive(Debug, Clone, Default)]
pub struct ReceivedPhoto {
    pub chat_id: String,
    pub caption: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Default)]
pub struct TelegramMock {
    pub photos: Arc<Mutex<Vec<ReceivedPhoto>>>,
    /// Answer `sendPhoto` with a 400 `ok: false` envelope carrying this description.
    pub reject: Option<&'static str>,
    /// `sendPhoto` requests answered with 429 flood control before the mock accepts uploads.
    pub rate_limited: Arc<AtomicUsize>,
    pub retry_after: u64,
    pub attempts: Arc<AtomicUsize>,
}

impl TelegramMock {
    pub async fn start(self) -> Url {
        let app = Router::new()
            .route("/{token}/getMe", get(get_me))
            .route("/{token}/sendPhoto", post(send_photo))
            .with_state(self);
        serve(app).await
    }

    pub fn photos(&self) -> Vec<ReceivedPhoto> {
        self.photos.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

fn token_ok(token: &str) -> bool {
    token == format!("bot{BOT_TOKEN}")
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"ok": false, "error_code": 401, "description": "Unauthorized"})),
    )
        .into_response()
}

async fn get_me(Path(token): Path<String>) -> Response {
    if !token_ok(&token) {
        return unauthorized();
    }
    Json(json!({"ok": true, "result": {"id": 42, "is_bot": true, "username": "stoa_bot"}}))
        .into_response()
}

async fn send_photo(
    State(mock): State<TelegramMock>,
    Path(token): Path<String>,
    mut multipart: Multipart,
) -> Response {
    if !token_ok(&token) {
        return unauthorized();
    }
    mock.attempts.fetch_add(1, Ordering::SeqCst);

    let mut photo = ReceivedPhoto::default();
    while let Some(field) = multipart.next_field().await.unwrap() {
        match field.name().unwrap_or_default() {
            "chat_id" => photo.chat_id = field.text().await.unwrap(),
            "caption" => photo.caption = field.text().await.unwrap(),
            "photo" => {
                photo.file_name = field.file_name().map(str::to_string);
                photo.content_type = field.content_type().map(str::to_string);
                photo.bytes = field.bytes().await.unwrap().to_vec();
            }
            _ => {}
        }
    }

    let pending = mock.rate_limited.load(Ordering::SeqCst);
    if pending > 0 {
        mock.rate_limited.store(pending - 1, Ordering::SeqCst);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after",
                "parameters": {"retry_after": mock.retry_after}
            })),
        )
            .into_response();
    }

    if let Some(description) = mock.reject {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"ok": false, "error_code": 400, "description": description})),
        )
            .into_response();
    }

    let mut photos = mock.photos.lock().unwrap();
    photos.push(photo);
    Json(json!({
        "ok": true,
        "result": {
            "message_id": photos.len(),
            "chat": {"id": -1001, "title": "Stoa"},
            "date": 1_700_000_000
        }
    }))
    .into_response()
}
