use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use sqlx::Error as SqlxError;
use std::collections::HashMap;
use thiserror::Error as ThisError;

pub type Result<T, E = BotError> = std::result::Result<T, E>;

#[derive(Debug, ThisError)]
pub enum BotError {
    #[error("quote store is empty; ingest quotes first")]
    EmptyStore,

    #[error("quote {0} not found")]
    QuoteNotFound(i64),

    #[error("insight generation failed: {0}")]
    Generation(String),

    #[error("image rendering failed: {0}")]
    Render(String),

    #[error("text overlay failed: {0}")]
    Overlay(String),

    #[error("publishing failed: {0}")]
    Publish(String),

    #[error("rate limited, retry after {0}s: {1}")]
    RetryAfter(u64, String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("Upstream error with status {0}: {1}")]
    UpstreamStatus(StatusCode, String),
}

impl BotError {
    /// Re-label a transport failure as a generation failure, keeping stage errors intact.
    pub fn into_generation(self) -> Self {
        match self {
            e @ (Self::Generation(_) | Self::Render(_) | Self::Overlay(_) | Self::Publish(_)) => e,
            other => Self::Generation(other.to_string()),
        }
    }

    pub fn into_render(self) -> Self {
        match self {
            e @ (Self::Generation(_) | Self::Render(_) | Self::Overlay(_) | Self::Publish(_)) => e,
            other => Self::Render(other.to_string()),
        }
    }

    pub fn into_overlay(self) -> Self {
        match self {
            e @ (Self::Generation(_) | Self::Render(_) | Self::Overlay(_) | Self::Publish(_)) => e,
            other => Self::Overlay(other.to_string()),
        }
    }

    pub fn into_publish(self) -> Self {
        match self {
            e @ (Self::Generation(_) | Self::Render(_) | Self::Overlay(_) | Self::Publish(_)) => e,
            other => Self::Publish(other.to_string()),
        }
    }
}

/// Decides whether a failed upstream call is worth another attempt.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for BotError {
    fn is_retryable(&self) -> bool {
        match self {
            BotError::Reqwest(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(is_retryable_status)
            }
            BotError::UpstreamStatus(status, _) => is_retryable_status(*status),
            BotError::RetryAfter(..) => true,
            _ => false,
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Gemini API error response structure
#[derive(Deserialize, Debug)]
pub struct GeminiError {
    pub error: GeminiErrorBody,
}

#[derive(Deserialize, Debug)]
pub struct GeminiErrorBody {
    pub code: u32,
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl GeminiError {
    /// Best-effort extraction of a readable message from an error body.
    pub fn describe(body: &str) -> String {
        match serde_json::from_str::<GeminiError>(body) {
            Ok(err) if err.error.status.is_empty() => err.error.message,
            Ok(err) => format!("{}: {}", err.error.status, err.error.message),
            Err(_) => body.chars().take(300).collect(),
        }
    }
}
