//! Stateless upstream calls. Each function performs one logical request with
//! network-aware retries and knows nothing about the pipeline.

pub mod gemini_api;
pub mod telegram_api;

pub use gemini_api::GeminiApi;
pub use telegram_api::{PhotoUpload, TelegramApi};
