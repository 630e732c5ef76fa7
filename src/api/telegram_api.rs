use crate::error::{BotError, IsRetryable, Result};
use crate::types::telegram::{Message, TelegramResponse, User};
use backon::{ExponentialBuilder, Retryable};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Longest flood-control pause worth waiting out inside one run.
const MAX_RETRY_AFTER: u64 = 60;

/// Photo upload for `sendPhoto`.
pub struct PhotoUpload<'a> {
    pub chat_id: &'a str,
    pub caption: &'a str,
    pub bytes: &'a [u8],
    pub mime_type: &'a str,
}

pub struct TelegramApi;

impl TelegramApi {
    /// `{base}bot{token}/{method}`. The result embeds the token; never log it.
    fn method_url(base: &Url, token: &str, method: &str) -> Result<Url> {
        // the `./` keeps `bot123:abc` from parsing as a URL scheme
        Ok(base.join(&format!("./bot{token}/{method}"))?)
    }

    /// Verify the token and return the bot's own user record.
    pub async fn get_me(
        client: &reqwest::Client,
        base: &Url,
        token: &str,
        retry_policy: ExponentialBuilder,
    ) -> Result<User> {
        let url = Self::method_url(base, token, "getMe")?;
        (|| async {
            let resp = client.get(url.clone()).send().await.map_err(redact)?;
            Self::read_envelope(resp).await
        })
        .retry(retry_policy)
        .when(|e: &BotError| e.is_retryable())
        .adjust(honour_retry_after)
        .notify(|err: &BotError, dur: Duration| {
            warn!(error = %err, "getMe failed, retrying in {:?}", dur);
        })
        .await
    }

    /// Upload a photo with caption as `multipart/form-data`.
    pub async fn send_photo(
        client: &reqwest::Client,
        base: &Url,
        token: &str,
        retry_policy: ExponentialBuilder,
        upload: &PhotoUpload<'_>,
    ) -> Result<Message> {
        let url = Self::method_url(base, token, "sendPhoto")?;
        let extension = upload.mime_type.rsplit('/').next().unwrap_or("png");

        (|| async {
            // multipart bodies are consumed by send, rebuild per attempt
            let photo = Part::bytes(upload.bytes.to_vec())
                .file_name(format!("illustration.{extension}"))
                .mime_str(upload.mime_type)?;
            let form = Form::new()
                .text("chat_id", upload.chat_id.to_string())
                .text("caption", upload.caption.to_string())
                .part("photo", photo);

            let resp = client
                .post(url.clone())
                .multipart(form)
                .send()
                .await
                .map_err(redact)?;
            Self::read_envelope(resp).await
        })
        .retry(retry_policy)
        .when(|e: &BotError| e.is_retryable())
        .adjust(honour_retry_after)
        .notify(|err: &BotError, dur: Duration| {
            warn!(chat_id = upload.chat_id, error = %err, "sendPhoto failed, retrying in {:?}", dur);
        })
        .await
    }

    async fn read_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        let text = resp.text().await.map_err(redact)?;
        let envelope: TelegramResponse<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(BotError::UpstreamStatus(
                    status,
                    text.chars().take(300).collect(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(after) = envelope.parameters.as_ref().and_then(|p| p.retry_after) {
            return Err(BotError::RetryAfter(after, envelope.failure()));
        }
        if !status.is_success() {
            return Err(BotError::UpstreamStatus(status, envelope.failure()));
        }
        if !envelope.ok {
            return Err(BotError::Publish(envelope.failure()));
        }
        envelope
            .result
            .ok_or_else(|| BotError::Publish("reply carried no result".to_string()))
    }
}

/// Wait exactly as long as flood control asks, or give up when that is too long.
/// Other errors keep the backoff's own schedule.
fn honour_retry_after(err: &BotError, planned: Option<Duration>) -> Option<Duration> {
    match err {
        BotError::RetryAfter(secs, _) => {
            planned?;
            (*secs <= MAX_RETRY_AFTER).then(|| Duration::from_secs(*secs))
        }
        _ => planned,
    }
}

/// Request URLs carry the bot token; strip them before errors reach logs.
fn redact(e: reqwest::Error) -> BotError {
    BotError::Reqwest(e.without_url())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_url_layout() {
        let base = Url::parse("https://api.telegram.org/").unwrap();
        let url = TelegramApi::method_url(&base, "123:abc", "sendPhoto").unwrap();
        assert_eq!(url.as_str(), "https://api.telegram.org/bot123:abc/sendPhoto");
    }

    #[test]
    fn retry_after_overrides_backoff() {
        let planned = Some(Duration::from_millis(200));
        let flood = BotError::RetryAfter(7, "429: Too Many Requests".into());
        assert_eq!(honour_retry_after(&flood, planned), Some(Duration::from_secs(7)));

        // too long to wait out, and no attempts left
        let long = BotError::RetryAfter(MAX_RETRY_AFTER + 1, String::new());
        assert_eq!(honour_retry_after(&long, planned), None);
        assert_eq!(honour_retry_after(&flood, None), None);

        let other = BotError::UpstreamStatus(reqwest::StatusCode::BAD_GATEWAY, String::new());
        assert_eq!(honour_retry_after(&other, planned), planned);
    }
}
