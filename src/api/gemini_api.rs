use crate::error::{BotError, GeminiError, IsRetryable, Result};
use crate::types::gemini::{
    GenerateContentRequest, GenerateContentResponse, PredictRequest, PredictResponse,
};
use backon::{ExponentialBuilder, Retryable};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::warn;
use url::Url;

pub struct GeminiApi;

impl GeminiApi {
    /// `{base}models/{model}:{method}`
    pub fn endpoint(base: &Url, model: &str, method: &str) -> Result<Url> {
        Ok(base.join(&format!("models/{model}:{method}"))?)
    }

    pub async fn generate_content(
        client: &reqwest::Client,
        base: &Url,
        api_key: &str,
        model: &str,
        retry_policy: ExponentialBuilder,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = Self::endpoint(base, model, "generateContent")?;
        Self::post_json(client, url, api_key, retry_policy, body).await
    }

    pub async fn predict(
        client: &reqwest::Client,
        base: &Url,
        api_key: &str,
        model: &str,
        retry_policy: ExponentialBuilder,
        body: &PredictRequest,
    ) -> Result<PredictResponse> {
        let url = Self::endpoint(base, model, "predict")?;
        Self::post_json(client, url, api_key, retry_policy, body).await
    }

    async fn post_json<B, T>(
        client: &reqwest::Client,
        url: Url,
        api_key: &str,
        retry_policy: ExponentialBuilder,
        body: &B,
    ) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        (|| async {
            let resp = client
                .post(url.clone())
                .header("x-goog-api-key", api_key)
                .json(body)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(BotError::UpstreamStatus(status, GeminiError::describe(&text)));
            }
            Ok(resp.json::<T>().await?)
        })
        .retry(retry_policy)
        .when(|e: &BotError| e.is_retryable())
        .notify(|err: &BotError, dur: Duration| {
            warn!(path = url.path(), error = %err, "Gemini call failed, retrying in {:?}", dur);
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_version_prefix() {
        let base = Url::parse("https://generativelanguage.googleapis.com/v1beta/").unwrap();
        let url = GeminiApi::endpoint(&base, "gemini-2.0-flash", "generateContent").unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}
