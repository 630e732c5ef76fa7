use crate::api::GeminiApi;
use crate::config::Config;
use crate::error::{BotError, Result};
use crate::types::gemini::{GenerateContentRequest, PredictRequest};
use async_trait::async_trait;
use backon::ExponentialBuilder;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl RenderedImage {
    pub fn file_extension(&self) -> &str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

#[async_trait]
pub trait ImageRenderer: Send + Sync {
    async fn render(&self, prompt: &str) -> Result<RenderedImage>;
}

pub struct GeminiImageRenderer {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    model: String,
    retry_policy: ExponentialBuilder,
}

impl GeminiImageRenderer {
    pub fn from_config(cfg: &Config, client: reqwest::Client) -> Result<Self> {
        Ok(Self {
            client,
            base_url: cfg.gemini_base_url.clone(),
            api_key: cfg.gemini_api_key()?.to_string(),
            model: cfg.image_model.clone(),
            retry_policy: cfg.retry_policy(),
        })
    }

    /// Imagen models are served through `:predict`, everything else through `:generateContent`.
    fn uses_predict(&self) -> bool {
        self.model.starts_with("imagen")
    }

    async fn render_with_generate_content(&self, prompt: &str) -> Result<RenderedImage> {
        let body =
            GenerateContentRequest::user_text(prompt).with_response_modalities(&["TEXT", "IMAGE"]);
        let resp = GeminiApi::generate_content(
            &self.client,
            &self.base_url,
            &self.api_key,
            &self.model,
            self.retry_policy,
            &body,
        )
        .await?;

        if let Some(text) = resp.text() {
            debug!(model = %self.model, "image model also returned text: {text}");
        }
        let inline = resp
            .first_inline_data()
            .ok_or_else(|| BotError::Render(resp.empty_reason()))?;
        decode(&inline.data, &inline.mime_type)
    }

    async fn render_with_predict(&self, prompt: &str) -> Result<RenderedImage> {
        let resp = GeminiApi::predict(
            &self.client,
            &self.base_url,
            &self.api_key,
            &self.model,
            self.retry_policy,
            &PredictRequest::single(prompt),
        )
        .await?;

        let prediction = resp
            .predictions
            .into_iter()
            .find(|p| p.bytes_base64_encoded.is_some())
            .ok_or_else(|| BotError::Render("no predictions returned".to_string()))?;
        let data = prediction.bytes_base64_encoded.unwrap_or_default();
        let mime = prediction.mime_type.unwrap_or_else(|| "image/png".to_string());
        decode(&data, &mime)
    }
}

fn decode(data: &str, mime_type: &str) -> Result<RenderedImage> {
    let bytes = STANDARD.decode(data.trim())?;
    if bytes.is_empty() {
        return Err(BotError::Render("image payload was empty".to_string()));
    }
    Ok(RenderedImage {
        bytes,
        mime_type: mime_type.to_string(),
    })
}

#[async_trait]
impl ImageRenderer for GeminiImageRenderer {
    async fn render(&self, prompt: &str) -> Result<RenderedImage> {
        let image = if self.uses_predict() {
            self.render_with_predict(prompt).await
        } else {
            self.render_with_generate_content(prompt).await
        }
        .map_err(BotError::into_render)?;

        info!(
            model = %self.model,
            bytes = image.bytes.len(),
            mime_type = %image.mime_type,
            "image rendered"
        );
        Ok(image)
    }
}
