use crate::api::GeminiApi;
use crate::config::Config;
use crate::error::{BotError, Result};
use crate::types::gemini::GenerateContentRequest;
use async_trait::async_trait;
use backon::ExponentialBuilder;
use tracing::{debug, warn};
use url::Url;

const EXPLANATION_TEMPLATE: &str = "For the Stoic quote: '{quote}', provide a brief (under {words} words) \
explanation focusing on how someone could apply this idea in their daily life. \
What's the key takeaway action? Write in plain prose without headings.";

const IMAGE_PROMPT_TEMPLATE: &str = "Based on the Stoic quote: '{quote}', craft an evocative image prompt \
(max {words} words) for an AI image generator.

1. Scene & Subject: describe a scene capturing the quote's essence, with a main subject (a statue, a person, \
an animal, an object or an abstract form) whose action reflects a Stoic principle such as acceptance, \
resilience or focus.
2. Setting & Atmosphere: describe the setting and its atmosphere.
3. Visual Style: a cinematic, atmospheric quality with dramatic, focused or chiaroscuro lighting, e.g. \
realistic digital painting, atmospheric 3D render or detailed stylized illustration.
4. Color Palette: slightly dimmed so the picture works as a background; dark, muted, contemplative tones.
5. Mood: state the overall mood.
6. Symbolism: subtle symbolism tied to the quote's message.
No text, letters or captions in the image.

Output only the image prompt itself, ready for an image generation model.";

/// Model output for one quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insight {
    pub explanation: String,
    pub image_prompt: String,
}

#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate(&self, quote_text: &str) -> Result<Insight>;
}

fn fill(template: &str, quote_text: &str, words: u32) -> String {
    template
        .replace("{words}", &words.to_string())
        .replace("{quote}", quote_text.trim())
}

pub fn explanation_prompt(quote_text: &str, words: u32) -> String {
    fill(EXPLANATION_TEMPLATE, quote_text, words)
}

pub fn image_prompt_prompt(quote_text: &str, words: u32) -> String {
    fill(IMAGE_PROMPT_TEMPLATE, quote_text, words)
}

pub struct GeminiInsightGenerator {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    model: String,
    explanation_words: u32,
    image_prompt_words: u32,
    retry_policy: ExponentialBuilder,
}

impl GeminiInsightGenerator {
    pub fn from_config(cfg: &Config, client: reqwest::Client) -> Result<Self> {
        Ok(Self {
            client,
            base_url: cfg.gemini_base_url.clone(),
            api_key: cfg.gemini_api_key()?.to_string(),
            model: cfg.text_model.clone(),
            explanation_words: cfg.explanation_words,
            image_prompt_words: cfg.image_prompt_words,
            retry_policy: cfg.retry_policy(),
        })
    }

    async fn ask(&self, prompt: String, what: &str, word_bound: u32) -> Result<String> {
        let body = GenerateContentRequest::user_text(prompt);
        let resp = GeminiApi::generate_content(
            &self.client,
            &self.base_url,
            &self.api_key,
            &self.model,
            self.retry_policy,
            &body,
        )
        .await
        .map_err(BotError::into_generation)?;

        let text = resp
            .text()
            .ok_or_else(|| BotError::Generation(format!("{what}: {}", resp.empty_reason())))?;

        let words = text.split_whitespace().count();
        if words > word_bound as usize {
            warn!(what, words, word_bound, "model exceeded the requested length");
        }
        debug!(what, words, model = %self.model, "generated text");
        Ok(text)
    }
}

#[async_trait]
impl InsightGenerator for GeminiInsightGenerator {
    async fn generate(&self, quote_text: &str) -> Result<Insight> {
        let explanation = self
            .ask(
                explanation_prompt(quote_text, self.explanation_words),
                "explanation",
                self.explanation_words,
            )
            .await?;
        let image_prompt = self
            .ask(
                image_prompt_prompt(quote_text, self.image_prompt_words),
                "image prompt",
                self.image_prompt_words,
            )
            .await?;
        Ok(Insight {
            explanation,
            image_prompt,
        })
    }
}
