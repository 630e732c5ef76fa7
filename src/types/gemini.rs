use serde::{Deserialize, Serialize};

/// Finish reasons returned by Gemini.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum FinishReason {
    FINISH_REASON_UNSPECIFIED,
    STOP,
    MAX_TOKENS,
    SAFETY,
    RECITATION,
    LANGUAGE,
    OTHER,
    BLOCKLIST,
    PROHIBITED_CONTENT,
    SPII,
    MALFORMED_FUNCTION_CALL,
    IMAGE_SAFETY,
    #[serde(other)]
    UNRECOGNIZED,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
}

/// Body of `models/{model}:generateContent`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    /// Single user turn carrying one text part.
    pub fn user_text(prompt: impl Into<String>) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.into()),
                    inline_data: None,
                }],
            }],
            generation_config: None,
        }
    }

    pub fn with_response_modalities(mut self, modalities: &[&str]) -> Self {
        let config = self.generation_config.get_or_insert_with(Default::default);
        config.response_modalities = Some(modalities.iter().map(|m| m.to_string()).collect());
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
    #[serde(default)]
    pub block_reason_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    pub model_version: Option<String>,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
    }

    /// Text parts of the first candidate joined and trimmed; `None` when blank.
    pub fn text(&self) -> Option<String> {
        let joined = self
            .first_parts()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    pub fn first_inline_data(&self) -> Option<&InlineData> {
        self.first_parts().find_map(|p| p.inline_data.as_ref())
    }

    /// Why the response carries no usable output, for error messages.
    pub fn empty_reason(&self) -> String {
        if let Some(feedback) = self.prompt_feedback.as_ref() {
            if let Some(reason) = feedback.block_reason.as_deref() {
                let message = feedback
                    .block_reason_message
                    .as_deref()
                    .unwrap_or("no message provided");
                return format!("prompt blocked ({reason}): {message}");
            }
        }
        match self.candidates.first() {
            None => "no candidates returned".to_string(),
            Some(Candidate {
                finish_reason: Some(reason),
                ..
            }) => format!("no usable content (finish reason {reason:?})"),
            Some(_) => "no usable content".to_string(),
        }
    }
}

/// Body of `models/{imagen-model}:predict`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    pub instances: Vec<PredictInstance>,
    pub parameters: PredictParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictInstance {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictParameters {
    pub sample_count: u32,
}

impl PredictRequest {
    pub fn single(prompt: impl Into<String>) -> Self {
        Self {
            instances: vec![PredictInstance {
                prompt: prompt.into(),
            }],
            parameters: PredictParameters { sample_count: 1 },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictResponse {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    #[serde(default)]
    pub bytes_base64_encoded: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}
