use serde::Deserialize;

/// Envelope wrapping every Bot API reply.
#[derive(Debug, Deserialize)]
pub struct TelegramResponse<T> {
    pub ok: bool,
    #[serde(default = "Option::default")]
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    #[serde(default)]
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub date: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl<T> TelegramResponse<T> {
    /// Human-readable failure description for `ok: false` replies.
    pub fn failure(&self) -> String {
        let mut msg = match (self.error_code, self.description.as_deref()) {
            (Some(code), Some(desc)) => format!("{code}: {desc}"),
            (None, Some(desc)) => desc.to_string(),
            (Some(code), None) => format!("error code {code}"),
            (None, None) => "request rejected without description".to_string(),
        };
        if let Some(after) = self.parameters.as_ref().and_then(|p| p.retry_after) {
            msg.push_str(&format!(" (retry after {after}s)"));
        }
        msg
    }
}
