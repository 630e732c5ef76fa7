use crate::error::{BotError, Result};
use backon::ExponentialBuilder;
use chrono::NaiveTime;
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Deserializer, Serialize, de};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const TELEGRAM_BASE_URL: &str = "https://api.telegram.org/";

/// Environment keys understood by [`Config::load`], lowercased as figment sees them.
const ENV_KEYS: &[&str] = &[
    "telegram_bot_token",
    "telegram_chat_id",
    "gemini_api_key",
    "database_url",
    "post_time",
    "text_model",
    "image_model",
    "explanation_words",
    "image_prompt_words",
    "gemini_base_url",
    "telegram_base_url",
    "proxy",
    "http_timeout_secs",
    "max_retries",
    "loglevel",
    "overlay_text",
    "font_path",
    "italic_font_path",
];

/// Older names for `TELEGRAM_CHAT_ID`, lowest precedence first.
const CHAT_ID_ALIASES: &[&str] = &["telegram_channel_id", "telegram_target_chat_id"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub telegram_bot_token: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub telegram_chat_id: Option<String>,
    pub gemini_api_key: Option<String>,
    pub database_url: String,
    /// Daily trigger, `HH:MM` in UTC.
    pub post_time: String,
    pub text_model: String,
    pub image_model: String,
    pub explanation_words: u32,
    pub image_prompt_words: u32,
    pub gemini_base_url: Url,
    pub telegram_base_url: Url,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub proxy: Option<Url>,
    pub http_timeout_secs: u64,
    pub max_retries: usize,
    pub loglevel: String,
    /// Draw the quote onto the rendered image before posting.
    pub overlay_text: bool,
    /// TTF/OTF for the quote text; the bundled serif when unset.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub font_path: Option<PathBuf>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub italic_font_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            gemini_api_key: None,
            database_url: "sqlite://quotes.db".to_string(),
            post_time: "08:00".to_string(),
            text_model: "gemini-2.0-flash".to_string(),
            image_model: "gemini-2.0-flash-exp-image-generation".to_string(),
            explanation_words: 100,
            image_prompt_words: 100,
            gemini_base_url: Url::parse(GEMINI_BASE_URL).expect("valid default Gemini URL"),
            telegram_base_url: Url::parse(TELEGRAM_BASE_URL).expect("valid default Telegram URL"),
            proxy: None,
            http_timeout_secs: 120,
            max_retries: 3,
            loglevel: "info".to_string(),
            overlay_text: true,
            font_path: None,
            italic_font_path: None,
        }
    }
}

impl Config {
    /// Defaults overlaid with the process environment.
    ///
    /// `TELEGRAM_CHANNEL_ID` and `TELEGRAM_TARGET_CHAT_ID` are read as fallbacks
    /// for `TELEGRAM_CHAT_ID`.
    pub fn load() -> Result<Self> {
        let mut env = Figment::new();
        for alias in CHAT_ID_ALIASES {
            env = env.merge(
                Env::raw()
                    .only(&[*alias])
                    .map(|_| "telegram_chat_id".into()),
            );
        }
        Self::from_figment(env.merge(Env::raw().only(ENV_KEYS)))
    }

    /// Extract from `overrides` layered on top of the defaults.
    pub fn from_figment(overrides: Figment) -> Result<Self> {
        let cfg: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(overrides)
            .extract()
            .map_err(|e| BotError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        self.post_time()?;
        if self.explanation_words == 0 || self.image_prompt_words == 0 {
            return Err(BotError::Config(
                "word bounds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn post_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.post_time.trim(), "%H:%M").map_err(|e| {
            BotError::Config(format!(
                "POST_TIME must be HH:MM (UTC), got {:?}: {e}",
                self.post_time
            ))
        })
    }

    pub fn gemini_api_key(&self) -> Result<&str> {
        non_empty(&self.gemini_api_key)
            .ok_or_else(|| BotError::Config("missing GEMINI_API_KEY".to_string()))
    }

    /// Ensure every credential a publishing run needs is present.
    pub fn require_credentials(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("TELEGRAM_BOT_TOKEN", &self.telegram_bot_token),
            ("TELEGRAM_CHAT_ID", &self.telegram_chat_id),
            ("GEMINI_API_KEY", &self.gemini_api_key),
        ]
        .into_iter()
        .filter(|(_, value)| non_empty(value).is_none())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BotError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn telegram_credentials(&self) -> Result<(&str, &str)> {
        match (
            non_empty(&self.telegram_bot_token),
            non_empty(&self.telegram_chat_id),
        ) {
            (Some(token), Some(chat)) => Ok((token, chat)),
            _ => Err(BotError::Config(
                "missing TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID".to_string(),
            )),
        }
    }

    /// Shared HTTP client for every upstream call.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("daily-stoic/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(self.http_timeout_secs));
        if let Some(proxy_url) = self.proxy.as_ref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
        }
        Ok(builder.build()?)
    }

    pub fn retry_policy(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(8))
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Optional values where an empty string means unset, e.g. `PROXY=`.
fn blank_as_none<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map(Some).map_err(de::Error::custom)
        }
        _ => Ok(None),
    }
}

/// Chat ids like `-1001234` arrive from the environment as numbers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Uint(u64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Uint(n) => n.to_string(),
    }))
}
