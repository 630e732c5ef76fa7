use crate::api::{PhotoUpload, TelegramApi};
use crate::config::Config;
use crate::db::Quote;
use crate::error::{BotError, Result};
use crate::pipeline::render::RenderedImage;
use crate::types::telegram::User;
use async_trait::async_trait;
use backon::ExponentialBuilder;
use tracing::info;
use url::Url;

/// Telegram's limit for photo captions, in UTF-16 code units.
pub const MAX_CAPTION_LEN: usize = 1024;

const ELLIPSIS: char = '…';

/// Everything that goes into one channel post.
#[derive(Debug, Clone, Copy)]
pub struct Post<'a> {
    pub quote: &'a Quote,
    pub explanation: &'a str,
    pub image: &'a RenderedImage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: i64,
    pub chat_id: i64,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, post: &Post<'_>) -> Result<PublishReceipt>;
}

/// Length as Telegram measures it.
pub fn caption_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Longest prefix of `text` that fits in `max_units` UTF-16 code units.
fn prefix_within(text: &str, max_units: usize) -> &str {
    let mut units = 0;
    for (idx, ch) in text.char_indices() {
        units += ch.len_utf16();
        if units > max_units {
            return &text[..idx];
        }
    }
    text
}

/// Build the caption: explanation, a separator, then the attributed quote.
///
/// Captions over [`MAX_CAPTION_LEN`] lose the tail of the explanation first;
/// the quote line is only cut when it does not fit on its own.
pub fn compose_caption(explanation: &str, quote_text: &str, author: &str) -> String {
    let explanation = explanation.trim();
    let footer = format!("\n\n---\nQuote: \"{}\" - {}", quote_text.trim(), author.trim());
    let footer_len = caption_len(&footer);

    if caption_len(explanation) + footer_len <= MAX_CAPTION_LEN {
        return format!("{explanation}{footer}");
    }

    let ellipsis_len = ELLIPSIS.len_utf16();
    let budget = MAX_CAPTION_LEN.saturating_sub(footer_len);
    if budget > ellipsis_len {
        let short = prefix_within(explanation, budget - ellipsis_len).trim_end();
        return format!("{short}{ELLIPSIS}{footer}");
    }

    let full = format!("{explanation}{footer}");
    let mut caption = prefix_within(&full, MAX_CAPTION_LEN - ellipsis_len).to_string();
    caption.push(ELLIPSIS);
    caption
}

pub struct TelegramPublisher {
    client: reqwest::Client,
    base_url: Url,
    token: String,
    chat_id: String,
    retry_policy: ExponentialBuilder,
}

impl TelegramPublisher {
    pub fn from_config(cfg: &Config, client: reqwest::Client) -> Result<Self> {
        let (token, chat_id) = cfg.telegram_credentials()?;
        Ok(Self {
            client,
            base_url: cfg.telegram_base_url.clone(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
            retry_policy: cfg.retry_policy(),
        })
    }

    /// Check the bot token against `getMe`.
    pub async fn verify(&self) -> Result<User> {
        let me = TelegramApi::get_me(&self.client, &self.base_url, &self.token, self.retry_policy)
            .await
            .map_err(BotError::into_publish)?;
        info!(bot_id = me.id, username = ?me.username, "telegram bot verified");
        Ok(me)
    }
}

#[async_trait]
impl Publisher for TelegramPublisher {
    async fn publish(&self, post: &Post<'_>) -> Result<PublishReceipt> {
        let caption = compose_caption(post.explanation, &post.quote.text, &post.quote.author);
        let upload = PhotoUpload {
            chat_id: &self.chat_id,
            caption: &caption,
            bytes: &post.image.bytes,
            mime_type: &post.image.mime_type,
        };

        let message = TelegramApi::send_photo(
            &self.client,
            &self.base_url,
            &self.token,
            self.retry_policy,
            &upload,
        )
        .await
        .map_err(BotError::into_publish)?;

        info!(
            message_id = message.message_id,
            chat_id = message.chat.id,
            quote_id = post.quote.id,
            "posted to telegram"
        );
        Ok(PublishReceipt {
            message_id: message.message_id,
            chat_id: message.chat.id,
        })
    }
}
