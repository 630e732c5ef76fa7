//! One posting run: select a quote, explain it, illustrate it, publish it.

pub mod insight;
pub mod overlay;
pub mod publish;
pub mod render;

pub use insight::{GeminiInsightGenerator, Insight, InsightGenerator};
pub use overlay::{ImageOverlay, TextOverlay};
pub use publish::{
    MAX_CAPTION_LEN, Post, PublishReceipt, Publisher, TelegramPublisher, caption_len, compose_caption,
};
pub use render::{GeminiImageRenderer, ImageRenderer, RenderedImage};

use crate::error::Result;
use crate::service::repository::QuoteRepository;
use crate::service::rotation::QuoteSelector;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub quote_id: i64,
    pub cycle_reset: bool,
    pub message_id: i64,
}

pub struct Pipeline<R> {
    selector: QuoteSelector<R>,
    insight: Arc<dyn InsightGenerator>,
    renderer: Arc<dyn ImageRenderer>,
    overlay: Option<Arc<dyn ImageOverlay>>,
    publisher: Arc<dyn Publisher>,
}

impl<R: QuoteRepository> Pipeline<R> {
    pub fn new(
        repo: R,
        insight: Arc<dyn InsightGenerator>,
        renderer: Arc<dyn ImageRenderer>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            selector: QuoteSelector::new(repo),
            insight,
            renderer,
            overlay: None,
            publisher,
        }
    }

    /// Draw the quote onto every rendered image before it is published.
    pub fn with_overlay(mut self, overlay: Arc<dyn ImageOverlay>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn repository(&self) -> &R {
        self.selector.repository()
    }

    /// Run every stage once, in order. The first failing stage aborts the run.
    ///
    /// A quote stays marked used once selected, even when a later stage fails.
    pub async fn run_once(&self) -> Result<RunReport> {
        let selection = self.selector.select_next_quote().await?;
        let quote = &selection.quote;
        info!(
            quote_id = quote.id,
            author = %quote.author,
            cycle_reset = selection.cycle_reset,
            "selected quote"
        );

        let posted = async {
            let insight = self.insight.generate(&quote.text).await?;
            let mut image = self.renderer.render(&insight.image_prompt).await?;
            if let Some(overlay) = &self.overlay {
                image = overlay.apply(image, &quote.text, &quote.author).await?;
            }
            let post = Post {
                quote,
                explanation: &insight.explanation,
                image: &image,
            };
            self.publisher.publish(&post).await
        }
        .await;

        let receipt = posted.inspect_err(|e| {
            warn!(quote_id = quote.id, error = %e, "run aborted; quote stays marked used");
        })?;

        Ok(RunReport {
            quote_id: quote.id,
            cycle_reset: selection.cycle_reset,
            message_id: receipt.message_id,
        })
    }
}

/// Explanation and image for an arbitrary quote, without touching the store or posting.
pub async fn preview(
    insight: &dyn InsightGenerator,
    renderer: &dyn ImageRenderer,
    overlay: Option<&dyn ImageOverlay>,
    quote_text: &str,
    author: &str,
) -> Result<(Insight, RenderedImage)> {
    let generated = insight.generate(quote_text).await?;
    let mut image = renderer.render(&generated.image_prompt).await?;
    if let Some(overlay) = overlay {
        image = overlay.apply(image, quote_text, author).await?;
    }
    Ok((generated, image))
}
