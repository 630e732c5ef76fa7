use crate::config::Config;
use crate::error::{BotError, Result};
use crate::pipeline::render::RenderedImage;
use ab_glyph::{FontArc, PxScale};
use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSerif.ttf");
const DEFAULT_ITALIC_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSerif-Italic.ttf");

/// Quote glyph height as a share of the image height.
const QUOTE_SCALE: f32 = 0.05;
const AUTHOR_SCALE: f32 = 0.7;
const WRAP_WIDTH: f32 = 0.6;
const LINE_SPACING: f32 = 1.3;
const AUTHOR_GAP: f32 = 0.02;
/// Alpha of the black layer laid over the whole picture.
const DIM_ALPHA: u16 = 128;
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Writes the quote onto the rendered illustration.
#[async_trait]
pub trait ImageOverlay: Send + Sync {
    async fn apply(
        &self,
        image: RenderedImage,
        quote_text: &str,
        author: &str,
    ) -> Result<RenderedImage>;
}

#[derive(Clone)]
pub struct TextOverlay {
    fonts: Arc<Fonts>,
}

struct Fonts {
    regular: FontArc,
    italic: FontArc,
}

impl TextOverlay {
    /// Bundled serif faces, replaced by `FONT_PATH` / `ITALIC_FONT_PATH` when set.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let regular = match &cfg.font_path {
            Some(path) => load_font(path)?,
            None => bundled(DEFAULT_FONT)?,
        };
        let italic = match &cfg.italic_font_path {
            Some(path) => load_font(path)?,
            None => bundled(DEFAULT_ITALIC_FONT)?,
        };
        Ok(Self {
            fonts: Arc::new(Fonts { regular, italic }),
        })
    }
}

fn bundled(bytes: &'static [u8]) -> Result<FontArc> {
    FontArc::try_from_slice(bytes).map_err(|e| BotError::Config(format!("bundled font: {e}")))
}

fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path)
        .map_err(|e| BotError::Config(format!("font {}: {e}", path.display())))?;
    FontArc::try_from_vec(bytes)
        .map_err(|e| BotError::Config(format!("font {}: {e}", path.display())))
}

#[async_trait]
impl ImageOverlay for TextOverlay {
    async fn apply(
        &self,
        image: RenderedImage,
        quote_text: &str,
        author: &str,
    ) -> Result<RenderedImage> {
        let fonts = self.fonts.clone();
        let quote_text = quote_text.trim().to_string();
        let author = format!("- {}", author.trim());

        tokio::task::spawn_blocking(move || fonts.draw(&image.bytes, &quote_text, &author))
            .await
            .map_err(|e| BotError::Overlay(format!("overlay task failed: {e}")))?
            .map_err(BotError::into_overlay)
    }
}

impl Fonts {
    fn draw(&self, bytes: &[u8], quote_text: &str, author: &str) -> Result<RenderedImage> {
        let mut canvas = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = canvas.dimensions();
        dim(&mut canvas);

        let quote_scale = PxScale::from((height as f32 * QUOTE_SCALE).max(1.0));
        let author_scale = PxScale::from(quote_scale.y * AUTHOR_SCALE);
        let max_width = (width as f32 * WRAP_WIDTH) as u32;
        let line_height = (quote_scale.y * LINE_SPACING) as i32;
        let gap = (height as f32 * AUTHOR_GAP) as i32;

        let lines = wrap(quote_text, max_width, |s| text_size(quote_scale, &self.regular, s).0);
        let (author_width, author_height) = text_size(author_scale, &self.italic, author);
        let block_width = lines
            .iter()
            .map(|l| text_size(quote_scale, &self.regular, l).0)
            .chain(std::iter::once(author_width))
            .max()
            .unwrap_or(0);
        let block_height = line_height * lines.len() as i32 + gap + author_height as i32;

        let left = (width as i32 - block_width as i32) / 2;
        let mut y = (height as i32 - block_height) / 2;
        for line in &lines {
            let line_width = text_size(quote_scale, &self.regular, line).0 as i32;
            let x = left + (block_width as i32 - line_width) / 2;
            draw_text_mut(&mut canvas, TEXT_COLOR, x, y, quote_scale, &self.regular, line);
            y += line_height;
        }
        y += gap;
        let x = left + (block_width as i32 - author_width as i32) / 2;
        draw_text_mut(&mut canvas, TEXT_COLOR, x, y, author_scale, &self.italic, author);

        debug!(width, height, lines = lines.len(), "quote drawn onto image");

        let mut out = Cursor::new(Vec::new());
        canvas.write_to(&mut out, ImageFormat::Png)?;
        Ok(RenderedImage {
            bytes: out.into_inner(),
            mime_type: "image/png".to_string(),
        })
    }
}

/// Blend a half-transparent black layer into every pixel.
fn dim(canvas: &mut RgbaImage) {
    for Rgba([r, g, b, _]) in canvas.pixels_mut() {
        for c in [r, g, b] {
            *c = (*c as u16 * (255 - DIM_ALPHA) / 255) as u8;
        }
    }
}

/// Greedy word wrap on measured width. A word wider than `max_width` gets a line of its own.
fn wrap(text: &str, max_width: u32, measure: impl Fn(&str) -> u32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{current} {word}");
        if measure(&candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn picture(width: u32, height: u32) -> RenderedImage {
        let canvas = RgbaImage::from_pixel(width, height, Rgba([200, 180, 160, 255]));
        let mut out = Cursor::new(Vec::new());
        canvas.write_to(&mut out, ImageFormat::Png).unwrap();
        RenderedImage {
            bytes: out.into_inner(),
            mime_type: "image/png".to_string(),
        }
    }

    fn overlay() -> TextOverlay {
        TextOverlay::from_config(&Config::default()).unwrap()
    }

    #[tokio::test]
    async fn keeps_dimensions_and_changes_pixels() {
        let input = picture(640, 480);
        let output = overlay()
            .apply(
                input.clone(),
                "Waste no more time arguing about what a good man should be. Be one.",
                "Marcus Aurelius",
            )
            .await
            .unwrap();

        assert_eq!(output.mime_type, "image/png");
        assert_ne!(output.bytes, input.bytes);

        let before = image::load_from_memory(&input.bytes).unwrap().to_rgba8();
        let after = image::load_from_memory(&output.bytes).unwrap().to_rgba8();
        assert_eq!(after.dimensions(), before.dimensions());

        // corners carry no text, only the dimming layer
        assert_eq!(after.get_pixel(0, 0), &Rgba([99, 89, 79, 255]));
        // white glyphs somewhere in the middle band
        let lit = (0..640)
            .flat_map(|x| (160..320).map(move |y| (x, y)))
            .filter(|&(x, y)| after.get_pixel(x, y).0[0] > 200)
            .count();
        assert!(lit > 0);
    }

    #[tokio::test]
    async fn jpeg_input_comes_back_as_png() {
        let canvas = image::RgbImage::from_pixel(320, 200, image::Rgb([10, 20, 30]));
        let mut jpeg = Cursor::new(Vec::new());
        canvas.write_to(&mut jpeg, ImageFormat::Jpeg).unwrap();
        let input = RenderedImage {
            bytes: jpeg.into_inner(),
            mime_type: "image/jpeg".to_string(),
        };

        let output = overlay().apply(input, "Hold fast.", "Seneca").await.unwrap();
        assert_eq!(output.file_extension(), "png");
        let decoded = image::load_from_memory(&output.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (320, 200));
    }

    #[tokio::test]
    async fn undecodable_bytes_are_an_overlay_error() {
        let input = RenderedImage {
            bytes: vec![0x89, b'P', b'N', b'G'],
            mime_type: "image/png".to_string(),
        };
        let err = overlay().apply(input, "Be one.", "Marcus Aurelius").await.unwrap_err();
        assert!(matches!(err, BotError::Overlay(_)), "{err:?}");
    }

    #[test]
    fn missing_font_file_is_a_config_error() {
        let cfg = Config {
            font_path: Some("/nonexistent/font.ttf".into()),
            ..Config::default()
        };
        assert!(matches!(TextOverlay::from_config(&cfg), Err(BotError::Config(_))));
    }

    #[test]
    fn wrap_respects_measured_width() {
        let measure = |s: &str| s.len() as u32;
        let lines = wrap("we suffer more often in imagination", 12, measure);
        assert_eq!(lines, ["we suffer", "more often", "in", "imagination"]);
        assert!(lines.iter().all(|l| measure(l) <= 12));

        // an overlong word is not split and leaves no empty line behind
        assert_eq!(wrap("indifferentism is", 5, measure), ["indifferentism", "is"]);
        assert!(wrap("   ", 5, measure).is_empty());
    }
}
