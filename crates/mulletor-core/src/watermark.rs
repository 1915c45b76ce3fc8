//! ============================================================================
//! Watermark Post-Processor - Stamp the bot handle on generated images
//! ============================================================================
//! Downloads a generated image, stamps `@mulletor_bot` in the bottom-right
//! corner with a colour picked from the local background brightness, and
//! writes the result to a uniquely named temp PNG. Callers own the returned
//! file and must delete it on every exit path.
//! ============================================================================

use std::path::PathBuf;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use rand::RngCore;
use tracing::debug;

use crate::types::{MulletorError, Result};

const WATERMARK_TEXT: &str = "@mulletor_bot";

/// Distance from the bottom-right corner, in pixels
const PADDING: u32 = 15;

/// Integer upscale of the 5x7 glyphs
const FONT_SCALE: u32 = 3;

/// Side of the bottom-right square sampled for brightness
const SAMPLE_AREA_SIZE: u32 = 50;

/// Sampling stride inside the sample area
const SAMPLE_STEP: u32 = 5;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// Seam between the payment pipeline and the image post-processing step
#[async_trait]
pub trait PostProcessor: Send + Sync {
    /// Fetch the image at `image_url`, post-process it and return the path
    /// of a temp file holding the result.
    async fn apply(&self, image_url: &str) -> Result<PathBuf>;
}

/// Production post-processor: watermark overlay
pub struct ImageWatermarkService {
    client: reqwest::Client,
}

impl ImageWatermarkService {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ImageWatermarkService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostProcessor for ImageWatermarkService {
    async fn apply(&self, image_url: &str) -> Result<PathBuf> {
        let response = self
            .client
            .get(image_url)
            .send()
            .await
            .map_err(|e| MulletorError::Transport(format!("GET {image_url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(MulletorError::Transport(format!(
                "{image_url} returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MulletorError::Transport(format!("could not read image body: {e}")))?;

        let stamped = watermark_bytes(&bytes)?;

        let mut encoded = Vec::new();
        image::DynamicImage::ImageRgba8(stamped)
            .write_to(
                &mut std::io::Cursor::new(&mut encoded),
                image::ImageFormat::Png,
            )
            .map_err(|e| MulletorError::Image(format!("could not encode png: {e}")))?;

        let path = std::env::temp_dir().join(format!("watermarked_{}.png", temp_token()));
        tokio::fs::write(&path, &encoded)
            .await
            .map_err(|e| MulletorError::Io(format!("could not write {}: {e}", path.display())))?;

        debug!("Watermarked image written to {}", path.display());
        Ok(path)
    }
}

/// Decode an image and stamp the watermark; dimensions are preserved
pub fn watermark_bytes(bytes: &[u8]) -> Result<RgbaImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| MulletorError::Image(format!("could not decode image: {e}")))?;
    let mut canvas = decoded.to_rgba8();

    let (width, height) = canvas.dimensions();
    let color = text_color(&canvas);

    let glyph_advance = (GLYPH_WIDTH + 1) * FONT_SCALE;
    let text_width = glyph_advance * WATERMARK_TEXT.chars().count() as u32;
    let text_height = GLYPH_HEIGHT * FONT_SCALE;

    let x = width.saturating_sub(text_width + PADDING);
    let y = height.saturating_sub(text_height + PADDING);

    draw_text(&mut canvas, WATERMARK_TEXT, x, y, color);
    Ok(canvas)
}

/// White on dark backgrounds, black on light ones, judged by the average
/// perceived brightness of the bottom-right corner.
fn text_color(canvas: &RgbaImage) -> Rgba<u8> {
    let (width, height) = canvas.dimensions();
    let sample = SAMPLE_AREA_SIZE.min(width).min(height);
    let start_x = width - sample;
    let start_y = height - sample;

    let mut total = 0.0f64;
    let mut count = 0u32;

    let mut x = start_x;
    while x < width {
        let mut y = start_y;
        while y < height {
            let Rgba([r, g, b, _]) = *canvas.get_pixel(x, y);
            total += 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
            count += 1;
            y += SAMPLE_STEP;
        }
        x += SAMPLE_STEP;
    }

    let average = if count > 0 { total / count as f64 } else { 128.0 };

    if average < 128.0 {
        Rgba([255, 255, 255, 255])
    } else {
        Rgba([0, 0, 0, 255])
    }
}

fn draw_text(canvas: &mut RgbaImage, text: &str, x: u32, y: u32, color: Rgba<u8>) {
    let glyph_advance = (GLYPH_WIDTH + 1) * FONT_SCALE;

    for (index, c) in text.chars().enumerate() {
        let origin_x = x + glyph_advance * index as u32;
        draw_glyph(canvas, c, origin_x, y, color);
    }
}

fn draw_glyph(canvas: &mut RgbaImage, c: char, x: u32, y: u32, color: Rgba<u8>) {
    let (width, height) = canvas.dimensions();
    let rows = glyph(c);

    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                continue;
            }
            // scale each set bit to a FONT_SCALE x FONT_SCALE block
            for dy in 0..FONT_SCALE {
                for dx in 0..FONT_SCALE {
                    let px = x + col * FONT_SCALE + dx;
                    let py = y + row as u32 * FONT_SCALE + dy;
                    if px < width && py < height {
                        canvas.put_pixel(px, py, color);
                    }
                }
            }
        }
    }
}

/// 5x7 bitmaps for the characters the watermark text uses
fn glyph(c: char) -> [u8; 7] {
    match c {
        '@' => [0b01110, 0b10001, 0b00001, 0b01101, 0b10101, 0b10101, 0b01110],
        'b' => [0b10000, 0b10000, 0b10110, 0b11001, 0b10001, 0b11001, 0b10110],
        'e' => [0b00000, 0b00000, 0b01110, 0b10001, 0b11111, 0b10000, 0b01110],
        'l' => [0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'm' => [0b00000, 0b00000, 0b11010, 0b10101, 0b10101, 0b10101, 0b10101],
        'o' => [0b00000, 0b00000, 0b01110, 0b10001, 0b10001, 0b10001, 0b01110],
        'r' => [0b00000, 0b00000, 0b10110, 0b11001, 0b10000, 0b10000, 0b10000],
        't' => [0b00100, 0b00100, 0b11111, 0b00100, 0b00100, 0b00101, 0b00010],
        'u' => [0b00000, 0b00000, 0b10001, 0b10001, 0b10001, 0b10011, 0b01101],
        '_' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b11111],
        _ => [0; 7],
    }
}

fn temp_token() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(color: [u8; 4], width: u32, height: u32) -> Vec<u8> {
        let canvas = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut encoded = Vec::new();
        image::DynamicImage::ImageRgba8(canvas)
            .write_to(
                &mut std::io::Cursor::new(&mut encoded),
                image::ImageFormat::Png,
            )
            .unwrap();
        encoded
    }

    fn count_pixels(canvas: &RgbaImage, color: [u8; 4]) -> usize {
        canvas.pixels().filter(|p| p.0 == color).count()
    }

    #[test]
    fn test_dimensions_are_preserved() {
        let stamped = watermark_bytes(&png_bytes([90, 90, 90, 255], 320, 240)).unwrap();
        assert_eq!(stamped.dimensions(), (320, 240));
    }

    #[test]
    fn test_dark_background_gets_white_text() {
        let stamped = watermark_bytes(&png_bytes([10, 10, 10, 255], 400, 400)).unwrap();
        assert!(count_pixels(&stamped, [255, 255, 255, 255]) > 0);
        assert_eq!(count_pixels(&stamped, [0, 0, 0, 255]), 0);
    }

    #[test]
    fn test_light_background_gets_black_text() {
        let stamped = watermark_bytes(&png_bytes([240, 240, 240, 255], 400, 400)).unwrap();
        assert!(count_pixels(&stamped, [0, 0, 0, 255]) > 0);
        assert_eq!(count_pixels(&stamped, [255, 255, 255, 255]), 0);
    }

    #[test]
    fn test_text_lands_in_the_bottom_right() {
        let stamped = watermark_bytes(&png_bytes([10, 10, 10, 255], 400, 400)).unwrap();

        // nothing stamped in the top half
        let top_half: usize = stamped
            .enumerate_pixels()
            .filter(|(_, y, p)| *y < 200 && p.0 == [255, 255, 255, 255])
            .count();
        assert_eq!(top_half, 0);
    }

    #[test]
    fn test_tiny_image_does_not_panic() {
        // smaller than the text itself; drawing clips at the edges
        let stamped = watermark_bytes(&png_bytes([10, 10, 10, 255], 40, 30)).unwrap();
        assert_eq!(stamped.dimensions(), (40, 30));
    }

    #[test]
    fn test_undecodable_bytes_fail_with_image_error() {
        let error = watermark_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(error, MulletorError::Image(_)));
    }

    #[test]
    fn test_every_watermark_char_has_a_glyph() {
        for c in WATERMARK_TEXT.chars() {
            assert_ne!(glyph(c), [0; 7], "missing glyph for {c:?}");
        }
    }
}
