use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use promptcanvas_contracts::errors::{CanvasError, Result};
use promptcanvas_contracts::response::{GenerationResult, ImagePayload};
use sha2::{Digest, Sha256};

use super::{ImageBackend, ImageBatch, ImagePrompt, TextRefiner};

const DEFAULT_SIZE: u32 = 64;

/// Offline backend: every sample is a solid-colour PNG keyed on the prompt.
#[derive(Debug, Clone)]
pub struct DryrunBackend {
    width: u32,
    height: u32,
}

impl Default for DryrunBackend {
    fn default() -> Self {
        Self {
            width: DEFAULT_SIZE,
            height: DEFAULT_SIZE,
        }
    }
}

impl DryrunBackend {
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    fn render(&self, prompt: &str, idx: u8) -> Result<Vec<u8>> {
        let (r, g, b) = color_from_prompt(prompt, idx);
        let mut image = RgbImage::new(self.width, self.height);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|err| CanvasError::Decode(format!("dryrun PNG encode failed: {err}")))?;
        Ok(bytes)
    }
}

fn color_from_prompt(prompt: &str, idx: u8) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update([idx]);
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

impl ImageBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_image(&self, prompt: &ImagePrompt, count: u8) -> Result<ImageBatch> {
        let text = prompt.joined_text();
        let results = (0..count.max(1))
            .map(|idx| {
                self.render(&text, idx).map(|bytes| {
                    GenerationResult::from_image(ImagePayload::new(bytes, "image/png"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(backend = "dryrun", count = results.len(), "rendered placeholder images");
        Ok(ImageBatch {
            results,
            warnings: Vec::new(),
        })
    }
}

impl TextRefiner for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn refine_text(&self, prompt: &str) -> Result<String> {
        Ok(prompt.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_decodable_png_per_sample() -> anyhow::Result<()> {
        let backend = DryrunBackend::with_size(8, 4);
        let batch = backend.generate_image(&ImagePrompt::text("a red bicycle"), 2)?;
        assert_eq!(batch.results.len(), 2);
        let Some(bytes) = batch.results[0].image_bytes() else {
            anyhow::bail!("missing image");
        };
        let decoded = image::load_from_memory(bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
        Ok(())
    }

    #[test]
    fn colour_is_deterministic_per_prompt_and_index() {
        assert_eq!(color_from_prompt("a", 0), color_from_prompt("a", 0));
        assert_ne!(color_from_prompt("a", 0), color_from_prompt("a", 1));
        assert_ne!(color_from_prompt("a", 0), color_from_prompt("b", 0));
    }

    #[test]
    fn refine_echoes_prompt() -> anyhow::Result<()> {
        assert_eq!(DryrunBackend::default().refine_text("keep me")?, "keep me");
        Ok(())
    }
}
