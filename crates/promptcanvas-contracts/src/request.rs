use std::fmt;

use crate::catalog::{Category, StyleDescriptor};
use crate::errors::{CanvasError, Result};
use crate::response::ImagePayload;

pub const MAX_IMAGE_COUNT: u8 = 4;

/// One user action's inputs. Built fresh per action and dropped afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub raw_instruction: String,
    pub category: Category,
    pub style: StyleDescriptor,
    pub base_image: Option<ImagePayload>,
    pub mask: Option<ImagePayload>,
    desired_count: u8,
}

impl GenerationRequest {
    pub fn new(
        raw_instruction: impl Into<String>,
        category: Category,
        style: StyleDescriptor,
    ) -> Self {
        Self {
            raw_instruction: raw_instruction.into(),
            category,
            style,
            base_image: None,
            mask: None,
            desired_count: 1,
        }
    }

    pub fn with_base_image(mut self, image: ImagePayload) -> Self {
        self.base_image = Some(image);
        self
    }

    pub fn with_mask(mut self, mask: ImagePayload) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_count(mut self, count: u8) -> Result<Self> {
        if !(1..=MAX_IMAGE_COUNT).contains(&count) {
            return Err(CanvasError::InvalidInput(format!(
                "image count must be between 1 and {MAX_IMAGE_COUNT}, got {count}"
            )));
        }
        self.desired_count = count;
        Ok(self)
    }

    pub fn desired_count(&self) -> u8 {
        self.desired_count
    }

    pub fn is_edit(&self) -> bool {
        self.base_image.is_some()
    }

    /// Rejects an empty instruction and an empty uploaded image.
    pub fn validate(&self) -> Result<()> {
        if self.raw_instruction.trim().is_empty() {
            return Err(CanvasError::InvalidInput(
                "enter an instruction describing the image".to_string(),
            ));
        }
        if self.base_image.as_ref().is_some_and(ImagePayload::is_empty) {
            return Err(CanvasError::InvalidInput(
                "the uploaded image is empty".to_string(),
            ));
        }
        if self.mask.is_some() && self.base_image.is_none() {
            return Err(CanvasError::InvalidInput(
                "a mask needs an image to edit".to_string(),
            ));
        }
        Ok(())
    }
}

/// Final instruction text sent to the generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnhancedPrompt(String);

impl EnhancedPrompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnhancedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EnhancedPrompt {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> GenerationRequest {
        GenerationRequest::new(text, Category::General, StyleDescriptor::None)
    }

    #[test]
    fn count_outside_range_is_rejected() {
        assert!(matches!(
            request("a cat").with_count(0),
            Err(CanvasError::InvalidInput(_))
        ));
        assert!(matches!(
            request("a cat").with_count(5),
            Err(CanvasError::InvalidInput(_))
        ));
        let four = request("a cat").with_count(4).map(|r| r.desired_count());
        assert_eq!(four.ok(), Some(4));
    }

    #[test]
    fn validate_rejects_missing_inputs() {
        assert!(request("   \n").validate().is_err());
        assert!(request("a cat").validate().is_ok());

        let empty_upload = request("make it blue").with_base_image(ImagePayload::new(
            Vec::new(),
            "image/png",
        ));
        assert!(empty_upload.validate().is_err());

        let mask_only = request("fill").with_mask(ImagePayload::new(vec![1], "image/png"));
        assert!(mask_only.validate().is_err());
    }

    #[test]
    fn edit_is_defined_by_base_image() {
        assert!(!request("a cat").is_edit());
        let edit = request("a cat").with_base_image(ImagePayload::new(vec![1], "image/png"));
        assert!(edit.is_edit());
    }
}
