//! Structured remote responses and the result handed back to hosts.

/// Image bytes with the MIME type they were declared or detected as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One content part of a remote response, in the order the remote sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePart {
    Text(String),
    Binary { mime_type: String, data: Vec<u8> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteResponse {
    pub parts: Vec<ResponsePart>,
    /// Raw response body, kept for best-effort text fallbacks.
    pub raw: String,
}

impl RemoteResponse {
    pub fn new(parts: Vec<ResponsePart>) -> Self {
        Self {
            parts,
            raw: String::new(),
        }
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }
}

/// Outcome of one generation request: an image, a textual explanation, or nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResult {
    image: Option<ImagePayload>,
    text_fallback: Option<String>,
}

impl GenerationResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_image(image: ImagePayload) -> Self {
        Self {
            image: Some(image),
            text_fallback: None,
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            image: None,
            text_fallback: Some(text.into()),
        }
    }

    pub fn image(&self) -> Option<&ImagePayload> {
        self.image.as_ref()
    }

    pub fn image_bytes(&self) -> Option<&[u8]> {
        self.image.as_ref().map(|image| image.bytes.as_slice())
    }

    pub fn text_fallback(&self) -> Option<&str> {
        self.text_fallback.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.text_fallback.is_none()
    }

    pub fn into_image(self) -> Option<ImagePayload> {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_populate_at_most_one_side() {
        let image = GenerationResult::from_image(ImagePayload::new(vec![1, 2], "image/png"));
        assert_eq!(image.image_bytes(), Some(&[1u8, 2][..]));
        assert!(image.text_fallback().is_none());

        let text = GenerationResult::from_text("done");
        assert!(text.image().is_none());
        assert_eq!(text.text_fallback(), Some("done"));

        assert!(GenerationResult::empty().is_empty());
        assert!(!text.is_empty());
    }
}
