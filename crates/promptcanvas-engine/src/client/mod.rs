//! Remote generation backends.
//!
//! Two seams: [`TextRefiner`] turns a composed prompt into a refined one, and
//! [`ImageBackend`] turns an [`ImagePrompt`] into image results. Every call is a
//! single attempt; nothing here retries.

mod dryrun;
mod stability;
mod vertex;

use promptcanvas_contracts::errors::{CanvasError, Result};
use promptcanvas_contracts::response::{GenerationResult, ImagePayload, RemoteResponse};
use reqwest::blocking::Response as HttpResponse;

use crate::extract::extract;

pub use dryrun::DryrunBackend;
pub use stability::StabilityClient;
pub use vertex::VertexGeminiClient;

/// One ordered piece of what is sent to an image backend.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Image(ImagePayload),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImagePrompt {
    pub parts: Vec<PromptPart>,
    pub mask: Option<ImagePayload>,
}

impl ImagePrompt {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            parts: vec![PromptPart::Text(prompt.into())],
            mask: None,
        }
    }

    /// Base image first, then the instruction.
    pub fn edit(base: ImagePayload, instruction: impl Into<String>) -> Self {
        Self {
            parts: vec![
                PromptPart::Image(base),
                PromptPart::Text(instruction.into()),
            ],
            mask: None,
        }
    }

    pub fn with_mask(mut self, mask: Option<ImagePayload>) -> Self {
        self.mask = mask;
        self
    }

    /// All text parts joined by blank lines.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                PromptPart::Text(text) => Some(text.as_str()),
                PromptPart::Image(_) => None,
            })
            .collect::<Vec<&str>>()
            .join("\n\n")
    }

    pub fn first_image(&self) -> Option<&ImagePayload> {
        self.parts.iter().find_map(|part| match part {
            PromptPart::Image(image) => Some(image),
            PromptPart::Text(_) => None,
        })
    }
}

/// Results of one `generate_image` call, plus anything the host should show
/// alongside them (e.g. a failure that cut a multi-image run short).
#[derive(Debug, Clone, Default)]
pub struct ImageBatch {
    pub results: Vec<GenerationResult>,
    pub warnings: Vec<String>,
}

pub trait TextRefiner: Send + Sync {
    fn name(&self) -> &str;

    /// First textual output of the text model, or the raw response body when
    /// it carried no text. Fails only on transport or HTTP errors.
    fn refine_text(&self, prompt: &str) -> Result<String>;
}

pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the model may answer an image request with prose. Edits sent to
    /// such a backend are framed to ask for an image only.
    fn replies_with_text(&self) -> bool {
        false
    }

    fn generate_image(&self, prompt: &ImagePrompt, count: u8) -> Result<ImageBatch>;
}

/// Issues `count` independent requests one after another.
///
/// A failure on the first request fails the call. A later failure stops the
/// loop; earlier results are kept and the failure becomes a warning.
pub(crate) fn generate_sequentially(
    backend: &str,
    count: u8,
    mut send: impl FnMut(u8) -> Result<RemoteResponse>,
) -> Result<ImageBatch> {
    let total = count.max(1);
    let mut batch = ImageBatch::default();
    for idx in 0..total {
        match send(idx) {
            Ok(response) => batch.results.push(extract(&response)),
            Err(err) if batch.results.is_empty() => return Err(err),
            Err(err) => {
                tracing::warn!(backend, request = idx + 1, total, "request failed: {err}");
                batch.warnings.push(format!(
                    "request {}/{} failed; showing {} earlier result(s): {err}",
                    idx + 1,
                    total,
                    batch.results.len()
                ));
                break;
            }
        }
    }
    Ok(batch)
}

pub(crate) fn transport_error(backend: &str, endpoint: &str, err: reqwest::Error) -> CanvasError {
    CanvasError::remote(
        err.status().map(|status| status.as_u16()),
        format!("{backend} request failed ({endpoint}): {err}"),
    )
}

/// Body text of a successful response; the status and body verbatim otherwise.
pub(crate) fn response_text_or_error(backend: &str, response: HttpResponse) -> Result<String> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|err| {
            CanvasError::remote(
                Some(status.as_u16()),
                format!("{backend} response body read failed: {err}"),
            )
        })?;
    if !status.is_success() {
        return Err(CanvasError::remote(Some(status.as_u16()), body));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use promptcanvas_contracts::response::ResponsePart;

    use super::*;

    fn image_response(tag: u8) -> RemoteResponse {
        RemoteResponse::new(vec![ResponsePart::Binary {
            mime_type: "image/png".to_string(),
            data: vec![tag],
        }])
    }

    #[test]
    fn sequential_generation_issues_one_request_per_image() -> anyhow::Result<()> {
        let mut calls = Vec::new();
        let batch = generate_sequentially("test", 3, |idx| {
            calls.push(idx);
            Ok(image_response(idx))
        })?;
        assert_eq!(calls, vec![0, 1, 2]);
        assert_eq!(batch.results.len(), 3);
        assert_eq!(batch.results[2].image_bytes(), Some(&[2u8][..]));
        assert!(batch.warnings.is_empty());
        Ok(())
    }

    #[test]
    fn later_failure_keeps_partial_results() -> anyhow::Result<()> {
        let mut calls = 0;
        let batch = generate_sequentially("test", 4, |idx| {
            calls += 1;
            if idx == 2 {
                return Err(CanvasError::remote(Some(503), "overloaded"));
            }
            Ok(image_response(idx))
        })?;
        assert_eq!(calls, 3);
        assert_eq!(batch.results.len(), 2);
        assert_eq!(batch.warnings.len(), 1);
        assert!(batch.warnings[0].contains("request 3/4 failed"));
        assert!(batch.warnings[0].contains("overloaded"));
        Ok(())
    }

    #[test]
    fn first_failure_fails_the_call() {
        let result = generate_sequentially("test", 2, |_| Err(CanvasError::remote(None, "down")));
        assert!(matches!(result, Err(CanvasError::RemoteService { .. })));
    }

    #[test]
    fn prompt_helpers_keep_part_order() {
        let base = ImagePayload::new(vec![1, 2, 3], "image/jpeg");
        let prompt = ImagePrompt::edit(base.clone(), "make it night");
        assert_eq!(prompt.first_image(), Some(&base));
        assert_eq!(prompt.joined_text(), "make it night");
        assert!(matches!(prompt.parts[0], PromptPart::Image(_)));
        assert!(ImagePrompt::text("x").first_image().is_none());
    }
}
