use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use promptcanvas_contracts::errors::{CanvasError, Result};
use promptcanvas_contracts::response::{
    GenerationResult, ImagePayload, RemoteResponse, ResponsePart,
};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::{response_text_or_error, transport_error, ImageBackend, ImageBatch, ImagePrompt};
use crate::config::{DEFAULT_STABILITY_API_BASE, DEFAULT_STABILITY_ENGINE};
use crate::extract::extract;
use crate::media::extension_for_mime;

const BACKEND: &str = "stability";
const MASK_SOURCE: &str = "MASK_IMAGE_BLACK";

/// Sampling knobs sent with every Stability request.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StabilityOptions {
    cfg_scale: f64,
    steps: u32,
    image_strength: f64,
}

impl Default for StabilityOptions {
    fn default() -> Self {
        Self {
            cfg_scale: 7.0,
            steps: 30,
            image_strength: 0.35,
        }
    }
}

/// Stability v1 REST generation. One call returns `samples` artifacts.
pub struct StabilityClient {
    api_base: String,
    engine: String,
    api_key: String,
    options: StabilityOptions,
    http: HttpClient,
    timeout: Option<Duration>,
}

impl StabilityClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_STABILITY_API_BASE.to_string(),
            engine: DEFAULT_STABILITY_ENGINE.to_string(),
            api_key: api_key.into(),
            options: StabilityOptions::default(),
            http: HttpClient::new(),
            timeout: None,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, operation: &str) -> String {
        format!(
            "{}/v1/generation/{}/{}",
            self.api_base, self.engine, operation
        )
    }

    fn image_part(name: &'static str, image: &ImagePayload) -> Result<MultipartPart> {
        MultipartPart::bytes(image.bytes.clone())
            .file_name(format!("{name}.{}", extension_for_mime(&image.mime_type)))
            .mime_str(&image.mime_type)
            .map_err(|err| {
                CanvasError::InvalidInput(format!(
                    "unusable MIME type '{}': {err}",
                    image.mime_type
                ))
            })
    }

    fn edit_form(
        &self,
        base: &ImagePayload,
        mask: Option<&ImagePayload>,
        text: &str,
        samples: u8,
    ) -> Result<MultipartForm> {
        let mut form = MultipartForm::new()
            .part("init_image", Self::image_part("init_image", base)?)
            .text("text_prompts[0][text]", text.to_string())
            .text("cfg_scale", self.options.cfg_scale.to_string())
            .text("steps", self.options.steps.to_string())
            .text("samples", samples.to_string());
        match mask {
            Some(mask) => {
                form = form
                    .part("mask_image", Self::image_part("mask_image", mask)?)
                    .text("mask_source", MASK_SOURCE);
            }
            None => {
                form = form.text("image_strength", self.options.image_strength.to_string());
            }
        }
        Ok(form)
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder, endpoint: &str) -> Result<String> {
        let mut request = request
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json");
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let started = Instant::now();
        let response = request
            .send()
            .map_err(|err| transport_error(BACKEND, endpoint, err))?;
        let body = response_text_or_error(BACKEND, response)?;
        tracing::debug!(
            backend = BACKEND,
            engine = %self.engine,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generation returned"
        );
        Ok(body)
    }
}

/// One result per `artifacts[]` entry, in order.
fn parse_artifacts(body: &str) -> Result<Vec<GenerationResult>> {
    let payload: Value = serde_json::from_str(body)?;
    let artifacts = payload
        .get("artifacts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut results = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let mut parts = Vec::new();
        if let Some(encoded) = artifact.get("base64").and_then(Value::as_str) {
            let data = BASE64
                .decode(encoded.trim().as_bytes())
                .map_err(|err| CanvasError::Decode(format!("Stability artifact base64: {err}")))?;
            parts.push(ResponsePart::Binary {
                mime_type: "image/png".to_string(),
                data,
            });
        }
        if let Some(reason) = artifact.get("finishReason").and_then(Value::as_str) {
            parts.push(ResponsePart::Text(format!("finish reason: {reason}")));
        }
        results.push(extract(&RemoteResponse::new(parts)));
    }
    Ok(results)
}

impl ImageBackend for StabilityClient {
    fn name(&self) -> &str {
        BACKEND
    }

    fn generate_image(&self, prompt: &ImagePrompt, count: u8) -> Result<ImageBatch> {
        let samples = count.max(1);
        let text = prompt.joined_text();
        tracing::info!(
            backend = BACKEND,
            engine = %self.engine,
            count = samples,
            "generating image"
        );

        let body = match prompt.first_image() {
            Some(base) => {
                let endpoint = match prompt.mask {
                    Some(_) => self.endpoint("image-to-image/masking"),
                    None => self.endpoint("image-to-image"),
                };
                let form = self.edit_form(base, prompt.mask.as_ref(), &text, samples)?;
                self.send(self.http.post(&endpoint).multipart(form), &endpoint)?
            }
            None => {
                let endpoint = self.endpoint("text-to-image");
                let payload = json!({
                    "text_prompts": [{ "text": text }],
                    "cfg_scale": self.options.cfg_scale,
                    "steps": self.options.steps,
                    "samples": samples,
                });
                self.send(self.http.post(&endpoint).json(&payload), &endpoint)?
            }
        };

        Ok(ImageBatch {
            results: parse_artifacts(&body)?,
            warnings: Vec::new(),
        })
    }
}
