use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use promptcanvas_contracts::errors::Result;
use promptcanvas_contracts::response::{RemoteResponse, ResponsePart};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::{
    generate_sequentially, response_text_or_error, transport_error, ImageBackend, ImageBatch,
    ImagePrompt, PromptPart, TextRefiner,
};
use crate::config::{DEFAULT_IMAGE_MODEL, DEFAULT_REGION, DEFAULT_TEXT_MODEL};
use crate::credentials::TokenSource;

const BACKEND: &str = "vertex";

/// Gemini models on Vertex AI, for both image generation and text refinement.
pub struct VertexGeminiClient {
    /// Defaults to the regional `aiplatform.googleapis.com` host.
    api_base: Option<String>,
    project: String,
    region: String,
    image_model: String,
    text_model: String,
    tokens: Box<dyn TokenSource>,
    http: HttpClient,
    timeout: Option<Duration>,
}

impl VertexGeminiClient {
    pub fn new(project: impl Into<String>, tokens: Box<dyn TokenSource>) -> Self {
        Self {
            api_base: None,
            project: project.into(),
            region: DEFAULT_REGION.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            tokens,
            http: HttpClient::new(),
            timeout: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_models(
        mut self,
        image_model: impl Into<String>,
        text_model: impl Into<String>,
    ) -> Self {
        self.image_model = image_model.into();
        self.text_model = text_model.into();
        self
    }

    pub fn with_http(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let api_base = self
            .api_base
            .clone()
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com/v1", self.region));
        format!(
            "{}/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            api_base,
            self.project,
            self.region,
            model.trim()
        )
    }

    fn post(&self, model: &str, payload: &Value) -> Result<RemoteResponse> {
        let endpoint = self.endpoint_for_model(model);
        let token = self.tokens.token()?;
        let mut request = self.http.post(&endpoint).bearer_auth(token).json(payload);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let started = Instant::now();
        let response = request
            .send()
            .map_err(|err| transport_error(BACKEND, &endpoint, err))?;
        let body = response_text_or_error(BACKEND, response)?;
        tracing::debug!(
            backend = BACKEND,
            model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generateContent returned"
        );
        Ok(parse_response(&body))
    }
}

fn build_parts(prompt: &ImagePrompt) -> Vec<Value> {
    prompt
        .parts
        .iter()
        .map(|part| match part {
            PromptPart::Text(text) => json!({ "text": text }),
            PromptPart::Image(image) => json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": BASE64.encode(&image.bytes),
                }
            }),
        })
        .collect()
}

fn image_payload(prompt: &ImagePrompt) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": build_parts(prompt) }],
        "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
    })
}

fn text_payload(prompt: &str) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
    })
}

/// Flattens `candidates[].content.parts[]` in order. Parts that are neither
/// text nor decodable inline data are skipped. A body that is not JSON yields
/// no parts.
fn parse_response(body: &str) -> RemoteResponse {
    let Ok(payload) = serde_json::from_str::<Value>(body) else {
        return RemoteResponse::default().with_raw(body);
    };
    let candidates = payload
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut parts = Vec::new();
    for candidate in candidates {
        let rows = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for row in rows {
            if let Some(inline) = row.get("inlineData").or_else(|| row.get("inline_data")) {
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("image/png")
                    .to_string();
                let encoded = inline.get("data").and_then(Value::as_str).unwrap_or_default();
                match BASE64.decode(encoded.trim().as_bytes()) {
                    Ok(data) => parts.push(ResponsePart::Binary { mime_type, data }),
                    Err(err) => tracing::warn!(
                        backend = BACKEND,
                        %mime_type,
                        "skipping inline part: {err}"
                    ),
                }
            } else if let Some(text) = row.get("text").and_then(Value::as_str) {
                parts.push(ResponsePart::Text(text.to_string()));
            }
        }
    }
    RemoteResponse::new(parts).with_raw(body)
}

impl TextRefiner for VertexGeminiClient {
    fn name(&self) -> &str {
        BACKEND
    }

    fn refine_text(&self, prompt: &str) -> Result<String> {
        let response = self.post(&self.text_model, &text_payload(prompt))?;
        let first_text = response.parts.iter().find_map(|part| match part {
            ResponsePart::Text(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        });
        Ok(first_text.unwrap_or(response.raw))
    }
}

impl ImageBackend for VertexGeminiClient {
    fn name(&self) -> &str {
        BACKEND
    }

    fn replies_with_text(&self) -> bool {
        true
    }

    fn generate_image(&self, prompt: &ImagePrompt, count: u8) -> Result<ImageBatch> {
        let payload = image_payload(prompt);
        tracing::info!(backend = BACKEND, model = %self.image_model, count, "generating image");
        let mut batch =
            generate_sequentially(BACKEND, count, |_| self.post(&self.image_model, &payload))?;
        if prompt.mask.is_some() {
            batch
                .warnings
                .insert(0, "Vertex Gemini does not take a mask; it was ignored.".to_string());
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use promptcanvas_contracts::errors::CanvasError;
    use promptcanvas_contracts::response::ImagePayload;

    use super::*;
    use crate::credentials::StaticToken;

    const MODEL_PATH: &str = concat!(
        "/projects/demo/locations/us-central1/publishers/google/models/",
        "gemini-2.5-flash-image-preview:generateContent"
    );
    const TEXT_MODEL_PATH: &str = concat!(
        "/projects/demo/locations/us-central1/publishers/google/models/",
        "gemini-2.5-flash:generateContent"
    );

    fn client(server: &mockito::Server) -> VertexGeminiClient {
        VertexGeminiClient::new("demo", Box::new(StaticToken::new("test-token")))
            .with_api_base(server.url())
    }

    fn image_body(bytes: &[u8]) -> String {
        json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Here is your image." },
                        { "inlineData": { "mimeType": "image/png", "data": BASE64.encode(bytes) } }
                    ]
                }
            }]
        })
        .to_string()
    }

    #[test]
    fn endpoint_follows_region_by_default() {
        let client = VertexGeminiClient::new("demo", Box::new(StaticToken::new("t")))
            .with_region("europe-west4");
        assert_eq!(
            client.endpoint_for_model("gemini-2.5-flash"),
            concat!(
                "https://europe-west4-aiplatform.googleapis.com/v1/projects/demo/",
                "locations/europe-west4/publishers/google/models/gemini-2.5-flash:generateContent"
            )
        );
    }

    #[test]
    fn edit_request_sends_image_then_text() -> anyhow::Result<()> {
        let mut server = mockito::Server::new();
        let base = ImagePayload::new(vec![9, 8, 7], "image/jpeg");
        let mock = server
            .mock("POST", MODEL_PATH)
            .match_header("authorization", "Bearer test-token")
            .match_body(Matcher::PartialJson(json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "inlineData": {
                            "mimeType": "image/jpeg",
                            "data": BASE64.encode([9u8, 8, 7])
                        } },
                        { "text": "make the sky purple" }
                    ]
                }],
                "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(image_body(b"edited"))
            .create();

        let batch = client(&server)
            .generate_image(&ImagePrompt::edit(base, "make the sky purple"), 1)?;
        mock.assert();
        assert!(client(&server).replies_with_text());
        assert_eq!(batch.results.len(), 1);
        assert_eq!(batch.results[0].image_bytes(), Some(&b"edited"[..]));
        Ok(())
    }

    #[test]
    fn text_only_reply_becomes_fallback() -> anyhow::Result<()> {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", MODEL_PATH)
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"I can't draw that."}]}}]}"#)
            .create();

        let batch = client(&server).generate_image(&ImagePrompt::text("a logo"), 1)?;
        assert!(batch.results[0].image().is_none());
        assert_eq!(batch.results[0].text_fallback(), Some("I can't draw that."));
        Ok(())
    }

    #[test]
    fn snake_case_inline_data_is_accepted() -> anyhow::Result<()> {
        let body = json!({
            "candidates": [
                { "content": { "parts": [{ "text": "first" }] } },
                { "content": { "parts": [{
                    "inline_data": { "mime_type": "image/webp", "data": BASE64.encode(b"w") }
                }] } }
            ]
        })
        .to_string();
        let parsed = parse_response(&body);
        assert_eq!(parsed.parts.len(), 2);
        assert_eq!(
            parsed.parts[1],
            ResponsePart::Binary {
                mime_type: "image/webp".to_string(),
                data: b"w".to_vec()
            }
        );
        Ok(())
    }

    #[test]
    fn undecodable_inline_part_is_skipped() -> anyhow::Result<()> {
        let body = json!({
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "mimeType": "image/png", "data": "%%not base64%%" } },
                { "inlineData": { "mimeType": "image/png", "data": BASE64.encode(b"good") } }
            ] } }]
        })
        .to_string();
        let parsed = parse_response(&body);
        assert_eq!(parsed.parts.len(), 1);
        assert_eq!(
            crate::extract::extract(&parsed).image_bytes(),
            Some(&b"good"[..])
        );
        Ok(())
    }

    #[test]
    fn count_issues_independent_requests() -> anyhow::Result<()> {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", MODEL_PATH)
            .with_status(200)
            .with_body(image_body(b"img"))
            .expect(3)
            .create();

        let batch = client(&server).generate_image(&ImagePrompt::text("three cats"), 3)?;
        mock.assert();
        assert_eq!(batch.results.len(), 3);
        Ok(())
    }

    #[test]
    fn non_success_status_is_surfaced_verbatim() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", MODEL_PATH)
            .with_status(429)
            .with_body(r#"{"error":{"code":429,"message":"Resource exhausted"}}"#)
            .create();

        match client(&server).generate_image(&ImagePrompt::text("x"), 1) {
            Err(CanvasError::RemoteService { status, message }) => {
                assert_eq!(status, Some(429));
                assert_eq!(message, r#"{"error":{"code":429,"message":"Resource exhausted"}}"#);
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn mask_is_ignored_with_warning() -> anyhow::Result<()> {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", MODEL_PATH)
            .with_status(200)
            .with_body(image_body(b"img"))
            .create();

        let prompt = ImagePrompt::edit(ImagePayload::new(vec![1], "image/png"), "x")
            .with_mask(Some(ImagePayload::new(vec![0], "image/png")));
        let batch = client(&server).generate_image(&prompt, 1)?;
        assert_eq!(batch.warnings.len(), 1);
        assert!(batch.warnings[0].contains("mask"));
        Ok(())
    }

    #[test]
    fn refine_returns_first_text_part() -> anyhow::Result<()> {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", TEXT_MODEL_PATH)
            .match_body(Matcher::PartialJson(json!({
                "contents": [{ "parts": [{ "text": "draft prompt" }] }]
            })))
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"  refined prompt  "}]}}]}"#)
            .create();

        assert_eq!(client(&server).refine_text("draft prompt")?, "refined prompt");
        Ok(())
    }

    #[test]
    fn refine_without_text_returns_raw_body() -> anyhow::Result<()> {
        let mut server = mockito::Server::new();
        let body = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        let _mock = server
            .mock("POST", TEXT_MODEL_PATH)
            .with_status(200)
            .with_body(body)
            .create();

        assert_eq!(client(&server).refine_text("draft")?, body);
        Ok(())
    }
}
