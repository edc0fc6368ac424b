//! The action handler that ties composing, generation, extraction and history
//! together for one user action.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use promptcanvas_contracts::errors::{CanvasError, Result};
use promptcanvas_contracts::events::{ActionMode, SessionEvent, SessionJournal};
use promptcanvas_contracts::history::{HistoryEntry, SessionHistory};
use promptcanvas_contracts::request::{EnhancedPrompt, GenerationRequest};
use promptcanvas_contracts::response::ImagePayload;
use reqwest::blocking::Client as HttpClient;
use sha2::{Digest, Sha256};

use crate::client::{
    DryrunBackend, ImageBackend, ImagePrompt, StabilityClient, TextRefiner, VertexGeminiClient,
};
use crate::composer::{frame_edit, PromptComposer};
use crate::config::{BackendKind, EngineConfig};
use crate::credentials::ServiceAccountTokenSource;

/// Per-session state owned by the host and threaded through every action.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub history: SessionHistory,
    pub active_image: Option<ImagePayload>,
    pub active_mask: Option<ImagePayload>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            history: SessionHistory::new(),
            active_image: None,
            active_mask: None,
        }
    }

    pub fn clear_active_image(&mut self) {
        self.active_image = None;
        self.active_mask = None;
    }
}

/// What one successful action produced.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub prompt_used: EnhancedPrompt,
    pub original: Option<ImagePayload>,
    pub images: Vec<ImagePayload>,
    /// Text the model returned instead of an image for some of the requests.
    pub text_fallbacks: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct Studio {
    composer: PromptComposer,
    backend: Arc<dyn ImageBackend>,
    refiner: Option<Arc<dyn TextRefiner>>,
    refine: bool,
    journal: Option<SessionJournal>,
}

impl Studio {
    pub fn new(composer: PromptComposer, backend: Arc<dyn ImageBackend>) -> Self {
        Self {
            composer,
            backend,
            refiner: None,
            refine: false,
            journal: None,
        }
    }

    pub fn with_refiner(mut self, refiner: Option<Arc<dyn TextRefiner>>) -> Self {
        self.refiner = refiner;
        self
    }

    pub fn with_journal(mut self, journal: Option<SessionJournal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn refine_enabled(&self) -> bool {
        self.refine
    }

    pub fn set_refine(&mut self, enabled: bool) {
        self.refine = enabled;
    }

    pub fn refine_available(&self) -> bool {
        self.refiner.is_some()
    }

    /// Runs one generate or edit action.
    ///
    /// Invalid input fails before any remote call. On success every returned
    /// image is appended to the session history; on any error the history is
    /// left untouched.
    pub fn generate(
        &self,
        session: &mut SessionContext,
        request: GenerationRequest,
    ) -> Result<ActionOutcome> {
        request.validate()?;
        let prompt = self.composer.compose(
            &request.raw_instruction,
            request.category,
            request.style,
        )?;

        self.journal_event(SessionEvent::ActionStarted {
            mode: if request.is_edit() {
                ActionMode::Edit
            } else {
                ActionMode::Generate
            },
            category: request.category,
            style: request.style,
            count: request.desired_count(),
            backend: self.backend.name().to_string(),
            prompt_sha256: prompt_digest(prompt.as_str()),
        });

        let started = Instant::now();
        match self.run(&request, prompt) {
            Ok(outcome) => {
                let timestamp = Utc::now();
                for image in &outcome.images {
                    session.history.append(HistoryEntry::new(
                        outcome.original.clone(),
                        image.clone(),
                        outcome.prompt_used.as_str(),
                        timestamp,
                    ));
                }
                tracing::info!(
                    backend = self.backend.name(),
                    images = outcome.images.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "action succeeded"
                );
                self.journal_event(SessionEvent::ActionSucceeded {
                    images: outcome.images.len(),
                    warnings: outcome.warnings.clone(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(backend = self.backend.name(), "action failed: {err}");
                self.journal_event(SessionEvent::ActionFailed {
                    error: err.to_string(),
                    severity: err.severity(),
                });
                Err(err)
            }
        }
    }

    fn run(&self, request: &GenerationRequest, composed: EnhancedPrompt) -> Result<ActionOutcome> {
        let mut warnings = Vec::new();
        let prompt = if self.refine {
            self.refined(composed, &mut warnings)?
        } else {
            composed
        };

        let image_prompt = match &request.base_image {
            Some(base) => {
                let instruction = if self.backend.replies_with_text() {
                    frame_edit(prompt.as_str())
                } else {
                    prompt.as_str().to_string()
                };
                ImagePrompt::edit(base.clone(), instruction).with_mask(request.mask.clone())
            }
            None => ImagePrompt::text(prompt.as_str()),
        };
        let batch = self
            .backend
            .generate_image(&image_prompt, request.desired_count())?;
        warnings.extend(batch.warnings);

        let mut images = Vec::new();
        let mut text_fallbacks = Vec::new();
        for result in batch.results {
            if let Some(text) = result.text_fallback() {
                text_fallbacks.push(text.to_string());
            }
            if let Some(image) = result.into_image() {
                images.push(image);
            }
        }
        if images.is_empty() {
            return Err(CanvasError::ExtractionFailure(
                text_fallbacks.into_iter().next().unwrap_or_default(),
            ));
        }

        Ok(ActionOutcome {
            prompt_used: prompt,
            original: request.base_image.clone(),
            images,
            text_fallbacks,
            warnings,
        })
    }

    fn refined(
        &self,
        composed: EnhancedPrompt,
        warnings: &mut Vec<String>,
    ) -> Result<EnhancedPrompt> {
        let Some(refiner) = &self.refiner else {
            warnings.push(
                "refinement is not available for this backend; used the composed prompt"
                    .to_string(),
            );
            return Ok(composed);
        };
        let refined = refiner.refine_text(composed.as_str())?;
        let refined = refined.trim();
        if refined.is_empty() {
            warnings.push("refinement returned nothing; used the composed prompt".to_string());
            return Ok(composed);
        }
        tracing::debug!(refiner = refiner.name(), "prompt refined");
        Ok(EnhancedPrompt::new(refined))
    }

    /// Journal failures are logged and never fail the action.
    fn journal_event(&self, event: SessionEvent) {
        let Some(journal) = &self.journal else {
            return;
        };
        if let Err(err) = journal.record(event) {
            tracing::warn!(path = %journal.path().display(), "journal write failed: {err}");
        }
    }

    pub fn record_session_started(&self) {
        self.journal_event(SessionEvent::SessionStarted {
            backend: self.backend.name().to_string(),
            refine: self.refine,
        });
    }
}

fn prompt_digest(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

/// The configured image backend and, when one is reachable, a text refiner.
pub struct Backends {
    pub image: Arc<dyn ImageBackend>,
    pub refiner: Option<Arc<dyn TextRefiner>>,
}

/// Builds clients once at startup from resolved settings.
pub fn build_backends(config: &EngineConfig) -> Result<Backends> {
    match config.backend {
        BackendKind::Dryrun => {
            let backend = Arc::new(DryrunBackend::default());
            Ok(Backends {
                image: backend.clone(),
                refiner: Some(backend),
            })
        }
        BackendKind::Vertex => {
            let vertex = Arc::new(vertex_client(config)?);
            Ok(Backends {
                image: vertex.clone(),
                refiner: Some(vertex),
            })
        }
        BackendKind::Stability => {
            let api_key = config.stability_api_key.clone().ok_or_else(|| {
                CanvasError::Credentials("STABILITY_API_KEY not set".to_string())
            })?;
            let stability = StabilityClient::new(api_key)
                .with_api_base(config.stability_api_base.clone())
                .with_engine(config.stability_engine.clone())
                .with_timeout(config.request_timeout);
            let refiner: Option<Arc<dyn TextRefiner>> = match config.credentials {
                Some(_) => match vertex_client(config) {
                    Ok(vertex) => Some(Arc::new(vertex)),
                    Err(err) => {
                        tracing::warn!("text refinement disabled: {err}");
                        None
                    }
                },
                None => None,
            };
            Ok(Backends {
                image: Arc::new(stability),
                refiner,
            })
        }
    }
}

fn vertex_client(config: &EngineConfig) -> Result<VertexGeminiClient> {
    let creds = config.load_credentials()?;
    let project = config.resolve_project(&creds)?;
    let http = HttpClient::new();
    let tokens = ServiceAccountTokenSource::new(creds, http.clone());
    Ok(VertexGeminiClient::new(project, Box::new(tokens))
        .with_region(config.region.clone())
        .with_api_base(config.vertex_api_base())
        .with_models(config.image_model.clone(), config.text_model.clone())
        .with_http(http)
        .with_timeout(config.request_timeout))
}
