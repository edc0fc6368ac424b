use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use promptcanvas_contracts::errors::{CanvasError, Result};

use crate::credentials::ServiceAccountCredentials;

pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_STABILITY_API_BASE: &str = "https://api.stability.ai";
pub const DEFAULT_STABILITY_ENGINE: &str = "stable-diffusion-xl-1024-v1-0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Vertex,
    Stability,
    Dryrun,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Stability => "stability",
            Self::Dryrun => "dryrun",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "vertex" | "gemini" => Ok(Self::Vertex),
            "stability" | "stable-diffusion" => Ok(Self::Stability),
            "dryrun" => Ok(Self::Dryrun),
            other => Err(format!(
                "unknown backend '{other}' (expected vertex, stability or dryrun)"
            )),
        }
    }
}

/// Where a service-account key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    File(PathBuf),
    Inline(String),
}

/// Process-wide settings, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub backend: BackendKind,
    pub project_id: Option<String>,
    pub region: String,
    pub image_model: String,
    pub text_model: String,
    pub vertex_api_base: Option<String>,
    pub credentials: Option<CredentialSource>,
    pub stability_api_key: Option<String>,
    pub stability_api_base: String,
    pub stability_engine: String,
    /// Applied to remote calls only when set; otherwise transport defaults apply.
    pub request_timeout: Option<Duration>,
    pub catalog_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            project_id: None,
            region: DEFAULT_REGION.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            vertex_api_base: None,
            credentials: None,
            stability_api_key: None,
            stability_api_base: DEFAULT_STABILITY_API_BASE.to_string(),
            stability_engine: DEFAULT_STABILITY_ENGINE.to_string(),
            request_timeout: None,
            catalog_path: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(non_empty_env)
    }

    /// Resolves settings through `lookup`, which must return trimmed non-empty
    /// values or `None`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup("PROMPTCANVAS_BACKEND") {
            config.backend = raw.parse().map_err(CanvasError::InvalidInput)?;
        }
        config.project_id = lookup("PROMPTCANVAS_PROJECT");
        if let Some(region) = lookup("PROMPTCANVAS_REGION") {
            config.region = region;
        }
        if let Some(model) = lookup("PROMPTCANVAS_IMAGE_MODEL") {
            config.image_model = model;
        }
        if let Some(model) = lookup("PROMPTCANVAS_TEXT_MODEL") {
            config.text_model = model;
        }
        config.vertex_api_base = lookup("PROMPTCANVAS_VERTEX_API_BASE")
            .map(|base| base.trim_end_matches('/').to_string());
        config.credentials = lookup("PROMPTCANVAS_SERVICE_ACCOUNT_JSON")
            .map(CredentialSource::Inline)
            .or_else(|| {
                lookup("GOOGLE_APPLICATION_CREDENTIALS")
                    .map(|path| CredentialSource::File(PathBuf::from(path)))
            });
        config.stability_api_key = lookup("STABILITY_API_KEY");
        if let Some(base) = lookup("STABILITY_API_BASE") {
            config.stability_api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(engine) = lookup("STABILITY_ENGINE") {
            config.stability_engine = engine;
        }
        if let Some(raw) = lookup("PROMPTCANVAS_REQUEST_TIMEOUT") {
            let seconds: f64 = raw.parse().map_err(|_| {
                CanvasError::InvalidInput(format!(
                    "PROMPTCANVAS_REQUEST_TIMEOUT must be a number of seconds, got '{raw}'"
                ))
            })?;
            if seconds > 0.0 {
                config.request_timeout = Some(Duration::from_secs_f64(seconds));
            }
        }
        config.catalog_path = lookup("PROMPTCANVAS_CATALOG").map(PathBuf::from);

        Ok(config)
    }

    pub fn load_credentials(&self) -> Result<ServiceAccountCredentials> {
        match &self.credentials {
            Some(CredentialSource::Inline(json)) => ServiceAccountCredentials::from_json(json),
            Some(CredentialSource::File(path)) => ServiceAccountCredentials::from_file(path),
            None => Err(CanvasError::Credentials(
                "set GOOGLE_APPLICATION_CREDENTIALS or PROMPTCANVAS_SERVICE_ACCOUNT_JSON"
                    .to_string(),
            )),
        }
    }

    /// Explicit project wins over the one embedded in the credentials.
    pub fn resolve_project(&self, creds: &ServiceAccountCredentials) -> Result<String> {
        self.project_id
            .clone()
            .or_else(|| creds.project_id.clone())
            .map(|project| project.trim().to_string())
            .filter(|project| !project.is_empty())
            .ok_or_else(|| {
                CanvasError::Credentials(
                    "no project id: set PROMPTCANVAS_PROJECT or use a key with project_id"
                        .to_string(),
                )
            })
    }

    pub fn vertex_api_base(&self) -> String {
        self.vertex_api_base
            .clone()
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com/v1", self.region))
    }
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
