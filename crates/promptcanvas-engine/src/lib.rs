pub mod client;
pub mod composer;
pub mod config;
pub mod credentials;
pub mod extract;
pub mod media;
pub mod studio;

pub use client::{
    DryrunBackend, ImageBackend, ImageBatch, ImagePrompt, PromptPart,
    StabilityClient, TextRefiner, VertexGeminiClient,
};
pub use composer::{compose, frame_edit, PromptComposer, EDIT_FRAMING};
pub use config::{BackendKind, CredentialSource, EngineConfig};
pub use credentials::{
    ServiceAccountCredentials, ServiceAccountTokenSource, StaticToken, TokenSource,
};
pub use extract::extract;
pub use studio::{build_backends, ActionOutcome, Backends, SessionContext, Studio};
