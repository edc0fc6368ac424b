//! Error taxonomy shared by the engine and its hosts.

/// How a host should surface an error to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Non-fatal; the user can correct the input or rephrase.
    Warning,
    /// The action failed.
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    /// Required user input is missing or out of range. No request was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Transport failure or non-success status from a remote endpoint.
    #[error("{}", render_remote(*status, message))]
    RemoteService {
        status: Option<u16>,
        message: String,
    },

    /// The remote call succeeded but returned nothing usable as an image.
    #[error("no image returned: {0}")]
    ExtractionFailure(String),

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("failed to decode: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CanvasError {
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::RemoteService {
            status,
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::InvalidInput(_) | Self::ExtractionFailure(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Text shown to the user at the action boundary.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(reason) => format!("Please check your input: {reason}"),
            Self::RemoteService { .. } => self.to_string(),
            Self::ExtractionFailure(detail) if detail.trim().is_empty() => {
                "No image was returned. Try rephrasing the instruction.".to_string()
            }
            Self::ExtractionFailure(detail) => format!(
                "The request worked but no image was returned ({detail}). \
                 Try rephrasing the instruction."
            ),
            other => format!("Something went wrong: {other}"),
        }
    }
}

fn render_remote(status: Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("remote service error ({code}): {message}"),
        None => format!("remote service error: {message}"),
    }
}

pub type Result<T> = std::result::Result<T, CanvasError>;
