pub mod catalog;
pub mod chat;
pub mod errors;
pub mod events;
pub mod history;
pub mod request;
pub mod response;

pub use catalog::{Category, PromptCatalog, StyleDescriptor, REQUEST_PLACEHOLDER};
pub use errors::{CanvasError, Result, Severity};
pub use events::{ActionMode, JournalRecord, SessionEvent, SessionJournal};
pub use history::{HistoryEntry, SessionHistory, DISPLAY_CAP};
pub use request::{EnhancedPrompt, GenerationRequest, MAX_IMAGE_COUNT};
pub use response::{GenerationResult, ImagePayload, RemoteResponse, ResponsePart};
