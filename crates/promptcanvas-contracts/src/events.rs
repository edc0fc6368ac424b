//! Typed action journal written as JSON lines.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{Category, StyleDescriptor};
use crate::errors::{Result, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionMode {
    Generate,
    Edit,
}

/// Something worth keeping about a session. The variant name becomes the
/// line's `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        backend: String,
        refine: bool,
    },
    ActionStarted {
        mode: ActionMode,
        category: Category,
        style: StyleDescriptor,
        count: u8,
        backend: String,
        /// Hex digest of the composed prompt; the prompt itself is not stored.
        prompt_sha256: String,
    },
    ActionSucceeded {
        images: usize,
        warnings: Vec<String>,
        elapsed_ms: u64,
    },
    ActionFailed {
        error: String,
        severity: Severity,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::ActionStarted { .. } => "action_started",
            Self::ActionSucceeded { .. } => "action_succeeded",
            Self::ActionFailed { .. } => "action_failed",
        }
    }
}

/// One journal line: the event plus who and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub session_id: String,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: SessionEvent,
}

/// Append-only `events.jsonl` for one session. The file and its parent
/// directory are created on first write.
#[derive(Debug, Clone)]
pub struct SessionJournal {
    path: PathBuf,
    session_id: String,
}

impl SessionJournal {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, event: SessionEvent) -> Result<()> {
        let record = JournalRecord {
            session_id: self.session_id.clone(),
            ts: Utc::now(),
            event,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        tracing::trace!(session_id = %self.session_id, event = record.event.kind(), "journaled");
        Ok(())
    }
}
