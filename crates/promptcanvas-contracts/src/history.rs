use chrono::{DateTime, Utc};

use crate::response::ImagePayload;

/// Number of entries hosts show by default.
pub const DISPLAY_CAP: usize = 20;

/// A successful generation, frozen at append time.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    original_image: Option<ImagePayload>,
    output_image: ImagePayload,
    prompt_used: String,
    timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        original_image: Option<ImagePayload>,
        output_image: ImagePayload,
        prompt_used: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            original_image,
            output_image,
            prompt_used: prompt_used.into(),
            timestamp,
        }
    }

    pub fn original_image(&self) -> Option<&ImagePayload> {
        self.original_image.as_ref()
    }

    pub fn output_image(&self) -> &ImagePayload {
        &self.output_image
    }

    pub fn prompt_used(&self) -> &str {
        &self.prompt_used
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Append-only log of one interactive session's outputs.
///
/// The store grows without bound; only `recent` is capped.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    entries: Vec<HistoryEntry>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// At most `n` entries, most recent first.
    pub fn recent(&self, n: usize) -> Vec<&HistoryEntry> {
        self.entries.iter().rev().take(n).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn entry(prompt: &str, offset_s: i64) -> HistoryEntry {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        HistoryEntry::new(
            None,
            ImagePayload::new(prompt.as_bytes().to_vec(), "image/png"),
            prompt,
            base + Duration::seconds(offset_s),
        )
    }

    #[test]
    fn recent_is_reverse_chronological_and_capped() {
        let mut history = SessionHistory::new();
        for idx in 0..25 {
            history.append(entry(&format!("p{idx}"), idx));
        }

        let recent = history.recent(DISPLAY_CAP);
        assert_eq!(recent.len(), DISPLAY_CAP);
        assert_eq!(recent[0].prompt_used(), "p24");
        assert_eq!(recent[19].prompt_used(), "p5");
        assert!(recent
            .windows(2)
            .all(|pair| pair[0].timestamp() > pair[1].timestamp()));
        assert_eq!(history.len(), 25);
    }

    #[test]
    fn recent_with_fewer_entries_than_requested() {
        let mut history = SessionHistory::new();
        assert!(history.recent(5).is_empty());

        history.append(entry("first", 0));
        history.append(entry("second", 1));
        let prompts: Vec<&str> = history
            .recent(5)
            .into_iter()
            .map(HistoryEntry::prompt_used)
            .collect();
        assert_eq!(prompts, vec!["second", "first"]);
        assert!(history.recent(0).is_empty());
    }
}
