//! # Playback Data Model
//!
//! Wire and cache representations shared by the engine, the progress store and
//! the download orchestrator.

use serde::{Deserialize, Serialize};

/// A narration unit mapped onto a span of playback time.
///
/// `end_time` is cumulative seconds from the start of the book, derived by
/// the timeline builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub section_id: i64,
    pub duration: f64,
    pub playback_order: i64,
    pub end_time: f64,
}

impl Section {
    /// Identifier of the synthetic entry at index 0 of every timeline.
    pub const SENTINEL_ID: i64 = -1;

    pub(crate) fn sentinel() -> Self {
        Self {
            section_id: Self::SENTINEL_ID,
            duration: 0.0,
            playback_order: -1,
            end_time: 0.0,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.playback_order < 0 && self.section_id == Self::SENTINEL_ID
    }
}

/// Book metadata as served by `GET /books/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDetails {
    pub id: String,
    pub title: String,
    pub pdf_file_name: String,
    #[serde(default)]
    pub number_of_pages: Option<u32>,
    /// Readiness as reported by the backend (e.g. `"ready"`, `"processing"`).
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackStatus {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackStatus::Playing)
    }
}

/// Where the listener is, as owned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackPosition {
    pub book_id: String,
    pub section_id: Option<i64>,
    pub section_progress_seconds: f64,
    pub global_progress_seconds: f64,
    pub playback_rate: f64,
}

/// Persisted progress snapshot, cached under the progress URL.
///
/// Fields the client never computes (percentages, narrated total) come from
/// the backend and survive local rewrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(default)]
    pub book_id: String,
    #[serde(default)]
    pub section_id: Option<i64>,
    #[serde(default)]
    pub section_progress_seconds: Option<f64>,
    #[serde(default)]
    pub global_progress_seconds: f64,
    #[serde(default)]
    pub total_narrated_seconds: f64,
    #[serde(default)]
    pub available_percent: f64,
    #[serde(default)]
    pub queued_percent: f64,
    #[serde(default)]
    pub unavailable_percent: f64,
    #[serde(default)]
    pub playback_rate: Option<f64>,
    #[serde(default = "default_sync_current_section")]
    pub sync_current_section: bool,
}

fn default_sync_current_section() -> bool {
    true
}

impl ProgressRecord {
    /// An empty record for a book that has never been played.
    pub fn new(book_id: impl Into<String>) -> Self {
        Self {
            book_id: book_id.into(),
            section_id: None,
            section_progress_seconds: None,
            global_progress_seconds: 0.0,
            total_narrated_seconds: 0.0,
            available_percent: 0.0,
            queued_percent: 0.0,
            unavailable_percent: 0.0,
            playback_rate: None,
            sync_current_section: true,
        }
    }

    /// Overwrite the position fields, keeping the backend-owned ones.
    pub fn apply(&mut self, position: &PlaybackPosition) {
        self.book_id = position.book_id.clone();
        self.section_id = position.section_id;
        self.section_progress_seconds = Some(position.section_progress_seconds);
        self.global_progress_seconds = position.global_progress_seconds;
        self.playback_rate = Some(position.playback_rate);
        self.sync_current_section = true;
    }

    /// Body of the progress `POST`.
    pub fn to_update(&self) -> ProgressUpdate {
        ProgressUpdate {
            book_id: self.book_id.clone(),
            section_id: self.section_id,
            section_progress_seconds: self.section_progress_seconds.unwrap_or(0.0),
            sync_current_section: self.sync_current_section,
            playback_rate: self.playback_rate.unwrap_or(1.0),
        }
    }
}

/// Body of `POST /books/{id}/progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub book_id: String,
    pub section_id: Option<i64>,
    pub section_progress_seconds: f64,
    pub sync_current_section: bool,
    pub playback_rate: f64,
}

/// Download status record, keyed by book id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadInfo {
    pub id: String,
    pub fragments_total: u64,
    pub fragments_downloaded: u64,
}

impl DownloadInfo {
    pub fn new(book_id: impl Into<String>) -> Self {
        Self {
            id: book_id.into(),
            fragments_total: 0,
            fragments_downloaded: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.fragments_total > 0 && self.fragments_downloaded >= self.fragments_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_record_from_backend_payload() {
        let json = r#"{
            "section_id": 12,
            "section_progress_seconds": 3.5,
            "global_progress_seconds": 120.0,
            "total_narrated_seconds": 600.0,
            "available_percent": 80.0,
            "queued_percent": 15.0,
            "unavailable_percent": 5.0
        }"#;
        let record: ProgressRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.section_id, Some(12));
        assert_eq!(record.playback_rate, None);
        assert!(record.sync_current_section);
        assert_eq!(record.book_id, "");
    }

    #[test]
    fn test_apply_keeps_backend_fields() {
        let mut record = ProgressRecord::new("b1");
        record.available_percent = 80.0;
        record.apply(&PlaybackPosition {
            book_id: "b1".to_string(),
            section_id: Some(4),
            section_progress_seconds: 2.0,
            global_progress_seconds: 42.0,
            playback_rate: 1.5,
        });

        assert_eq!(record.available_percent, 80.0);
        let update = record.to_update();
        assert_eq!(update.section_id, Some(4));
        assert_eq!(update.playback_rate, 1.5);
        assert!(update.sync_current_section);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PlaybackStatus::Playing).unwrap(),
            "\"playing\""
        );
    }
}
