//! File-per-record analysis history
//!
//! Each audited receipt lives in its own pretty-printed JSON file named by
//! record id, so writers to different records never contend on a shared
//! index. Saving an id that already has a file overwrites it in place.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{AnalysisRecord, RecordSummary, TIMESTAMP_FORMAT};

/// File-backed store for analysis records
#[derive(Debug, Clone)]
pub struct RecordStore {
    /// Directory where record files are stored
    history_dir: PathBuf,
}

impl RecordStore {
    /// Create a new store
    ///
    /// Creates the history directory if it doesn't exist.
    pub fn new(history_dir: impl Into<PathBuf>) -> Result<Self> {
        let history_dir = history_dir.into();

        if !history_dir.exists() {
            fs::create_dir_all(&history_dir)?;
            info!("Created history directory: {}", history_dir.display());
        }

        Ok(Self { history_dir })
    }

    /// Get the full path for a record id
    fn record_path(&self, id: &str) -> PathBuf {
        self.history_dir.join(format!("{}.json", id))
    }

    /// Get the history directory path
    pub fn history_dir(&self) -> &Path {
        &self.history_dir
    }

    /// Persist a record, returning its id
    ///
    /// A record with an empty id gets one minted from its timestamp and
    /// merchant; a record that already has an id overwrites its own file.
    pub fn save(&self, record: &mut AnalysisRecord) -> Result<String> {
        if record.id.is_empty() {
            record.id = mint_id(&record.timestamp, &record.merchant);
        }

        let path = self.record_path(&record.id);
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json)?;

        info!("Saved record: {}", path.display());
        Ok(record.id.clone())
    }

    /// Load a record by id
    pub fn load(&self, id: &str) -> Result<AnalysisRecord> {
        let path = self.record_path(id);

        if !path.exists() {
            return Err(Error::RecordNotFound(id.to_string()));
        }

        let raw = fs::read_to_string(&path)?;
        let mut record: AnalysisRecord =
            serde_json::from_str(&raw).map_err(|e| Error::RecordCorrupt {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        record.id = id.to_string();
        Ok(record)
    }

    /// List stored records, newest first by the id's embedded timestamp
    ///
    /// Unreadable or corrupt entries are skipped with a warning instead of
    /// failing the whole listing.
    pub fn list(&self) -> Result<Vec<RecordSummary>> {
        let mut entries: Vec<(NaiveDateTime, RecordSummary)> = Vec::new();

        for entry in fs::read_dir(&self.history_dir)? {
            let entry = entry?;
            let path = entry.path();

            let id = match record_id_from_path(&path) {
                Some(id) => id,
                None => continue,
            };

            let stamp = match parse_id_timestamp(&id) {
                Some(stamp) => stamp,
                None => {
                    warn!("Skipping file without a timestamped name: {}", path.display());
                    continue;
                }
            };

            match self.load(&id) {
                Ok(record) => entries.push((
                    stamp,
                    RecordSummary {
                        id,
                        timestamp: record.timestamp,
                        merchant: record.merchant,
                    },
                )),
                Err(e) => warn!("Skipping unreadable record {}: {}", id, e),
            }
        }

        // Newest first; id breaks same-minute ties deterministically
        entries.sort_by(|a, b| (b.0, &b.1.id).cmp(&(a.0, &a.1.id)));

        Ok(entries.into_iter().map(|(_, summary)| summary).collect())
    }

    /// Find a stored record with the given image hash, if any
    pub fn find_by_image_hash(&self, image_sha256: &str) -> Result<Option<String>> {
        if image_sha256.is_empty() {
            return Ok(None);
        }

        for summary in self.list()? {
            if let Ok(record) = self.load(&summary.id) {
                if record.image_sha256 == image_sha256 {
                    return Ok(Some(summary.id));
                }
            }
        }
        Ok(None)
    }
}

/// Synthesize a record id from a timestamp and a raw merchant name.
pub fn mint_id(timestamp: &str, merchant: &str) -> String {
    format!("{}-{}", timestamp, sanitize_merchant(merchant))
}

/// Reduce a merchant name to a filename-safe token
///
/// Keeps only alphanumerics, spaces, and underscores, then turns spaces into
/// underscores. Never empty and never able to traverse paths.
fn sanitize_merchant(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '_')
        .collect();
    let cleaned = kept.trim().replace(' ', "_");

    if cleaned.is_empty() {
        "Unknown".to_string()
    } else {
        cleaned
    }
}

/// The minute-resolution timestamp a record id starts with, if well formed.
fn parse_id_timestamp(id: &str) -> Option<NaiveDateTime> {
    // DD-MM-YY-HHMM, followed by "-<merchant>"
    let prefix = id.get(..13)?;
    NaiveDateTime::parse_from_str(prefix, TIMESTAMP_FORMAT).ok()
}

/// Record id for a `.json` file path, None for anything else.
fn record_id_from_path(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}
