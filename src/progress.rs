use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use dirs_next::data_dir;
use serde::{Deserialize, Serialize};

use crate::registry::Provider;

/// Per-episode watch position, keyed by the episode's href. Written on every
/// sample tick, read back to seed "resume from" the next time the same
/// episode opens. Never deleted, only overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackProgressRecord {
    pub last_played_secs: f64,
    pub total_secs: f64,
}

/// Denormalized snapshot for the "continue watching" surface, written
/// alongside the progress record. Latest write wins per href; most recent
/// entries sit at the front.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueWatchingEntry {
    pub title: String,
    pub episode: String,
    pub href: String,
    /// Title reference used to re-fetch the episode list on resume.
    pub reference: String,
    pub thumbnail: Option<String>,
    pub last_played_secs: f64,
    pub total_secs: f64,
    pub source: Provider,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProgressStore {
    #[serde(default)]
    pub records: HashMap<String, PlaybackProgressRecord>,
    #[serde(default)]
    pub continue_watching: Vec<ContinueWatchingEntry>,
}

impl ProgressStore {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read progress file {}", path.display()))?;
        let store = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse progress file {}", path.display()))?;
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create progress directory {}", parent.display())
            })?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)
            .with_context(|| format!("failed to write progress file {}", path.display()))?;
        Ok(())
    }

    /// Upserts the watch position for one episode. The position is clamped
    /// to the reported duration; equal values overwrite in place, so
    /// repeating a write is a no-op.
    pub fn upsert_record(&mut self, href: &str, position_secs: f64, total_secs: f64) {
        let clamped = position_secs.clamp(0.0, total_secs);
        self.records.insert(
            href.to_string(),
            PlaybackProgressRecord {
                last_played_secs: clamped,
                total_secs,
            },
        );
    }

    pub fn upsert_continue_watching(&mut self, entry: ContinueWatchingEntry) {
        if let Some(pos) = self
            .continue_watching
            .iter()
            .position(|e| e.href == entry.href)
        {
            self.continue_watching.remove(pos);
        }
        self.continue_watching.insert(0, entry);
    }

    pub fn record(&self, href: &str) -> Option<&PlaybackProgressRecord> {
        self.records.get(href)
    }

    /// Position to seek to before playing `href`, if any was recorded.
    pub fn resume_position(&self, href: &str) -> Option<f64> {
        self.records
            .get(href)
            .map(|r| r.last_played_secs)
            .filter(|&t| t > 0.0)
    }
}

pub fn store_path() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(base.join("anzu").join("progress.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(href: &str, position: f64) -> ContinueWatchingEntry {
        ContinueWatchingEntry {
            title: "Great Show".into(),
            episode: "1".into(),
            href: href.into(),
            reference: "/category/great-show".into(),
            thumbnail: None,
            last_played_secs: position,
            total_secs: 1440.0,
            source: Provider::GogoAnime,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn repeated_identical_writes_leave_the_record_unchanged() {
        let mut store = ProgressStore::default();
        store.upsert_record("/ep/1", 300.0, 1440.0);
        let before = store.record("/ep/1").cloned();
        store.upsert_record("/ep/1", 300.0, 1440.0);
        assert_eq!(store.record("/ep/1").cloned(), before);
        assert_eq!(store.records.len(), 1);
    }

    #[test]
    fn position_is_clamped_to_duration() {
        let mut store = ProgressStore::default();
        store.upsert_record("/ep/1", 2000.0, 1440.0);
        assert_eq!(store.record("/ep/1").unwrap().last_played_secs, 1440.0);
    }

    #[test]
    fn resume_position_requires_progress() {
        let mut store = ProgressStore::default();
        store.upsert_record("/ep/1", 0.0, 1440.0);
        assert_eq!(store.resume_position("/ep/1"), None);
        store.upsert_record("/ep/1", 12.5, 1440.0);
        assert_eq!(store.resume_position("/ep/1"), Some(12.5));
        assert_eq!(store.resume_position("/ep/2"), None);
    }

    #[test]
    fn continue_watching_keeps_latest_write_per_href() {
        let mut store = ProgressStore::default();
        store.upsert_continue_watching(entry("/ep/1", 100.0));
        store.upsert_continue_watching(entry("/ep/2", 50.0));
        store.upsert_continue_watching(entry("/ep/1", 200.0));

        assert_eq!(store.continue_watching.len(), 2);
        assert_eq!(store.continue_watching[0].href, "/ep/1");
        assert_eq!(store.continue_watching[0].last_played_secs, 200.0);
    }

    #[test]
    fn store_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("anzu-test-{}", std::process::id()));
        let path = dir.join("progress.json");
        let mut store = ProgressStore::default();
        store.upsert_record("/ep/1", 300.0, 1440.0);
        store.upsert_continue_watching(entry("/ep/1", 300.0));
        store.save(&path).unwrap();

        let loaded = ProgressStore::load(&path).unwrap();
        assert_eq!(loaded.record("/ep/1").unwrap().last_played_secs, 300.0);
        assert_eq!(loaded.continue_watching.len(), 1);
        fs::remove_dir_all(&dir).ok();
    }
}
