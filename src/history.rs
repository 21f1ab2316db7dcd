/// Upload history
///
/// Keeps the last few uploads that were announced (or deliberately recorded)
/// and persists them to a small JSON file so a restart does not re-announce
/// old videos.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

/// Number of uploads retained in history.
pub const HISTORY_LIMIT: usize = 5;

/// A single upload of the watched channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: String,
    pub published_at: DateTime<Utc>,
}

impl UploadRecord {
    pub fn new(id: impl Into<String>, published_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            published_at,
        }
    }
}

/// Bounded, publish-time ascending window of recent uploads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    records: Vec<UploadRecord>,
}

impl History {
    /// Build a history from arbitrary records, restoring the ordering and
    /// size invariants.
    pub fn from_records(mut records: Vec<UploadRecord>) -> Self {
        records.sort_by(|a, b| a.published_at.cmp(&b.published_at));
        let mut history = Self { records };
        history.truncate();
        history
    }

    pub fn records(&self) -> &[UploadRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recently published upload.
    pub fn latest(&self) -> Option<&UploadRecord> {
        self.records.last()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    /// Append a record. Records older than the current tail are inserted at
    /// their chronological position so the window stays sorted.
    pub fn push(&mut self, record: UploadRecord) {
        let at = self
            .records
            .partition_point(|r| r.published_at <= record.published_at);
        self.records.insert(at, record);
    }

    /// Drop everything but the newest `HISTORY_LIMIT` records.
    pub fn truncate(&mut self) {
        if self.records.len() > HISTORY_LIMIT {
            let start = self.records.len() - HISTORY_LIMIT;
            self.records.drain(..start);
        }
    }
}

/// On-disk layout, kept compatible with the `videos.json` files written by
/// earlier deployments.
#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(rename = "videoIds", default)]
    video_ids: Vec<UploadRecord>,
}

/// JSON file backing for [`History`].
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted history. A missing file is an empty history.
    pub async fn load(&self) -> Result<History> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "No history file at {}, starting with empty history",
                    self.path.display()
                );
                return Ok(History::default());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        let file: HistoryFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        let history = History::from_records(file.video_ids);
        log::info!(
            "Loaded {} uploads from {}",
            history.len(),
            self.path.display()
        );

        Ok(history)
    }

    /// Write the history in full (temp file, then rename).
    pub async fn save(&self, history: &History) -> Result<()> {
        let file = HistoryFile {
            video_ids: history.records().to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&file).context("Failed to encode history")?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let mut out = tokio::fs::File::create(&tmp)
            .await
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        out.write_all(&bytes).await?;
        out.flush().await?;
        out.sync_all()
            .await
            .with_context(|| format!("Failed to sync {}", tmp.display()))?;
        drop(out);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        log::debug!("Saved {} uploads to {}", history.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn at(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_sorted(history: &History) -> bool {
        history
            .records()
            .windows(2)
            .all(|w| w[0].published_at <= w[1].published_at)
    }

    #[test]
    fn from_records_sorts_and_keeps_newest() {
        let records = (0..8)
            .rev()
            .map(|i| UploadRecord::new(format!("v{}", i), at(i * 10)))
            .collect();
        let history = History::from_records(records);

        assert_eq!(history.len(), HISTORY_LIMIT);
        assert!(is_sorted(&history));
        assert_eq!(history.records()[0].id, "v3");
        assert_eq!(history.latest().unwrap().id, "v7");
    }

    #[test]
    fn push_then_truncate_keeps_invariants() {
        let mut history = History::default();
        for i in 0..12 {
            history.push(UploadRecord::new(format!("v{}", i), at(100 + i)));
            history.truncate();
            assert!(history.len() <= HISTORY_LIMIT);
            assert!(is_sorted(&history));
        }
        assert_eq!(history.latest().unwrap().id, "v11");
        assert!(!history.contains("v6"));
        assert!(history.contains("v7"));
    }

    #[test]
    fn push_out_of_order_inserts_chronologically() {
        let mut history = History::from_records(vec![
            UploadRecord::new("a", at(100)),
            UploadRecord::new("c", at(300)),
        ]);
        history.push(UploadRecord::new("b", at(200)));

        let ids: Vec<&str> = history.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn missing_file_loads_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("videos.json"));

        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_restores_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("state").join("videos.json"));
        let history = History::from_records(vec![
            UploadRecord::new("a", at(100)),
            UploadRecord::new("b", at(200)),
        ]);

        store.save(&history).await.unwrap();

        assert_eq!(store.load().await.unwrap(), history);
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn save_writes_complete_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("videos.json");
        let store = HistoryStore::new(&path);
        std::fs::write(&path, r#"{ "videoIds": [] }"#).unwrap();

        store
            .save(&History::from_records(vec![UploadRecord::new("a", at(100))]))
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["videoIds"][0]["id"], "a");
        assert_eq!(raw["videoIds"][0]["publishedAt"], "1970-01-01T00:01:40Z");
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn reads_legacy_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("videos.json");
        std::fs::write(
            &path,
            r#"{
  "videoIds": [
    { "id": "new", "publishedAt": "2024-03-02T10:00:00Z" },
    { "id": "old", "publishedAt": "2024-03-01T10:00:00Z" }
  ]
}"#,
        )
        .unwrap();

        let history = HistoryStore::new(&path).load().await.unwrap();

        assert_eq!(history.records()[0].id, "old");
        assert_eq!(history.latest().unwrap().id, "new");
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("videos.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(HistoryStore::new(&path).load().await.is_err());
    }
}
