/// New upload detection
///
/// Decides which freshly fetched uploads have not been seen before.
use std::collections::HashSet;

use crate::history::{History, UploadRecord};

/// Return the uploads in `fresh` that are genuinely new, oldest first.
///
/// An upload is new when its id is absent from `history` and it was
/// published strictly after the newest upload in `history`. With an empty
/// history only the id check applies. Input order does not matter; the API
/// usually returns newest first.
///
/// Uploads that scroll out of the bounded history window between two polls
/// are indistinguishable from already-seen ones.
pub fn detect_new(fresh: &[UploadRecord], history: &History) -> Vec<UploadRecord> {
    let watermark = history.latest().map(|r| r.published_at);
    let mut reported = HashSet::new();

    let mut unseen: Vec<UploadRecord> = fresh
        .iter()
        .filter(|record| !history.contains(&record.id))
        .filter(|record| watermark.map_or(true, |w| record.published_at > w))
        .filter(|record| reported.insert(record.id.as_str()))
        .cloned()
        .collect();

    unseen.sort_by(|a, b| a.published_at.cmp(&b.published_at));
    unseen
}
