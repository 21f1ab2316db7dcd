/// Duplicate notification suppression
///
/// Remembers which upload ids were announced recently so overlapping or
/// retried cycles never post the same video twice within the cooldown.
/// Entries carry their own expiry and are evicted lazily; nothing here is
/// persisted.
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Default cooldown before an id may be announced again.
pub const DEFAULT_COOLDOWN_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct NotificationGate {
    cooldown: Duration,
    notified: HashMap<String, DateTime<Utc>>,
}

impl Default for NotificationGate {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_COOLDOWN_HOURS))
    }
}

impl NotificationGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            notified: HashMap::new(),
        }
    }

    pub fn should_notify(&mut self, id: &str) -> bool {
        self.should_notify_at(id, Utc::now())
    }

    pub fn mark_notified(&mut self, id: &str) {
        self.mark_notified_at(id, Utc::now());
    }

    /// `false` while `id` is cooling down at `now`.
    pub fn should_notify_at(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        self.sweep(now);
        !self.notified.contains_key(id)
    }

    pub fn mark_notified_at(&mut self, id: &str, now: DateTime<Utc>) {
        let expires_at = now
            .checked_add_signed(self.cooldown)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.notified.insert(id.to_string(), expires_at);
    }

    /// Lift the cooldown for `id` ahead of its expiry.
    pub fn forget(&mut self, id: &str) {
        self.notified.remove(id);
    }

    /// Number of ids currently cooling down (expired entries included until
    /// the next sweep).
    pub fn len(&self) -> usize {
        self.notified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notified.is_empty()
    }

    fn sweep(&mut self, now: DateTime<Utc>) {
        self.notified.retain(|_, expires_at| *expires_at > now);
    }
}
