/// Upload check cycle
///
/// One cycle fetches the latest uploads, works out which are new, announces
/// them oldest first and persists the updated history. Cycles never overlap:
/// a trigger that arrives while a cycle is running is dropped.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::announcer::{AnnounceError, Announcer};
use crate::detector::detect_new;
use crate::fetcher::Fetcher;
use crate::gate::NotificationGate;
use crate::history::{History, HistoryStore, UploadRecord};

/// Result of one trigger of [`Poller::run_cycle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Another cycle was still running.
    Skipped,
    /// Every API key failed; nothing changed.
    FetchFailed { reason: String },
    /// The API answered with an empty item list.
    NoItems,
    NothingNew,
    Processed {
        notified: usize,
        recorded: usize,
        undelivered: usize,
        persisted: bool,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PollStatus {
    pub last_poll: Option<DateTime<Utc>>,
    pub last_outcome: Option<CycleOutcome>,
    pub total_cycles: u64,
    pub total_notified: u64,
}

#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Record an upload in history even when its announcement failed.
    pub record_undelivered: bool,
    pub cooldown: chrono::Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            record_undelivered: true,
            cooldown: chrono::Duration::hours(crate::gate::DEFAULT_COOLDOWN_HOURS),
        }
    }
}

struct WatchState {
    history: History,
    gate: NotificationGate,
}

/// Clears the running flag when dropped, whichever way the cycle ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Watches a single channel. Owns the history, the notification gate and the
/// key rotation state.
pub struct Poller {
    fetcher: Fetcher,
    store: HistoryStore,
    announcer: Arc<dyn Announcer>,
    state: Mutex<WatchState>,
    running: AtomicBool,
    status: RwLock<PollStatus>,
    record_undelivered: bool,
}

impl Poller {
    pub fn new(
        fetcher: Fetcher,
        store: HistoryStore,
        history: History,
        announcer: Arc<dyn Announcer>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            fetcher,
            store,
            announcer,
            state: Mutex::new(WatchState {
                history,
                gate: NotificationGate::new(settings.cooldown),
            }),
            running: AtomicBool::new(false),
            status: RwLock::new(PollStatus::default()),
            record_undelivered: settings.record_undelivered,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> PollStatus {
        self.status.read().await.clone()
    }

    /// Most recent upload in history.
    pub async fn latest_upload(&self) -> Option<UploadRecord> {
        self.state.lock().await.history.latest().cloned()
    }

    pub async fn history(&self) -> History {
        self.state.lock().await.history.clone()
    }

    /// Run one cycle unless one is already in flight.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            log::info!("Previous upload check still running, skipping this cycle");
            return CycleOutcome::Skipped;
        };

        let outcome = self.check_uploads().await;

        let mut status = self.status.write().await;
        status.last_poll = Some(Utc::now());
        status.total_cycles += 1;
        if let CycleOutcome::Processed { notified, .. } = &outcome {
            status.total_notified += *notified as u64;
        }
        status.last_outcome = Some(outcome.clone());

        outcome
    }

    async fn check_uploads(&self) -> CycleOutcome {
        let response = match self.fetcher.fetch().await {
            Ok(response) => response,
            Err(e) => {
                log::error!("Upload check failed: {}", e);
                return CycleOutcome::FetchFailed {
                    reason: e.to_string(),
                };
            }
        };

        if response.items.is_empty() {
            log::info!("Empty response from YouTube API, no new videos");
            return CycleOutcome::NoItems;
        }

        // Only the cycle holding the running flag mutates the state, so it
        // works on copies and writes them back at the end. Readers such as
        // `/status` never wait on a send.
        let (mut history, mut gate) = {
            let state = self.state.lock().await;
            (state.history.clone(), state.gate.clone())
        };

        let fresh = detect_new(&response.uploads(), &history);

        if fresh.is_empty() {
            log::info!("No new videos found");
            return CycleOutcome::NothingNew;
        }

        log::info!("Found {} new videos", fresh.len());

        let mut notified = 0;
        let mut recorded = 0;
        let mut undelivered = 0;

        for upload in fresh {
            if gate.should_notify(&upload.id) {
                match self.announcer.announce(&upload).await {
                    Ok(()) => {
                        gate.mark_notified(&upload.id);
                        notified += 1;
                    }
                    Err(e) => {
                        match &e {
                            AnnounceError::DestinationUnavailable(_) => {
                                log::error!("Discarding notification for {}: {}", upload.id, e)
                            }
                            AnnounceError::Send(_) => {
                                log::error!("Failed to notify about {}: {}", upload.id, e)
                            }
                        }
                        undelivered += 1;

                        if !self.record_undelivered {
                            // Later uploads would hide this one behind the
                            // timestamp filter, so retry all of them next time.
                            log::warn!("Leaving {} and later uploads for the next cycle", upload.id);
                            break;
                        }
                    }
                }
            } else {
                log::debug!("Already notified about {}, recording only", upload.id);
            }

            history.push(upload);
            recorded += 1;
        }

        history.truncate();

        {
            let mut state = self.state.lock().await;
            state.history = history.clone();
            state.gate = gate;
        }

        let persisted = if recorded > 0 {
            match self.store.save(&history).await {
                Ok(()) => true,
                Err(e) => {
                    log::error!("Failed to persist upload history: {:#}", e);
                    false
                }
            }
        } else {
            true
        };

        CycleOutcome::Processed {
            notified,
            recorded,
            undelivered,
            persisted,
        }
    }
}
