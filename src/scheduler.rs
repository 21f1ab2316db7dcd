/// Scheduler Module
///
/// Periodic triggers: the frequent upload check and the daily status refresh.
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use teloxide::Bot;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::bot::refresh_status;
use crate::poller::{CycleOutcome, Poller};

/// Run an upload check now and then every `every`
///
/// A tick that fires while a check is still running is skipped by the
/// poller itself.
pub async fn start_poll_scheduler(poller: Arc<Poller>, every: Duration) {
    let mut interval = time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    log::info!(
        "Starting upload check scheduler (interval: {} seconds)",
        every.as_secs()
    );

    loop {
        interval.tick().await;

        log::debug!("Scheduled upload check triggered");

        match poller.run_cycle().await {
            CycleOutcome::Processed {
                notified,
                recorded,
                ..
            } => {
                log::info!(
                    "Upload check complete: {} notified, {} recorded",
                    notified,
                    recorded
                );
            }
            outcome => log::debug!("Upload check finished: {:?}", outcome),
        }
    }
}

/// Refresh the bot status at the next UTC midnight and every `every` after
pub async fn start_status_scheduler(bot: Bot, every: Duration) {
    let first = duration_until_next_midnight(Utc::now());
    let mut interval = time::interval_at(Instant::now() + first, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log::info!(
        "Starting status refresh scheduler (first refresh in {} minutes, then every {} hours)",
        first.as_secs() / 60,
        every.as_secs() / 3600
    );

    loop {
        interval.tick().await;
        refresh_status(&bot).await;
    }
}

/// Time left until the next 00:00 UTC.
pub fn duration_until_next_midnight(now: DateTime<Utc>) -> Duration {
    let next = (now.date_naive() + ChronoDuration::days(1))
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc());

    next.and_then(|midnight| (midnight - now).to_std().ok())
        .unwrap_or(Duration::from_secs(24 * 3600))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_to_next_midnight() {
        let now: DateTime<Utc> = "2024-03-10T22:30:00Z".parse().unwrap();
        assert_eq!(
            duration_until_next_midnight(now),
            Duration::from_secs(90 * 60)
        );
    }

    #[test]
    fn exactly_midnight_waits_a_full_day() {
        let now: DateTime<Utc> = "2024-03-10T00:00:00Z".parse().unwrap();
        assert_eq!(
            duration_until_next_midnight(now),
            Duration::from_secs(24 * 3600)
        );
    }

    #[test]
    fn crosses_month_boundaries() {
        let now: DateTime<Utc> = "2024-02-29T23:59:59Z".parse().unwrap();
        assert_eq!(duration_until_next_midnight(now), Duration::from_secs(1));
    }
}
