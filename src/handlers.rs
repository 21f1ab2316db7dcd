/// Command handlers module
///
/// Replies to the bot commands with the watcher's state.
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;

use crate::history::UploadRecord;
use crate::poller::{CycleOutcome, PollStatus, Poller};
use crate::youtube::watch_url;

/// Describe the poll status for chat users
pub fn format_status(status: &PollStatus, running: bool) -> String {
    let mut text = String::from("📡 Upload watcher status\n\n");

    match status.last_poll {
        Some(when) => text.push_str(&format!(
            "Last check: {}\n",
            when.format("%Y-%m-%d %H:%M:%S UTC")
        )),
        None => text.push_str("Last check: not yet run\n"),
    }

    if let Some(outcome) = &status.last_outcome {
        text.push_str(&format!("Last result: {}\n", describe_outcome(outcome)));
    }

    text.push_str(&format!(
        "Checks run: {}\nVideos announced: {}\n",
        status.total_cycles, status.total_notified
    ));

    if running {
        text.push_str("A check is running right now.\n");
    }

    text
}

fn describe_outcome(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::Skipped => "skipped (previous check still running)".to_string(),
        CycleOutcome::FetchFailed { reason } => format!("fetch failed ({})", reason),
        CycleOutcome::NoItems => "no videos returned".to_string(),
        CycleOutcome::NothingNew => "no new videos".to_string(),
        CycleOutcome::Processed {
            notified,
            recorded,
            undelivered,
            persisted,
        } => {
            let mut line = format!("{} new, {} announced", recorded, notified);
            if *undelivered > 0 {
                line.push_str(&format!(", {} not delivered", undelivered));
            }
            if !persisted {
                line.push_str(", history not saved");
            }
            line
        }
    }
}

/// Describe the most recent recorded upload
pub fn format_latest(latest: Option<&UploadRecord>) -> String {
    match latest {
        Some(upload) => format!(
            "🎥 Latest video ({}):\n{}",
            upload.published_at.format("%B %d, %Y"),
            watch_url(&upload.id)
        ),
        None => "No videos recorded yet.".to_string(),
    }
}

/// Handle the /start command
pub async fn handle_start_command(bot: Bot, msg: Message) -> Result<()> {
    let welcome_message = "👋 Hello! I announce new uploads from the watched YouTube channel.\n\n\
        Use /latest to see the most recent video and /status to see when I last checked.";

    bot.send_message(msg.chat.id, welcome_message).await?;

    Ok(())
}

/// Handle the /help command
pub async fn handle_help_command(bot: Bot, msg: Message) -> Result<()> {
    let help_message = "ℹ️ Upload watcher help\n\n\
        Commands:\n\
        /start - Welcome message\n\
        /help - Show this help message\n\
        /status - When the channel was last checked\n\
        /latest - Link to the most recent video";

    bot.send_message(msg.chat.id, help_message).await?;

    Ok(())
}

/// Handle the /status command
pub async fn handle_status_command(bot: Bot, msg: Message, poller: Arc<Poller>) -> Result<()> {
    let status = poller.status().await;

    bot.send_message(msg.chat.id, format_status(&status, poller.is_running()))
        .await?;

    Ok(())
}

/// Handle the /latest command
pub async fn handle_latest_command(bot: Bot, msg: Message, poller: Arc<Poller>) -> Result<()> {
    let latest = poller.latest_upload().await;

    bot.send_message(msg.chat.id, format_latest(latest.as_ref()))
        .await?;

    Ok(())
}
