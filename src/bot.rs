/// Telegram bot module
///
/// This module sets up and runs the Telegram bot using the teloxide framework.
/// It connects all the pieces: configuration, the upload poller, the
/// schedulers, the status server and the command handlers.
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use teloxide::{prelude::*, types::Me, utils::command::BotCommands};
use tokio::time::sleep;

use crate::announcer::TelegramAnnouncer;
use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::handlers::{
    handle_help_command, handle_latest_command, handle_start_command, handle_status_command,
};
use crate::history::{History, HistoryStore};
use crate::http_server::{start_server, AppState};
use crate::keys::KeyRotator;
use crate::poller::{Poller, PollerSettings};
use crate::scheduler::{start_poll_scheduler, start_status_scheduler};
use crate::youtube::ReqwestTransport;

/// Bot commands that users can use
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "Start the bot and see welcome message")]
    Start,
    #[command(description = "Show help information")]
    Help,
    #[command(description = "Show when the channel was last checked")]
    Status,
    #[command(description = "Link to the most recent video")]
    Latest,
}

/// Build the Telegram client used for both commands and announcements
fn build_bot(config: &Config) -> Result<Bot> {
    log::info!("Creating HTTP client with extended timeouts (60s request, 30s connect)...");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .context("Failed to create HTTP client")?;

    Ok(Bot::with_client(&config.telegram_token, client))
}

/// Wire up the poller for the configured channel
async fn build_poller(config: &Config, bot: Bot) -> Result<Arc<Poller>> {
    let keys = KeyRotator::new(config.youtube_api_keys.clone())?;
    let transport = Arc::new(ReqwestTransport::new()?);
    let fetcher = Fetcher::new(transport, keys, config.search_query());

    let store = HistoryStore::new(&config.history_file);
    let history = match store.load().await {
        Ok(history) => history,
        Err(e) => {
            log::error!("Could not load upload history, starting empty: {:#}", e);
            History::default()
        }
    };

    let announcer = Arc::new(TelegramAnnouncer::new(
        bot,
        ChatId(config.telegram_chat_id),
        config.channel_display_name.clone(),
    ));

    let settings = PollerSettings {
        record_undelivered: config.record_undelivered,
        cooldown: chrono::Duration::hours(config.notify_cooldown_hours),
    };

    Ok(Arc::new(Poller::new(
        fetcher, store, history, announcer, settings,
    )))
}

/// Re-register the command menu, the bot's visible status
pub async fn refresh_status(bot: &Bot) {
    match bot.set_my_commands(Command::bot_commands()).await {
        Ok(_) => log::info!("Bot status refreshed"),
        Err(e) => log::warn!("Failed to refresh bot status: {}", e),
    }
}

/// Initialize and run the bot
pub async fn run_bot(config: Config) -> Result<()> {
    log::info!("Initializing bot...");

    let bot = build_bot(&config)?;

    // Get bot info with retry logic for network issues
    let me = retry_get_me(&bot)
        .await
        .context("Failed to connect to Telegram API after multiple retries")?;
    log::info!("Logged in as @{}", me.username());

    let poller = build_poller(&config, bot.clone()).await?;

    refresh_status(&bot).await;

    tokio::spawn(start_poll_scheduler(
        poller.clone(),
        Duration::from_secs(config.poll_interval_secs),
    ));
    tokio::spawn(start_status_scheduler(
        bot.clone(),
        Duration::from_secs(config.status_refresh_hours.saturating_mul(3600)),
    ));

    if let Some(port) = config.http_port {
        let state = AppState {
            config: config.clone(),
            poller: poller.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = start_server(state, port).await {
                log::error!("HTTP server stopped: {:#}", e);
            }
        });
    }

    let handler = Update::filter_message()
        .filter_command::<Command>()
        .endpoint(
            |bot: Bot, msg: Message, cmd: Command, poller: Arc<Poller>| async move {
                match cmd {
                    Command::Start => handle_start_command(bot, msg).await,
                    Command::Help => handle_help_command(bot, msg).await,
                    Command::Status => handle_status_command(bot, msg, poller).await,
                    Command::Latest => handle_latest_command(bot, msg, poller).await,
                }
            },
        );

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![poller, me])
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build();

    log::info!("Bot is running. Press Ctrl+C to stop.");

    dispatcher.dispatch().await;

    Ok(())
}

/// Retry getting bot info with exponential backoff
async fn retry_get_me(bot: &Bot) -> Result<Me> {
    let max_retries = 5;
    let mut delay = Duration::from_secs(2);

    log::info!("Attempting to connect to Telegram API...");

    for attempt in 1..=max_retries {
        match bot.get_me().await {
            Ok(me) => {
                log::info!("Successfully connected to Telegram API on attempt {}", attempt);
                return Ok(me);
            }
            Err(e) if attempt == max_retries => {
                log::error!(
                    "Failed to connect to Telegram API after {} attempts.",
                    max_retries
                );
                anyhow::bail!(
                    "Failed to connect to Telegram API after {} attempts: {}",
                    max_retries,
                    e
                );
            }
            Err(e) => {
                log::warn!(
                    "Failed to connect to Telegram API (attempt {}/{}): {}\n\
                    Retrying in {:?}...",
                    attempt,
                    max_retries,
                    e,
                    delay
                );

                sleep(delay).await;
                delay *= 2; // Exponential backoff
            }
        }
    }

    unreachable!()
}
