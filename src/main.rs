/// Upload Watch Bot
/// 
/// A Telegram bot that watches a YouTube channel and announces every new
/// upload in a chat.
/// 
/// The bot:
/// - Checks the channel's latest uploads every few minutes
/// - Rotates through several API keys when one is exhausted
/// - Announces each new video once, oldest first
/// - Remembers the last few videos across restarts

use anyhow::Result;
use upload_watch_bot::{bot, config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    pretty_env_logger::init();
    
    log::info!("Starting Upload Watch Bot...");

    // Load configuration from environment
    let cfg = config::Config::from_env()?;
    
    // Probe the API keys
    cfg.validate().await?;

    // Run the bot
    bot::run_bot(cfg).await?;

    Ok(())
}
