/// Configuration module for managing environment variables and API keys
///
/// This module loads and validates all required configuration values from
/// environment variables (typically from a .env file).
use anyhow::{bail, Context, Result};
use std::env;
use std::sync::Arc;

use crate::youtube::{probe_keys, ReqwestTransport, SearchQuery, DEFAULT_SEARCH_URL};

/// Highest `YOUTUBE_API_KEY_<n>` slot that is read.
pub const MAX_KEY_SLOTS: usize = 10;

/// Upper bound for hour-valued settings (one year).
pub const MAX_COOLDOWN_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token from BotFather
    pub telegram_token: String,

    /// Chat that receives upload announcements
    pub telegram_chat_id: i64,

    /// YouTube channel to watch
    pub youtube_channel_id: String,

    /// YouTube Data API keys, rotated on every request
    pub youtube_api_keys: Vec<String>,

    /// Channel name used in announcements
    pub channel_display_name: String,

    /// Search endpoint (overridable for testing against a proxy)
    pub youtube_api_url: String,

    /// Number of recent uploads requested per check
    pub max_results: u32,

    /// Seconds between upload checks
    pub poll_interval_secs: u64,

    /// Hours between status refreshes
    pub status_refresh_hours: u64,

    /// Where the upload history is persisted
    pub history_file: String,

    /// Hours before the same video may be announced again
    pub notify_cooldown_hours: i64,

    /// Record uploads whose announcement failed instead of retrying them
    pub record_undelivered: bool,

    /// Port for the status HTTP server; disabled when unset
    pub http_port: Option<u16>,

    /// Bearer secret required by the manual poll endpoint (optional)
    pub poll_api_secret: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if any required environment variable is missing
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> Result<String> {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set", name))
        };

        let telegram_chat_id = required("TELEGRAM_CHAT_ID")?
            .trim()
            .parse()
            .context("TELEGRAM_CHAT_ID must be a numeric chat id")?;

        let youtube_api_keys: Vec<String> = (1..=MAX_KEY_SLOTS)
            .filter_map(|slot| lookup(&format!("YOUTUBE_API_KEY_{}", slot)))
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();

        if youtube_api_keys.is_empty() {
            bail!(
                "At least one of YOUTUBE_API_KEY_1..YOUTUBE_API_KEY_{} must be set",
                MAX_KEY_SLOTS
            );
        }

        Ok(Config {
            telegram_token: required("TELEGRAM_BOT_TOKEN")?,

            telegram_chat_id,

            youtube_channel_id: required("YOUTUBE_CHANNEL_ID")?,

            youtube_api_keys,

            channel_display_name: lookup("CHANNEL_DISPLAY_NAME")
                .unwrap_or_else(|| "The channel".to_string()),

            youtube_api_url: lookup("YOUTUBE_API_URL")
                .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),

            max_results: lookup("MAX_RESULTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),

            poll_interval_secs: lookup("POLL_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(180),

            status_refresh_hours: lookup("STATUS_REFRESH_HOURS")
                .and_then(|v| v.parse().ok())
                .filter(|hours| (1..=MAX_COOLDOWN_HOURS as u64).contains(hours))
                .unwrap_or(24),

            history_file: lookup("HISTORY_FILE").unwrap_or_else(|| "videos.json".to_string()),

            notify_cooldown_hours: lookup("NOTIFY_COOLDOWN_HOURS")
                .and_then(|v| v.parse().ok())
                .filter(|hours| (1..=MAX_COOLDOWN_HOURS).contains(hours))
                .unwrap_or(crate::gate::DEFAULT_COOLDOWN_HOURS),

            record_undelivered: lookup("RECORD_UNDELIVERED")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(true),

            http_port: lookup("HTTP_PORT").and_then(|v| v.parse().ok()),

            poll_api_secret: lookup("POLL_API_SECRET").filter(|v| !v.is_empty()),
        })
    }

    /// Search parameters for the watched channel.
    pub fn search_query(&self) -> SearchQuery {
        SearchQuery::new(
            self.youtube_api_url.clone(),
            self.youtube_channel_id.clone(),
            self.max_results,
        )
    }

    /// Check that the API keys are usable
    ///
    /// Failing keys are only logged; rotation skips past them at runtime.
    pub async fn validate(&self) -> Result<()> {
        log::info!("Validating configuration...");

        let transport = Arc::new(ReqwestTransport::new()?);
        let report = probe_keys(transport, &self.search_query(), &self.youtube_api_keys).await;

        log::info!(
            "Configuration validated: {} of {} API keys working",
            report.working,
            self.youtube_api_keys.len()
        );
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
