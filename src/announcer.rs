/// Upload announcements
///
/// Formats the "new video" message and posts it to the configured chat.
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::{ApiError, RequestError};
use thiserror::Error;

use crate::history::UploadRecord;
use crate::youtube::watch_url;

#[derive(Debug, Error)]
pub enum AnnounceError {
    /// The destination chat cannot be reached (deleted, bot removed, ...).
    #[error("destination chat unavailable: {0}")]
    DestinationUnavailable(String),
    #[error("failed to send announcement: {0}")]
    Send(String),
}

/// Sends one announcement per upload.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, upload: &UploadRecord) -> Result<(), AnnounceError>;
}

pub fn format_announcement(channel_name: &str, video_id: &str) -> String {
    format!(
        "Hey everyone, {} just posted a new video! 🎥 Check it out:\n{}",
        channel_name,
        watch_url(video_id)
    )
}

/// Posts announcements to a Telegram chat.
#[derive(Clone)]
pub struct TelegramAnnouncer {
    bot: Bot,
    chat_id: ChatId,
    channel_name: String,
}

impl TelegramAnnouncer {
    pub fn new(bot: Bot, chat_id: ChatId, channel_name: impl Into<String>) -> Self {
        Self {
            bot,
            chat_id,
            channel_name: channel_name.into(),
        }
    }
}

#[async_trait]
impl Announcer for TelegramAnnouncer {
    async fn announce(&self, upload: &UploadRecord) -> Result<(), AnnounceError> {
        let text = format_announcement(&self.channel_name, &upload.id);

        match self.bot.send_message(self.chat_id, text).await {
            Ok(_) => {
                log::info!("Notified about video: {}", upload.id);
                Ok(())
            }
            Err(RequestError::Api(e @ (ApiError::ChatNotFound | ApiError::BotKicked))) => {
                Err(AnnounceError::DestinationUnavailable(format!(
                    "chat {}: {}",
                    self.chat_id.0, e
                )))
            }
            Err(e) => Err(AnnounceError::Send(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode};
    use axum::Router;

    #[test]
    fn announcement_links_to_the_video() {
        let text = format_announcement("AceOfCreation", "abc123");

        assert!(text.starts_with("Hey everyone, AceOfCreation just posted a new video!"));
        assert!(text.ends_with("\nhttps://www.youtube.com/watch?v=abc123"));
    }

    /// Serve `body` with `status` for every request, standing in for the
    /// Telegram Bot API.
    async fn stub_telegram(status: StatusCode, body: &'static str) -> reqwest::Url {
        let app = Router::new().fallback(move || async move {
            (status, [(header::CONTENT_TYPE, "application/json")], body)
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        reqwest::Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    async fn announce_via(status: StatusCode, body: &'static str) -> Result<(), AnnounceError> {
        let bot = Bot::new("123:test-token").set_api_url(stub_telegram(status, body).await);
        let announcer = TelegramAnnouncer::new(bot, ChatId(-100123), "AceOfCreation");
        let upload = UploadRecord::new("abc123", "2024-05-01T08:00:00Z".parse().unwrap());

        announcer.announce(&upload).await
    }

    #[tokio::test]
    async fn missing_chat_is_destination_unavailable() {
        let result = announce_via(
            StatusCode::BAD_REQUEST,
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .await;

        match result {
            Err(AnnounceError::DestinationUnavailable(reason)) => {
                assert!(reason.contains("-100123"))
            }
            other => panic!("expected DestinationUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn removed_bot_is_destination_unavailable() {
        let result = announce_via(
            StatusCode::FORBIDDEN,
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was kicked from the group chat"}"#,
        )
        .await;

        assert!(matches!(result, Err(AnnounceError::DestinationUnavailable(_))));
    }

    #[tokio::test]
    async fn other_api_errors_are_send_failures() {
        let result = announce_via(
            StatusCode::BAD_REQUEST,
            r#"{"ok":false,"error_code":400,"description":"Bad Request: message text is empty"}"#,
        )
        .await;

        assert!(matches!(result, Err(AnnounceError::Send(_))));
    }

    #[tokio::test]
    async fn server_error_is_a_send_failure() {
        let result = announce_via(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").await;

        assert!(matches!(result, Err(AnnounceError::Send(_))));
    }
}
