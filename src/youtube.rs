/// YouTube Data API search client
///
/// Payload types for the `search` endpoint, the transport seam used by the
/// fetcher, and the startup key probe.
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::history::UploadRecord;
use crate::keys::mask_key;

pub const DEFAULT_SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
pub const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

const VIDEO_KIND: &str = "youtube#video";

/// Parameters of a channel upload search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub endpoint: String,
    pub channel_id: String,
    pub max_results: u32,
}

impl SearchQuery {
    pub fn new(endpoint: impl Into<String>, channel_id: impl Into<String>, max_results: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            channel_id: channel_id.into(),
            max_results,
        }
    }

    /// Query string pairs, without the key.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("channelId", self.channel_id.clone()),
            ("part", "snippet,id".to_string()),
            ("order", "date".to_string()),
            ("maxResults", self.max_results.to_string()),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<SearchItem>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchItem {
    pub id: ItemId,
    pub snippet: Option<Snippet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemId {
    pub kind: String,
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Snippet {
    #[serde(rename = "publishedAt")]
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
}

impl SearchResponse {
    /// Video uploads in the payload; channels, playlists and malformed items
    /// are skipped.
    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.items
            .iter()
            .filter(|item| item.id.kind == VIDEO_KIND)
            .filter_map(|item| {
                let id = item.id.video_id.as_ref()?;
                let snippet = item.snippet.as_ref()?;
                Some(UploadRecord::new(id.clone(), snippet.published_at))
            })
            .collect()
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("{}{}", WATCH_URL, video_id)
}

/// Issues one search request with one key.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn search(&self, query: &SearchQuery, api_key: &str) -> Result<SearchResponse>;
}

/// HTTP transport backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchTransport for ReqwestTransport {
    async fn search(&self, query: &SearchQuery, api_key: &str) -> Result<SearchResponse> {
        // Error bodies come back with 4xx statuses, so the status is not
        // checked here; the caller inspects the `error` field instead.
        let response = self
            .client
            .get(&query.endpoint)
            .query(&query.params())
            .query(&[("key", api_key)])
            .send()
            .await
            .context("Failed to reach YouTube API")?;

        let status = response.status();
        let payload: SearchResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse YouTube API response ({})", status))?;

        Ok(payload)
    }
}

/// Outcome of probing the key pool at startup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub working: usize,
    pub failing: usize,
}

/// Try every key once and log which ones work. Never fails.
pub async fn probe_keys(
    transport: Arc<dyn SearchTransport>,
    query: &SearchQuery,
    keys: &[String],
) -> ProbeReport {
    log::info!("Testing {} API keys...", keys.len());

    let probe = SearchQuery {
        max_results: 1,
        ..query.clone()
    };
    let mut report = ProbeReport::default();

    for key in keys {
        match transport.search(&probe, key).await {
            Ok(SearchResponse {
                error: Some(error), ..
            }) => {
                log::warn!("API key test failed ({}): {}", mask_key(key), error.message);
                report.failing += 1;
            }
            Ok(_) => {
                log::info!("API key working: {}", mask_key(key));
                report.working += 1;
            }
            Err(e) => {
                log::warn!("Error testing API key ({}): {:#}", mask_key(key), e);
                report.failing += 1;
            }
        }
    }

    if report.working == 0 {
        log::warn!("No working API keys; upload checks will fail until one recovers");
    }

    report
}
