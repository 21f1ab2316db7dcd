/// Recent upload fetching
///
/// Fetches the channel's latest uploads, rotating to the next API key
/// whenever a key errors out. One pass over the pool is the retry budget.
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::keys::{mask_key, KeyRotator};
use crate::youtube::{SearchQuery, SearchResponse, SearchTransport};

/// Failure of a single attempt with a single key.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("request failed: {0:#}")]
    Transport(anyhow::Error),
    #[error("API error: {0}")]
    Api(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("all {attempts} API keys failed (last error: {last_error})")]
    Exhausted {
        attempts: usize,
        last_error: AttemptError,
    },
}

/// Run `attempt` with successive keys from `keys`, at most once per key in
/// the pool, returning the first success.
pub async fn retry_with_rotation<T, F, Fut>(
    keys: &KeyRotator,
    mut attempt: F,
) -> Result<T, FetchError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let attempts = keys.len();
    let mut last_error = None;

    for n in 1..=attempts {
        let key = keys.next_key().to_string();
        let masked = mask_key(&key);

        match attempt(key).await {
            Ok(value) => {
                if n > 1 {
                    log::info!("Request succeeded with API key {} on attempt {}", masked, n);
                }
                return Ok(value);
            }
            Err(e) => {
                log::warn!("Attempt {}/{} with API key {} failed: {}", n, attempts, masked, e);
                last_error = Some(e);
            }
        }
    }

    log::error!("All API keys failed");
    Err(FetchError::Exhausted {
        attempts,
        last_error: last_error.unwrap_or_else(|| AttemptError::Api("no attempts made".into())),
    })
}

/// Fetches recent uploads for one channel.
pub struct Fetcher {
    transport: Arc<dyn SearchTransport>,
    keys: KeyRotator,
    query: SearchQuery,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn SearchTransport>, keys: KeyRotator, query: SearchQuery) -> Self {
        Self {
            transport,
            keys,
            query,
        }
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    /// Fetch the latest search page. A payload with no items is a success.
    pub async fn fetch(&self) -> Result<SearchResponse, FetchError> {
        retry_with_rotation(&self.keys, |key| async move {
            let response = self
                .transport
                .search(&self.query, &key)
                .await
                .map_err(AttemptError::Transport)?;

            match response.error {
                Some(error) => Err(AttemptError::Api(error.message)),
                None => Ok(response),
            }
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Transport that replays one scripted response per call and records
    /// the keys it was called with.
    pub(crate) struct ScriptedTransport {
        script: Mutex<Vec<Result<SearchResponse>>>,
        pub(crate) keys_used: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(mut script: Vec<Result<SearchResponse>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                keys_used: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.keys_used.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SearchTransport for ScriptedTransport {
        async fn search(&self, _query: &SearchQuery, api_key: &str) -> Result<SearchResponse> {
            self.keys_used.lock().unwrap().push(api_key.to_string());
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }
    }

    pub(crate) fn api_error(message: &str) -> Result<SearchResponse> {
        Ok(serde_json::from_value(serde_json::json!({
            "error": { "code": 403, "message": message }
        }))?)
    }

    pub(crate) fn items(videos: &[(&str, &str)]) -> Result<SearchResponse> {
        let items: Vec<_> = videos
            .iter()
            .map(|(id, published)| {
                serde_json::json!({
                    "id": { "kind": "youtube#video", "videoId": id },
                    "snippet": { "publishedAt": published }
                })
            })
            .collect();
        Ok(serde_json::from_value(serde_json::json!({ "items": items }))?)
    }

    pub(crate) fn rotator(n: usize) -> KeyRotator {
        KeyRotator::new((1..=n).map(|i| format!("key-{}", i)).collect()).unwrap()
    }

    fn fetcher(transport: Arc<ScriptedTransport>, keys: usize) -> Fetcher {
        Fetcher::new(
            transport,
            rotator(keys),
            SearchQuery::new("http://localhost/search", "UC123", 5),
        )
    }

    #[tokio::test]
    async fn last_key_succeeds_after_failures() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            api_error("quotaExceeded"),
            Err(anyhow::anyhow!("connection reset")),
            items(&[("v1", "2024-01-01T00:00:00Z")]),
        ]));

        let response = fetcher(transport.clone(), 3).fetch().await.unwrap();

        assert_eq!(transport.calls(), 3);
        assert_eq!(response.uploads()[0].id, "v1");
        assert_eq!(
            *transport.keys_used.lock().unwrap(),
            vec!["key-1", "key-2", "key-3"]
        );
    }

    #[tokio::test]
    async fn all_keys_failing_is_terminal_after_one_pass() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            api_error("quota"),
            api_error("quota"),
            Err(anyhow::anyhow!("timeout")),
            items(&[("never", "2024-01-01T00:00:00Z")]),
        ]));

        let err = fetcher(transport.clone(), 3).fetch().await.unwrap_err();

        assert_eq!(transport.calls(), 3);
        let FetchError::Exhausted {
            attempts,
            last_error,
        } = err;
        assert_eq!(attempts, 3);
        assert!(matches!(last_error, AttemptError::Transport(_)));
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            items(&[("v1", "2024-01-01T00:00:00Z")]),
            api_error("unused"),
        ]));

        fetcher(transport.clone(), 4).fetch().await.unwrap();

        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn empty_item_list_is_not_a_failure() {
        let transport = Arc::new(ScriptedTransport::new(vec![items(&[])]));

        let response = fetcher(transport.clone(), 2).fetch().await.unwrap();

        assert!(response.items.is_empty());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn rotation_continues_across_fetches() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            items(&[]),
            api_error("quota"),
            items(&[]),
        ]));
        let fetcher = fetcher(transport.clone(), 3);

        fetcher.fetch().await.unwrap();
        fetcher.fetch().await.unwrap();

        assert_eq!(
            *transport.keys_used.lock().unwrap(),
            vec!["key-1", "key-2", "key-3"]
        );
    }
}
