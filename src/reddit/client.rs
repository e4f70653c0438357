use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::models::ThreadDocument;
use super::strip_type_prefix;
use crate::config::Config;
use crate::constants::THREAD_COMMENT_LIMIT;

/// Failure fetching a thread from Reddit. All variants are worth retrying later.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },
    #[error("failed to decode thread from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of full comment threads.
#[async_trait]
pub trait ThreadSource: Send + Sync {
    /// Fetch the thread containing `thread_id` (a link id, with or without `t3_`).
    async fn fetch_thread(&self, thread_id: &str) -> Result<ThreadDocument, FetchError>;
}

/// Reddit JSON API client.
#[derive(Debug, Clone)]
pub struct RedditClient {
    client: Client,
    base_url: String,
}

impl RedditClient {
    /// Create a client for `base_url` (normally `https://www.reddit.com`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from application configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Self::new(
            &config.reddit_base_url,
            &config.reddit_user_agent,
            config.http_timeout,
        )
    }

    /// JSON URL for a thread.
    #[must_use]
    pub fn thread_url(&self, thread_id: &str) -> String {
        format!(
            "{}/comments/{}.json?limit={THREAD_COMMENT_LIMIT}",
            self.base_url,
            strip_type_prefix(thread_id)
        )
    }
}

#[async_trait]
impl ThreadSource for RedditClient {
    async fn fetch_thread(&self, thread_id: &str) -> Result<ThreadDocument, FetchError> {
        let url = self.thread_url(thread_id);
        debug!(url = %url, "Fetching Reddit thread");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;

        ThreadDocument::from_slice(&body).map_err(|source| FetchError::Decode { url, source })
    }
}
