//! Client for the developer tracker's post API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::post::Post;

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The API already has a post with this URL.
    #[error("{url} returned {status}: post already exists")]
    Duplicate { url: String, status: u16 },
    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("API base URL {0} cannot take a path")]
    BaseUrl(String),
}

impl SubmitError {
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// HTTP status of the response, if one was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Duplicate { status, .. } | Self::Status { status, .. } => Some(*status),
            Self::Request { .. } | Self::BaseUrl(_) => None,
        }
    }
}

/// Where normalized posts are persisted.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Store a post for `game`.
    async fn submit(&self, game: &str, post: &Post) -> Result<(), SubmitError>;

    /// URLs of the most recent posts stored for `game`.
    async fn recent_post_urls(&self, game: &str) -> Result<Vec<String>, SubmitError>;
}

/// HTTP client for the tracker API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct StoredPost {
    #[serde(default)]
    url: Option<String>,
}

impl ApiClient {
    /// Create a client for `base_url` authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("devtracker-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Create a client from application configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Self::new(&config.api_base_url, &config.api_token, config.http_timeout)
    }

    /// `{base}/{game}/posts`, with `game` encoded as a single path segment.
    fn posts_url(&self, game: &str) -> Result<Url, SubmitError> {
        let invalid = || SubmitError::BaseUrl(self.base_url.clone());
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend([game, "posts"]);
        Ok(url)
    }
}

#[async_trait]
impl PostStore for ApiClient {
    async fn submit(&self, game: &str, post: &Post) -> Result<(), SubmitError> {
        let url = self.posts_url(game)?;
        debug!(url = %url, post_url = %post.url, "Submitting post");

        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.token)
            .json(&post.payload())
            .send()
            .await
            .map_err(|source| SubmitError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::CONFLICT {
            Err(SubmitError::Duplicate {
                url: url.into(),
                status: status.as_u16(),
            })
        } else {
            Err(SubmitError::Status {
                url: url.into(),
                status: status.as_u16(),
            })
        }
    }

    async fn recent_post_urls(&self, game: &str) -> Result<Vec<String>, SubmitError> {
        let url = self.posts_url(game)?;

        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| SubmitError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::Status {
                url: url.into(),
                status: status.as_u16(),
            });
        }

        let posts: Vec<StoredPost> = response
            .json()
            .await
            .map_err(|source| SubmitError::Request {
                url: url.into(),
                source,
            })?;

        Ok(posts.into_iter().filter_map(|p| p.url).collect())
    }
}
