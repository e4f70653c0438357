use std::fmt;

use serde::{Deserialize, Serialize};

/// Tracker account a post belongs to.
///
/// Producers send either a numeric database id or a string; whichever arrives is sent
/// back to the write API unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountId {
    Number(i64),
    Text(String),
}

impl AccountId {
    /// True for ids that cannot identify an account (`0` or an empty string).
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Number(n) => *n == 0,
            Self::Text(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A developer post, normalized and ready for the write API.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub account_id: AccountId,
    /// Subreddit the post was made in.
    pub section: String,
    /// Creation time, seconds since the epoch.
    pub timestamp: i64,
    pub topic_title: String,
    pub topic_url: String,
    /// Link to this specific post. Unique per post; the write API deduplicates on it.
    pub url: String,
    /// Rendered HTML content.
    pub text: String,
}

/// Body of `POST /{game}/posts`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPayload<'a> {
    pub account_id: &'a AccountId,
    pub content: &'a str,
    pub section: &'a str,
    pub timestamp: i64,
    pub topic: &'a str,
    pub topic_url: &'a str,
    pub url: &'a str,
}

impl Post {
    #[must_use]
    pub fn payload(&self) -> PostPayload<'_> {
        PostPayload {
            account_id: &self.account_id,
            content: &self.text,
            section: &self.section,
            timestamp: self.timestamp,
            topic: &self.topic_title,
            topic_url: &self.topic_url,
            url: &self.url,
        }
    }
}
