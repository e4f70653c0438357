use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::post::AccountId;
use crate::reddit::Thing;

/// Inbound job shape, as sent by producers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobData {
    #[serde(default)]
    pub account_id: Option<AccountId>,
    pub game: String,
    pub post: Thing,
}

impl JobData {
    /// Key identifying the same item queued twice for the same game.
    #[must_use]
    pub fn dedupe_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.game.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.post.kind.as_bytes());
        hasher.update(b"\n");
        match self.post.fullname() {
            Some(name) => hasher.update(name.as_bytes()),
            // Nothing identifies the item; fall back to its full content.
            None => hasher.update(serde_json::to_string(&self.post).unwrap_or_default()),
        }
        hex::encode(hasher.finalize())
    }
}

/// A job as stored in the queue table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRecord {
    pub id: i64,
    pub game: String,
    pub payload: String,
    pub dedupe_key: String,
    pub status: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub next_run_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRecord {
    /// Decode the stored payload into a [`Job`].
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a valid job.
    pub fn decode(&self) -> Result<Job, serde_json::Error> {
        let data: JobData = serde_json::from_str(&self.payload)?;
        Ok(Job {
            id: self.id,
            account_id: data.account_id,
            game: data.game,
            post: data.post,
            attempt: u32::try_from(self.attempts).unwrap_or(u32::MAX),
        })
    }

    #[must_use]
    pub fn job_status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }
}

/// One unit of ingestion work: a single Reddit item for a single game.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub account_id: Option<AccountId>,
    pub game: String,
    pub post: Thing,
    /// 1 on the first run.
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Active,
    /// Out of attempts or permanently failed; kept for inspection.
    Dead,
}

impl JobStatus {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Created(i64),
    /// A dead job for the same item was put back in the queue.
    Revived(i64),
    /// The item is already waiting or running.
    AlreadyQueued(i64),
}

impl EnqueueResult {
    #[must_use]
    pub fn id(&self) -> i64 {
        match self {
            Self::Created(id) | Self::Revived(id) | Self::AlreadyQueued(id) => *id,
        }
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        !matches!(self, Self::AlreadyQueued(_))
    }
}

/// What happened to a job after a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    Retrying { attempt: u32, delay: Duration },
    Dead { attempts: u32 },
}

/// Attempt budget and backoff for failed jobs.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay before the next run after `attempt` failed: `base * 2^(attempt - 1)`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub active: i64,
    pub dead: i64,
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pending, {} active, {} dead",
            self.pending, self.active, self.dead
        )
    }
}
