//! Turns queued Reddit items into tracker posts.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::api::PostStore;
use crate::cache::KnownPostCache;
use crate::normalize::{normalize, reply_url, NormalizeError};
use crate::queue::{DiscardReason, Job, JobHandler, JobOutcome};
use crate::reddit::ThreadSource;

/// Job handler that normalizes an item and submits it to the tracker.
#[derive(Clone)]
pub struct Ingestor {
    threads: Arc<dyn ThreadSource>,
    store: Arc<dyn PostStore>,
    known: Arc<KnownPostCache>,
}

impl Ingestor {
    #[must_use]
    pub fn new(
        threads: Arc<dyn ThreadSource>,
        store: Arc<dyn PostStore>,
        known: Arc<KnownPostCache>,
    ) -> Self {
        Self {
            threads,
            store,
            known,
        }
    }
}

#[async_trait]
impl JobHandler for Ingestor {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let account_id = match &job.account_id {
            Some(id) if !id.is_blank() => id,
            _ => {
                info!(job_id = job.id, "Discarding job because it has no account id");
                return JobOutcome::Discarded(DiscardReason::MissingAccount);
            }
        };

        self.known.track(&job.game);

        // Replies cost a thread fetch to normalize; skip known ones up front.
        if let Some(url) = reply_url(&job.post) {
            if self.known.contains(&job.game, &url) {
                debug!(job_id = job.id, url = %url, "Reply already known to the tracker");
                return JobOutcome::Discarded(DiscardReason::Duplicate);
            }
        }

        let post = match normalize(account_id, &job.post, self.threads.as_ref()).await {
            Ok(post) => post,
            Err(e @ NormalizeError::Malformed { .. }) => {
                info!(job_id = job.id, "Discarding job because we didn't get a post: {e}");
                return JobOutcome::Discarded(DiscardReason::Malformed(e.to_string()));
            }
            Err(e) => return JobOutcome::Retryable(e.to_string()),
        };

        if self.known.contains(&job.game, &post.url) {
            debug!(job_id = job.id, url = %post.url, "Post already known to the tracker");
            return JobOutcome::Discarded(DiscardReason::Duplicate);
        }

        match self.store.submit(&job.game, &post).await {
            Ok(()) => {
                self.known.remember(&job.game, &post.url);
                info!(job_id = job.id, game = %job.game, url = %post.url, "Submitted post");
                JobOutcome::Completed
            }
            Err(e) if e.is_duplicate() => {
                self.known.remember(&job.game, &post.url);
                JobOutcome::Discarded(DiscardReason::Duplicate)
            }
            Err(e) => {
                warn!(
                    job_id = job.id,
                    game = %job.game,
                    status = ?e.status(),
                    "Failed to submit post: {e}"
                );
                JobOutcome::Retryable(e.to_string())
            }
        }
    }
}
