//! Single-consumer loop that runs queued jobs under the start-rate limit.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{FailureDisposition, Job, JobQueue, WindowLimiter};
use crate::config::Config;

/// Why a job was dropped without producing a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// The job did not name a tracker account.
    MissingAccount,
    /// The Reddit item is missing data needed to build a post.
    Malformed(String),
    /// The tracker already has this post.
    Duplicate,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAccount => write!(f, "missing account id"),
            Self::Malformed(detail) => write!(f, "malformed item: {detail}"),
            Self::Duplicate => write!(f, "duplicate content"),
        }
    }
}

/// Result of running one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Discarded(DiscardReason),
    /// Failed, but may succeed if run again.
    Retryable(String),
    /// Failed and will fail the same way every time.
    Permanent(String),
}

/// Runs a claimed job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> JobOutcome;
}

/// A job that went through [`QueueWorker::process_next`].
#[derive(Debug, Clone)]
pub struct ProcessedJob {
    pub id: i64,
    pub game: String,
    pub outcome: JobOutcome,
}

#[derive(Debug)]
pub struct QueueWorker {
    queue: JobQueue,
    limiter: WindowLimiter,
    poll_interval: Duration,
    /// Jobs that ran but whose outcome could not be written. They stay active in the
    /// queue until the write goes through.
    unsettled: Mutex<Vec<ProcessedJob>>,
}

impl QueueWorker {
    #[must_use]
    pub fn new(queue: JobQueue, limiter: WindowLimiter, poll_interval: Duration) -> Self {
        Self {
            queue,
            limiter,
            poll_interval,
            unsettled: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn from_config(queue: JobQueue, config: &Config) -> Self {
        Self::new(
            queue,
            WindowLimiter::new(config.queue_max_per_window, config.queue_window),
            config.queue_poll_interval,
        )
    }

    /// Run jobs one at a time until `shutdown` is cancelled.
    ///
    /// A job already started is allowed to finish before the loop exits.
    pub async fn process<H>(&self, handler: &H, shutdown: CancellationToken)
    where
        H: JobHandler + ?Sized,
    {
        info!("Queue worker started");

        while !shutdown.is_cancelled() {
            let idle = match self.process_next(handler).await {
                Ok(Some(_)) => false,
                Ok(None) => {
                    debug!("No runnable jobs");
                    true
                }
                Err(e) => {
                    error!("Queue worker error: {e:#}");
                    true
                }
            };

            if idle {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        info!("Queue worker stopped");
    }

    /// Claim and run the next job, if one is runnable.
    ///
    /// Outcomes that failed to be recorded on an earlier call are recorded first.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read or updated.
    pub async fn process_next<H>(&self, handler: &H) -> Result<Option<ProcessedJob>>
    where
        H: JobHandler + ?Sized,
    {
        self.settle_unsettled().await?;

        let Some(record) = self.queue.claim_next().await? else {
            return Ok(None);
        };

        self.limiter.acquire().await;
        info!(
            job_id = record.id,
            game = %record.game,
            attempt = record.attempts,
            "Running job"
        );

        let outcome = match record.decode() {
            Ok(job) => handler.handle(&job).await,
            Err(e) => JobOutcome::Permanent(format!("undecodable payload: {e}")),
        };

        let processed = ProcessedJob {
            id: record.id,
            game: record.game,
            outcome,
        };

        if let Err(e) = self.settle(&processed).await {
            warn!(job_id = processed.id, "Failed to record job outcome, will retry");
            self.unsettled_jobs().push(processed);
            return Err(e);
        }

        Ok(Some(processed))
    }

    async fn settle_unsettled(&self) -> Result<()> {
        let mut pending = std::mem::take(&mut *self.unsettled_jobs()).into_iter();

        while let Some(job) = pending.next() {
            if let Err(e) = self.settle(&job).await {
                let mut unsettled = self.unsettled_jobs();
                unsettled.push(job);
                unsettled.extend(pending);
                return Err(e.context("Failed to record outcome of an earlier job"));
            }
        }

        Ok(())
    }

    fn unsettled_jobs(&self) -> MutexGuard<'_, Vec<ProcessedJob>> {
        self.unsettled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn settle(&self, job: &ProcessedJob) -> Result<()> {
        let (id, game) = (job.id, job.game.as_str());
        match &job.outcome {
            JobOutcome::Completed => {
                self.queue.complete(id).await?;
                info!(job_id = id, game = %game, "Job completed");
            }
            JobOutcome::Discarded(DiscardReason::Duplicate) => {
                self.queue.remove(id).await?;
                info!(job_id = id, game = %game, "Removed job as the content is a duplicate");
            }
            JobOutcome::Discarded(reason) => {
                self.queue.discard(id).await?;
                warn!(job_id = id, game = %game, reason = %reason, "Discarded job");
            }
            JobOutcome::Retryable(err) => match self.queue.fail(id, err).await? {
                FailureDisposition::Retrying { attempt, delay } => {
                    warn!(
                        job_id = id,
                        game = %game,
                        attempt,
                        retry_in_secs = delay.as_secs(),
                        "Job failed, will retry: {err}"
                    );
                }
                FailureDisposition::Dead { attempts } => {
                    error!(
                        job_id = id,
                        game = %game,
                        attempts,
                        "Job failed, out of attempts: {err}"
                    );
                }
            },
            JobOutcome::Permanent(err) => {
                self.queue.bury(id, err).await?;
                error!(job_id = id, game = %game, "Job failed permanently: {err}");
            }
        }

        Ok(())
    }
}
