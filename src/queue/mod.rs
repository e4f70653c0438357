//! Durable job queue for Reddit items awaiting ingestion.
//!
//! Jobs live in SQLite so they survive restarts. A single worker claims them in
//! order; see [`QueueWorker`].

mod limiter;
mod migrations;
mod models;
mod queries;
mod worker;

pub use limiter::WindowLimiter;
pub use models::*;
pub use worker::{DiscardReason, JobHandler, JobOutcome, ProcessedJob, QueueWorker};

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

#[derive(Debug, Clone)]
pub struct JobQueue {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl JobQueue {
    /// Open the queue database, running migrations if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails, migrations fail, or the database is
    /// not writable.
    pub async fn open(path: &Path, retry: RetryPolicy) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // The intake route and the worker write concurrently.
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to queue database")?;

        let queue = Self { pool, retry };
        migrations::run(&queue.pool).await?;
        info!("Queue migrations complete");
        queue.verify_writable(path).await?;

        Ok(queue)
    }

    async fn verify_writable(&self, path: &Path) -> Result<()> {
        // Starting a transaction requires write capability on SQLite.
        let tx = self.pool.begin().await.with_context(|| {
            format!(
                "Queue database is not writable (path: {}). Check volume mount permissions/ownership",
                path.display()
            )
        })?;

        tx.commit()
            .await
            .context("Failed to commit queue writability check")?;
        Ok(())
    }

    /// Add a job to the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn enqueue(&self, data: &JobData) -> Result<EnqueueResult> {
        queries::insert_job(&self.pool, data).await
    }

    /// Claim the oldest runnable job, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn claim_next(&self) -> Result<Option<JobRecord>> {
        queries::claim_next_job(&self.pool).await
    }

    /// # Errors
    ///
    /// Returns an error if the database read fails.
    pub async fn get(&self, id: i64) -> Result<Option<JobRecord>> {
        queries::get_job(&self.pool, id).await
    }

    /// Drop a job that finished successfully.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn complete(&self, id: i64) -> Result<()> {
        queries::delete_job(&self.pool, id).await?;
        Ok(())
    }

    /// Drop a job that can never succeed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn discard(&self, id: i64) -> Result<()> {
        queries::delete_job(&self.pool, id).await?;
        Ok(())
    }

    /// Remove a job from the queue, whatever its state. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn remove(&self, id: i64) -> Result<bool> {
        queries::delete_job(&self.pool, id).await
    }

    /// Record a retryable failure of the job's current attempt.
    ///
    /// The job is rescheduled with exponential backoff while it has attempts left,
    /// and marked dead otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the job does not exist or the database write fails.
    pub async fn fail(&self, id: i64, error: &str) -> Result<FailureDisposition> {
        let job = queries::get_job(&self.pool, id)
            .await?
            .with_context(|| format!("Job {id} not found"))?;

        let attempts = u32::try_from(job.attempts).unwrap_or(u32::MAX);
        if attempts >= self.retry.max_attempts {
            queries::set_job_dead(&self.pool, id, error).await?;
            return Ok(FailureDisposition::Dead { attempts });
        }

        let delay = self.retry.delay_after(attempts);
        queries::set_job_retry(&self.pool, id, error, delay.as_secs()).await?;
        Ok(FailureDisposition::Retrying {
            attempt: attempts,
            delay,
        })
    }

    /// Mark a job dead without further attempts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn bury(&self, id: i64, error: &str) -> Result<()> {
        queries::set_job_dead(&self.pool, id, error).await
    }

    /// Return jobs left active by an interrupted run to the pending state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn recover_stalled(&self) -> Result<u64> {
        queries::reset_active_jobs(&self.pool).await
    }

    /// # Errors
    ///
    /// Returns an error if the database read fails.
    pub async fn stats(&self) -> Result<QueueStats> {
        queries::count_jobs_by_status(&self.pool).await
    }
}
