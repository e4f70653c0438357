use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{EnqueueResult, JobData, JobRecord, JobStatus, QueueStats};

/// Insert a job unless the same item is already queued for the game.
///
/// A dead job for the same item is reset to pending with a fresh attempt budget.
pub async fn insert_job(pool: &SqlitePool, data: &JobData) -> Result<EnqueueResult> {
    let payload = serde_json::to_string(data).context("Failed to encode job payload")?;
    let dedupe_key = data.dedupe_key();

    let result = sqlx::query(
        r"
        INSERT OR IGNORE INTO jobs (game, payload, dedupe_key)
        VALUES (?, ?, ?)
        ",
    )
    .bind(&data.game)
    .bind(&payload)
    .bind(&dedupe_key)
    .execute(pool)
    .await
    .context("Failed to insert job")?;

    if result.rows_affected() == 1 {
        return Ok(EnqueueResult::Created(result.last_insert_rowid()));
    }

    let (id, status): (i64, String) =
        sqlx::query_as("SELECT id, status FROM jobs WHERE dedupe_key = ?")
            .bind(&dedupe_key)
            .fetch_one(pool)
            .await
            .context("Failed to look up existing job")?;

    if JobStatus::parse(&status) != Some(JobStatus::Dead) {
        return Ok(EnqueueResult::AlreadyQueued(id));
    }

    sqlx::query(
        r"
        UPDATE jobs
        SET status = 'pending',
            payload = ?,
            attempts = 0,
            last_error = NULL,
            next_run_at = datetime('now'),
            updated_at = datetime('now')
        WHERE id = ?
        ",
    )
    .bind(&payload)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to revive dead job")?;

    Ok(EnqueueResult::Revived(id))
}

/// Claim the oldest runnable job, marking it active and counting the attempt.
pub async fn claim_next_job(pool: &SqlitePool) -> Result<Option<JobRecord>> {
    let job = sqlx::query_as::<_, JobRecord>(
        r"
        UPDATE jobs
        SET status = 'active',
            attempts = attempts + 1,
            updated_at = datetime('now')
        WHERE id = (
            SELECT id FROM jobs
            WHERE status = 'pending' AND next_run_at <= datetime('now')
            ORDER BY next_run_at ASC, id ASC
            LIMIT 1
        )
        RETURNING *
        ",
    )
    .fetch_optional(pool)
    .await
    .context("Failed to claim next job")?;

    Ok(job)
}

pub async fn get_job(pool: &SqlitePool, id: i64) -> Result<Option<JobRecord>> {
    sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch job")
}

pub async fn delete_job(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete job")?;

    Ok(result.rows_affected() > 0)
}

/// Put a job back in the queue to run after `delay_secs`.
pub async fn set_job_retry(pool: &SqlitePool, id: i64, error: &str, delay_secs: u64) -> Result<()> {
    sqlx::query(
        r"
        UPDATE jobs
        SET status = 'pending',
            last_error = ?,
            next_run_at = datetime('now', ?),
            updated_at = datetime('now')
        WHERE id = ?
        ",
    )
    .bind(error)
    .bind(format!("+{delay_secs} seconds"))
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to schedule job retry")?;

    Ok(())
}

pub async fn set_job_dead(pool: &SqlitePool, id: i64, error: &str) -> Result<()> {
    sqlx::query(
        r"
        UPDATE jobs
        SET status = 'dead',
            last_error = ?,
            updated_at = datetime('now')
        WHERE id = ?
        ",
    )
    .bind(error)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to mark job dead")?;

    Ok(())
}

/// Reset jobs left active by a previous run.
pub async fn reset_active_jobs(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r"
        UPDATE jobs
        SET status = 'pending',
            updated_at = datetime('now')
        WHERE status = 'active'
        ",
    )
    .execute(pool)
    .await
    .context("Failed to reset active jobs")?;

    Ok(result.rows_affected())
}

pub async fn count_jobs_by_status(pool: &SqlitePool) -> Result<QueueStats> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
            .fetch_all(pool)
            .await
            .context("Failed to count jobs")?;

    let mut stats = QueueStats::default();
    for (status, count) in rows {
        match JobStatus::parse(&status) {
            Some(JobStatus::Pending) => stats.pending = count,
            Some(JobStatus::Active) => stats.active = count,
            Some(JobStatus::Dead) => stats.dead = count,
            None => {}
        }
    }

    Ok(stats)
}
