use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration as StdDuration, SystemTime},
};

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sqlx::{PgPool, Row};
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{usage::REGISTERED_OPERATIONS, web::AppState};

/// Widest rate-limit window; limiter buckets idle for longer than this can
/// only be empty.
const LIMITER_PRUNE_WINDOW: StdDuration = StdDuration::from_secs(24 * 60 * 60);

pub fn spawn(state: AppState) {
    tokio::spawn(async move {
        let interval = state.config().cleanup_interval;
        loop {
            if let Err(err) = run_cleanup_cycle(&state).await {
                error!(?err, "retention cleanup cycle failed");
            }
            sleep(interval).await;
        }
    });
}

async fn run_cleanup_cycle(state: &AppState) -> Result<()> {
    let pool = state.pool();

    let purged_jobs = purge_expired_jobs(state, &pool).await?;
    let orphaned_dirs = sweep_orphaned_directories(state).await;
    let expired_sessions = purge_expired_sessions(&pool).await?;
    state.rate_limiter().prune(LIMITER_PRUNE_WINDOW);

    if purged_jobs > 0 || orphaned_dirs > 0 || expired_sessions > 0 {
        info!(
            purged_jobs,
            orphaned_dirs, expired_sessions, "retention cleanup completed"
        );
    }

    Ok(())
}

/// Deletes working directories of jobs older than the retention window and
/// stamps the rows so downloads answer 410 from then on.
async fn purge_expired_jobs(state: &AppState, pool: &PgPool) -> Result<u64> {
    let cutoff = Utc::now() - Duration::hours(state.config().file_retention_hours);

    let rows = sqlx::query(
        "SELECT id, operation FROM pdf_jobs WHERE files_purged_at IS NULL AND created_at < $1",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await
    .context("failed to fetch jobs pending cleanup")?;

    let mut purged = 0_u64;

    for row in rows {
        let job_id: Uuid = row.try_get("id")?;
        let operation: String = row.try_get("operation")?;

        let root = state.config().operation_root(&operation);
        if !remove_job_directory(root, &job_id.to_string()).await {
            continue;
        }

        sqlx::query(
            "UPDATE pdf_jobs
             SET output_path = NULL, files_purged_at = NOW(), updated_at = NOW()
             WHERE id = $1",
        )
        .bind(job_id)
        .execute(pool)
        .await
        .context("failed to update job after cleanup")?;

        purged += 1;
    }

    Ok(purged)
}

/// Backstop for directories with no matching job row, such as leftovers from
/// a crash between upload and row insert. Anything under an operation root
/// whose mtime is past the retention window gets removed; directories with
/// live rows are already gone by the time this runs.
async fn sweep_orphaned_directories(state: &AppState) -> u64 {
    let max_age =
        StdDuration::from_secs(state.config().file_retention_hours.max(0) as u64 * 60 * 60);
    let mut removed = 0_u64;

    for descriptor in REGISTERED_OPERATIONS {
        let root = state.config().operation_root(descriptor.key);
        removed += sweep_stale_entries(&root, max_age).await;
    }

    removed
}

/// Removes direct children of `root` older than `max_age`. A missing root
/// just means no job has run for that operation yet.
async fn sweep_stale_entries(root: &Path, max_age: StdDuration) -> u64 {
    let cutoff = SystemTime::now() - max_age;
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return 0,
        Err(err) => {
            warn!(?err, root = %root.display(), "failed to scan operation root");
            return 0;
        }
    };

    let mut removed = 0_u64;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if modified >= cutoff {
            continue;
        }

        let path = entry.path();
        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(_) => removed += 1,
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(?err, path = %path.display(), "failed to remove stale entry"),
        }
    }

    removed
}

async fn purge_expired_sessions(pool: &PgPool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
        .execute(pool)
        .await
        .context("failed to delete expired sessions")?;
    Ok(result.rows_affected())
}

async fn remove_job_directory(root: PathBuf, name: &str) -> bool {
    let path = root.join(name);
    match tokio::fs::remove_dir_all(&path).await {
        Ok(_) => true,
        Err(err) if err.kind() == ErrorKind::NotFound => true,
        Err(err) => {
            warn!(?err, path = %path.display(), "failed to remove job directory");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remove_job_directory_succeeds_on_missing_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(remove_job_directory(dir.path().to_path_buf(), "missing").await);
    }

    #[tokio::test]
    async fn remove_job_directory_deletes_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let job_dir = dir.path().join("some-job");
        std::fs::create_dir_all(&job_dir).expect("create job dir");
        std::fs::write(job_dir.join("output.pdf"), b"%PDF-1.4").expect("write file");

        assert!(remove_job_directory(dir.path().to_path_buf(), "some-job").await);
        assert!(!job_dir.exists());
    }

    #[tokio::test]
    async fn stale_sweep_tolerates_missing_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("split");
        assert_eq!(sweep_stale_entries(&missing, StdDuration::ZERO).await, 0);
    }

    #[tokio::test]
    async fn stale_sweep_removes_aged_directories_and_keeps_fresh_ones() {
        let root = tempfile::tempdir().expect("tempdir");
        let orphan = root.path().join("4c2e3a1e-orphan");
        std::fs::create_dir_all(&orphan).expect("create orphan dir");
        std::fs::write(orphan.join("upload.pdf"), b"%PDF-1.4").expect("write file");

        // Everything is older than a zero-length window. The pause keeps the
        // directory mtime strictly behind the sweep's cutoff.
        std::thread::sleep(StdDuration::from_millis(20));
        assert_eq!(sweep_stale_entries(root.path(), StdDuration::ZERO).await, 1);
        assert!(!orphan.exists());

        let fresh = root.path().join("fresh-job");
        std::fs::create_dir_all(&fresh).expect("create fresh dir");
        assert_eq!(
            sweep_stale_entries(root.path(), StdDuration::from_secs(60 * 60)).await,
            0
        );
        assert!(fresh.exists());
    }
}
