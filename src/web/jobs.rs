use std::path::Path;

use anyhow::{Context, Result};
use axum::{
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::web::uploads::SavedFile;

/// Input files recorded alongside a completed job.
pub struct JobInputFile<'a> {
    pub saved: &'a SavedFile,
    pub page_count: i32,
}

/// Persists a finished job together with its input file metadata. Jobs are
/// only written once the output exists on disk, so the row is born in the
/// `completed` state.
pub async fn insert_completed_job(
    pool: &PgPool,
    job_id: Uuid,
    user_id: Uuid,
    operation: &str,
    output_path: &str,
    download_name: &str,
    inputs: &[JobInputFile<'_>],
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin job transaction")?;

    sqlx::query(
        r#"
        INSERT INTO pdf_jobs (id, user_id, operation, status, output_path, download_name)
        VALUES ($1, $2, $3, 'completed', $4, $5)
        "#,
    )
    .bind(job_id)
    .bind(user_id)
    .bind(operation)
    .bind(output_path)
    .bind(download_name)
    .execute(&mut *tx)
    .await
    .context("insert job row")?;

    for (ordinal, input) in inputs.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO pdf_job_files (id, job_id, ordinal, original_filename, stored_path, file_size, page_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(job_id)
        .bind(ordinal as i32)
        .bind(&input.saved.original_name)
        .bind(input.saved.stored_path.to_string_lossy().as_ref())
        .bind(input.saved.file_size as i64)
        .bind(input.page_count)
        .execute(&mut *tx)
        .await
        .context("insert job file row")?;
    }

    tx.commit().await.context("commit job transaction")?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
pub struct DownloadRow {
    pub user_id: Uuid,
    pub operation: String,
    pub status: String,
    pub output_path: Option<String>,
    pub download_name: Option<String>,
    pub files_purged_at: Option<DateTime<Utc>>,
}

pub async fn fetch_download(pool: &PgPool, job_id: Uuid) -> Result<Option<DownloadRow>> {
    sqlx::query_as::<_, DownloadRow>(
        r#"
        SELECT user_id, operation, status, output_path, download_name, files_purged_at
        FROM pdf_jobs
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await
    .context("load job for download")
}

/// Serves a stored output file as an attachment download. A file that has
/// disappeared from disk maps to 410, matching the retention sweep.
pub async fn serve_attachment(
    path: &Path,
    filename: &str,
    content_type: &'static str,
) -> Result<Response, StatusCode> {
    let bytes = tokio::fs::read(path).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            StatusCode::GONE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(content_type),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        header::HeaderValue::from_str(&format!(
            "attachment; filename=\"{}\"",
            filename.replace('"', "")
        ))
        .unwrap_or_else(|_| header::HeaderValue::from_static("attachment")),
    );

    Ok((headers, bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serve_attachment_maps_missing_file_to_gone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("not_there.pdf");
        let err = serve_attachment(&missing, "out.pdf", "application/pdf")
            .await
            .err()
            .expect("expected an error status");
        assert_eq!(err, StatusCode::GONE);
    }

    #[tokio::test]
    async fn serve_attachment_sets_disposition() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.pdf");
        std::fs::write(&path, b"%PDF-1.4").expect("write sample");

        let response = serve_attachment(&path, "merged_20240101.pdf", "application/pdf")
            .await
            .expect("response");
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .expect("disposition header")
            .to_str()
            .expect("ascii header");
        assert_eq!(
            disposition,
            "attachment; filename=\"merged_20240101.pdf\""
        );
    }
}
