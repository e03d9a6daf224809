use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path as AxumPath, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::error;
use uuid::Uuid;

use crate::{
    modules::{
        self, JsonError, UPLOAD_BODY_LIMIT, authorize_job, complete_job, discard_job_dir,
        fail_job, job_dir, timestamped_name,
    },
    pdf,
    usage::{self, OP_MERGE},
    web::{
        AppState, JobCompleted, auth, jobs, json_error,
        uploads::{FileFieldConfig, FileNaming, process_upload_form},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tools/merge", get(merge_page))
        .route("/tools/merge/jobs", post(create_job))
        .route("/api/merge/jobs/:id/download", get(download))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

async fn merge_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Html<String>, Redirect> {
    let user = auth::require_user_redirect(&state, &jar).await?;
    let limits = state.config().limits_for(user.effective_tier());
    let descriptor = usage::descriptor(OP_MERGE);

    let form_html = format!(
        r#"                <label for="files">PDF files (2 to {max_files})</label>
                <input id="files" type="file" name="files" accept=".pdf" multiple required>
                <p class="note">Files are combined in the order you select them.</p>"#,
        max_files = limits.max_merge_files,
    );

    Ok(Html(modules::render_tool_page(
        &user, descriptor, &limits, form_html,
    )))
}

async fn create_job(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<JobCompleted>, JsonError> {
    let request = authorize_job(&state, &jar, &headers).await?;

    let job_id = Uuid::new_v4();
    let dir = job_dir(&state, OP_MERGE, job_id);

    let config = FileFieldConfig::new(
        "files",
        &["pdf"],
        request.limits.max_merge_files,
        request.limits.max_file_bytes,
        FileNaming::Indexed {
            prefix: "input_",
            pad_width: 3,
        },
    )
    .with_min_files(2);

    let outcome = match process_upload_form(multipart, &dir, &[config]).await {
        Ok(outcome) => outcome,
        Err(err) => {
            discard_job_dir(&dir).await;
            return Err(json_error(StatusCode::BAD_REQUEST, err.message()));
        }
    };

    let saved: Vec<_> = outcome.files_for("files").cloned().collect();
    let total_size: i64 = saved.iter().map(|file| file.file_size as i64).sum();

    let mut documents = Vec::with_capacity(saved.len());
    for file in &saved {
        match tokio::fs::read(&file.stored_path).await {
            Ok(bytes) => documents.push(bytes),
            Err(err) => {
                error!(?err, "failed to read uploaded file");
                discard_job_dir(&dir).await;
                return Err(json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not read the uploaded files.",
                ));
            }
        }
    }

    // Validate each input up front so the error names the offending file.
    let mut page_counts = Vec::with_capacity(documents.len());
    for (index, bytes) in documents.iter().enumerate() {
        let bytes = bytes.clone();
        match tokio::task::spawn_blocking(move || pdf::inspect(&bytes)).await {
            Ok(Ok(summary)) => page_counts.push(summary.page_count),
            Ok(Err(err)) => {
                let message = format!(
                    "{name}: {reason}",
                    name = saved[index].original_name,
                    reason = err.message()
                );
                return Err(fail_job(
                    &state,
                    &request,
                    OP_MERGE,
                    Some(total_size),
                    &dir,
                    StatusCode::BAD_REQUEST,
                    message,
                )
                .await);
            }
            Err(err) => {
                error!(?err, "merge inspection task panicked");
                discard_job_dir(&dir).await;
                return Err(json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The operation failed unexpectedly.",
                ));
            }
        }
    }

    let pages_processed: u32 = page_counts.iter().sum();
    let merged = match tokio::task::spawn_blocking(move || pdf::merge(&documents)).await {
        Ok(Ok(merged)) => merged,
        Ok(Err(err)) => {
            let message = err.message().to_string();
            return Err(fail_job(
                &state,
                &request,
                OP_MERGE,
                Some(total_size),
                &dir,
                StatusCode::BAD_REQUEST,
                message,
            )
            .await);
        }
        Err(err) => {
            error!(?err, "merge task panicked");
            discard_job_dir(&dir).await;
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "The operation failed unexpectedly.",
            ));
        }
    };

    let inputs: Vec<jobs::JobInputFile<'_>> = saved
        .iter()
        .zip(&page_counts)
        .map(|(file, &page_count)| jobs::JobInputFile {
            saved: file,
            page_count: page_count as i32,
        })
        .collect();

    complete_job(
        &state,
        &request,
        OP_MERGE,
        job_id,
        &dir,
        merged,
        timestamped_name("merged", "pdf"),
        &inputs,
        pages_processed,
    )
    .await
}

async fn download(
    State(state): State<AppState>,
    jar: CookieJar,
    AxumPath(job_id): AxumPath<Uuid>,
) -> Result<impl IntoResponse, JsonError> {
    modules::download_job(&state, &jar, OP_MERGE, job_id, "application/pdf").await
}
