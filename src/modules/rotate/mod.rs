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
    pdf::{self, RotationTarget},
    usage::{self, OP_ROTATE},
    web::{
        AppState, JobCompleted, auth, jobs, json_error,
        uploads::{FileFieldConfig, FileNaming, process_upload_form},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tools/rotate", get(rotate_page))
        .route("/tools/rotate/jobs", post(create_job))
        .route("/api/rotate/jobs/:id/download", get(download))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

async fn rotate_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Html<String>, Redirect> {
    let user = auth::require_user_redirect(&state, &jar).await?;
    let limits = state.config().limits_for(user.effective_tier());
    let descriptor = usage::descriptor(OP_ROTATE);

    let form_html = r#"                <label for="file">PDF file</label>
                <input id="file" type="file" name="file" accept=".pdf" required>
                <label for="rotation" style="margin-top: 1.2rem;">Rotation (clockwise)</label>
                <select id="rotation" name="rotation">
                    <option value="90">90°</option>
                    <option value="180">180°</option>
                    <option value="270">270°</option>
                </select>
                <label for="apply_to" style="margin-top: 1.2rem;">Apply to</label>
                <select id="apply_to" name="apply_to">
                    <option value="all">All pages</option>
                    <option value="even">Even pages</option>
                    <option value="odd">Odd pages</option>
                </select>"#
        .to_string();

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
    let dir = job_dir(&state, OP_ROTATE, job_id);

    let config = FileFieldConfig::new(
        "file",
        &["pdf"],
        1,
        request.limits.max_file_bytes,
        FileNaming::RandomPrefix,
    );
    let outcome = match process_upload_form(multipart, &dir, &[config]).await {
        Ok(outcome) => outcome,
        Err(err) => {
            discard_job_dir(&dir).await;
            return Err(json_error(StatusCode::BAD_REQUEST, err.message()));
        }
    };

    let Some(saved) = outcome.first_file_for("file").cloned() else {
        discard_job_dir(&dir).await;
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Please choose a PDF file.",
        ));
    };

    let angle = match outcome
        .first_text("rotation")
        .unwrap_or("90")
        .trim()
        .parse::<i64>()
    {
        Ok(angle) => angle,
        Err(_) => {
            return Err(fail_job(
                &state,
                &request,
                OP_ROTATE,
                Some(saved.file_size as i64),
                &dir,
                StatusCode::BAD_REQUEST,
                "Rotation must be 90, 180 or 270 degrees.".to_string(),
            )
            .await);
        }
    };
    let target = RotationTarget::from_form_value(outcome.first_text("apply_to").unwrap_or("all"));

    let bytes = match tokio::fs::read(&saved.stored_path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(?err, "failed to read uploaded file");
            discard_job_dir(&dir).await;
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Could not read the uploaded file.",
            ));
        }
    };

    let (rotated, page_count) = {
        let bytes_for_task = bytes.clone();
        let task = tokio::task::spawn_blocking(move || {
            let summary = pdf::inspect(&bytes_for_task)?;
            let rotated = pdf::rotate(&bytes_for_task, angle, target)?;
            Ok::<_, pdf::PdfError>((rotated, summary.page_count))
        });
        match task.await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                let message = err.message().to_string();
                return Err(fail_job(
                    &state,
                    &request,
                    OP_ROTATE,
                    Some(saved.file_size as i64),
                    &dir,
                    StatusCode::BAD_REQUEST,
                    message,
                )
                .await);
            }
            Err(err) => {
                error!(?err, "rotate task panicked");
                discard_job_dir(&dir).await;
                return Err(json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The operation failed unexpectedly.",
                ));
            }
        }
    };

    let inputs = [jobs::JobInputFile {
        saved: &saved,
        page_count: page_count as i32,
    }];
    complete_job(
        &state,
        &request,
        OP_ROTATE,
        job_id,
        &dir,
        rotated,
        timestamped_name("rotated", "pdf"),
        &inputs,
        page_count,
    )
    .await
}

async fn download(
    State(state): State<AppState>,
    jar: CookieJar,
    AxumPath(job_id): AxumPath<Uuid>,
) -> Result<impl IntoResponse, JsonError> {
    modules::download_job(&state, &jar, OP_ROTATE, job_id, "application/pdf").await
}
