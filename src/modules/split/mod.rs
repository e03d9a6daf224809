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
    pdf::{self, PageSelection},
    usage::{self, OP_SPLIT},
    web::{
        AppState, JobCompleted, auth, json_error,
        uploads::{FileFieldConfig, FileNaming, process_upload_form},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tools/split", get(split_page))
        .route("/tools/split/jobs", post(create_job))
        .route("/api/split/jobs/:id/download", get(download))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

async fn split_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Html<String>, Redirect> {
    let user = auth::require_user_redirect(&state, &jar).await?;
    let limits = state.config().limits_for(user.effective_tier());
    let descriptor = usage::descriptor(OP_SPLIT);

    let form_html = r#"                <label for="file">PDF file</label>
                <input id="file" type="file" name="file" accept=".pdf" required>
                <label style="margin-top: 1.2rem;">Pages to extract</label>
                <label><input type="radio" name="split_type" value="range" checked> Page range</label>
                <div style="display: flex; gap: 1rem;">
                    <input type="number" name="start_page" min="1" placeholder="From (default 1)">
                    <input type="number" name="end_page" min="1" placeholder="To (default last)">
                </div>
                <label style="margin-top: 0.8rem;"><input type="radio" name="split_type" value="specific"> Specific pages</label>
                <input type="text" name="specific_pages" placeholder="e.g. 1,3,5-7">
                <label style="margin-top: 0.8rem;"><input type="radio" name="split_type" value="even"> Even pages only</label>
                <label><input type="radio" name="split_type" value="odd"> Odd pages only</label>
                <p class="note">Each selected page becomes its own PDF; you download them together as a ZIP archive.</p>"#
        .to_string();

    Ok(Html(modules::render_tool_page(
        &user, descriptor, &limits, form_html,
    )))
}

fn selection_from_form(
    split_type: &str,
    start_page: Option<&str>,
    end_page: Option<&str>,
    specific_pages: Option<&str>,
    page_count: u32,
) -> Result<PageSelection, String> {
    match split_type {
        "specific" => {
            let spec = specific_pages.unwrap_or("").trim();
            if spec.is_empty() {
                return Err("Please enter the pages to extract, e.g. 1,3,5-7.".to_string());
            }
            PageSelection::parse_spec(spec).map_err(|err| err.message().to_string())
        }
        "even" => Ok(PageSelection::Even),
        "odd" => Ok(PageSelection::Odd),
        _ => {
            let start = parse_optional_page(start_page, 1)?;
            let end = parse_optional_page(end_page, page_count)?;
            Ok(PageSelection::Range { start, end })
        }
    }
}

fn parse_optional_page(value: Option<&str>, default: u32) -> Result<u32, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(default),
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| format!("'{raw}' is not a valid page number.")),
    }
}

async fn create_job(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<JobCompleted>, JsonError> {
    let request = authorize_job(&state, &jar, &headers).await?;

    let job_id = Uuid::new_v4();
    let dir = job_dir(&state, OP_SPLIT, job_id);

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

    let summary = {
        let bytes = bytes.clone();
        match tokio::task::spawn_blocking(move || pdf::inspect(&bytes)).await {
            Ok(Ok(summary)) => summary,
            Ok(Err(err)) => {
                let message = err.message().to_string();
                return Err(fail_job(
                    &state,
                    &request,
                    OP_SPLIT,
                    Some(saved.file_size as i64),
                    &dir,
                    StatusCode::BAD_REQUEST,
                    message,
                )
                .await);
            }
            Err(err) => {
                error!(?err, "split inspection task panicked");
                discard_job_dir(&dir).await;
                return Err(json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The operation failed unexpectedly.",
                ));
            }
        }
    };

    let split_type = outcome.first_text("split_type").unwrap_or("range").to_string();
    let selection = match selection_from_form(
        &split_type,
        outcome.first_text("start_page"),
        outcome.first_text("end_page"),
        outcome.first_text("specific_pages"),
        summary.page_count,
    ) {
        Ok(selection) => selection,
        Err(message) => {
            return Err(fail_job(
                &state,
                &request,
                OP_SPLIT,
                Some(saved.file_size as i64),
                &dir,
                StatusCode::BAD_REQUEST,
                message,
            )
            .await);
        }
    };

    let pages = match selection.resolve(summary.page_count) {
        Ok(pages) => pages,
        Err(err) => {
            let message = err.message().to_string();
            return Err(fail_job(
                &state,
                &request,
                OP_SPLIT,
                Some(saved.file_size as i64),
                &dir,
                StatusCode::BAD_REQUEST,
                message,
            )
            .await);
        }
    };

    let pages_processed = pages.len() as u32;
    let archive = {
        let bytes = bytes.clone();
        let pages = pages.clone();
        match tokio::task::spawn_blocking(move || pdf::split_to_zip(&bytes, &pages)).await {
            Ok(Ok(archive)) => archive,
            Ok(Err(err)) => {
                let message = err.message().to_string();
                return Err(fail_job(
                    &state,
                    &request,
                    OP_SPLIT,
                    Some(saved.file_size as i64),
                    &dir,
                    StatusCode::BAD_REQUEST,
                    message,
                )
                .await);
            }
            Err(err) => {
                error!(?err, "split task panicked");
                discard_job_dir(&dir).await;
                return Err(json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The operation failed unexpectedly.",
                ));
            }
        }
    };

    let inputs = [crate::web::jobs::JobInputFile {
        saved: &saved,
        page_count: summary.page_count as i32,
    }];
    complete_job(
        &state,
        &request,
        OP_SPLIT,
        job_id,
        &dir,
        archive,
        timestamped_name("split_pages", "zip"),
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
    modules::download_job(&state, &jar, OP_SPLIT, job_id, "application/zip").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_defaults_span_the_document() {
        let selection =
            selection_from_form("range", None, None, None, 8).expect("selection");
        assert_eq!(selection, PageSelection::Range { start: 1, end: 8 });
    }

    #[test]
    fn explicit_spec_is_parsed() {
        let selection =
            selection_from_form("specific", None, None, Some("1,3-4"), 10).expect("selection");
        assert_eq!(selection, PageSelection::Explicit(vec![(1, 1), (3, 4)]));
    }

    #[test]
    fn empty_spec_is_rejected() {
        assert!(selection_from_form("specific", None, None, Some("  "), 10).is_err());
    }

    #[test]
    fn bad_page_number_is_rejected() {
        assert!(selection_from_form("range", Some("abc"), None, None, 10).is_err());
    }

    #[test]
    fn unknown_split_type_falls_back_to_range() {
        let selection =
            selection_from_form("mystery", Some("2"), Some("5"), None, 10).expect("selection");
        assert_eq!(selection, PageSelection::Range { start: 2, end: 5 });
    }
}
