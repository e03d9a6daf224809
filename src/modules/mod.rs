//! The PDF tools. Each submodule contributes a tool page, a job endpoint
//! that processes the upload inline, and a download endpoint for the
//! resulting artifact.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    config::{RATE_PDF_OPERATIONS, TierLimits},
    usage::{self, OperationDescriptor, QuotaErrorKind, RequestContext},
    web::{
        ApiMessage, AppState,
        auth::{self, AuthUser},
        jobs,
        json_error,
        templates::{self, NavLink, PageLayout, escape_html},
    },
};

pub mod compress;
pub mod merge;
pub mod rotate;
pub mod split;

pub(crate) type JsonError = (StatusCode, Json<ApiMessage>);

/// Multipart bodies may carry the premium 100MB file cap plus form overhead.
pub(crate) const UPLOAD_BODY_LIMIT: usize = 110 * 1024 * 1024;

/// Everything a job handler needs once the request has been admitted.
pub(crate) struct ToolRequest {
    pub user: AuthUser,
    pub context: RequestContext,
    pub limits: TierLimits,
}

/// Front door shared by every job endpoint: session, the per-tool rate
/// limit, quota. The global ceilings are counted once per request by the
/// router middleware.
pub(crate) async fn authorize_job(
    state: &AppState,
    jar: &CookieJar,
    headers: &HeaderMap,
) -> Result<ToolRequest, JsonError> {
    let context = auth::request_context(headers);
    let user = auth::require_user_json(state, jar).await?;

    let key = auth::principal_key(Some(&user), &context);
    if let Err(limited) = state.rate_limiter().check(&key, &RATE_PDF_OPERATIONS) {
        return Err(json_error(StatusCode::TOO_MANY_REQUESTS, limited.message()));
    }

    let limits = state.config().limits_for(user.effective_tier());
    if let Err(quota) = usage::ensure_within_quota(state.pool_ref(), &user, limits.daily_operations).await
    {
        let status = match quota.kind {
            QuotaErrorKind::DailyExceeded { .. } => StatusCode::FORBIDDEN,
            QuotaErrorKind::Backend => StatusCode::INTERNAL_SERVER_ERROR,
        };
        return Err(json_error(status, quota.message()));
    }

    Ok(ToolRequest {
        user,
        context,
        limits,
    })
}

pub(crate) fn job_dir(state: &AppState, operation: &str, job_id: Uuid) -> PathBuf {
    state.config().operation_root(operation).join(job_id.to_string())
}

/// Removes a job working directory; a directory that is already gone is not
/// an error.
pub(crate) async fn discard_job_dir(dir: &Path) {
    if let Err(err) = tokio::fs::remove_dir_all(dir).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(?err, dir = %dir.display(), "failed to remove job directory");
        }
    }
}

pub(crate) fn timestamped_name(prefix: &str, extension: &str) -> String {
    format!(
        "{prefix}_{}.{extension}",
        Utc::now().format("%Y%m%d_%H%M%S")
    )
}

/// Records a failed operation and cleans up before returning the error the
/// client will see. Rejections that happen before any work (rate limits,
/// quota) skip this and therefore never consume quota or log usage.
pub(crate) async fn fail_job(
    state: &AppState,
    request: &ToolRequest,
    operation: &str,
    file_size: Option<i64>,
    dir: &Path,
    status: StatusCode,
    message: String,
) -> JsonError {
    if let Err(err) = usage::record_usage(
        state.pool_ref(),
        request.user.id,
        operation,
        file_size,
        None,
        &request.context,
        false,
        Some(&message),
    )
    .await
    {
        error!(?err, operation, "failed to record failed operation");
    }
    discard_job_dir(dir).await;
    json_error(status, message)
}

/// Writes the artifact, persists the job and usage rows, and builds the
/// completion payload.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn complete_job(
    state: &AppState,
    request: &ToolRequest,
    operation: &str,
    job_id: Uuid,
    dir: &Path,
    output: Vec<u8>,
    download_name: String,
    inputs: &[jobs::JobInputFile<'_>],
    pages_processed: u32,
) -> Result<Json<crate::web::JobCompleted>, JsonError> {
    let output_path = dir.join(&download_name);
    if let Err(err) = tokio::fs::write(&output_path, &output).await {
        error!(?err, operation, "failed to write job output");
        let message = "Could not store the result. Please try again.".to_string();
        return Err(fail_job(
            state,
            request,
            operation,
            total_input_size(inputs),
            dir,
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
        )
        .await);
    }

    if let Err(err) = jobs::insert_completed_job(
        state.pool_ref(),
        job_id,
        request.user.id,
        operation,
        output_path.to_string_lossy().as_ref(),
        &download_name,
        inputs,
    )
    .await
    {
        error!(?err, operation, "failed to persist job");
        discard_job_dir(dir).await;
        return Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Could not record the job. Please try again.",
        ));
    }

    if let Err(err) = usage::record_usage(
        state.pool_ref(),
        request.user.id,
        operation,
        total_input_size(inputs),
        Some(pages_processed as i32),
        &request.context,
        true,
        None,
    )
    .await
    {
        error!(?err, operation, "failed to record usage");
    }

    Ok(Json(crate::web::JobCompleted::new(
        job_id,
        format!("/api/{operation}/jobs/{job_id}/download"),
        pages_processed,
    )))
}

fn total_input_size(inputs: &[jobs::JobInputFile<'_>]) -> Option<i64> {
    Some(
        inputs
            .iter()
            .map(|input| input.saved.file_size as i64)
            .sum(),
    )
}

/// Shared download endpoint logic. Jobs belong to their creator; admins may
/// fetch any job. Purged artifacts answer 410.
pub(crate) async fn download_job(
    state: &AppState,
    jar: &CookieJar,
    operation: &str,
    job_id: Uuid,
    content_type: &'static str,
) -> Result<Response, JsonError> {
    let user = auth::require_user_json(state, jar).await?;

    let row = jobs::fetch_download(state.pool_ref(), job_id)
        .await
        .map_err(|err| {
            error!(?err, "failed to load job for download");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Could not load the job.")
        })?;

    let Some(row) = row else {
        return Err(json_error(StatusCode::NOT_FOUND, "Job not found."));
    };

    if row.operation != operation || (row.user_id != user.id && !user.is_admin) {
        return Err(json_error(StatusCode::NOT_FOUND, "Job not found."));
    }

    if row.status != "completed" || row.files_purged_at.is_some() {
        return Err(json_error(
            StatusCode::GONE,
            "This download has expired. Files are kept for one hour.",
        ));
    }

    let (Some(output_path), Some(download_name)) = (row.output_path, row.download_name) else {
        return Err(json_error(
            StatusCode::GONE,
            "This download has expired. Files are kept for one hour.",
        ));
    };

    jobs::serve_attachment(Path::new(&output_path), &download_name, content_type)
        .await
        .map_err(|status| match status {
            StatusCode::GONE => json_error(
                StatusCode::GONE,
                "This download has expired. Files are kept for one hour.",
            ),
            other => json_error(other, "Could not read the stored file."),
        })
}

/// JavaScript shared by the tool pages: submit the form as multipart, then
/// surface either the error message or a download link.
pub(crate) const TOOL_SUBMIT_SCRIPT: &str = r#"    <script>
const form = document.getElementById('tool-form');
const statusBox = document.getElementById('submission-status');
const submitButton = form.querySelector('button[type="submit"]');

form.addEventListener('submit', async (event) => {
    event.preventDefault();
    statusBox.className = 'status-box';
    statusBox.textContent = 'Processing...';
    submitButton.disabled = true;

    try {
        const response = await fetch(form.action, {
            method: 'POST',
            body: new FormData(form),
        });
        const payload = await response.json().catch(() => null);

        if (!response.ok) {
            statusBox.className = 'status-box error';
            statusBox.textContent = (payload && payload.message) || 'The operation failed. Please try again.';
            return;
        }

        statusBox.className = 'status-box success';
        statusBox.innerHTML = `Done (${payload.page_count} pages). <a href="${payload.download_url}">Download the result</a>. Files are deleted after one hour.`;
        form.reset();
    } catch (err) {
        statusBox.className = 'status-box error';
        statusBox.textContent = 'Something went wrong while uploading. Please try again.';
    } finally {
        submitButton.disabled = false;
    }
});
    </script>"#;

/// Renders a tool page around the tool-specific form body.
pub(crate) fn render_tool_page(
    user: &AuthUser,
    descriptor: &OperationDescriptor,
    limits: &TierLimits,
    form_html: String,
) -> String {
    let tier = user.effective_tier();
    let allowance = match limits.daily_operations {
        Some(limit) => Cow::Owned(format!("{limit} operations per day")),
        None => Cow::Borrowed("unlimited operations"),
    };

    let mut nav_links = vec![
        NavLink {
            href: "/",
            label: "← Tools",
            admin: false,
        },
        NavLink {
            href: "/dashboard",
            label: "Dashboard",
            admin: false,
        },
    ];
    if user.is_admin {
        nav_links.push(NavLink {
            href: "/admin",
            label: "Admin",
            admin: true,
        });
    }

    let body = format!(
        r#"        <section class="panel">
            <h2>{label}</h2>
            <form id="tool-form" action="{path}/jobs" enctype="multipart/form-data">
{form_html}
                <button type="submit" style="margin-top: 1.5rem;">Start</button>
            </form>
            <div id="submission-status" class="status-box"></div>
            <p class="note" style="margin-top: 1rem;">Your {tier_label} plan allows files up to {max_mb}MB and {allowance}.</p>
        </section>"#,
        label = descriptor.label,
        path = descriptor.tool_path,
        form_html = form_html,
        tier_label = tier.label(),
        max_mb = limits.max_file_mb(),
        allowance = allowance,
    );

    templates::render_page(PageLayout {
        meta_title: &format!("{} · ZenPDF", descriptor.label),
        page_heading: descriptor.label,
        subtitle_html: Cow::Owned(format!(
            "{description} Signed in as <strong>{username}</strong>.",
            description = descriptor.description,
            username = escape_html(&user.username),
        )),
        nav_links,
        flash_html: Cow::Borrowed(""),
        body_html: Cow::Owned(body),
        extra_style_blocks: Vec::new(),
        body_scripts: vec![Cow::Borrowed(TOOL_SUBMIT_SCRIPT)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamped_name_uses_prefix_and_extension() {
        let name = timestamped_name("merged", "pdf");
        assert!(name.starts_with("merged_"));
        assert!(name.ends_with(".pdf"));
    }

    #[tokio::test]
    async fn discard_job_dir_tolerates_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("never-created");
        discard_job_dir(&missing).await;
    }
}
