use std::borrow::Cow;

use axum::{
    extract::State,
    response::{Html, Redirect},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::error;

use crate::{
    usage::{self, UsageRecordRow, operation_label},
    web::{
        AppState,
        auth::{self, AuthUser},
        templates::{self, NavLink, PageLayout, escape_html},
    },
};

const RECENT_ROWS: i64 = 10;

pub async fn dashboard_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Html<String>, Redirect> {
    let user = auth::require_user_redirect(&state, &jar).await?;
    let pool = state.pool();

    let today = usage::daily_count(&pool, user.id).await.unwrap_or_else(|err| {
        error!(?err, "failed to load daily usage for dashboard");
        0
    });
    let this_month = usage::monthly_count(&pool, user.id)
        .await
        .unwrap_or_else(|err| {
            error!(?err, "failed to load monthly usage for dashboard");
            0
        });
    let recent = usage::recent_for_user(&pool, user.id, RECENT_ROWS)
        .await
        .unwrap_or_else(|err| {
            error!(?err, "failed to load recent usage for dashboard");
            Vec::new()
        });

    Ok(Html(render_dashboard(
        &state, &user, today, this_month, &recent,
    )))
}

fn render_dashboard(
    state: &AppState,
    user: &AuthUser,
    today: i64,
    this_month: i64,
    recent: &[UsageRecordRow],
) -> String {
    let tier = user.effective_tier();
    let limits = state.config().limits_for(tier);
    let badge_class = if tier.is_paid() { "paid" } else { "free" };

    let daily_allowance = match limits.daily_operations {
        Some(limit) => format!("{today} of {limit} today"),
        None => format!("{today} today · unlimited"),
    };

    let rows = if recent.is_empty() {
        r#"                <tr><td colspan="5" class="note">No operations yet. Pick a tool from the front page to get started.</td></tr>"#
            .to_string()
    } else {
        recent
            .iter()
            .map(|record| {
                let outcome = if record.success {
                    r#"<span class="tier-badge paid">OK</span>"#.to_string()
                } else {
                    let reason = record
                        .error_message
                        .as_deref()
                        .map(escape_html)
                        .unwrap_or_else(|| "failed".to_string());
                    format!(r#"<span class="tier-badge free" title="{reason}">Failed</span>"#)
                };
                let size = record
                    .file_size
                    .map(format_bytes)
                    .unwrap_or_else(|| "-".to_string());
                let pages = record
                    .pages_processed
                    .map(|count| count.to_string())
                    .unwrap_or_else(|| "-".to_string());
                format!(
                    r#"                <tr>
                    <td>{label}</td>
                    <td>{size}</td>
                    <td>{pages}</td>
                    <td>{outcome}</td>
                    <td>{when}</td>
                </tr>"#,
                    label = operation_label(&record.operation_type),
                    size = size,
                    pages = pages,
                    outcome = outcome,
                    when = record.created_at.format("%Y-%m-%d %H:%M UTC"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let subscription_note = match (tier.is_paid(), user.subscription_end) {
        (true, Some(end)) => format!(
            "Your {} plan is active until {}.",
            tier.label(),
            end.format("%Y-%m-%d")
        ),
        _ => "You are on the Free plan. <a href=\"/pricing\">Upgrade</a> for bigger files and unlimited daily operations.".to_string(),
    };

    let mut nav_links = vec![
        NavLink {
            href: "/",
            label: "← Tools",
            admin: false,
        },
        NavLink {
            href: "/pricing",
            label: "Pricing",
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
            <h2>Account</h2>
            <p class="note"><strong>{username}</strong> ({email}) · <span class="tier-badge {badge_class}">{tier_label}</span></p>
            <p class="note">{subscription_note}</p>
            <p class="note">Operations: {daily_allowance} · {this_month} this month · files up to {max_mb}MB · merge up to {max_merge} files.</p>
        </section>
        <section class="panel">
            <h2>Recent activity</h2>
            <table>
                <thead>
                    <tr><th>Operation</th><th>Input size</th><th>Pages</th><th>Result</th><th>When</th></tr>
                </thead>
                <tbody>
{rows}
                </tbody>
            </table>
        </section>"#,
        username = escape_html(&user.username),
        email = escape_html(&user.email),
        badge_class = badge_class,
        tier_label = tier.label(),
        subscription_note = subscription_note,
        daily_allowance = daily_allowance,
        this_month = this_month,
        max_mb = limits.max_file_mb(),
        max_merge = limits.max_merge_files,
        rows = rows,
    );

    templates::render_page(PageLayout {
        meta_title: "Dashboard · ZenPDF",
        page_heading: "Dashboard",
        subtitle_html: Cow::Borrowed("Your usage at a glance."),
        nav_links,
        flash_html: Cow::Borrowed(""),
        body_html: Cow::Owned(body),
        extra_style_blocks: Vec::new(),
        body_scripts: Vec::new(),
    })
}

pub(crate) fn format_bytes(bytes: i64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let bytes = bytes.max(0) as f64;
    if bytes >= MIB {
        format!("{:.1} MB", bytes / MIB)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes / KIB)
    } else {
        format!("{bytes:.0} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_picks_sensible_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(-1), "0 B");
    }
}
