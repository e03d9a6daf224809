use std::borrow::Cow;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    response::{Html, Redirect},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::{
    tiers::SubscriptionTier,
    usage::operation_label,
    web::{
        AppState,
        auth::{self, AuthUser},
        dashboard::format_bytes,
        templates::{self, NavLink, PageLayout, escape_html},
    },
};

pub mod users;

const RECENT_OPERATIONS: i64 = 20;

/// Admin guard layered on top of the session guard.
pub async fn require_admin_user(
    state: &AppState,
    jar: &CookieJar,
) -> Result<AuthUser, Redirect> {
    let user = auth::require_user_redirect(state, jar).await?;
    if !user.is_admin {
        return Err(Redirect::to("/"));
    }
    Ok(user)
}

#[derive(Default, serde::Deserialize)]
pub struct AdminPageQuery {
    pub status: Option<String>,
    pub error: Option<String>,
}

#[derive(sqlx::FromRow)]
struct AdminUserRow {
    id: Uuid,
    email: String,
    username: String,
    is_active: bool,
    is_admin: bool,
    subscription_tier: String,
    subscription_end: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AdminUsageRow {
    username: String,
    operation_type: String,
    file_size: Option<i64>,
    success: bool,
    created_at: DateTime<Utc>,
}

struct SiteStats {
    total_users: i64,
    active_users: i64,
    paid_users: i64,
    total_operations: i64,
    operations_today: i64,
}

pub async fn admin_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<AdminPageQuery>,
) -> Result<Html<String>, Redirect> {
    let admin = require_admin_user(&state, &jar).await?;
    let pool = state.pool();

    let stats = match load_site_stats(&pool).await {
        Ok(stats) => stats,
        Err(err) => {
            error!(?err, "failed to load admin statistics");
            return Err(Redirect::to("/?error=server"));
        }
    };

    let users = match load_users(&pool).await {
        Ok(users) => users,
        Err(err) => {
            error!(?err, "failed to load user list");
            return Err(Redirect::to("/?error=server"));
        }
    };

    let recent = match load_recent_operations(&pool).await {
        Ok(rows) => rows,
        Err(err) => {
            error!(?err, "failed to load recent operations");
            return Err(Redirect::to("/?error=server"));
        }
    };

    let flash = templates::compose_flash(params.status.as_deref(), params.error.as_deref());
    Ok(Html(render_admin_page(&admin, &stats, &users, &recent, &flash)))
}

async fn load_site_stats(pool: &PgPool) -> Result<SiteStats> {
    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
        .context("count users")?;
    let active_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_active")
        .fetch_one(pool)
        .await
        .context("count active users")?;
    let paid_users: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE subscription_tier <> 'free' \
         AND subscription_end IS NOT NULL AND subscription_end > NOW()",
    )
    .fetch_one(pool)
    .await
    .context("count paid users")?;
    let total_operations: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM usage_records WHERE success")
            .fetch_one(pool)
            .await
            .context("count operations")?;
    let operations_today: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM usage_records WHERE success \
         AND created_at >= date_trunc('day', NOW())",
    )
    .fetch_one(pool)
    .await
    .context("count today's operations")?;

    Ok(SiteStats {
        total_users,
        active_users,
        paid_users,
        total_operations,
        operations_today,
    })
}

async fn load_users(pool: &PgPool) -> Result<Vec<AdminUserRow>> {
    sqlx::query_as::<_, AdminUserRow>(
        "SELECT id, email, username, is_active, is_admin, subscription_tier, \
                subscription_end, created_at \
         FROM users ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await
    .context("load user list")
}

async fn load_recent_operations(pool: &PgPool) -> Result<Vec<AdminUsageRow>> {
    sqlx::query_as::<_, AdminUsageRow>(
        "SELECT users.username, usage_records.operation_type, usage_records.file_size, \
                usage_records.success, usage_records.created_at \
         FROM usage_records JOIN users ON users.id = usage_records.user_id \
         ORDER BY usage_records.created_at DESC LIMIT $1",
    )
    .bind(RECENT_OPERATIONS)
    .fetch_all(pool)
    .await
    .context("load recent operations")
}

fn render_admin_page(
    admin: &AuthUser,
    stats: &SiteStats,
    users: &[AdminUserRow],
    recent: &[AdminUsageRow],
    flash_html: &str,
) -> String {
    let user_rows = users
        .iter()
        .map(|user| {
            let tier = SubscriptionTier::from_str(&user.subscription_tier)
                .unwrap_or(SubscriptionTier::Free);
            let tier_cell = match (tier.is_paid(), user.subscription_end) {
                (true, Some(end)) => {
                    format!("{} until {}", tier.label(), end.format("%Y-%m-%d"))
                }
                _ => tier.label().to_string(),
            };
            let active_label = if user.is_active { "Deactivate" } else { "Activate" };
            let admin_label = if user.is_admin { "Revoke admin" } else { "Make admin" };
            let tier_options = [
                SubscriptionTier::Free,
                SubscriptionTier::Premium,
                SubscriptionTier::Enterprise,
            ]
            .iter()
            .map(|candidate| {
                let selected = if *candidate == tier { " selected" } else { "" };
                format!(
                    r#"<option value="{value}"{selected}>{label}</option>"#,
                    value = candidate.as_str(),
                    label = candidate.label(),
                )
            })
            .collect::<Vec<_>>()
            .join("");

            format!(
                r#"                <tr>
                    <td>{username}<br><span class="note">{email}</span></td>
                    <td>{tier_cell}</td>
                    <td>{active}{admin_tag}</td>
                    <td>{joined}</td>
                    <td class="actions">
                        <form method="post" action="/admin/users/active"><input type="hidden" name="user_id" value="{id}"><button type="submit" class="secondary">{active_label}</button></form>
                        <form method="post" action="/admin/users/admin"><input type="hidden" name="user_id" value="{id}"><button type="submit" class="secondary">{admin_label}</button></form>
                        <form method="post" action="/admin/users/tier"><input type="hidden" name="user_id" value="{id}"><select name="tier">{tier_options}</select><button type="submit">Set tier</button></form>
                    </td>
                </tr>"#,
                username = escape_html(&user.username),
                email = escape_html(&user.email),
                tier_cell = tier_cell,
                active = if user.is_active { "Active" } else { "Deactivated" },
                admin_tag = if user.is_admin { " · Admin" } else { "" },
                joined = user.created_at.format("%Y-%m-%d"),
                id = user.id,
                active_label = active_label,
                admin_label = admin_label,
                tier_options = tier_options,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let recent_rows = if recent.is_empty() {
        r#"                <tr><td colspan="5" class="note">No operations recorded yet.</td></tr>"#.to_string()
    } else {
        recent
            .iter()
            .map(|row| {
                format!(
                    r#"                <tr>
                    <td>{username}</td>
                    <td>{label}</td>
                    <td>{size}</td>
                    <td>{result}</td>
                    <td>{when}</td>
                </tr>"#,
                    username = escape_html(&row.username),
                    label = operation_label(&row.operation_type),
                    size = row
                        .file_size
                        .map(format_bytes)
                        .unwrap_or_else(|| "-".to_string()),
                    result = if row.success { "OK" } else { "Failed" },
                    when = row.created_at.format("%Y-%m-%d %H:%M UTC"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let body = format!(
        r#"        <section class="panel">
            <h2>Overview</h2>
            <p class="note">{total_users} accounts · {active_users} active · {paid_users} on paid plans · {total_operations} operations all time · {operations_today} today</p>
        </section>
        <section class="panel">
            <h2>Users</h2>
            <table>
                <thead>
                    <tr><th>Account</th><th>Plan</th><th>Status</th><th>Joined</th><th>Actions</th></tr>
                </thead>
                <tbody>
{user_rows}
                </tbody>
            </table>
        </section>
        <section class="panel">
            <h2>Recent operations</h2>
            <table>
                <thead>
                    <tr><th>User</th><th>Operation</th><th>Input size</th><th>Result</th><th>When</th></tr>
                </thead>
                <tbody>
{recent_rows}
                </tbody>
            </table>
        </section>"#,
        total_users = stats.total_users,
        active_users = stats.active_users,
        paid_users = stats.paid_users,
        total_operations = stats.total_operations,
        operations_today = stats.operations_today,
        user_rows = user_rows,
        recent_rows = recent_rows,
    );

    let extra_styles = Cow::Borrowed(
        r#"
        .actions { display: flex; flex-direction: column; gap: 0.4rem; }
        .actions form { display: flex; gap: 0.4rem; align-items: center; margin: 0; }
        .actions button { padding: 0.4rem 0.7rem; font-size: 0.85rem; }
        .actions button.secondary { background: #e2e8f0; color: #0f172a; }
        .actions button.secondary:hover { background: #cbd5f5; }
        .actions select { width: auto; padding: 0.4rem; }
"#,
    );

    templates::render_page(PageLayout {
        meta_title: "Admin · ZenPDF",
        page_heading: "Admin panel",
        subtitle_html: Cow::Owned(format!(
            "Signed in as {}.",
            escape_html(&admin.username)
        )),
        nav_links: vec![
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
        ],
        flash_html: Cow::Owned(flash_html.to_string()),
        body_html: Cow::Owned(body),
        extra_style_blocks: vec![extra_styles],
        body_scripts: Vec::new(),
    })
}
