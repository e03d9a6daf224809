use std::borrow::Cow;

use axum::{
    extract::{Query, State},
    response::Html,
};
use axum_extra::extract::cookie::CookieJar;

use crate::{
    usage::REGISTERED_OPERATIONS,
    web::{
        AppState,
        auth::{self, AuthUser},
        templates::{self, NavLink, PageLayout, escape_html},
    },
};

#[derive(Default, serde::Deserialize)]
pub struct LandingQuery {
    pub status: Option<String>,
    pub error: Option<String>,
}

/// The front page doubles as the tool launcher once logged in; anonymous
/// visitors see the login form instead.
pub async fn landing_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<LandingQuery>,
) -> Html<String> {
    let flash = templates::compose_flash(params.status.as_deref(), params.error.as_deref());

    match auth::current_user(&state, &jar).await {
        Some(user) => Html(render_tool_launcher(&user, &flash)),
        None => Html(templates::render_login_page(&flash)),
    }
}

fn render_tool_launcher(user: &AuthUser, flash_html: &str) -> String {
    let cards = REGISTERED_OPERATIONS
        .iter()
        .map(|descriptor| {
            format!(
                r#"            <div class="tool-card">
                <h3>{label}</h3>
                <p>{description}</p>
                <a href="{path}">Open tool →</a>
            </div>"#,
                label = descriptor.label,
                description = descriptor.description,
                path = descriptor.tool_path,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let tier = user.effective_tier();
    let badge_class = if tier.is_paid() { "paid" } else { "free" };

    let mut nav_links = vec![
        NavLink {
            href: "/dashboard",
            label: "Dashboard",
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
        r#"        <section>
            <div class="tool-grid">
{cards}
            </div>
        </section>
        <section class="panel">
            <h2>Your plan</h2>
            <p class="note">Signed in as <strong>{username}</strong> · <span class="tier-badge {badge_class}">{tier_label}</span></p>
            <p class="note">Files are processed on our servers and deleted within one hour. See the <a href="/dashboard">dashboard</a> for your recent activity.</p>
            <form method="post" action="/logout" style="margin-top: 1rem;">
                <button type="submit">Log out</button>
            </form>
        </section>"#,
        cards = cards,
        username = escape_html(&user.username),
        badge_class = badge_class,
        tier_label = tier.label(),
    );

    templates::render_page(PageLayout {
        meta_title: "ZenPDF",
        page_heading: "ZenPDF",
        subtitle_html: Cow::Borrowed("Split, merge, rotate and compress PDF files."),
        nav_links,
        flash_html: Cow::Owned(flash_html.to_string()),
        body_html: Cow::Owned(body),
        extra_style_blocks: Vec::new(),
        body_scripts: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn launcher_lists_every_tool_and_escapes_username() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: "a@b.example".to_string(),
            username: "<script>".to_string(),
            is_admin: false,
            subscription_tier: "free".to_string(),
            subscription_end: None,
        };
        let html = render_tool_launcher(&user, "");
        for descriptor in REGISTERED_OPERATIONS {
            assert!(html.contains(descriptor.tool_path));
        }
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("/admin"));
    }

    #[test]
    fn launcher_shows_admin_link_for_admins() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: "admin@b.example".to_string(),
            username: "admin".to_string(),
            is_admin: true,
            subscription_tier: "enterprise".to_string(),
            subscription_end: Some(chrono::Utc::now() + chrono::Duration::days(30)),
        };
        let html = render_tool_launcher(&user, "");
        assert!(html.contains(r#"href="/admin""#));
    }
}
