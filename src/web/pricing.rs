use std::borrow::Cow;

use axum::{extract::State, response::Html};
use axum_extra::extract::cookie::CookieJar;

use crate::web::{
    AppState, auth,
    templates::{self, NavLink, PageLayout},
};

/// Public plan comparison page. Payment is handled out of band; admins
/// assign paid tiers from the admin panel.
pub async fn pricing_page(State(state): State<AppState>, jar: CookieJar) -> Html<String> {
    let user = auth::current_user(&state, &jar).await;

    let nav_links = if user.is_some() {
        vec![
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
        ]
    } else {
        vec![
            NavLink {
                href: "/login",
                label: "Log in",
                admin: false,
            },
            NavLink {
                href: "/register",
                label: "Register",
                admin: false,
            },
        ]
    };

    let body = r#"        <section class="panel">
            <h2>Plans</h2>
            <table>
                <thead>
                    <tr><th></th><th>Free</th><th>Premium</th><th>Enterprise</th></tr>
                </thead>
                <tbody>
                    <tr><td>Price</td><td>$0</td><td>$9.99 / month</td><td>Contact us</td></tr>
                    <tr><td>Max file size</td><td>10MB</td><td>100MB</td><td>100MB</td></tr>
                    <tr><td>Operations per day</td><td>5</td><td>Unlimited</td><td>Unlimited</td></tr>
                    <tr><td>Merge files per job</td><td>5</td><td>20</td><td>20</td></tr>
                    <tr><td>Split, rotate, compress</td><td>✓</td><td>✓</td><td>✓</td></tr>
                    <tr><td>Priority support</td><td>—</td><td>✓</td><td>✓</td></tr>
                </tbody>
            </table>
            <p class="note" style="margin-top: 1.5rem;">To upgrade, contact <a href="mailto:support@zenpdf.example">support@zenpdf.example</a>. Subscriptions run for one year from activation.</p>
        </section>"#;

    Html(templates::render_page(PageLayout {
        meta_title: "Pricing · ZenPDF",
        page_heading: "Pricing",
        subtitle_html: Cow::Borrowed("Simple plans for every workload."),
        nav_links,
        flash_html: Cow::Borrowed(""),
        body_html: Cow::Borrowed(body),
        extra_style_blocks: Vec::new(),
        body_scripts: Vec::new(),
    }))
}
