use axum::{
    Json, Router,
    http::{StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use crate::{
    modules,
    web::{AppState, admin, auth, dashboard, landing, limits, pricing},
};

const ROBOTS_TXT_BODY: &str = include_str!("../../robots.txt");

pub fn build_router(state: AppState) -> Router {
    // Routes added after the rate-limit layer (health probe, version,
    // robots.txt) are exempt from the global ceilings.
    Router::new()
        .route("/", get(landing::landing_page))
        .route("/login", get(auth::login_page).post(auth::process_login))
        .route(
            "/register",
            get(auth::register_page).post(auth::process_register),
        )
        .route("/logout", post(auth::logout))
        .route("/pricing", get(pricing::pricing_page))
        .route("/dashboard", get(dashboard::dashboard_page))
        .route("/admin", get(admin::admin_page))
        .route("/admin/users/active", post(admin::users::toggle_active))
        .route("/admin/users/admin", post(admin::users::toggle_admin))
        .route("/admin/users/tier", post(admin::users::update_tier))
        .merge(modules::split::router())
        .merge(modules::merge::router())
        .merge(modules::rotate::router())
        .merge(modules::compress::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            limits::global_rate_limit,
        ))
        .route("/healthz", get(healthz))
        .route("/version", get(version))
        .route("/robots.txt", get(robots_txt))
        .with_state(state)
}

async fn robots_txt() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        ROBOTS_TXT_BODY,
    )
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

async fn version() -> impl IntoResponse {
    Json(json!({
        "name": "ZenPDF",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}
