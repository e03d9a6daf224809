use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::{
    Json,
    extract::{Form, State},
    http::{HeaderMap, StatusCode},
    response::{Html, Redirect},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cookie::time::Duration as CookieDuration;
use rand_core::OsRng;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::{
    tiers::SubscriptionTier,
    usage::RequestContext,
    web::{ApiMessage, AppState, json_error, templates},
};

pub const SESSION_COOKIE: &str = "auth_token";
pub const SESSION_TTL_DAYS: i64 = 7;

const MIN_PASSWORD_LENGTH: usize = 8;
const MIN_USERNAME_LENGTH: usize = 3;

#[derive(Clone, sqlx::FromRow)]
pub struct DbUserAuth {
    pub id: Uuid,
    pub password_hash: String,
    pub is_active: bool,
}

/// The authenticated user as seen by request handlers.
#[derive(Clone, sqlx::FromRow)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub is_admin: bool,
    pub subscription_tier: String,
    pub subscription_end: Option<DateTime<Utc>>,
}

impl AuthUser {
    /// The tier the account claims. Unknown strings degrade to free rather
    /// than erroring, matching how the original treated bad tier values.
    pub fn tier(&self) -> SubscriptionTier {
        SubscriptionTier::from_str(&self.subscription_tier).unwrap_or(SubscriptionTier::Free)
    }

    /// A paid tier only grants its benefits while the subscription window is
    /// open.
    pub fn effective_tier(&self) -> SubscriptionTier {
        let tier = self.tier();
        if !tier.is_paid() {
            return SubscriptionTier::Free;
        }
        match self.subscription_end {
            Some(end) if end > Utc::now() => tier,
            _ => SubscriptionTier::Free,
        }
    }
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Default, Deserialize)]
pub struct AuthPageQuery {
    pub status: Option<String>,
    pub error: Option<String>,
}

pub async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
    axum::extract::Query(params): axum::extract::Query<AuthPageQuery>,
) -> Result<Html<String>, Redirect> {
    if let Some(redirect) = redirect_if_authenticated(&state, &jar).await {
        return Err(redirect);
    }

    let flash = templates::compose_flash(params.status.as_deref(), params.error.as_deref());
    Ok(Html(templates::render_login_page(&flash)))
}

pub async fn process_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Redirect), Redirect> {
    let email = form.email.trim().to_ascii_lowercase();
    let pool = state.pool();

    let user = match fetch_user_auth_by_email(&pool, &email).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(Redirect::to("/login?error=invalid_credentials")),
        Err(err) => {
            error!(?err, "failed to fetch user during login");
            return Err(Redirect::to("/login?error=server"));
        }
    };

    if !verify_password(&form.password, &user.password_hash) {
        return Err(Redirect::to("/login?error=invalid_credentials"));
    }

    if !user.is_active {
        return Err(Redirect::to("/login?error=deactivated"));
    }

    let session_token = Uuid::new_v4();
    let expires_at = Utc::now() + ChronoDuration::days(SESSION_TTL_DAYS);

    if let Err(err) =
        sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_token)
            .bind(user.id)
            .bind(expires_at)
            .execute(state.pool_ref())
            .await
    {
        error!(?err, "failed to create session");
        return Err(Redirect::to("/login?error=server"));
    }

    if let Err(err) = sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
        .bind(user.id)
        .execute(state.pool_ref())
        .await
    {
        error!(?err, "failed to stamp last login");
    }

    let mut cookie = Cookie::new(SESSION_COOKIE, session_token.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::days(SESSION_TTL_DAYS));

    let jar = jar.add(cookie);
    Ok((jar, Redirect::to("/dashboard")))
}

pub async fn register_page(
    State(state): State<AppState>,
    jar: CookieJar,
    axum::extract::Query(params): axum::extract::Query<AuthPageQuery>,
) -> Result<Html<String>, Redirect> {
    if let Some(redirect) = redirect_if_authenticated(&state, &jar).await {
        return Err(redirect);
    }

    let flash = templates::compose_flash(params.status.as_deref(), params.error.as_deref());
    Ok(Html(templates::render_register_page(&flash)))
}

pub async fn process_register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Redirect {
    let email = form.email.trim().to_ascii_lowercase();
    let username = form.username.trim().to_string();

    if email.is_empty() || !email.contains('@') {
        return Redirect::to("/register?error=invalid_email");
    }
    if username.len() < MIN_USERNAME_LENGTH {
        return Redirect::to("/register?error=short_username");
    }
    if form.password.len() < MIN_PASSWORD_LENGTH {
        return Redirect::to("/register?error=short_password");
    }
    if form.password != form.confirm_password {
        return Redirect::to("/register?error=password_mismatch");
    }

    let password_hash = match hash_password(&form.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!(?err, "failed to hash password during registration");
            return Redirect::to("/register?error=server");
        }
    };

    let result = sqlx::query(
        "INSERT INTO users (id, email, username, password_hash, subscription_tier) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(&username)
    .bind(password_hash)
    .bind(SubscriptionTier::Free.as_str())
    .execute(state.pool_ref())
    .await;

    match result {
        Ok(_) => Redirect::to("/login?status=registered"),
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
            Redirect::to("/register?error=duplicate")
        }
        Err(err) => {
            error!(?err, "failed to create user account");
            Redirect::to("/register?error=server")
        }
    }
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    let mut jar = jar;

    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Ok(token) = Uuid::parse_str(cookie.value()) {
            if let Err(err) = sqlx::query("DELETE FROM sessions WHERE id = $1")
                .bind(token)
                .execute(state.pool_ref())
                .await
            {
                error!(?err, "failed to remove session during logout");
            }
        }
    }

    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    removal.set_http_only(true);
    removal.set_same_site(SameSite::Lax);
    removal.set_max_age(CookieDuration::seconds(0));
    jar = jar.remove(removal);

    (jar, Redirect::to("/?status=logged_out"))
}

/// Resolves the session cookie to a user, if any. Deactivated accounts and
/// expired sessions resolve to `None`.
pub async fn current_user(state: &AppState, jar: &CookieJar) -> Option<AuthUser> {
    let token_cookie = jar.get(SESSION_COOKIE)?;
    let token = Uuid::parse_str(token_cookie.value()).ok()?;

    match fetch_user_by_session(state.pool_ref(), token).await {
        Ok(user) => user,
        Err(err) => {
            error!(?err, "failed to resolve session");
            None
        }
    }
}

/// Page guard: redirects anonymous visitors to the login page.
pub async fn require_user_redirect(state: &AppState, jar: &CookieJar) -> Result<AuthUser, Redirect> {
    current_user(state, jar)
        .await
        .ok_or_else(|| Redirect::to("/login"))
}

/// API guard: anonymous requests get a 401 JSON payload.
pub async fn require_user_json(
    state: &AppState,
    jar: &CookieJar,
) -> Result<AuthUser, (StatusCode, Json<ApiMessage>)> {
    current_user(state, jar).await.ok_or_else(|| {
        json_error(
            StatusCode::UNAUTHORIZED,
            "Please log in to use this feature.",
        )
    })
}

pub async fn redirect_if_authenticated(state: &AppState, jar: &CookieJar) -> Option<Redirect> {
    current_user(state, jar)
        .await
        .map(|_| Redirect::to("/dashboard"))
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

pub async fn fetch_user_auth_by_email(
    pool: &PgPool,
    email: &str,
) -> sqlx::Result<Option<DbUserAuth>> {
    sqlx::query_as::<_, DbUserAuth>(
        "SELECT id, password_hash, is_active FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_user_by_session(pool: &PgPool, token: Uuid) -> sqlx::Result<Option<AuthUser>> {
    sqlx::query_as::<_, AuthUser>(
        "SELECT users.id, users.email, users.username, users.is_admin, \
                users.subscription_tier, users.subscription_end \
         FROM sessions JOIN users ON users.id = sessions.user_id \
         WHERE sessions.id = $1 AND sessions.expires_at > NOW() AND users.is_active",
    )
    .bind(token)
    .fetch_optional(pool)
    .await
}

/// Extracts client IP and user agent from proxy headers for the usage log
/// and as the anonymous rate-limit principal.
pub fn request_context(headers: &HeaderMap) -> RequestContext {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_string())
        });

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    RequestContext {
        ip_address,
        user_agent,
    }
}

/// Rate-limit principal: the user id when authenticated, the client IP
/// otherwise.
pub fn principal_key(user: Option<&AuthUser>, context: &RequestContext) -> String {
    match user {
        Some(user) => format!("user:{}", user.id),
        None => format!(
            "ip:{}",
            context.ip_address.as_deref().unwrap_or("unknown")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(tier: &str, end: Option<DateTime<Utc>>) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            username: "user".to_string(),
            is_admin: false,
            subscription_tier: tier.to_string(),
            subscription_end: end,
        }
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let hash = hash_password("correct horse battery staple").expect("hash");
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn lapsed_premium_degrades_to_free() {
        let lapsed = user_with("premium", Some(Utc::now() - ChronoDuration::days(1)));
        assert_eq!(lapsed.effective_tier(), SubscriptionTier::Free);

        let active = user_with("premium", Some(Utc::now() + ChronoDuration::days(30)));
        assert_eq!(active.effective_tier(), SubscriptionTier::Premium);

        let no_end = user_with("premium", None);
        assert_eq!(no_end.effective_tier(), SubscriptionTier::Free);
    }

    #[test]
    fn unknown_tier_string_is_treated_as_free() {
        let user = user_with("platinum", None);
        assert_eq!(user.tier(), SubscriptionTier::Free);
    }

    #[test]
    fn principal_key_prefers_user_id() {
        let user = user_with("free", None);
        let context = RequestContext {
            ip_address: Some("203.0.113.9".to_string()),
            user_agent: None,
        };
        assert_eq!(
            principal_key(Some(&user), &context),
            format!("user:{}", user.id)
        );
        assert_eq!(principal_key(None, &context), "ip:203.0.113.9");
    }
}
