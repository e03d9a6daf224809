//! Site-wide request ceilings. Every routed request passes through the
//! middleware here before its handler runs; per-tool limits stay with the
//! job endpoints.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::{
    config::{RATE_GLOBAL_DAILY, RATE_GLOBAL_HOURLY},
    ratelimit::{RateLimited, RateLimiter},
    web::{AppState, auth, json_error},
};

/// Counts one request against the global ceilings for `key`.
pub fn enforce_global_limits(limiter: &RateLimiter, key: &str) -> Result<(), RateLimited> {
    limiter.check_all(key, &[RATE_GLOBAL_DAILY, RATE_GLOBAL_HOURLY])
}

/// Applies the global per-principal ceilings to every request. The principal
/// is the session user when one is present and the client IP otherwise, so
/// login and registration attempts are throttled per address.
pub async fn global_rate_limit(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let context = auth::request_context(request.headers());
    let user = auth::current_user(&state, &jar).await;
    let key = auth::principal_key(user.as_ref(), &context);

    if let Err(limited) = enforce_global_limits(state.rate_limiter(), &key) {
        return json_error(StatusCode::TOO_MANY_REQUESTS, limited.message()).into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_principal_hits_the_hourly_ceiling() {
        let limiter = RateLimiter::new();

        for _ in 0..RATE_GLOBAL_HOURLY.max {
            assert!(enforce_global_limits(&limiter, "ip:203.0.113.9").is_ok());
        }
        let rejected = enforce_global_limits(&limiter, "ip:203.0.113.9").unwrap_err();
        assert_eq!(rejected.rule_name, RATE_GLOBAL_HOURLY.name);

        // A different address is unaffected.
        assert!(enforce_global_limits(&limiter, "ip:198.51.100.4").is_ok());
    }
}
