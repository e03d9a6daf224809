use axum::{
    extract::{Form, State},
    response::Redirect,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::{
    tiers::SubscriptionTier,
    web::{AppState, admin::require_admin_user},
};

const SUBSCRIPTION_DAYS: i64 = 365;

#[derive(Deserialize)]
pub struct UserTargetForm {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct UpdateTierForm {
    pub user_id: Uuid,
    pub tier: String,
}

pub async fn toggle_active(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<UserTargetForm>,
) -> Result<Redirect, Redirect> {
    require_admin_user(&state, &jar).await?;

    let result = sqlx::query("UPDATE users SET is_active = NOT is_active WHERE id = $1")
        .bind(form.user_id)
        .execute(state.pool_ref())
        .await;

    Ok(match result {
        Ok(outcome) if outcome.rows_affected() > 0 => {
            Redirect::to("/admin?status=user_updated")
        }
        Ok(_) => Redirect::to("/admin?error=unknown_user"),
        Err(err) => {
            error!(?err, "failed to toggle account state");
            Redirect::to("/admin?error=server")
        }
    })
}

pub async fn toggle_admin(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<UserTargetForm>,
) -> Result<Redirect, Redirect> {
    let admin = require_admin_user(&state, &jar).await?;

    // Removing your own admin flag requires a second admin.
    if form.user_id == admin.id {
        return Ok(Redirect::to("/admin?error=cannot_demote_self"));
    }

    let result = sqlx::query("UPDATE users SET is_admin = NOT is_admin WHERE id = $1")
        .bind(form.user_id)
        .execute(state.pool_ref())
        .await;

    Ok(match result {
        Ok(outcome) if outcome.rows_affected() > 0 => {
            Redirect::to("/admin?status=user_updated")
        }
        Ok(_) => Redirect::to("/admin?error=unknown_user"),
        Err(err) => {
            error!(?err, "failed to toggle admin flag");
            Redirect::to("/admin?error=server")
        }
    })
}

/// Assigns a tier. Paid tiers open a one-year subscription window starting
/// now; switching to free clears the window.
pub async fn update_tier(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<UpdateTierForm>,
) -> Result<Redirect, Redirect> {
    require_admin_user(&state, &jar).await?;

    let Some(tier) = SubscriptionTier::from_str(&form.tier) else {
        return Ok(Redirect::to("/admin?error=invalid_tier"));
    };

    let result = if tier.is_paid() {
        sqlx::query(
            "UPDATE users SET subscription_tier = $1, subscription_start = NOW(), \
             subscription_end = NOW() + make_interval(days => $2) WHERE id = $3",
        )
        .bind(tier.as_str())
        .bind(SUBSCRIPTION_DAYS as i32)
        .bind(form.user_id)
        .execute(state.pool_ref())
        .await
    } else {
        sqlx::query(
            "UPDATE users SET subscription_tier = $1, subscription_start = NULL, \
             subscription_end = NULL WHERE id = $2",
        )
        .bind(tier.as_str())
        .bind(form.user_id)
        .execute(state.pool_ref())
        .await
    };

    Ok(match result {
        Ok(outcome) if outcome.rows_affected() > 0 => {
            Redirect::to("/admin?status=tier_updated")
        }
        Ok(_) => Redirect::to("/admin?error=unknown_user"),
        Err(err) => {
            error!(?err, "failed to update subscription tier");
            Redirect::to("/admin?error=server")
        }
    })
}
