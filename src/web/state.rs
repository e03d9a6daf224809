use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;
use uuid::Uuid;

use crate::{config::AppConfig, ratelimit::RateLimiter, tiers::SubscriptionTier};

#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    config: Arc<AppConfig>,
    limiter: Arc<RateLimiter>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("failed to connect to Postgres")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;

        Ok(Self {
            pool,
            config: Arc::new(config),
            limiter: Arc::new(RateLimiter::new()),
        })
    }

    /// Seeds an initial admin account when the users table has none, so a
    /// fresh deployment is reachable.
    pub async fn ensure_seed_admin(&self) -> Result<()> {
        let has_admin: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE is_admin = TRUE)")
                .fetch_one(&self.pool)
                .await
                .context("failed to verify admin presence")?;

        if !has_admin {
            let password_hash = crate::web::auth::hash_password("change-me")
                .map_err(|err| anyhow!("failed to hash seed admin password: {err}"))?;

            sqlx::query(
                "INSERT INTO users (id, email, username, password_hash, is_admin, subscription_tier) \
                 VALUES ($1, $2, $3, $4, TRUE, $5)",
            )
            .bind(Uuid::new_v4())
            .bind("admin@zenpdf.local")
            .bind("admin")
            .bind(password_hash)
            .bind(SubscriptionTier::Enterprise.as_str())
            .execute(&self.pool)
            .await
            .context("failed to insert seed admin user")?;

            info!("Seeded default admin user 'admin' (password: 'change-me'). Update it promptly.");
        }

        Ok(())
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    pub fn pool_ref(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}
