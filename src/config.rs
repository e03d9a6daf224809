use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};

use crate::tiers::SubscriptionTier;

const DEFAULT_STORAGE_ROOT: &str = "storage";
const DEFAULT_CLEANUP_INTERVAL_MINUTES: i64 = 15;
const DEFAULT_FILE_RETENTION_HOURS: i64 = 1;

const MAX_FILE_BYTES_FREE: u64 = 10 * 1024 * 1024;
const MAX_FILE_BYTES_PREMIUM: u64 = 100 * 1024 * 1024;
const MAX_MERGE_FILES_FREE: usize = 5;
const MAX_MERGE_FILES_PREMIUM: usize = 20;
const DAILY_OPERATION_LIMIT_FREE: i64 = 5;

/// Per-tier operational limits.
#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    pub max_file_bytes: u64,
    pub max_merge_files: usize,
    /// `None` means unlimited.
    pub daily_operations: Option<i64>,
}

impl TierLimits {
    pub fn max_file_mb(&self) -> u64 {
        self.max_file_bytes / (1024 * 1024)
    }
}

/// Named sliding-window rate limit.
#[derive(Debug, Clone, Copy)]
pub struct RateRule {
    pub name: &'static str,
    pub max: usize,
    pub window: Duration,
}

/// 30 PDF operations per hour, the per-route limit of the original service.
pub const RATE_PDF_OPERATIONS: RateRule = RateRule {
    name: "pdf-ops",
    max: 30,
    window: Duration::from_secs(60 * 60),
};

/// Global per-principal ceilings applied to all authenticated traffic.
pub const RATE_GLOBAL_HOURLY: RateRule = RateRule {
    name: "global-hour",
    max: 50,
    window: Duration::from_secs(60 * 60),
};

pub const RATE_GLOBAL_DAILY: RateRule = RateRule {
    name: "global-day",
    max: 200,
    window: Duration::from_secs(24 * 60 * 60),
};

/// Process-wide configuration, loaded once at startup from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub storage_root: PathBuf,
    pub cleanup_interval: Duration,
    pub file_retention_hours: i64,
    free_limits: TierLimits,
    paid_limits: TierLimits,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL env var is missing")?;

        let port = match env::var("PORT") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {value}"))?,
            Err(_) => 8080,
        };

        let storage_root = env::var("STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORAGE_ROOT));

        let file_retention_hours =
            optional_env_i64("FILE_RETENTION_HOURS")?.unwrap_or(DEFAULT_FILE_RETENTION_HOURS);
        if file_retention_hours < 1 {
            bail!("FILE_RETENTION_HOURS must be at least 1");
        }

        let cleanup_minutes = optional_env_i64("CLEANUP_INTERVAL_MINUTES")?
            .unwrap_or(DEFAULT_CLEANUP_INTERVAL_MINUTES);
        if cleanup_minutes < 1 {
            bail!("CLEANUP_INTERVAL_MINUTES must be at least 1");
        }

        Ok(Self {
            database_url,
            port,
            storage_root,
            cleanup_interval: Duration::from_secs(cleanup_minutes as u64 * 60),
            file_retention_hours,
            free_limits: TierLimits {
                max_file_bytes: MAX_FILE_BYTES_FREE,
                max_merge_files: MAX_MERGE_FILES_FREE,
                daily_operations: Some(DAILY_OPERATION_LIMIT_FREE),
            },
            paid_limits: TierLimits {
                max_file_bytes: MAX_FILE_BYTES_PREMIUM,
                max_merge_files: MAX_MERGE_FILES_PREMIUM,
                daily_operations: None,
            },
        })
    }

    /// Limits for a tier. Callers decide whether a paid subscription is
    /// actually active; lapsed subscriptions should pass `Free`.
    pub fn limits_for(&self, tier: SubscriptionTier) -> TierLimits {
        if tier.is_paid() {
            self.paid_limits
        } else {
            self.free_limits
        }
    }

    /// Directory holding the per-job working directories of one tool.
    pub fn operation_root(&self, operation: &str) -> PathBuf {
        self.storage_root.join(operation)
    }

    #[cfg(test)]
    pub fn for_tests(storage_root: PathBuf) -> Self {
        Self {
            database_url: String::new(),
            port: 0,
            storage_root,
            cleanup_interval: Duration::from_secs(900),
            file_retention_hours: DEFAULT_FILE_RETENTION_HOURS,
            free_limits: TierLimits {
                max_file_bytes: MAX_FILE_BYTES_FREE,
                max_merge_files: MAX_MERGE_FILES_FREE,
                daily_operations: Some(DAILY_OPERATION_LIMIT_FREE),
            },
            paid_limits: TierLimits {
                max_file_bytes: MAX_FILE_BYTES_PREMIUM,
                max_merge_files: MAX_MERGE_FILES_PREMIUM,
                daily_operations: None,
            },
        }
    }
}

fn optional_env_i64(name: &str) -> Result<Option<i64>> {
    match env::var(name) {
        Ok(value) => {
            let parsed = value
                .trim()
                .parse()
                .with_context(|| format!("{name} is not a valid integer: {value}"))?;
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paid_tiers_share_the_premium_limits() {
        let config = AppConfig::for_tests(PathBuf::from("storage"));

        let premium = config.limits_for(SubscriptionTier::Premium);
        let enterprise = config.limits_for(SubscriptionTier::Enterprise);
        assert_eq!(premium.max_file_bytes, enterprise.max_file_bytes);
        assert!(premium.daily_operations.is_none());

        let free = config.limits_for(SubscriptionTier::Free);
        assert_eq!(free.daily_operations, Some(DAILY_OPERATION_LIMIT_FREE));
        assert_eq!(free.max_file_mb(), 10);
    }

    #[test]
    fn operation_root_nests_under_storage() {
        let config = AppConfig::for_tests(PathBuf::from("storage"));
        assert_eq!(config.operation_root("split"), PathBuf::from("storage/split"));
    }
}
