use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::web::auth::AuthUser;

pub const OP_SPLIT: &str = "split";
pub const OP_MERGE: &str = "merge";
pub const OP_ROTATE: &str = "rotate";
pub const OP_COMPRESS: &str = "compress";

/// Human readable metadata for the registered tools, driving the landing
/// page and dashboard labels.
pub struct OperationDescriptor {
    pub key: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub tool_path: &'static str,
}

pub const REGISTERED_OPERATIONS: &[OperationDescriptor] = &[
    OperationDescriptor {
        key: OP_SPLIT,
        label: "Split PDF",
        description: "Extract pages from a PDF into separate files, downloaded as a ZIP archive.",
        tool_path: "/tools/split",
    },
    OperationDescriptor {
        key: OP_MERGE,
        label: "Merge PDFs",
        description: "Combine multiple PDF files into a single document, in the order you choose.",
        tool_path: "/tools/merge",
    },
    OperationDescriptor {
        key: OP_ROTATE,
        label: "Rotate PDF",
        description: "Rotate all, even or odd pages by 90, 180 or 270 degrees.",
        tool_path: "/tools/rotate",
    },
    OperationDescriptor {
        key: OP_COMPRESS,
        label: "Compress PDF",
        description: "Recompress page content streams to reduce file size.",
        tool_path: "/tools/compress",
    },
];

pub fn descriptor(key: &str) -> &'static OperationDescriptor {
    REGISTERED_OPERATIONS
        .iter()
        .find(|descriptor| descriptor.key == key)
        .unwrap_or(&REGISTERED_OPERATIONS[0])
}

pub fn operation_label(key: &str) -> &str {
    REGISTERED_OPERATIONS
        .iter()
        .find(|descriptor| descriptor.key == key)
        .map(|descriptor| descriptor.label)
        .unwrap_or(key)
}

/// One row of the usage log, as shown on the dashboard and admin panel.
#[derive(Clone, sqlx::FromRow)]
pub struct UsageRecordRow {
    pub operation_type: String,
    pub file_size: Option<i64>,
    pub pages_processed: Option<i32>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request-scoped context recorded with every usage row.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug)]
pub enum QuotaErrorKind {
    DailyExceeded { used: i64, limit: i64 },
    Backend,
}

#[derive(Debug)]
pub struct QuotaError {
    pub kind: QuotaErrorKind,
}

impl QuotaError {
    pub fn message(&self) -> String {
        match &self.kind {
            QuotaErrorKind::DailyExceeded { used, limit } => format!(
                "Daily limit reached ({used}/{limit} operations). Upgrade to Premium for unlimited access."
            ),
            QuotaErrorKind::Backend => {
                "Could not verify your usage quota. Please try again later.".to_string()
            }
        }
    }
}

/// Rejects the request when the user's tier has a daily cap and today's
/// successful operations already meet it. Failed operations are not counted;
/// a bad upload should not burn quota.
pub async fn ensure_within_quota(
    pool: &PgPool,
    user: &AuthUser,
    limit: Option<i64>,
) -> Result<(), QuotaError> {
    let Some(limit) = limit else {
        return Ok(());
    };

    let used = match daily_count(pool, user.id).await {
        Ok(count) => count,
        Err(err) => {
            error!(?err, "failed to load daily usage count");
            return Err(QuotaError {
                kind: QuotaErrorKind::Backend,
            });
        }
    };

    if used >= limit {
        return Err(QuotaError {
            kind: QuotaErrorKind::DailyExceeded { used, limit },
        });
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn record_usage(
    pool: &PgPool,
    user_id: Uuid,
    operation_type: &str,
    file_size: Option<i64>,
    pages_processed: Option<i32>,
    context: &RequestContext,
    success: bool,
    error_message: Option<&str>,
) -> Result<()> {
    // The column caps user agents at 255 chars, same as the original schema.
    let user_agent = context
        .user_agent
        .as_deref()
        .map(|agent| agent.chars().take(255).collect::<String>());

    sqlx::query(
        "INSERT INTO usage_records \
         (id, user_id, operation_type, file_size, pages_processed, ip_address, user_agent, success, error_message) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(operation_type)
    .bind(file_size)
    .bind(pages_processed)
    .bind(context.ip_address.as_deref())
    .bind(user_agent)
    .bind(success)
    .bind(error_message)
    .execute(pool)
    .await
    .context("failed to insert usage record")?;

    Ok(())
}

/// Successful operations since midnight UTC.
pub async fn daily_count(pool: &PgPool, user_id: Uuid) -> Result<i64> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM usage_records \
         WHERE user_id = $1 AND success AND created_at >= date_trunc('day', NOW())",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("failed to count daily usage")
}

/// Successful operations since the first of the current month (UTC).
pub async fn monthly_count(pool: &PgPool, user_id: Uuid) -> Result<i64> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM usage_records \
         WHERE user_id = $1 AND success AND created_at >= date_trunc('month', NOW())",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("failed to count monthly usage")
}

pub async fn recent_for_user(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<UsageRecordRow>> {
    sqlx::query_as::<_, UsageRecordRow>(
        "SELECT operation_type, file_size, pages_processed, success, error_message, created_at \
         FROM usage_records WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to fetch recent usage records")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_message_names_the_limit() {
        let err = QuotaError {
            kind: QuotaErrorKind::DailyExceeded { used: 5, limit: 5 },
        };
        assert!(err.message().contains("5/5"));
    }

    #[test]
    fn every_registered_operation_has_a_label() {
        for descriptor in REGISTERED_OPERATIONS {
            assert_eq!(operation_label(descriptor.key), descriptor.label);
        }
        assert_eq!(operation_label("unknown"), "unknown");
    }
}
