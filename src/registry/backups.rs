use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;
use crate::model::BackupPolicy;

/// Default dump schedule installed on first deploy of an environment.
pub const DEFAULT_BACKUP_CRON: &str = "*/30 * * * *";

/// Install the default schedule if the environment has none yet.
pub async fn ensure_default(
    pool: &SqlitePool,
    application_id: Uuid,
    environment: &str,
) -> Result<BackupPolicy> {
    if let Some(existing) = find(pool, application_id, environment).await? {
        return Ok(existing);
    }
    upsert(pool, application_id, environment, DEFAULT_BACKUP_CRON).await
}

/// Create or replace the schedule for one environment.
pub async fn upsert(
    pool: &SqlitePool,
    application_id: Uuid,
    environment: &str,
    cron_expression: &str,
) -> Result<BackupPolicy> {
    let policy = sqlx::query_as::<_, BackupPolicy>(
        r"
        INSERT INTO backup_policies (id, application_id, environment, cron_expression, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (application_id, environment)
        DO UPDATE SET cron_expression = excluded.cron_expression
        RETURNING id, application_id, environment, cron_expression, created_at
        ",
    )
    .bind(Uuid::new_v4())
    .bind(application_id)
    .bind(environment)
    .bind(cron_expression)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(policy)
}

pub async fn find(
    pool: &SqlitePool,
    application_id: Uuid,
    environment: &str,
) -> Result<Option<BackupPolicy>> {
    let policy = sqlx::query_as::<_, BackupPolicy>(
        "SELECT id, application_id, environment, cron_expression, created_at
         FROM backup_policies WHERE application_id = ? AND environment = ?",
    )
    .bind(application_id)
    .bind(environment)
    .fetch_optional(pool)
    .await?;
    Ok(policy)
}
