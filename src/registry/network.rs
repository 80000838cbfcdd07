use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;
use crate::model::NetworkAccess;

/// Record one whitelisted client IP for an application environment.
pub async fn create(
    pool: &SqlitePool,
    application_id: Uuid,
    ip: &str,
    environment: &str,
) -> Result<NetworkAccess> {
    let record = sqlx::query_as::<_, NetworkAccess>(
        r"
        INSERT INTO network_access (id, application_id, ip, environment, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, application_id, ip, environment, created_at
        ",
    )
    .bind(Uuid::new_v4())
    .bind(application_id)
    .bind(ip)
    .bind(environment)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(record)
}

pub async fn find(
    pool: &SqlitePool,
    application_id: Uuid,
    ip: &str,
    environment: &str,
) -> Result<Option<NetworkAccess>> {
    let record = sqlx::query_as::<_, NetworkAccess>(
        "SELECT id, application_id, ip, environment, created_at
         FROM network_access
         WHERE application_id = ? AND ip = ? AND environment = ?",
    )
    .bind(application_id)
    .bind(ip)
    .bind(environment)
    .fetch_optional(pool)
    .await?;
    Ok(record)
}

pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM network_access WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
