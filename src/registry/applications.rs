use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Application, ResourcePolicy, StorageEngine};

pub struct CreateApplicationParams {
    pub name: String,
    pub domain: String,
    pub storage_engines: Vec<StorageEngine>,
}

/// Create an application. Names are unique across the host.
#[tracing::instrument(skip(pool, params), fields(name = %params.name), err)]
pub async fn create(pool: &SqlitePool, params: CreateApplicationParams) -> Result<Application> {
    if find_by_name(pool, &params.name).await?.is_some() {
        return Err(Error::conflict(format!(
            "application with name {} already exists",
            params.name
        )));
    }

    let app = sqlx::query_as::<_, Application>(
        r"
        INSERT INTO applications (id, name, domain, storage_engines, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, name, domain, storage_engines, resource_policy, created_at
        ",
    )
    .bind(Uuid::new_v4())
    .bind(&params.name)
    .bind(&params.domain)
    .bind(Json(&params.storage_engines))
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(app)
}

pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<Application> {
    sqlx::query_as::<_, Application>(
        "SELECT id, name, domain, storage_engines, resource_policy, created_at
         FROM applications WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::not_found(format!("application {id}")))
}

pub async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Application>> {
    let app = sqlx::query_as::<_, Application>(
        "SELECT id, name, domain, storage_engines, resource_policy, created_at
         FROM applications WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(app)
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<Application>> {
    let apps = sqlx::query_as::<_, Application>(
        "SELECT id, name, domain, storage_engines, resource_policy, created_at
         FROM applications ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(apps)
}

/// Replace the application's resource policy, the only mutable field.
pub async fn update_resource_policy(
    pool: &SqlitePool,
    id: Uuid,
    policy: &ResourcePolicy,
) -> Result<()> {
    let result = sqlx::query("UPDATE applications SET resource_policy = ? WHERE id = ?")
        .bind(Json(policy))
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found(format!("application {id}")));
    }
    Ok(())
}
