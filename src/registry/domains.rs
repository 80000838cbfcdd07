use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Domain, InstanceKind};

pub struct AddDomainParams {
    pub name: String,
    pub environment: String,
    pub instance_type: InstanceKind,
}

/// Register a custom FQDN. The name is unique across every application and
/// environment on the host.
#[tracing::instrument(skip(pool, params), fields(name = %params.name), err)]
pub async fn create(
    pool: &SqlitePool,
    application_id: Uuid,
    params: &AddDomainParams,
) -> Result<Domain> {
    if let Some(existing) = find_by_name(pool, &params.name).await? {
        return Err(Error::conflict(format!(
            "domain {} already registered in environment {}",
            existing.name, existing.environment
        )));
    }

    let domain = sqlx::query_as::<_, Domain>(
        r"
        INSERT INTO domains (id, application_id, name, environment, instance_type, status, created_at)
        VALUES (?, ?, ?, ?, ?, 'CREATED', ?)
        RETURNING id, application_id, name, environment, instance_type, status, created_at
        ",
    )
    .bind(Uuid::new_v4())
    .bind(application_id)
    .bind(&params.name)
    .bind(&params.environment)
    .bind(params.instance_type)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(domain)
}

pub async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Domain>> {
    let domain = sqlx::query_as::<_, Domain>(
        "SELECT id, application_id, name, environment, instance_type, status, created_at
         FROM domains WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(domain)
}

pub async fn list_for_application(pool: &SqlitePool, application_id: Uuid) -> Result<Vec<Domain>> {
    let domains = sqlx::query_as::<_, Domain>(
        "SELECT id, application_id, name, environment, instance_type, status, created_at
         FROM domains WHERE application_id = ? ORDER BY created_at",
    )
    .bind(application_id)
    .fetch_all(pool)
    .await?;
    Ok(domains)
}

pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM domains WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
