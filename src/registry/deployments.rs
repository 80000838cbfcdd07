use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Deployment, DeploymentStatus, InstanceKind};

pub struct CreateDeploymentParams {
    pub application_id: Uuid,
    pub environment: String,
    pub instance_type: InstanceKind,
    pub instance_count: i64,
    pub port: Option<i64>,
    pub identifier: String,
}

/// Append a new deployment row at status CREATED.
#[tracing::instrument(
    skip(pool, params),
    fields(
        application_id = %params.application_id,
        environment = %params.environment,
        instance_type = %params.instance_type,
    ),
    err
)]
pub async fn create(pool: &SqlitePool, params: CreateDeploymentParams) -> Result<Deployment> {
    let deployment = sqlx::query_as::<_, Deployment>(
        r"
        INSERT INTO deployments
            (id, application_id, environment, instance_type, status,
             instance_count, port, identifier, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id, application_id, environment, instance_type, status,
                  instance_count, port, identifier, created_at
        ",
    )
    .bind(Uuid::new_v4())
    .bind(params.application_id)
    .bind(&params.environment)
    .bind(params.instance_type)
    .bind(DeploymentStatus::Created)
    .bind(params.instance_count)
    .bind(params.port)
    .bind(&params.identifier)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(deployment)
}

pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<Deployment> {
    sqlx::query_as::<_, Deployment>(
        "SELECT id, application_id, environment, instance_type, status,
                instance_count, port, identifier, created_at
         FROM deployments WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::not_found(format!("deployment {id}")))
}

pub async fn list_for_application(pool: &SqlitePool, application_id: Uuid) -> Result<Vec<Deployment>> {
    let deployments = sqlx::query_as::<_, Deployment>(
        "SELECT id, application_id, environment, instance_type, status,
                instance_count, port, identifier, created_at
         FROM deployments WHERE application_id = ? ORDER BY created_at",
    )
    .bind(application_id)
    .fetch_all(pool)
    .await?;
    Ok(deployments)
}

/// All ACTIVE deployments of one kind in one environment, oldest first.
pub async fn find_active(
    pool: &SqlitePool,
    application_id: Uuid,
    instance_type: InstanceKind,
    environment: &str,
) -> Result<Vec<Deployment>> {
    let deployments = sqlx::query_as::<_, Deployment>(
        "SELECT id, application_id, environment, instance_type, status,
                instance_count, port, identifier, created_at
         FROM deployments
         WHERE application_id = ? AND instance_type = ? AND environment = ? AND status = ?
         ORDER BY created_at",
    )
    .bind(application_id)
    .bind(instance_type)
    .bind(environment)
    .bind(DeploymentStatus::Active)
    .fetch_all(pool)
    .await?;
    Ok(deployments)
}

/// The single ACTIVE deployment of one kind in one environment; an error when
/// there is none.
pub async fn find_active_one(
    pool: &SqlitePool,
    application_id: Uuid,
    instance_type: InstanceKind,
    environment: &str,
) -> Result<Deployment> {
    find_active(pool, application_id, instance_type, environment)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            Error::not_found(format!(
                "active {instance_type} deployment in environment {environment}"
            ))
        })
}

/// All deployments created by one rollout, whatever their current status.
pub async fn find_by_identifier(pool: &SqlitePool, identifier: &str) -> Result<Vec<Deployment>> {
    let deployments = sqlx::query_as::<_, Deployment>(
        "SELECT id, application_id, environment, instance_type, status,
                instance_count, port, identifier, created_at
         FROM deployments WHERE identifier = ? ORDER BY created_at",
    )
    .bind(identifier)
    .fetch_all(pool)
    .await?;
    Ok(deployments)
}

/// Move a deployment to a new status. Transitions are forward-only; the
/// callers drive CREATED → ACTIVE → STOPPED.
pub async fn update_status(pool: &SqlitePool, id: Uuid, status: DeploymentStatus) -> Result<()> {
    let result = sqlx::query("UPDATE deployments SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found(format!("deployment {id}")));
    }
    Ok(())
}
