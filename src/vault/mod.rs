pub mod crypto;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;
use crate::model::InstanceKind;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A variable with its value decrypted. Only ever held in memory; the
/// registry stores the encrypted form.
#[derive(Debug, Clone)]
pub struct Secret {
    pub id: Uuid,
    pub application_id: Uuid,
    pub name: String,
    pub value: String,
    pub environment: String,
    pub instance_type: InstanceKind,
}

impl Secret {
    /// Environment line passed to a container, `NAME=value`.
    pub fn env_line(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// A variable to create or update.
#[derive(Debug, Clone)]
pub struct VarSpec {
    pub key: String,
    pub value: String,
    pub environment: String,
    pub instance_type: InstanceKind,
}

#[derive(sqlx::FromRow)]
struct SecretRow {
    id: Uuid,
    application_id: Uuid,
    name: String,
    encrypted_value: String,
    environment: String,
    instance_type: InstanceKind,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Right-biased union over the variable key set: every key of `overlays` wins
/// with its new value; keys of `previous` absent from `overlays` carry over
/// unchanged. `merge(previous, [])` reproduces `previous`.
pub fn merge(previous: &[Secret], overlays: Vec<VarSpec>) -> Vec<VarSpec> {
    let mut merged = overlays;
    for old in previous {
        if merged.iter().any(|overlay| overlay.key == old.name) {
            continue;
        }
        merged.push(VarSpec {
            key: old.name.clone(),
            value: old.value.clone(),
            environment: old.environment.clone(),
            instance_type: old.instance_type,
        });
    }
    merged
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Encrypting variable store. Secrets hold the latest value of a variable per
/// (application, environment, instance type); deployment snapshots pin the
/// set of secrets a deployment was built with and are never edited afterward.
#[derive(Clone)]
pub struct Vault {
    pool: SqlitePool,
    master_key: [u8; 32],
}

impl Vault {
    pub fn new(pool: SqlitePool, master_key: [u8; 32]) -> Self {
        Self { pool, master_key }
    }

    /// Create or update one variable. On conflict the value is replaced and
    /// the existing secret id is kept, so older deployment snapshots keep
    /// pointing at the row they were built from.
    #[tracing::instrument(skip(self, spec), fields(key = %spec.key, environment = %spec.environment), err)]
    pub async fn upsert(&self, application_id: Uuid, spec: &VarSpec) -> Result<Secret> {
        let encrypted = crypto::encrypt(&spec.value, &self.master_key)?;

        let row = sqlx::query_as::<_, SecretRow>(
            r"
            INSERT INTO secrets
                (id, application_id, name, encrypted_value, environment, instance_type,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (application_id, name, environment, instance_type)
            DO UPDATE SET
                encrypted_value = excluded.encrypted_value,
                updated_at = excluded.updated_at
            RETURNING id, application_id, name, encrypted_value, environment,
                      instance_type, created_at
            ",
        )
        .bind(Uuid::new_v4())
        .bind(application_id)
        .bind(&spec.key)
        .bind(&encrypted)
        .bind(&spec.environment)
        .bind(spec.instance_type)
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(Secret {
            id: row.id,
            application_id: row.application_id,
            name: row.name,
            value: spec.value.clone(),
            environment: row.environment,
            instance_type: row.instance_type,
        })
    }

    pub async fn upsert_all(
        &self,
        application_id: Uuid,
        specs: impl IntoIterator<Item = VarSpec>,
    ) -> Result<Vec<Secret>> {
        let mut created = Vec::new();
        for spec in specs {
            created.push(self.upsert(application_id, &spec).await?);
        }
        Ok(created)
    }

    /// Every variable of an application, decrypted.
    pub async fn list_for_application(&self, application_id: Uuid) -> Result<Vec<Secret>> {
        let rows = sqlx::query_as::<_, SecretRow>(
            "SELECT id, application_id, name, encrypted_value, environment,
                    instance_type, created_at
             FROM secrets WHERE application_id = ? ORDER BY name",
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| self.decrypt_row(row)).collect()
    }

    /// Pin the given secrets as the immutable snapshot of one deployment.
    #[tracing::instrument(skip(self, secrets), fields(%deployment_id, count = secrets.len()), err)]
    pub async fn snapshot(&self, deployment_id: Uuid, secrets: &[Secret]) -> Result<()> {
        for secret in secrets {
            sqlx::query(
                "INSERT INTO deployment_secrets (id, deployment_id, secret_id) VALUES (?, ?, ?)",
            )
            .bind(Uuid::new_v4())
            .bind(deployment_id)
            .bind(secret.id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// The variables a deployment was built with, decrypted.
    pub async fn deployment_snapshot(&self, deployment_id: Uuid) -> Result<Vec<Secret>> {
        let rows = sqlx::query_as::<_, SecretRow>(
            "SELECT s.id, s.application_id, s.name, s.encrypted_value, s.environment,
                    s.instance_type, s.created_at
             FROM deployment_secrets ds
             JOIN secrets s ON s.id = ds.secret_id
             WHERE ds.deployment_id = ?
             ORDER BY s.name",
        )
        .bind(deployment_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| self.decrypt_row(row)).collect()
    }

    /// Drop a deployment's snapshot join rows. The secrets themselves stay.
    pub async fn delete_snapshot(&self, deployment_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM deployment_secrets WHERE deployment_id = ?")
            .bind(deployment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn decrypt_row(&self, row: SecretRow) -> Result<Secret> {
        let value = crypto::decrypt(&row.encrypted_value, &self.master_key)?;
        Ok(Secret {
            id: row.id,
            application_id: row.application_id,
            name: row.name,
            value,
            environment: row.environment,
            instance_type: row.instance_type,
        })
    }
}
