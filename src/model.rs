use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InstanceKind {
    Frontend,
    Backend,
    Database,
    Proxy,
}

impl InstanceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Database => "database",
            Self::Proxy => "proxy",
        }
    }
}

impl std::fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a deployment row. Forward-only:
/// CREATED → ACTIVE → STOPPED, STOPPED is terminal. A failed builder run
/// leaves the row at CREATED; it is never reaped automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DeploymentStatus {
    Created,
    Active,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    Postgres,
    Mysql,
    Mongo,
    Redis,
}

impl StorageEngine {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Mongo => "mongo",
            Self::Redis => "redis",
        }
    }
}

impl std::fmt::Display for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Per-application container resource limits. The only mutable part of an
/// application after creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    pub cpus: Option<f64>,
    pub memory_mb: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Application {
    pub id: Uuid,
    pub name: String,
    pub domain: String,
    pub storage_engines: Json<Vec<StorageEngine>>,
    pub resource_policy: Option<Json<ResourcePolicy>>,
    pub created_at: DateTime<Utc>,
}

impl Application {
    pub fn id_simple(&self) -> String {
        self.id.simple().to_string()
    }
}

/// One version of one component. Append-only: every rollout, rollback, scale
/// and variable update creates a new row; only `status` and `port` are ever
/// updated in place.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Deployment {
    pub id: Uuid,
    pub application_id: Uuid,
    pub environment: String,
    pub instance_type: InstanceKind,
    pub status: DeploymentStatus,
    pub instance_count: i64,
    pub port: Option<i64>,
    pub identifier: String,
    pub created_at: DateTime<Utc>,
}

impl Deployment {
    pub fn id_simple(&self) -> String {
        self.id.simple().to_string()
    }

    pub fn application_id_simple(&self) -> String {
        self.application_id.simple().to_string()
    }

    /// Image tag for the built backend artifact.
    pub fn image_name(&self) -> String {
        format!("{}:{}", self.id_simple(), self.environment)
    }

    /// Name of the nth instance container of this deployment.
    pub fn container_name(&self, index: i64) -> String {
        format!("{}-{}-{}", self.id_simple(), self.environment, index)
    }

    /// Private network shared by all components of one (application,
    /// environment). Stable across deployment versions.
    pub fn network_name(&self) -> String {
        format!(
            "network-{}-{}",
            self.application_id_simple(),
            self.environment
        )
    }

    /// Dial target the reverse proxy uses for the nth instance.
    pub fn upstream_addr(&self, index: i64) -> String {
        let port = self.port.unwrap_or_default();
        format!("{}:{}", self.container_name(index), port)
    }

    /// Canonical public host for this deployment, e.g.
    /// `backend-prod.example.com`.
    pub fn access_host(&self, app: &Application) -> String {
        format!("{}-{}.{}", self.instance_type, self.environment, app.domain)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Domain {
    pub id: Uuid,
    pub application_id: Uuid,
    pub name: String,
    pub environment: String,
    pub instance_type: InstanceKind,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Audit row for one whitelisted database client IP.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NetworkAccess {
    pub id: Uuid,
    pub application_id: Uuid,
    pub ip: String,
    pub environment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BackupPolicy {
    pub id: Uuid,
    pub application_id: Uuid,
    pub environment: String,
    pub cron_expression: String,
    pub created_at: DateTime<Utc>,
}
