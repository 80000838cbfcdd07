use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Application, DeploymentStatus, StorageEngine};
use crate::registry::{applications, deployments};
use crate::runtime::{PortBinding, StartSpec, VolumeBinding};
use crate::vault::{Secret, VarSpec};

use super::{BuildOutcome, Builder, Services};

// ---------------------------------------------------------------------------
// Engine providers
// ---------------------------------------------------------------------------

/// Engine-specific knowledge: image, wire port, data path and the credential
/// variables seeded on first start.
pub trait EngineProvider: Send + Sync {
    fn engine(&self) -> StorageEngine;

    fn image(&self) -> &'static str;

    fn port(&self) -> u16;

    fn data_path(&self) -> &'static str;

    /// Deterministic container name shared by every deployment version of
    /// one (application, environment, engine).
    fn container_name(&self, app: &Application, environment: &str) -> String {
        format!("{}-{}-{}", self.engine(), app.name, environment)
    }

    fn credential_vars(&self, app: &Application, environment: &str) -> Vec<VarSpec>;
}

pub fn provider_for(engine: StorageEngine) -> Box<dyn EngineProvider> {
    match engine {
        StorageEngine::Postgres => Box::new(PostgresProvider),
        StorageEngine::Mysql => Box::new(MysqlProvider),
        StorageEngine::Mongo => Box::new(MongoProvider),
        StorageEngine::Redis => Box::new(RedisProvider),
    }
}

fn database_var(key: &str, value: String, environment: &str) -> VarSpec {
    VarSpec {
        key: key.into(),
        value,
        environment: environment.into(),
        instance_type: crate::model::InstanceKind::Database,
    }
}

fn random_password() -> String {
    Uuid::new_v4().to_string()
}

struct PostgresProvider;

impl EngineProvider for PostgresProvider {
    fn engine(&self) -> StorageEngine {
        StorageEngine::Postgres
    }

    fn image(&self) -> &'static str {
        "postgres:17"
    }

    fn port(&self) -> u16 {
        5432
    }

    fn data_path(&self) -> &'static str {
        "/var/lib/postgresql/data"
    }

    fn credential_vars(&self, app: &Application, environment: &str) -> Vec<VarSpec> {
        let host = self.container_name(app, environment);
        vec![
            database_var("POSTGRES_DB", host.clone(), environment),
            database_var(
                "POSTGRES_USER",
                format!("{}-{environment}-user", app.name),
                environment,
            ),
            database_var("POSTGRES_HOST", host, environment),
            database_var("POSTGRES_PORT", self.port().to_string(), environment),
            database_var("POSTGRES_PASSWORD", random_password(), environment),
        ]
    }
}

struct MysqlProvider;

impl EngineProvider for MysqlProvider {
    fn engine(&self) -> StorageEngine {
        StorageEngine::Mysql
    }

    fn image(&self) -> &'static str {
        "mysql:8"
    }

    fn port(&self) -> u16 {
        3306
    }

    fn data_path(&self) -> &'static str {
        "/var/lib/mysql"
    }

    fn credential_vars(&self, app: &Application, environment: &str) -> Vec<VarSpec> {
        vec![
            database_var(
                "MYSQL_DATABASE",
                format!("{}_{environment}", app.name.replace('-', "_")),
                environment,
            ),
            database_var(
                "MYSQL_USER",
                format!("{}-{environment}-user", app.name),
                environment,
            ),
            database_var("MYSQL_HOST", self.container_name(app, environment), environment),
            database_var("MYSQL_PORT", self.port().to_string(), environment),
            database_var("MYSQL_PASSWORD", random_password(), environment),
            database_var("MYSQL_ROOT_PASSWORD", random_password(), environment),
        ]
    }
}

struct MongoProvider;

impl EngineProvider for MongoProvider {
    fn engine(&self) -> StorageEngine {
        StorageEngine::Mongo
    }

    fn image(&self) -> &'static str {
        "mongo:8"
    }

    fn port(&self) -> u16 {
        27017
    }

    fn data_path(&self) -> &'static str {
        "/data/db"
    }

    fn credential_vars(&self, app: &Application, environment: &str) -> Vec<VarSpec> {
        vec![
            database_var(
                "MONGO_INITDB_DATABASE",
                format!("{}-{environment}", app.name),
                environment,
            ),
            database_var(
                "MONGO_INITDB_ROOT_USERNAME",
                format!("{}-{environment}-user", app.name),
                environment,
            ),
            database_var("MONGO_HOST", self.container_name(app, environment), environment),
            database_var("MONGO_PORT", self.port().to_string(), environment),
            database_var("MONGO_INITDB_ROOT_PASSWORD", random_password(), environment),
        ]
    }
}

struct RedisProvider;

impl EngineProvider for RedisProvider {
    fn engine(&self) -> StorageEngine {
        StorageEngine::Redis
    }

    fn image(&self) -> &'static str {
        "redis:7"
    }

    fn port(&self) -> u16 {
        6379
    }

    fn data_path(&self) -> &'static str {
        "/data"
    }

    fn credential_vars(&self, app: &Application, environment: &str) -> Vec<VarSpec> {
        vec![
            database_var("REDIS_HOST", self.container_name(app, environment), environment),
            database_var("REDIS_PORT", self.port().to_string(), environment),
            database_var("REDIS_PASSWORD", random_password(), environment),
        ]
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Idempotent singleton per (application, environment, engine): when the
/// deterministic container already runs, its identity is returned untouched.
/// Otherwise fresh credentials are generated, snapshotted against the
/// deployment, and the engine container started on a persistent volume.
pub struct DatabaseBuilder {
    services: Services,
    provider: Box<dyn EngineProvider>,
}

impl DatabaseBuilder {
    pub fn new(services: Services, engine: StorageEngine) -> Self {
        Self {
            services,
            provider: provider_for(engine),
        }
    }
}

#[async_trait]
impl Builder for DatabaseBuilder {
    fn name(&self) -> &str {
        self.provider.image()
    }

    #[tracing::instrument(skip(self), fields(%deployment_id), err)]
    async fn run(&self, deployment_id: Uuid) -> Result<BuildOutcome> {
        let pool = &self.services.pool;
        let deployment = deployments::get(pool, deployment_id).await?;
        let app = applications::get(pool, deployment.application_id).await?;
        tracing::debug!(engine = %self.provider.engine(), application = %app.name, "running database builder");

        let container = self.provider.container_name(&app, &deployment.environment);
        if let Some(handle) = self
            .services
            .runtime
            .inspect_running(&container)
            .await
            .map_err(|e| Error::dependency("container runtime", "inspect container", e))?
        {
            tracing::info!(%container, "database container already running");
            return Ok(BuildOutcome {
                container: Some(handle),
                previous_active: Vec::new(),
            });
        }

        let credentials = self
            .services
            .vault
            .upsert_all(
                app.id,
                self.provider.credential_vars(&app, &deployment.environment),
            )
            .await?;
        self.services.vault.snapshot(deployment_id, &credentials).await?;

        self.services
            .runtime
            .ensure_network(&deployment.network_name())
            .await
            .map_err(|e| Error::dependency("container runtime", "create network", e))?;

        self.services
            .runtime
            .pull_image(self.provider.image())
            .await
            .map_err(|e| Error::dependency("container runtime", "pull image", e))?;

        let volume_source = self
            .services
            .config
            .storage_dir()
            .join(format!(
                "{}-{}",
                deployment.application_id_simple(),
                deployment.environment
            ))
            .join(self.provider.engine().as_str());

        let ports: Vec<PortBinding> = deployment
            .port
            .and_then(|p| u16::try_from(p).ok())
            .map(|host_port| PortBinding {
                host_ip: "0.0.0.0".into(),
                host_port,
                container_port: self.provider.port(),
            })
            .into_iter()
            .collect();

        let handle = self
            .services
            .runtime
            .start_container(StartSpec {
                image: self.provider.image().into(),
                name: container,
                network: Some(deployment.network_name()),
                env: credentials.iter().map(Secret::env_line).collect(),
                volumes: vec![VolumeBinding {
                    source: volume_source.display().to_string(),
                    target: self.provider.data_path().into(),
                }],
                ports,
                cpus: None,
                memory_mb: None,
            })
            .await
            .map_err(|e| Error::dependency("container runtime", "start container", e))?;

        deployments::update_status(pool, deployment_id, DeploymentStatus::Active).await?;

        Ok(BuildOutcome {
            container: Some(handle),
            previous_active: Vec::new(),
        })
    }

    /// Database containers are long-lived; a redeploy never tears them down.
    async fn cleanup(&self, _outcome: &BuildOutcome) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::types::Json;

    fn app() -> Application {
        Application {
            id: Uuid::new_v4(),
            name: "shop".into(),
            domain: "example.com".into(),
            storage_engines: Json(vec![StorageEngine::Postgres]),
            resource_policy: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn container_name_is_deterministic() {
        let provider = provider_for(StorageEngine::Postgres);
        assert_eq!(provider.container_name(&app(), "prod"), "postgres-shop-prod");
        assert_eq!(
            provider.container_name(&app(), "prod"),
            provider.container_name(&app(), "prod")
        );
    }

    #[test]
    fn postgres_credentials_cover_connection_variables() {
        let vars = provider_for(StorageEngine::Postgres).credential_vars(&app(), "prod");
        let keys: Vec<&str> = vars.iter().map(|v| v.key.as_str()).collect();
        assert!(keys.contains(&"POSTGRES_DB"));
        assert!(keys.contains(&"POSTGRES_USER"));
        assert!(keys.contains(&"POSTGRES_HOST"));
        assert!(keys.contains(&"POSTGRES_PORT"));
        assert!(keys.contains(&"POSTGRES_PASSWORD"));
    }

    #[test]
    fn passwords_are_fresh_per_call() {
        let provider = provider_for(StorageEngine::Postgres);
        let first = provider.credential_vars(&app(), "prod");
        let second = provider.credential_vars(&app(), "prod");
        let pw = |vars: &[VarSpec]| {
            vars.iter()
                .find(|v| v.key == "POSTGRES_PASSWORD")
                .unwrap()
                .value
                .clone()
        };
        assert_ne!(pw(&first), pw(&second));
    }

    #[test]
    fn mysql_database_name_avoids_hyphens() {
        let mut application = app();
        application.name = "my-shop".into();
        let vars = provider_for(StorageEngine::Mysql).credential_vars(&application, "prod");
        let db = vars.iter().find(|v| v.key == "MYSQL_DATABASE").unwrap();
        assert_eq!(db.value, "my_shop_prod");
    }
}
