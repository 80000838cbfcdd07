mod access;

use std::sync::Arc;

use uuid::Uuid;

use crate::builders::{self, BuildOutcome, Services};
use crate::error::{Error, Result};
use crate::firewall::{Firewall, PortBlocker};
use crate::ids::{IDENTIFIER_LEN, IdGenerator, PortAllocator};
use crate::model::{
    Application, BackupPolicy, Deployment, InstanceKind, ResourcePolicy, StorageEngine,
};
use crate::registry::applications::CreateApplicationParams;
use crate::registry::deployments::CreateDeploymentParams;
use crate::registry::{applications, backups, deployments, domains};
use crate::vault::{Secret, VarSpec, merge};

pub use access::AccessOp;
pub use crate::registry::domains::AddDomainParams;

// ---------------------------------------------------------------------------
// Operation parameters / results
// ---------------------------------------------------------------------------

pub struct DeployParams {
    pub application_id: Uuid,
    pub environment: String,
    pub instance_count: i64,
    /// Gzipped build context for the backend service, if this rollout ships one.
    pub backend: Option<Vec<u8>>,
    /// Gzipped static bundle for the frontend, if this rollout ships one.
    pub frontend: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct DeployReceipt {
    pub identifier: String,
    pub backend_urls: Vec<String>,
    pub frontend_urls: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VarUpdate {
    pub key: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Composes the builders, the registry, the vault and the artifact store into
/// the public platform operations. All collaborators are injected, including
/// the identifier and port sources, so tests can run fully deterministic.
pub struct Orchestrator {
    services: Services,
    firewall: Arc<dyn Firewall>,
    blocker: PortBlocker,
    ids: Arc<dyn IdGenerator>,
    ports: Arc<dyn PortAllocator>,
}

impl Orchestrator {
    pub fn new(
        services: Services,
        firewall: Arc<dyn Firewall>,
        blocker: PortBlocker,
        ids: Arc<dyn IdGenerator>,
        ports: Arc<dyn PortAllocator>,
    ) -> Self {
        Self {
            services,
            firewall,
            blocker,
            ids,
            ports,
        }
    }

    // -----------------------------------------------------------------------
    // Applications
    // -----------------------------------------------------------------------

    pub async fn create_application(&self, params: CreateApplicationParams) -> Result<Application> {
        if params.name.trim().is_empty() {
            return Err(Error::validation("application name is required"));
        }
        if params.domain.trim().is_empty() {
            return Err(Error::validation("application domain is required"));
        }
        applications::create(&self.services.pool, params).await
    }

    pub async fn get_application(&self, application_id: Uuid) -> Result<Application> {
        applications::get(&self.services.pool, application_id).await
    }

    pub async fn list_applications(&self) -> Result<Vec<Application>> {
        applications::list(&self.services.pool).await
    }

    pub async fn list_deployments(&self, application_id: Uuid) -> Result<Vec<Deployment>> {
        deployments::list_for_application(&self.services.pool, application_id).await
    }

    pub async fn set_resource_policy(
        &self,
        application_id: Uuid,
        policy: ResourcePolicy,
    ) -> Result<()> {
        applications::update_resource_policy(&self.services.pool, application_id, &policy).await
    }

    pub async fn list_variables(
        &self,
        application_id: Uuid,
        environment: Option<&str>,
    ) -> Result<Vec<Secret>> {
        let secrets = self
            .services
            .vault
            .list_for_application(application_id)
            .await?;
        Ok(match environment {
            Some(env) if !env.is_empty() => secrets
                .into_iter()
                .filter(|s| s.environment == env)
                .collect(),
            _ => secrets,
        })
    }

    pub async fn set_backup_schedule(
        &self,
        application_id: Uuid,
        environment: &str,
        cron_expression: &str,
    ) -> Result<BackupPolicy> {
        backups::upsert(
            &self.services.pool,
            application_id,
            environment,
            cron_expression,
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Deploy
    // -----------------------------------------------------------------------

    /// Roll out a new version: managed databases first (idempotent), then the
    /// backend service, then the static frontend. Returns the rollout
    /// identifier — the unit of rollback — and the access URLs.
    #[tracing::instrument(skip(self, params), fields(application_id = %params.application_id, environment = %params.environment), err)]
    pub async fn deploy(&self, params: DeployParams) -> Result<DeployReceipt> {
        if params.environment.trim().is_empty() {
            return Err(Error::validation("environment is required"));
        }
        if params.instance_count < 1 {
            return Err(Error::validation("instance count must be at least 1"));
        }

        let pool = &self.services.pool;
        let app = applications::get(pool, params.application_id).await?;
        let identifier = self.ids.generate(IDENTIFIER_LEN);
        tracing::info!(application = %app.name, %identifier, "starting rollout");

        self.ensure_proxy().await?;

        for engine in app.storage_engines.0.clone() {
            let port = self.ports.allocate()?;
            let db_deployment = deployments::create(
                pool,
                CreateDeploymentParams {
                    application_id: app.id,
                    environment: params.environment.clone(),
                    instance_type: InstanceKind::Database,
                    instance_count: 1,
                    port: Some(i64::from(port)),
                    identifier: identifier.clone(),
                },
            )
            .await?;

            let builder =
                builders::for_kind(InstanceKind::Database, Some(engine), self.services.clone())?;
            builder.run(db_deployment.id).await?;

            // Fire-and-forget: shielding the port must not gate availability.
            self.blocker.request_block(port);
        }

        if !app.storage_engines.0.is_empty() {
            backups::ensure_default(pool, app.id, &params.environment).await?;
        }

        let mut backend_deployment = None;
        if let Some(bundle) = &params.backend {
            let port = self.ports.allocate()?;
            let deployment = deployments::create(
                pool,
                CreateDeploymentParams {
                    application_id: app.id,
                    environment: params.environment.clone(),
                    instance_type: InstanceKind::Backend,
                    instance_count: params.instance_count,
                    port: Some(i64::from(port)),
                    identifier: identifier.clone(),
                },
            )
            .await?;
            self.services.artifacts.save(&deployment, bundle).await?;
            self.seed_backend_variables(&deployment).await?;
            backend_deployment = Some(deployment);
        }

        let mut frontend_deployment = None;
        if let Some(bundle) = &params.frontend {
            let deployment = deployments::create(
                pool,
                CreateDeploymentParams {
                    application_id: app.id,
                    environment: params.environment.clone(),
                    instance_type: InstanceKind::Frontend,
                    instance_count: params.instance_count,
                    port: None,
                    identifier: identifier.clone(),
                },
            )
            .await?;
            self.services.artifacts.save(&deployment, bundle).await?;
            frontend_deployment = Some(deployment);
        }

        if let Some(deployment) = &backend_deployment {
            self.run_and_cleanup(InstanceKind::Backend, None, deployment.id)
                .await?;
        }
        if let Some(deployment) = &frontend_deployment {
            self.run_and_cleanup(InstanceKind::Frontend, None, deployment.id)
                .await?;
        }

        let mut backend_urls = Vec::new();
        let mut frontend_urls = Vec::new();
        if let Some(deployment) = &backend_deployment {
            backend_urls.push(to_url(&deployment.access_host(&app)));
        }
        if let Some(deployment) = &frontend_deployment {
            frontend_urls.push(to_url(&deployment.access_host(&app)));
        }
        for domain in domains::list_for_application(pool, app.id).await? {
            if domain.environment != params.environment {
                continue;
            }
            match domain.instance_type {
                InstanceKind::Backend => backend_urls.push(to_url(&domain.name)),
                InstanceKind::Frontend => frontend_urls.push(to_url(&domain.name)),
                _ => {}
            }
        }

        Ok(DeployReceipt {
            identifier,
            backend_urls,
            frontend_urls,
        })
    }

    // -----------------------------------------------------------------------
    // Rollback / Scale / UpdateVariables
    // -----------------------------------------------------------------------

    /// Re-release the versions of an earlier rollout. Never mutates the source
    /// rows: artifacts and secret snapshots are copied into new rows under a
    /// fresh identifier, so repeating a rollback yields independent versions.
    #[tracing::instrument(skip(self), fields(%identifier), err)]
    pub async fn rollback(&self, identifier: &str) -> Result<Vec<Deployment>> {
        let pool = &self.services.pool;
        let source = deployments::find_by_identifier(pool, identifier).await?;
        if source.is_empty() {
            return Err(Error::not_found(format!("rollout {identifier}")));
        }

        let new_identifier = self.ids.generate(IDENTIFIER_LEN);
        let mut result = Vec::new();

        if let Some(backend) = source
            .iter()
            .find(|d| d.instance_type == InstanceKind::Backend)
        {
            let successor = self
                .clone_version(backend, backend.instance_count, &new_identifier, true)
                .await?;
            self.run_and_cleanup(InstanceKind::Backend, None, successor.id)
                .await?;
            result.push(deployments::get(pool, successor.id).await?);
        }

        if let Some(frontend) = source
            .iter()
            .find(|d| d.instance_type == InstanceKind::Frontend)
        {
            let successor = self
                .clone_version(frontend, frontend.instance_count, &new_identifier, false)
                .await?;
            self.run_and_cleanup(InstanceKind::Frontend, None, successor.id)
                .await?;
            result.push(deployments::get(pool, successor.id).await?);
        }

        Ok(result)
    }

    /// Re-release the oldest active backend version with a new instance count.
    #[tracing::instrument(skip(self), fields(%application_id, %environment, instance_count), err)]
    pub async fn scale(
        &self,
        application_id: Uuid,
        environment: &str,
        instance_count: i64,
    ) -> Result<Vec<Deployment>> {
        if instance_count < 1 {
            return Err(Error::validation("instance count must be at least 1"));
        }

        let pool = &self.services.pool;
        let actives =
            deployments::find_active(pool, application_id, InstanceKind::Backend, environment)
                .await?;
        let Some(oldest) = actives.first() else {
            return Err(Error::not_found(format!(
                "active backend deployment in environment {environment}"
            )));
        };

        let new_identifier = self.ids.generate(IDENTIFIER_LEN);
        let successor = self
            .clone_version(oldest, instance_count, &new_identifier, true)
            .await?;
        self.run_and_cleanup(InstanceKind::Backend, None, successor.id)
            .await?;

        Ok(vec![deployments::get(pool, successor.id).await?])
    }

    /// Re-release the active backend version with `updates` merged over its
    /// snapshot: keys present in `updates` override, absent keys carry over.
    #[tracing::instrument(skip(self, updates), fields(%application_id, %environment), err)]
    pub async fn update_variables(
        &self,
        application_id: Uuid,
        environment: &str,
        updates: Vec<VarUpdate>,
    ) -> Result<Deployment> {
        let pool = &self.services.pool;
        let active =
            deployments::find_active_one(pool, application_id, InstanceKind::Backend, environment)
                .await?;

        let new_identifier = self.ids.generate(IDENTIFIER_LEN);
        let successor = self
            .clone_version(&active, active.instance_count, &new_identifier, false)
            .await?;

        let previous_vars = self.services.vault.deployment_snapshot(active.id).await?;
        let overlays: Vec<VarSpec> = updates
            .into_iter()
            .map(|update| VarSpec {
                key: update.key,
                value: update.value,
                environment: environment.to_owned(),
                instance_type: InstanceKind::Backend,
            })
            .collect();

        let merged = merge(&previous_vars, overlays);
        let created = self.services.vault.upsert_all(application_id, merged).await?;
        self.services.vault.snapshot(successor.id, &created).await?;

        self.run_and_cleanup(InstanceKind::Backend, None, successor.id)
            .await?;

        deployments::get(pool, successor.id).await
    }

    // -----------------------------------------------------------------------
    // Destroy
    // -----------------------------------------------------------------------

    /// Tear down an application's resources. `environment: None` destroys
    /// every environment. Containers, routes, snapshots and stored content go;
    /// every affected deployment row ends STOPPED.
    #[tracing::instrument(skip(self), fields(%application_id, destroy_all = environment.is_none()), err)]
    pub async fn destroy(&self, application_id: Uuid, environment: Option<&str>) -> Result<()> {
        let pool = &self.services.pool;
        let app = applications::get(pool, application_id).await?;
        let all = deployments::list_for_application(pool, application_id).await?;

        let to_destroy: Vec<Deployment> = match environment {
            None | Some("") => all,
            Some(env) => all.into_iter().filter(|d| d.environment == env).collect(),
        };

        for deployment in to_destroy
            .iter()
            .filter(|d| d.instance_type == InstanceKind::Backend)
        {
            for index in 0..deployment.instance_count {
                if let Err(e) = self
                    .services
                    .runtime
                    .stop_and_remove(&deployment.container_name(index), true)
                    .await
                {
                    tracing::debug!(error = %e, "instance container already gone");
                }
            }
            if let Err(e) = self.services.artifacts.remove(deployment).await {
                tracing::warn!(deployment_id = %deployment.id, error = %e, "failed to remove artifact");
            }
            self.services
                .proxy
                .remove_route(&deployment.access_host(&app))
                .await
                .map_err(|e| Error::dependency("reverse proxy", "remove route", e))?;
            self.services.vault.delete_snapshot(deployment.id).await?;
            deployments::update_status(pool, deployment.id, crate::model::DeploymentStatus::Stopped)
                .await?;
        }

        for deployment in to_destroy
            .iter()
            .filter(|d| d.instance_type == InstanceKind::Frontend)
        {
            if let Err(e) = self.services.artifacts.remove_site(deployment).await {
                tracing::warn!(deployment_id = %deployment.id, error = %e, "failed to remove site content");
            }
            if let Err(e) = self.services.artifacts.remove(deployment).await {
                tracing::warn!(deployment_id = %deployment.id, error = %e, "failed to remove artifact");
            }
            self.services
                .proxy
                .remove_route(&deployment.access_host(&app))
                .await
                .map_err(|e| Error::dependency("reverse proxy", "remove route", e))?;
            deployments::update_status(pool, deployment.id, crate::model::DeploymentStatus::Stopped)
                .await?;
        }

        // Engine containers are shared per (engine, environment), torn down
        // once per environment rather than per deployment row.
        let mut environments: Vec<&str> =
            to_destroy.iter().map(|d| d.environment.as_str()).collect();
        environments.sort_unstable();
        environments.dedup();

        for engine in &app.storage_engines.0 {
            let provider = crate::builders::database::provider_for(*engine);
            for env in &environments {
                let container = provider.container_name(&app, env);
                if let Err(e) = self.services.runtime.stop_and_remove(&container, true).await {
                    tracing::debug!(%container, error = %e, "database container already gone");
                }
            }
        }

        for deployment in to_destroy
            .iter()
            .filter(|d| d.instance_type == InstanceKind::Database)
        {
            self.services.vault.delete_snapshot(deployment.id).await?;
            deployments::update_status(pool, deployment.id, crate::model::DeploymentStatus::Stopped)
                .await?;
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Shared plumbing
    // -----------------------------------------------------------------------

    /// Run a builder, then let it clean up the versions it superseded.
    /// Cleanup failures are logged and swallowed: the new version is serving,
    /// so availability wins over strict resource hygiene.
    async fn run_and_cleanup(
        &self,
        kind: InstanceKind,
        engine: Option<StorageEngine>,
        deployment_id: Uuid,
    ) -> Result<BuildOutcome> {
        let builder = builders::for_kind(kind, engine, self.services.clone())?;
        let outcome = builder.run(deployment_id).await?;
        if let Err(e) = builder.cleanup(&outcome).await {
            tracing::warn!(component = builder.name(), error = %e, "cleanup failed");
        }
        Ok(outcome)
    }

    /// Bring up the shared reverse proxy if it is not already running. The
    /// proxy builder is a host singleton and ignores the deployment id.
    async fn ensure_proxy(&self) -> Result<()> {
        let builder = builders::for_kind(InstanceKind::Proxy, None, self.services.clone())?;
        builder.run(Uuid::nil()).await?;
        Ok(())
    }

    /// Append a successor row for `source` and copy its artifact (and, when
    /// asked, its secret snapshot) over. The source row is never touched.
    async fn clone_version(
        &self,
        source: &Deployment,
        instance_count: i64,
        identifier: &str,
        clone_vars: bool,
    ) -> Result<Deployment> {
        let successor = deployments::create(
            &self.services.pool,
            CreateDeploymentParams {
                application_id: source.application_id,
                environment: source.environment.clone(),
                instance_type: source.instance_type,
                instance_count,
                port: source.port,
                identifier: identifier.to_owned(),
            },
        )
        .await?;

        self.services.artifacts.copy(source, &successor).await?;

        if clone_vars {
            let vars = self.services.vault.deployment_snapshot(source.id).await?;
            let specs: Vec<VarSpec> = vars
                .iter()
                .map(|secret| VarSpec {
                    key: secret.name.clone(),
                    value: secret.value.clone(),
                    environment: secret.environment.clone(),
                    instance_type: secret.instance_type,
                })
                .collect();
            let created = self
                .services
                .vault
                .upsert_all(source.application_id, specs)
                .await?;
            self.services.vault.snapshot(successor.id, &created).await?;
        }

        Ok(successor)
    }

    /// Merge the application's variables for this environment with the
    /// injected PORT variable into the deployment's snapshot.
    async fn seed_backend_variables(&self, deployment: &Deployment) -> Result<()> {
        let port = deployment.port.unwrap_or_default();
        let port_secret = self
            .services
            .vault
            .upsert(
                deployment.application_id,
                &VarSpec {
                    key: "PORT".into(),
                    value: port.to_string(),
                    environment: deployment.environment.clone(),
                    instance_type: InstanceKind::Backend,
                },
            )
            .await?;

        let app_secrets = self
            .services
            .vault
            .list_for_application(deployment.application_id)
            .await?;
        let mut snapshot: Vec<Secret> = app_secrets
            .into_iter()
            .filter(|s| s.environment == deployment.environment && s.id != port_secret.id)
            .collect();
        snapshot.push(port_secret);

        self.services.vault.snapshot(deployment.id, &snapshot).await
    }
}

fn to_url(host: &str) -> String {
    if host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("https://{host}")
    }
}
