use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::PROXY_CONTAINER_NAME;
use crate::error::{Error, Result};
use crate::model::{DeploymentStatus, InstanceKind};
use crate::proxy::Route;
use crate::registry::{applications, deployments};
use crate::runtime::StartSpec;
use crate::vault::Secret;

use super::{BuildOutcome, Builder, Services};

/// Cap on container starts in flight within one run.
const MAX_CONCURRENT_STARTS: usize = 4;

/// Builds a backend service version: image from the stored artifact, N
/// instance containers on the deployment's private network, and a replaced
/// reverse-proxy route with one upstream per instance.
pub struct BackendBuilder {
    services: Services,
}

impl BackendBuilder {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Builder for BackendBuilder {
    fn name(&self) -> &str {
        "backend"
    }

    #[tracing::instrument(skip(self), fields(%deployment_id), err)]
    async fn run(&self, deployment_id: Uuid) -> Result<BuildOutcome> {
        let pool = &self.services.pool;
        let deployment = deployments::get(pool, deployment_id).await?;
        let app = applications::get(pool, deployment.application_id).await?;
        let snapshot = self.services.vault.deployment_snapshot(deployment_id).await?;

        // Record the versions this run supersedes before anything changes.
        let previous_active = deployments::find_active(
            pool,
            app.id,
            InstanceKind::Backend,
            &deployment.environment,
        )
        .await?;

        let artifact = self.services.artifacts.artifact_path(&deployment);
        self.services
            .runtime
            .build_image(&deployment.image_name(), &artifact)
            .await
            .map_err(|e| Error::dependency("container runtime", "build image", e))?;

        self.services
            .runtime
            .ensure_network(&deployment.network_name())
            .await
            .map_err(|e| Error::dependency("container runtime", "create network", e))?;

        let env: Vec<String> = snapshot.iter().map(Secret::env_line).collect();
        let policy = app
            .resource_policy
            .as_ref()
            .map(|p| p.0.clone())
            .unwrap_or_default();

        let mut starts = JoinSet::new();
        let limiter = Arc::new(Semaphore::new(MAX_CONCURRENT_STARTS));
        for index in 0..deployment.instance_count {
            let runtime = Arc::clone(&self.services.runtime);
            let limiter = Arc::clone(&limiter);
            let spec = StartSpec {
                image: deployment.image_name(),
                name: deployment.container_name(index),
                network: Some(deployment.network_name()),
                env: env.clone(),
                volumes: Vec::new(),
                ports: Vec::new(),
                cpus: policy.cpus,
                memory_mb: policy.memory_mb,
            };
            starts.spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .map_err(|e| anyhow::anyhow!("start limiter closed: {e}"))?;
                runtime.start_container(spec).await
            });
        }

        while let Some(joined) = starts.join_next().await {
            match joined {
                Ok(Ok(handle)) => {
                    tracing::info!(container = %handle.name, component = self.name(), "started instance");
                }
                Ok(Err(e)) => {
                    // First failure cancels the remaining starts and fails
                    // the whole run. Instances that already came up are left
                    // for the next successful rollout's cleanup to reclaim.
                    starts.abort_all();
                    return Err(Error::dependency("container runtime", "start container", e));
                }
                Err(join_error) if join_error.is_cancelled() => {}
                Err(join_error) => {
                    starts.abort_all();
                    return Err(Error::dependency(
                        "container runtime",
                        "start container",
                        anyhow::anyhow!(join_error),
                    ));
                }
            }
        }

        deployments::update_status(pool, deployment_id, DeploymentStatus::Active).await?;

        let host = deployment.access_host(&app);
        let upstreams: Vec<String> = (0..deployment.instance_count)
            .map(|index| deployment.upstream_addr(index))
            .collect();
        self.services
            .proxy
            .upsert_route(&host, Route::reverse_proxy(&host, upstreams))
            .await
            .map_err(|e| Error::dependency("reverse proxy", "replace route", e))?;

        // The shared proxy must be able to dial the instance containers.
        if let Err(e) = self
            .services
            .runtime
            .connect_network(PROXY_CONTAINER_NAME, &deployment.network_name())
            .await
        {
            tracing::warn!(error = %e, "failed to connect proxy to deployment network");
        }

        Ok(BuildOutcome {
            container: None,
            previous_active,
        })
    }

    async fn cleanup(&self, outcome: &BuildOutcome) -> Result<()> {
        for previous in &outcome.previous_active {
            for index in 0..previous.instance_count {
                self.services
                    .runtime
                    .stop_and_remove(&previous.container_name(index), true)
                    .await
                    .map_err(|e| {
                        Error::dependency("container runtime", "stop container", e)
                    })?;
            }
        }

        for previous in &outcome.previous_active {
            deployments::update_status(&self.services.pool, previous.id, DeploymentStatus::Stopped)
                .await?;
        }

        Ok(())
    }
}
