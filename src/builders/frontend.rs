use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{DeploymentStatus, InstanceKind};
use crate::proxy::Route;
use crate::registry::{applications, deployments};

use super::{BuildOutcome, Builder, Services};

/// Publishes a static frontend version: extracts the uploaded bundle into a
/// per-deployment content directory and points the reverse-proxy route's
/// `file_server` at it.
pub struct FrontendBuilder {
    services: Services,
}

impl FrontendBuilder {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Builder for FrontendBuilder {
    fn name(&self) -> &str {
        "frontend"
    }

    #[tracing::instrument(skip(self), fields(%deployment_id), err)]
    async fn run(&self, deployment_id: Uuid) -> Result<BuildOutcome> {
        let pool = &self.services.pool;
        let deployment = deployments::get(pool, deployment_id).await?;
        let app = applications::get(pool, deployment.application_id).await?;

        let previous_active = deployments::find_active(
            pool,
            app.id,
            InstanceKind::Frontend,
            &deployment.environment,
        )
        .await?;

        let site_root = self.services.artifacts.extract_site(&deployment).await?;

        let host = deployment.access_host(&app);
        self.services
            .proxy
            .upsert_route(&host, Route::file_server(&host, &site_root.display().to_string()))
            .await
            .map_err(|e| Error::dependency("reverse proxy", "replace route", e))?;

        deployments::update_status(pool, deployment_id, DeploymentStatus::Active).await?;

        Ok(BuildOutcome {
            container: None,
            previous_active,
        })
    }

    async fn cleanup(&self, outcome: &BuildOutcome) -> Result<()> {
        for previous in &outcome.previous_active {
            if let Err(e) = self.services.artifacts.remove_site(previous).await {
                tracing::warn!(
                    deployment_id = %previous.id,
                    error = %e,
                    "failed to remove stale site content"
                );
            }
            deployments::update_status(&self.services.pool, previous.id, DeploymentStatus::Stopped)
                .await?;
        }
        Ok(())
    }
}
