pub mod backend;
pub mod database;
pub mod frontend;
pub mod proxy;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::artifact::ArtifactStore;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Deployment, InstanceKind, StorageEngine};
use crate::proxy::ProxyAdmin;
use crate::runtime::{ContainerHandle, ContainerRuntime};
use crate::vault::Vault;

/// Shared collaborators injected into every builder.
#[derive(Clone)]
pub struct Services {
    pub pool: SqlitePool,
    pub vault: Vault,
    pub artifacts: ArtifactStore,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub proxy: Arc<dyn ProxyAdmin>,
    pub config: Arc<Config>,
}

/// What a builder run produced: the runtime identity where one container
/// represents the component, and the previously-active deployments this run
/// superseded — the input to the subsequent `cleanup` pass.
#[derive(Debug, Default)]
pub struct BuildOutcome {
    pub container: Option<ContainerHandle>,
    pub previous_active: Vec<Deployment>,
}

/// Turns one deployment row into running resources and knows how to clean up
/// the resources of its own superseded deployments.
#[async_trait]
pub trait Builder: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, deployment_id: Uuid) -> Result<BuildOutcome>;

    async fn cleanup(&self, outcome: &BuildOutcome) -> Result<()>;
}

/// Select the builder for an instance type; database builders are further
/// keyed by storage engine.
pub fn for_kind(
    kind: InstanceKind,
    engine: Option<StorageEngine>,
    services: Services,
) -> Result<Box<dyn Builder>> {
    match kind {
        InstanceKind::Backend => Ok(Box::new(backend::BackendBuilder::new(services))),
        InstanceKind::Frontend => Ok(Box::new(frontend::FrontendBuilder::new(services))),
        InstanceKind::Proxy => Ok(Box::new(proxy::ProxyBuilder::new(services))),
        InstanceKind::Database => {
            let engine = engine.ok_or_else(|| {
                Error::validation("database builder requires a storage engine")
            })?;
            Ok(Box::new(database::DatabaseBuilder::new(services, engine)))
        }
    }
}
