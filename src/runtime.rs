use std::path::Path;

use async_trait::async_trait;

/// Identity of a running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// Host path or named volume mounted into a container.
#[derive(Debug, Clone)]
pub struct VolumeBinding {
    pub source: String,
    pub target: String,
}

/// Host port published for a container.
#[derive(Debug, Clone)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
}

/// Everything needed to start one container and block until it is running.
#[derive(Debug, Clone, Default)]
pub struct StartSpec {
    pub image: String,
    pub name: String,
    pub network: Option<String>,
    pub env: Vec<String>,
    pub volumes: Vec<VolumeBinding>,
    pub ports: Vec<PortBinding>,
    pub cpus: Option<f64>,
    pub memory_mb: Option<i64>,
}

/// Capability surface of the container runtime. The engine drives deploys
/// through this trait; the concrete client (Docker or compatible) lives
/// outside the orchestration core.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build an image from a stored artifact (gzipped build context).
    async fn build_image(&self, image: &str, artifact: &Path) -> anyhow::Result<()>;

    async fn pull_image(&self, image: &str) -> anyhow::Result<()>;

    /// Create the network if it does not exist yet.
    async fn ensure_network(&self, name: &str) -> anyhow::Result<()>;

    async fn create_volume(&self, name: &str) -> anyhow::Result<()>;

    /// Start a container and wait until it reports running.
    async fn start_container(&self, spec: StartSpec) -> anyhow::Result<ContainerHandle>;

    async fn stop_and_remove(&self, container: &str, remove_volumes: bool) -> anyhow::Result<()>;

    async fn connect_network(&self, container: &str, network: &str) -> anyhow::Result<()>;

    /// Identity of the named container if it is currently running.
    async fn inspect_running(&self, container: &str) -> anyhow::Result<Option<ContainerHandle>>;

    /// Run a one-off command inside a container and capture its output
    /// (consumed by the backup pipeline for database dumps).
    async fn exec(&self, container: &str, cmd: &[String], env: &[String])
    -> anyhow::Result<Vec<u8>>;
}
