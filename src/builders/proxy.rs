use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::PROXY_CONTAINER_NAME;
use crate::error::{Error, Result};
use crate::proxy;
use crate::runtime::{PortBinding, StartSpec, VolumeBinding};

use super::{BuildOutcome, Builder, Services};

const STATIC_FILES_VOLUME: &str = "sarabi-statics";
const CONFIG_VOLUME: &str = "sarabi-proxy-config";
const ADMIN_PORT: u16 = 2019;

/// Idempotent singleton per host: one shared reverse-proxy container fronting
/// every application. Binds 80/443 publicly and the admin port on loopback
/// only, then waits for the admin API before pushing the empty route table.
pub struct ProxyBuilder {
    services: Services,
}

impl ProxyBuilder {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Builder for ProxyBuilder {
    fn name(&self) -> &str {
        "proxy"
    }

    // The proxy is a host singleton; the deployment id is part of the builder
    // contract but does not select anything here.
    #[tracing::instrument(skip(self, _deployment_id), err)]
    async fn run(&self, _deployment_id: Uuid) -> Result<BuildOutcome> {
        let runtime = &self.services.runtime;

        if let Some(handle) = runtime
            .inspect_running(PROXY_CONTAINER_NAME)
            .await
            .map_err(|e| Error::dependency("container runtime", "inspect container", e))?
        {
            return Ok(BuildOutcome {
                container: Some(handle),
                previous_active: Vec::new(),
            });
        }

        runtime
            .create_volume(STATIC_FILES_VOLUME)
            .await
            .map_err(|e| Error::dependency("container runtime", "create volume", e))?;
        runtime
            .create_volume(CONFIG_VOLUME)
            .await
            .map_err(|e| Error::dependency("container runtime", "create volume", e))?;

        runtime
            .pull_image(&self.services.config.proxy_image)
            .await
            .map_err(|e| Error::dependency("container runtime", "pull image", e))?;

        // Site content is served straight off the host path, mounted at the
        // identical path inside the container so file_server roots resolve.
        let sites = self.services.config.sites_dir().display().to_string();

        let handle = runtime
            .start_container(StartSpec {
                image: self.services.config.proxy_image.clone(),
                name: PROXY_CONTAINER_NAME.into(),
                network: None,
                env: Vec::new(),
                volumes: vec![
                    VolumeBinding {
                        source: CONFIG_VOLUME.into(),
                        target: "/data".into(),
                    },
                    VolumeBinding {
                        source: sites.clone(),
                        target: sites,
                    },
                ],
                ports: vec![
                    PortBinding {
                        host_ip: "0.0.0.0".into(),
                        host_port: 80,
                        container_port: 80,
                    },
                    PortBinding {
                        host_ip: "0.0.0.0".into(),
                        host_port: 443,
                        container_port: 443,
                    },
                    PortBinding {
                        host_ip: "127.0.0.1".into(),
                        host_port: ADMIN_PORT,
                        container_port: ADMIN_PORT,
                    },
                ],
                cpus: None,
                memory_mb: None,
            })
            .await
            .map_err(|e| Error::dependency("container runtime", "start container", e))?;

        proxy::wait_ready(
            self.services.proxy.as_ref(),
            self.services.config.proxy_ready_attempts,
            Duration::from_millis(self.services.config.proxy_ready_base_delay_ms),
        )
        .await?;

        self.services
            .proxy
            .install_base_config()
            .await
            .map_err(|e| Error::dependency("reverse proxy", "install base config", e))?;

        Ok(BuildOutcome {
            container: Some(handle),
            previous_active: Vec::new(),
        })
    }

    /// Only invoked on full teardown of the host.
    async fn cleanup(&self, _outcome: &BuildOutcome) -> Result<()> {
        self.services
            .runtime
            .stop_and_remove(PROXY_CONTAINER_NAME, true)
            .await
            .map_err(|e| Error::dependency("container runtime", "stop container", e))
    }
}
