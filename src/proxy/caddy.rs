use async_trait::async_trait;
use tokio::sync::Mutex;

use super::config::{MAIN_SERVER, ProxyConfig, Route, find_route_index};
use super::{AliasOp, ProxyAdmin};

/// Admin-API client for a Caddy-compatible reverse proxy. Every mutation
/// takes the client-side lock across its whole fetch-patch cycle, so
/// concurrent deploys and domain updates cannot clobber each other's routes.
pub struct CaddyClient {
    http: reqwest::Client,
    base: String,
    lock: Mutex<()>,
}

impl CaddyClient {
    pub fn new(admin_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: admin_url.trim_end_matches('/').to_owned(),
            lock: Mutex::new(()),
        }
    }

    fn config_url(&self) -> String {
        format!("{}/config/", self.base)
    }

    fn routes_url(&self) -> String {
        format!("{}/config/apps/http/servers/{MAIN_SERVER}/routes", self.base)
    }

    fn route_url(&self, index: usize) -> String {
        format!("{}/{index}", self.routes_url())
    }

    async fn fetch(&self) -> anyhow::Result<ProxyConfig> {
        let config = self
            .http
            .get(self.config_url())
            .send()
            .await?
            .error_for_status()?
            .json::<ProxyConfig>()
            .await?;
        Ok(config)
    }

    fn routes(config: ProxyConfig) -> anyhow::Result<Vec<Route>> {
        config
            .apps
            .http
            .servers
            .get(MAIN_SERVER)
            .map(|s| s.routes.clone())
            .ok_or_else(|| anyhow::anyhow!("proxy has no '{MAIN_SERVER}' server configured"))
    }

    async fn patch_route(&self, index: usize, route: &Route) -> anyhow::Result<()> {
        self.http
            .patch(self.route_url(index))
            .json(route)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn replace_routes(&self, routes: &[Route]) -> anyhow::Result<()> {
        self.http
            .patch(self.routes_url())
            .json(&routes)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_route(&self, index: usize) -> anyhow::Result<()> {
        self.http
            .delete(self.route_url(index))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl ProxyAdmin for CaddyClient {
    async fn ready(&self) -> bool {
        match self.http.get(self.config_url()).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    #[tracing::instrument(skip(self), err)]
    async fn install_base_config(&self) -> anyhow::Result<()> {
        let admin_listen = self
            .base
            .strip_prefix("http://")
            .unwrap_or(&self.base)
            .to_owned();

        self.http
            .post(self.config_url())
            .json(&ProxyConfig::base(&admin_listen))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    #[tracing::instrument(skip(self, route), fields(%host), err)]
    async fn upsert_route(&self, host: &str, route: Route) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;

        let mut routes = Self::routes(self.fetch().await?)?;
        match find_route_index(&routes, host) {
            Some(index) => self.patch_route(index, &route).await,
            None => {
                routes.push(route);
                self.replace_routes(&routes).await
            }
        }
    }

    #[tracing::instrument(skip(self), fields(%host), err)]
    async fn remove_route(&self, host: &str) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;

        let routes = Self::routes(self.fetch().await?)?;
        match find_route_index(&routes, host) {
            Some(index) => self.delete_route(index).await,
            None => Ok(()),
        }
    }

    #[tracing::instrument(skip(self), fields(%canonical_host, %alias, ?op), err)]
    async fn apply_alias(
        &self,
        canonical_host: &str,
        alias: &str,
        op: AliasOp,
    ) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;

        let routes = Self::routes(self.fetch().await?)?;
        let index = find_route_index(&routes, canonical_host)
            .ok_or_else(|| anyhow::anyhow!("no route for host {canonical_host}"))?;

        let mut route = routes[index].clone();
        let mut hosts: Vec<String> = route.hosts().to_vec();
        match op {
            AliasOp::Add => {
                if !hosts.iter().any(|h| h == alias) {
                    hosts.push(alias.to_owned());
                }
            }
            AliasOp::Remove => hosts.retain(|h| h != alias),
        }

        if hosts.is_empty() {
            return self.delete_route(index).await;
        }

        route.set_hosts(hosts);
        self.patch_route(index, &route).await
    }
}
