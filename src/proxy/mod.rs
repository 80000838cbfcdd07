pub mod caddy;
pub mod config;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

pub use caddy::CaddyClient;
pub use config::Route;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasOp {
    Add,
    Remove,
}

/// Capability surface of the reverse-proxy admin API, one route per
/// deployment host. Implementations must serialize route-table mutations:
/// the table is replaced wholesale via read-modify-write, so two interleaved
/// writers would silently lose one update.
#[async_trait]
pub trait ProxyAdmin: Send + Sync {
    /// Probe whether the admin endpoint answers.
    async fn ready(&self) -> bool;

    /// Push the initial configuration: listeners plus an empty route table.
    async fn install_base_config(&self) -> anyhow::Result<()>;

    /// Replace the route for `host`, or append one if none exists.
    async fn upsert_route(&self, host: &str, route: Route) -> anyhow::Result<()>;

    /// Delete the route matching `host`. Deleting an absent route is a no-op.
    async fn remove_route(&self, host: &str) -> anyhow::Result<()>;

    /// Add or remove an alias hostname on the route matching
    /// `canonical_host`, pruning the route entirely when no hosts remain.
    async fn apply_alias(&self, canonical_host: &str, alias: &str, op: AliasOp)
    -> anyhow::Result<()>;
}

/// Wait for the proxy admin endpoint to come up: bounded exponential backoff
/// (`base_delay` doubling per attempt), fatal once the attempt budget is
/// exhausted.
pub async fn wait_ready(
    proxy: &dyn ProxyAdmin,
    attempts: u32,
    base_delay: Duration,
) -> Result<()> {
    let mut delay = base_delay;
    for _ in 0..attempts {
        if proxy.ready().await {
            tracing::info!("reverse proxy admin endpoint is available");
            return Ok(());
        }
        tokio::time::sleep(delay).await;
        delay *= 2;
    }

    Err(Error::dependency(
        "reverse proxy",
        "readiness wait",
        anyhow::anyhow!("admin endpoint unreachable after {attempts} attempts"),
    ))
}
