use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Capability surface of the host firewall. Rule mechanics (nftables or
/// otherwise) live outside the orchestration core.
#[async_trait]
pub trait Firewall: Send + Sync {
    /// Drop public traffic to a host port.
    async fn block_port(&self, port: u16) -> anyhow::Result<()>;

    /// Allow one client IP through to a blocked port.
    async fn whitelist_ip(&self, ip: IpAddr, port: u16) -> anyhow::Result<()>;

    /// Revoke a previously whitelisted client IP.
    async fn blacklist_ip(&self, ip: IpAddr, port: u16) -> anyhow::Result<()>;
}

/// No-op implementation for platforms without a supported packet filter.
#[derive(Debug, Default)]
pub struct NoopFirewall;

#[async_trait]
impl Firewall for NoopFirewall {
    async fn block_port(&self, _port: u16) -> anyhow::Result<()> {
        Ok(())
    }

    async fn whitelist_ip(&self, _ip: IpAddr, _port: u16) -> anyhow::Result<()> {
        Ok(())
    }

    async fn blacklist_ip(&self, _ip: IpAddr, _port: u16) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Port-block worker
// ---------------------------------------------------------------------------

/// Outcome of one asynchronous port-block request. Deploy never waits on
/// these; they surface on the event channel for observers and tests.
#[derive(Debug)]
pub struct BlockEvent {
    pub port: u16,
    pub result: Result<(), String>,
}

/// Handle used to request that a port be shielded from public access.
/// Requests are queued; a full queue drops the request with a warning rather
/// than blocking a deploy on firewall configuration.
#[derive(Clone)]
pub struct PortBlocker {
    tx: mpsc::Sender<u16>,
}

impl PortBlocker {
    pub fn request_block(&self, port: u16) {
        if self.tx.try_send(port).is_err() {
            tracing::warn!(port, "port-block queue full, dropping request");
        }
    }
}

/// Spawn the worker draining port-block requests against the firewall.
/// Returns the request handle and the event stream. The worker stops once
/// every `PortBlocker` clone is dropped.
pub fn spawn_blocker(
    firewall: Arc<dyn Firewall>,
    queue_capacity: usize,
) -> (PortBlocker, mpsc::Receiver<BlockEvent>) {
    let (tx, mut rx) = mpsc::channel::<u16>(queue_capacity);
    let (event_tx, event_rx) = mpsc::channel::<BlockEvent>(queue_capacity);

    tokio::spawn(async move {
        while let Some(port) = rx.recv().await {
            let result = firewall
                .block_port(port)
                .await
                .map_err(|e| e.to_string());

            match &result {
                Ok(()) => tracing::info!(port, "blocked public access to port"),
                Err(e) => tracing::warn!(port, error = %e, "failed to block port"),
            }

            // Nobody is required to listen; drop events when the buffer is
            // full or the receiver is gone.
            let _ = event_tx.try_send(BlockEvent { port, result });
        }
    });

    (PortBlocker { tx }, event_rx)
}
