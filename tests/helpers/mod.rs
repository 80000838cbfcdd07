#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use sarabi::artifact::ArtifactStore;
use sarabi::builders::Services;
use sarabi::config::Config;
use sarabi::firewall::{BlockEvent, Firewall, spawn_blocker};
use sarabi::ids::{IdGenerator, PortAllocator};
use sarabi::model::{Application, StorageEngine};
use sarabi::orchestrator::Orchestrator;
use sarabi::proxy::config::{Route, find_route_index};
use sarabi::proxy::{AliasOp, ProxyAdmin};
use sarabi::registry;
use sarabi::registry::applications::CreateApplicationParams;
use sarabi::runtime::{ContainerHandle, ContainerRuntime, StartSpec};
use sarabi::vault::{Vault, crypto};

// ---------------------------------------------------------------------------
// Fake container runtime
// ---------------------------------------------------------------------------

/// In-memory container runtime recording every call. `fail_start_suffix`
/// makes any container whose name ends with the suffix fail to start.
#[derive(Default)]
pub struct FakeRuntime {
    pub running: Mutex<HashMap<String, ContainerHandle>>,
    pub networks: Mutex<Vec<String>>,
    pub volumes: Mutex<Vec<String>>,
    pub built_images: Mutex<Vec<String>>,
    pub pulled_images: Mutex<Vec<String>>,
    pub connections: Mutex<Vec<(String, String)>>,
    pub fail_start_suffix: Mutex<Option<String>>,
    pub start_calls: AtomicUsize,
}

impl FakeRuntime {
    pub fn is_running(&self, name: &str) -> bool {
        self.running.lock().unwrap().contains_key(name)
    }

    pub fn running_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.running.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn fail_starts_ending_with(&self, suffix: &str) {
        *self.fail_start_suffix.lock().unwrap() = Some(suffix.to_owned());
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn build_image(&self, image: &str, artifact: &Path) -> anyhow::Result<()> {
        if !artifact.exists() {
            anyhow::bail!("artifact missing: {}", artifact.display());
        }
        self.built_images.lock().unwrap().push(image.to_owned());
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> anyhow::Result<()> {
        self.pulled_images.lock().unwrap().push(image.to_owned());
        Ok(())
    }

    async fn ensure_network(&self, name: &str) -> anyhow::Result<()> {
        let mut networks = self.networks.lock().unwrap();
        if !networks.iter().any(|n| n == name) {
            networks.push(name.to_owned());
        }
        Ok(())
    }

    async fn create_volume(&self, name: &str) -> anyhow::Result<()> {
        self.volumes.lock().unwrap().push(name.to_owned());
        Ok(())
    }

    async fn start_container(&self, spec: StartSpec) -> anyhow::Result<ContainerHandle> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .fail_start_suffix
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|suffix| spec.name.ends_with(suffix));
        if should_fail {
            anyhow::bail!("container {} refused to start", spec.name);
        }

        let handle = ContainerHandle {
            id: format!("cid-{}", spec.name),
            name: spec.name.clone(),
        };
        self.running
            .lock()
            .unwrap()
            .insert(spec.name, handle.clone());
        Ok(handle)
    }

    async fn stop_and_remove(&self, container: &str, _remove_volumes: bool) -> anyhow::Result<()> {
        self.running.lock().unwrap().remove(container);
        Ok(())
    }

    async fn connect_network(&self, container: &str, network: &str) -> anyhow::Result<()> {
        self.connections
            .lock()
            .unwrap()
            .push((container.to_owned(), network.to_owned()));
        Ok(())
    }

    async fn inspect_running(&self, container: &str) -> anyhow::Result<Option<ContainerHandle>> {
        Ok(self.running.lock().unwrap().get(container).cloned())
    }

    async fn exec(
        &self,
        _container: &str,
        _cmd: &[String],
        _env: &[String],
    ) -> anyhow::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Fake reverse proxy
// ---------------------------------------------------------------------------

/// In-memory route table with the same replace/append/prune semantics as the
/// admin-API client.
#[derive(Default)]
pub struct FakeProxy {
    pub routes: Mutex<Vec<Route>>,
    pub base_installed: AtomicBool,
}

impl FakeProxy {
    pub fn route_for(&self, host: &str) -> Option<Route> {
        let routes = self.routes.lock().unwrap();
        find_route_index(&routes, host).map(|index| routes[index].clone())
    }

    pub fn route_count(&self) -> usize {
        self.routes.lock().unwrap().len()
    }
}

#[async_trait]
impl ProxyAdmin for FakeProxy {
    async fn ready(&self) -> bool {
        true
    }

    async fn install_base_config(&self) -> anyhow::Result<()> {
        self.base_installed.store(true, Ordering::SeqCst);
        self.routes.lock().unwrap().clear();
        Ok(())
    }

    async fn upsert_route(&self, host: &str, route: Route) -> anyhow::Result<()> {
        let mut routes = self.routes.lock().unwrap();
        match find_route_index(&routes, host) {
            Some(index) => routes[index] = route,
            None => routes.push(route),
        }
        Ok(())
    }

    async fn remove_route(&self, host: &str) -> anyhow::Result<()> {
        let mut routes = self.routes.lock().unwrap();
        if let Some(index) = find_route_index(&routes, host) {
            routes.remove(index);
        }
        Ok(())
    }

    async fn apply_alias(
        &self,
        canonical_host: &str,
        alias: &str,
        op: AliasOp,
    ) -> anyhow::Result<()> {
        let mut routes = self.routes.lock().unwrap();
        let index = find_route_index(&routes, canonical_host)
            .ok_or_else(|| anyhow::anyhow!("no route for host {canonical_host}"))?;

        let mut hosts: Vec<String> = routes[index].hosts().to_vec();
        match op {
            AliasOp::Add => {
                if !hosts.iter().any(|h| h == alias) {
                    hosts.push(alias.to_owned());
                }
            }
            AliasOp::Remove => hosts.retain(|h| h != alias),
        }

        if hosts.is_empty() {
            routes.remove(index);
        } else {
            routes[index].set_hosts(hosts);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake firewall
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeFirewall {
    pub blocked: Mutex<Vec<u16>>,
    pub whitelisted: Mutex<Vec<(String, u16)>>,
    pub blacklisted: Mutex<Vec<(String, u16)>>,
}

#[async_trait]
impl Firewall for FakeFirewall {
    async fn block_port(&self, port: u16) -> anyhow::Result<()> {
        self.blocked.lock().unwrap().push(port);
        Ok(())
    }

    async fn whitelist_ip(&self, ip: std::net::IpAddr, port: u16) -> anyhow::Result<()> {
        self.whitelisted
            .lock()
            .unwrap()
            .push((ip.to_string(), port));
        Ok(())
    }

    async fn blacklist_ip(&self, ip: std::net::IpAddr, port: u16) -> anyhow::Result<()> {
        self.blacklisted
            .lock()
            .unwrap()
            .push((ip.to_string(), port));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Deterministic id / port sources
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct SequenceIds {
    counter: AtomicUsize,
}

impl IdGenerator for SequenceIds {
    fn generate(&self, len: usize) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{n:0len$}")
    }
}

pub struct SequencePorts {
    next: AtomicU16,
}

impl Default for SequencePorts {
    fn default() -> Self {
        Self {
            next: AtomicU16::new(40000),
        }
    }
}

impl PortAllocator for SequencePorts {
    fn allocate(&self) -> std::io::Result<u16> {
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub pool: SqlitePool,
    pub vault: Vault,
    pub artifacts: ArtifactStore,
    pub runtime: Arc<FakeRuntime>,
    pub proxy: Arc<FakeProxy>,
    pub firewall: Arc<FakeFirewall>,
    pub block_events: mpsc::Receiver<BlockEvent>,
    _data_dir: tempfile::TempDir,
}

/// Build an orchestrator over an in-memory registry, a temp data directory
/// and fake collaborators.
pub async fn harness() -> Harness {
    sarabi::telemetry::init();

    let data_dir = tempfile::tempdir().expect("tempdir");
    let pool = registry::connect("sqlite::memory:").await.expect("registry");
    let vault = Vault::new(pool.clone(), crypto::dev_master_key());

    let config = Arc::new(Config {
        database_url: "sqlite::memory:".into(),
        data_dir: data_dir.path().to_path_buf(),
        proxy_admin_url: "http://127.0.0.1:2019".into(),
        proxy_image: "caddy:2.9".into(),
        proxy_ready_attempts: 3,
        proxy_ready_base_delay_ms: 1,
        master_key: None,
        dev_mode: true,
    });
    let artifacts = ArtifactStore::new(config.artifacts_dir(), config.sites_dir());

    let runtime = Arc::new(FakeRuntime::default());
    let proxy = Arc::new(FakeProxy::default());
    let firewall = Arc::new(FakeFirewall::default());

    let services = Services {
        pool: pool.clone(),
        vault: vault.clone(),
        artifacts: artifacts.clone(),
        runtime: Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
        proxy: Arc::clone(&proxy) as Arc<dyn ProxyAdmin>,
        config,
    };

    let (blocker, block_events) = spawn_blocker(Arc::clone(&firewall) as Arc<dyn Firewall>, 16);

    let orchestrator = Orchestrator::new(
        services,
        Arc::clone(&firewall) as Arc<dyn Firewall>,
        blocker,
        Arc::new(SequenceIds::default()),
        Arc::new(SequencePorts::default()),
    );

    Harness {
        orchestrator,
        pool,
        vault,
        artifacts,
        runtime,
        proxy,
        firewall,
        block_events,
        _data_dir: data_dir,
    }
}

impl Harness {
    pub async fn create_app(&self, name: &str, engines: Vec<StorageEngine>) -> Application {
        self.orchestrator
            .create_application(CreateApplicationParams {
                name: name.into(),
                domain: "example.com".into(),
                storage_engines: engines,
            })
            .await
            .expect("create application")
    }
}

/// A minimal one-file `.tar.gz` bundle usable as backend or frontend artifact.
pub fn bundle() -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    let mut bytes = Vec::new();
    {
        let encoder = GzEncoder::new(&mut bytes, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let content = b"<html>ok</html>";
        let mut header = tar::Header::new_gnu();
        header.set_path("index.html").unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &content[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }
    bytes
}
