mod helpers;

use sarabi::config::PROXY_CONTAINER_NAME;
use sarabi::model::{DeploymentStatus, InstanceKind, StorageEngine};
use sarabi::orchestrator::DeployParams;

use helpers::{bundle, harness};

fn deploy_params(
    application_id: uuid::Uuid,
    environment: &str,
    instance_count: i64,
    backend: bool,
    frontend: bool,
) -> DeployParams {
    DeployParams {
        application_id,
        environment: environment.into(),
        instance_count,
        backend: backend.then(bundle),
        frontend: frontend.then(bundle),
    }
}

#[tokio::test]
async fn backend_deploy_creates_instances_and_route() {
    let h = harness().await;
    let app = h.create_app("shop", vec![]).await;

    let receipt = h
        .orchestrator
        .deploy(deploy_params(app.id, "prod", 2, true, false))
        .await
        .unwrap();

    // Exactly one backend deployment row, ACTIVE, with the requested count
    let deployments = h.orchestrator.list_deployments(app.id).await.unwrap();
    let backends: Vec<_> = deployments
        .iter()
        .filter(|d| d.instance_type == InstanceKind::Backend)
        .collect();
    assert_eq!(backends.len(), 1);
    let backend = backends[0];
    assert_eq!(backend.status, DeploymentStatus::Active);
    assert_eq!(backend.instance_count, 2);
    assert_eq!(backend.identifier, receipt.identifier);

    // Two running containers named {deployment_id}-prod-{index}
    assert!(h.runtime.is_running(&backend.container_name(0)));
    assert!(h.runtime.is_running(&backend.container_name(1)));

    // One proxy route for the canonical host with exactly two upstreams
    let route = h.proxy.route_for("backend-prod.example.com").unwrap();
    let handle = &route.handle[0];
    assert_eq!(handle.handler, "reverse_proxy");
    let upstreams = handle.upstreams.as_ref().unwrap();
    assert_eq!(upstreams.len(), 2);
    assert_eq!(upstreams[0].dial, backend.upstream_addr(0));
    assert_eq!(upstreams[1].dial, backend.upstream_addr(1));

    assert_eq!(receipt.backend_urls, vec!["https://backend-prod.example.com"]);
    assert!(receipt.frontend_urls.is_empty());

    // The snapshot carries the injected PORT variable
    let snapshot = h.vault.deployment_snapshot(backend.id).await.unwrap();
    let port_var = snapshot.iter().find(|s| s.name == "PORT").unwrap();
    assert_eq!(port_var.value, backend.port.unwrap().to_string());

    // Shared proxy got connected to the deployment network
    let connections = h.runtime.connections.lock().unwrap().clone();
    assert!(connections.contains(&(PROXY_CONTAINER_NAME.into(), backend.network_name())));
}

#[tokio::test]
async fn second_deploy_supersedes_the_first() {
    let h = harness().await;
    let app = h.create_app("shop", vec![]).await;

    h.orchestrator
        .deploy(deploy_params(app.id, "prod", 1, true, false))
        .await
        .unwrap();
    h.orchestrator
        .deploy(deploy_params(app.id, "prod", 1, true, false))
        .await
        .unwrap();

    let deployments = h.orchestrator.list_deployments(app.id).await.unwrap();
    let backends: Vec<_> = deployments
        .iter()
        .filter(|d| d.instance_type == InstanceKind::Backend)
        .collect();
    assert_eq!(backends.len(), 2);

    let old = &backends[0];
    let new = &backends[1];
    assert_eq!(old.status, DeploymentStatus::Stopped);
    assert_eq!(new.status, DeploymentStatus::Active);

    // Old instance containers were stopped and removed; the new one serves
    assert!(!h.runtime.is_running(&old.container_name(0)));
    assert!(h.runtime.is_running(&new.container_name(0)));

    // The route was replaced, not duplicated
    let route = h.proxy.route_for("backend-prod.example.com").unwrap();
    let upstreams = route.handle[0].upstreams.as_ref().unwrap();
    assert_eq!(upstreams.len(), 1);
    assert_eq!(upstreams[0].dial, new.upstream_addr(0));
    assert_eq!(h.proxy.route_count(), 1);
}

#[tokio::test]
async fn frontend_deploy_extracts_bundle_and_serves_it() {
    let h = harness().await;
    let app = h.create_app("shop", vec![]).await;

    h.orchestrator
        .deploy(deploy_params(app.id, "prod", 1, false, true))
        .await
        .unwrap();

    let deployments = h.orchestrator.list_deployments(app.id).await.unwrap();
    let frontend = deployments
        .iter()
        .find(|d| d.instance_type == InstanceKind::Frontend)
        .unwrap();
    assert_eq!(frontend.status, DeploymentStatus::Active);

    // Content extracted under the per-deployment site directory
    let site = h.artifacts.site_dir(frontend);
    assert!(site.join("index.html").exists());

    // file_server route rooted at that directory
    let route = h.proxy.route_for("frontend-prod.example.com").unwrap();
    assert_eq!(route.handle[0].handler, "file_server");
    assert_eq!(
        route.handle[0].root.as_deref(),
        Some(site.display().to_string().as_str())
    );
}

#[tokio::test]
async fn instance_start_failure_fails_the_deploy_without_activation() {
    let h = harness().await;
    let app = h.create_app("shop", vec![]).await;
    h.runtime.fail_starts_ending_with("-prod-1");

    let err = h
        .orchestrator
        .deploy(deploy_params(app.id, "prod", 3, true, false))
        .await;
    assert!(err.is_err());

    // The row stays CREATED; no route was installed
    let deployments = h.orchestrator.list_deployments(app.id).await.unwrap();
    let backend = deployments
        .iter()
        .find(|d| d.instance_type == InstanceKind::Backend)
        .unwrap();
    assert_eq!(backend.status, DeploymentStatus::Created);
    assert!(h.proxy.route_for("backend-prod.example.com").is_none());
}

#[tokio::test]
async fn database_deploy_is_idempotent_and_blocks_its_port() {
    let mut h = harness().await;
    let app = h.create_app("shop", vec![StorageEngine::Postgres]).await;

    h.orchestrator
        .deploy(deploy_params(app.id, "prod", 1, false, false))
        .await
        .unwrap();

    assert!(h.runtime.is_running("postgres-shop-prod"));
    assert!(h.runtime.pulled_images.lock().unwrap().contains(&"postgres:17".to_string()));

    let deployments = h.orchestrator.list_deployments(app.id).await.unwrap();
    let first_db = deployments
        .iter()
        .find(|d| d.instance_type == InstanceKind::Database)
        .unwrap()
        .clone();
    assert_eq!(first_db.status, DeploymentStatus::Active);

    // Credentials were generated and snapshotted against the deployment
    let snapshot = h.vault.deployment_snapshot(first_db.id).await.unwrap();
    assert!(snapshot.iter().any(|s| s.name == "POSTGRES_PASSWORD"));

    // The ephemeral port got queued for public blocking
    let event = h.block_events.recv().await.unwrap();
    assert_eq!(i64::from(event.port), first_db.port.unwrap());
    assert!(event.result.is_ok());
    assert_eq!(*h.firewall.blocked.lock().unwrap(), vec![event.port]);

    // A second rollout sees the running container and does not reseed
    let starts_before = h
        .runtime
        .start_calls
        .load(std::sync::atomic::Ordering::SeqCst);
    h.orchestrator
        .deploy(deploy_params(app.id, "prod", 1, false, false))
        .await
        .unwrap();

    let deployments = h.orchestrator.list_deployments(app.id).await.unwrap();
    let second_db = deployments
        .iter()
        .filter(|d| d.instance_type == InstanceKind::Database)
        .next_back()
        .unwrap();
    assert_ne!(second_db.id, first_db.id);
    assert!(h
        .vault
        .deployment_snapshot(second_db.id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        h.runtime
            .start_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        starts_before
    );
}

#[tokio::test]
async fn deploy_installs_base_proxy_config_once() {
    let h = harness().await;
    let app = h.create_app("shop", vec![]).await;

    h.orchestrator
        .deploy(deploy_params(app.id, "prod", 1, true, false))
        .await
        .unwrap();

    assert!(h.runtime.is_running(PROXY_CONTAINER_NAME));
    assert!(h
        .proxy
        .base_installed
        .load(std::sync::atomic::Ordering::SeqCst));

    // The proxy is a singleton: a second deploy must not reinstall the base
    // config (which would wipe the live route table)
    h.proxy
        .base_installed
        .store(false, std::sync::atomic::Ordering::SeqCst);
    h.orchestrator
        .deploy(deploy_params(app.id, "prod", 1, true, false))
        .await
        .unwrap();
    assert!(!h
        .proxy
        .base_installed
        .load(std::sync::atomic::Ordering::SeqCst));
    assert!(h.proxy.route_for("backend-prod.example.com").is_some());
}

#[tokio::test]
async fn deploy_rejects_bad_input() {
    let h = harness().await;
    let app = h.create_app("shop", vec![]).await;

    let err = h
        .orchestrator
        .deploy(deploy_params(app.id, "", 1, true, false))
        .await;
    assert!(matches!(err, Err(sarabi::Error::Validation(_))));

    let err = h
        .orchestrator
        .deploy(deploy_params(app.id, "prod", 0, true, false))
        .await;
    assert!(matches!(err, Err(sarabi::Error::Validation(_))));

    let err = h
        .orchestrator
        .deploy(deploy_params(uuid::Uuid::new_v4(), "prod", 1, true, false))
        .await;
    assert!(matches!(err, Err(sarabi::Error::NotFound(_))));
}

#[tokio::test]
async fn duplicate_application_name_conflicts() {
    let h = harness().await;
    h.create_app("shop", vec![]).await;

    let err = h
        .orchestrator
        .create_application(sarabi::registry::applications::CreateApplicationParams {
            name: "shop".into(),
            domain: "other.com".into(),
            storage_engines: vec![],
        })
        .await;
    assert!(matches!(err, Err(sarabi::Error::Conflict(_))));
}
