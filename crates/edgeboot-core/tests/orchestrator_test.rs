#![cfg(unix)]
#![allow(clippy::unwrap_used)]
// End-to-end pipeline runs with fake tools and wiremock HTTP.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use tokio::sync::broadcast::Receiver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use edgeboot_api::{GeoLocator, GeoProvider, RegistryClient};
use edgeboot_config::{RawConfig, TunnelConfig};
use edgeboot_core::backoff::Backoff;
use edgeboot_core::provision::{ToolCatalog, ToolSpec};
use edgeboot_core::publish::{Delivery, Publisher};
use edgeboot_core::resolver::DomainResolver;
use edgeboot_core::supervisor::Readiness;
use edgeboot_core::{BootEvent, Orchestrator, Role};

// ── Helpers ─────────────────────────────────────────────────────────

/// Shell script padded past the provisioner's size threshold.
fn fake_tool(dir: &Path, name: &str, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    let mut script = format!("#!/bin/sh\n{body}\n#");
    script.push_str(&"x".repeat(1_000_100));
    script.push('\n');
    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn catalog(server: &MockServer) -> ToolCatalog {
    let at = |spec: ToolSpec| ToolSpec {
        url_template: format!("{}/releases/{}-{{arch}}", server.uri(), spec.name),
        ..spec
    };
    ToolCatalog {
        proxy_core: at(ToolSpec::xray("v0")),
        tunnel_client: at(ToolSpec::cloudflared("v0")),
        monitor_agent: at(ToolSpec::komari("v0")),
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn quick() -> Backoff {
    Backoff::new(
        Duration::from_millis(20),
        Duration::from_millis(100),
        Duration::from_millis(300),
    )
}

async fn mount_geo(server: &MockServer) -> GeoLocator {
    Mock::given(method("GET"))
        .and(path("/geo"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"country_code": "DE", "org": "Hetzner"})),
        )
        .mount(server)
        .await;
    let provider = GeoProvider::new(
        format!("{}/geo", server.uri()).parse().unwrap(),
        "country_code",
        "org",
    );
    GeoLocator::with_providers(reqwest::Client::new(), vec![provider])
}

async fn mount_missing_releases(server: &MockServer) {
    Mock::given(method("GET"))
        .and(wiremock::matchers::path_regex("^/releases/.*"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

fn drain(rx: &mut Receiver<Arc<BootEvent>>) -> Vec<BootEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push((*event).clone());
    }
    out
}

fn config(workdir: &Path, raw: RawConfig) -> TunnelConfig {
    TunnelConfig::try_from(RawConfig {
        file_path: workdir.display().to_string(),
        uuid: Some("5f0c6a1e-8d9b-4c2e-9b7a-3e1f2d4c5b6a".into()),
        ..raw
    })
    .unwrap()
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_ephemeral_tunnel_full_pipeline() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_missing_releases(&server).await;
    let geo = mount_geo(&server).await;

    fake_tool(dir.path(), "xray", "exec sleep 30");
    fake_tool(
        dir.path(),
        "cloudflared",
        "echo 'INF |  https://fake-edge.trycloudflare.com  |' > boot.log\nexec sleep 30",
    );

    let cfg = config(
        dir.path(),
        RawConfig {
            argo_port: free_port(),
            name: "edge".into(),
            ..RawConfig::default()
        },
    );
    let orch = Orchestrator::new(cfg)
        .unwrap()
        .with_tools(catalog(&server))
        .with_geo(geo)
        .with_readiness(quick())
        .with_resolver(DomainResolver::new(Backoff::new(
            Duration::from_millis(20),
            Duration::from_millis(100),
            Duration::from_secs(5),
        )));
    let mut rx = orch.events();
    let hook = orch.shutdown_hook();

    let report = orch.boot().await;

    assert_eq!(report.error, None);
    assert_eq!(report.tunnel_mode, Some("quick"));
    assert_eq!(report.started, vec![Role::ProxyCore, Role::TunnelClient]);
    assert_eq!(report.proxy_readiness, Some(Readiness::TimedOut));
    assert_eq!(report.domain.as_deref(), Some("fake-edge.trycloudflare.com"));
    assert!(dir.path().join("config.json").exists());

    let encoded = std::fs::read_to_string(dir.path().join("sub.txt")).unwrap();
    let plain = String::from_utf8(STANDARD.decode(encoded.trim()).unwrap()).unwrap();
    assert!(plain.contains("vless://5f0c6a1e-8d9b-4c2e-9b7a-3e1f2d4c5b6a@fake-edge.trycloudflare.com:443?"));
    assert!(plain.contains("#edge-DE_Hetzner"));
    assert!(plain.contains("vmess://"));
    assert!(plain.contains("trojan://"));

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, BootEvent::ToolReady { tool: "xray", cached: true, .. })));
    assert!(events.contains(&BootEvent::DomainResolved {
        host: "fake-edge.trycloudflare.com".into()
    }));

    assert!(hook.fire().await);
    assert!(orch.supervisor().roles().await.is_empty());
    assert!(!hook.fire().await);

    // shutdown cancels the pending cleanup
    let cleanup = report.cleanup.unwrap();
    assert_eq!(tokio_test::assert_ok!(cleanup.await), None);
    assert!(dir.path().join("config.json").exists());
}

#[tokio::test]
async fn test_zero_ports_never_starts_proxy_core() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_missing_releases(&server).await;

    let cfg = config(
        dir.path(),
        RawConfig {
            vless_port: 0,
            vmess_port: 0,
            trojan_port: 0,
            ..RawConfig::default()
        },
    );
    let orch = Orchestrator::new(cfg)
        .unwrap()
        .with_tools(catalog(&server))
        .with_readiness(quick());
    let mut rx = orch.events();

    let report = orch.boot().await;

    assert_eq!(report.error, None);
    assert!(report.started.is_empty());
    assert!(report.domain.is_none());
    assert!(report.subscription.is_none());
    assert!(!dir.path().join("config.json").exists());
    assert!(!dir.path().join("xray").exists());

    let events = drain(&mut rx);
    assert!(events.contains(&BootEvent::ProxyCoreSkipped));
    assert!(events.contains(&BootEvent::DomainUnresolved));
    // only the tunnel client was wanted
    let unavailable: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            BootEvent::ToolUnavailable { tool, .. } => Some(*tool),
            _ => None,
        })
        .collect();
    assert_eq!(unavailable, vec!["cloudflared"]);

    orch.shutdown_hook().fire().await;
}

#[tokio::test]
async fn test_static_domain_publishes_nodes_without_binaries() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_missing_releases(&server).await;
    let geo = mount_geo(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/add-nodes"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(
        dir.path(),
        RawConfig {
            argo_auth: Some("Zm9vYmFyYmF6".repeat(12)),
            argo_domain: Some("edge.example.com".into()),
            cfip: Some("cdn.example.net".into()),
            cfport: 8443,
            trojan_port: 0,
            upload_url: Some(server.uri()),
            ..RawConfig::default()
        },
    );
    let orch = Orchestrator::new(cfg)
        .unwrap()
        .with_tools(catalog(&server))
        .with_geo(geo)
        .with_publisher(Publisher::new(RegistryClient::from_reqwest(
            reqwest::Client::new(),
        )));

    let report = orch.boot().await;

    assert_eq!(report.error, None);
    assert_eq!(report.tunnel_mode, Some("remote"));
    assert!(report.started.is_empty());
    assert_eq!(report.domain.as_deref(), Some("edge.example.com"));

    let doc = report.subscription.unwrap();
    assert_eq!(doc.links().len(), 2);
    assert!(doc.links()[0].starts_with("vless://5f0c6a1e-8d9b-4c2e-9b7a-3e1f2d4c5b6a@cdn.example.net:8443?"));
    assert!(doc.links()[0].contains("sni=edge.example.com"));
    assert_eq!(report.publish.unwrap().registry, Delivery::Delivered);
}

#[tokio::test]
async fn test_structured_credential_writes_tunnel_files() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_missing_releases(&server).await;
    let geo = mount_geo(&server).await;

    let secret = r#"{"AccountTag":"acc","TunnelSecret":"c2VjcmV0","TunnelID":"tid-7"}"#;
    let cfg = config(
        dir.path(),
        RawConfig {
            argo_auth: Some(secret.into()),
            argo_domain: Some("named.example.com".into()),
            ..RawConfig::default()
        },
    );
    let orch = Orchestrator::new(cfg)
        .unwrap()
        .with_tools(catalog(&server))
        .with_geo(geo);

    let report = orch.boot().await;
    assert_eq!(report.error, None);
    assert_eq!(report.tunnel_mode, Some("config-file"));

    assert_eq!(
        std::fs::read_to_string(dir.path().join("tunnel.json")).unwrap(),
        secret
    );
    let yaml = std::fs::read_to_string(dir.path().join("tunnel.yml")).unwrap();
    assert!(yaml.contains("tunnel: tid-7"));
    assert!(yaml.contains("named.example.com"));
    assert!(yaml.contains("http_status:404"));
}

#[tokio::test]
async fn test_pipeline_failure_is_contained() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    // working directory path is occupied by a regular file
    let blocked = dir.path().join("world");
    std::fs::write(&blocked, "not a directory").unwrap();

    let orch = Orchestrator::new(config(&blocked, RawConfig::default()))
        .unwrap()
        .with_tools(catalog(&server));
    let mut rx = orch.events();

    let report = orch.boot().await;

    assert!(report.error.is_some());
    assert!(report.started.is_empty());
    assert!(report.cleanup.is_some());
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, BootEvent::PipelineFailed { .. })));
}

#[tokio::test]
async fn test_single_inbound_tunnel_links_only_that_protocol() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_missing_releases(&server).await;
    let geo = mount_geo(&server).await;

    let cfg = config(
        dir.path(),
        RawConfig {
            argo_auth: Some("Zm9vYmFyYmF6".repeat(12)),
            argo_domain: Some("edge.example.com".into()),
            argo_port: 0,
            ..RawConfig::default()
        },
    );
    let orch = Orchestrator::new(cfg)
        .unwrap()
        .with_tools(catalog(&server))
        .with_geo(geo);

    let report = orch.boot().await;

    assert_eq!(report.error, None);
    assert_eq!(report.domain.as_deref(), Some("edge.example.com"));
    let doc = report.subscription.unwrap();
    assert_eq!(doc.links().len(), 1);
    assert!(doc.links()[0].starts_with("vless://"));

    let encoded = std::fs::read_to_string(dir.path().join("sub.txt")).unwrap();
    let plain = String::from_utf8(STANDARD.decode(encoded.trim()).unwrap()).unwrap();
    assert!(!plain.contains("vmess://"));
    assert!(!plain.contains("trojan://"));
}

#[tokio::test]
async fn test_static_domain_without_protocols_publishes_nothing() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_missing_releases(&server).await;
    let geo = mount_geo(&server).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = config(
        dir.path(),
        RawConfig {
            argo_auth: Some("Zm9vYmFyYmF6".repeat(12)),
            argo_domain: Some("edge.example.com".into()),
            vless_port: 0,
            vmess_port: 0,
            trojan_port: 0,
            upload_url: Some(server.uri()),
            project_url: Some("https://app.example.com".into()),
            ..RawConfig::default()
        },
    );
    let orch = Orchestrator::new(cfg)
        .unwrap()
        .with_tools(catalog(&server))
        .with_geo(geo)
        .with_publisher(Publisher::new(RegistryClient::from_reqwest(
            reqwest::Client::new(),
        )));

    let report = orch.boot().await;

    assert_eq!(report.error, None);
    assert_eq!(report.domain.as_deref(), Some("edge.example.com"));
    assert!(report.subscription.is_none());
    assert!(!dir.path().join("sub.txt").exists());
    assert_eq!(report.publish.unwrap().registry, Delivery::Skipped);
}
