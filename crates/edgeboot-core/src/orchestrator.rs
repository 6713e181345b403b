//! The bootstrap pipeline.
//!
//! [`Orchestrator::boot`] runs once at startup:
//!
//! 1. prepare the working directory
//! 2. provision the tools this configuration needs
//! 3. write the proxy-core document and, for named tunnels, the ingress files
//! 4. start the monitor agent, the proxy core (then wait for its port), the
//!    tunnel client
//! 5. resolve the public hostname
//! 6. build and persist the subscription
//! 7. publish, register keep-alive
//! 8. schedule removal of the proxy config and tunnel log
//!
//! Every failure is absorbed: `boot` always returns a [`BootReport`] and the
//! host process starts regardless.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use edgeboot_api::{Downloader, GeoLocator, RegistryClient};
use edgeboot_config::{Protocol, TunnelConfig, TunnelCredential};

use crate::backoff::Backoff;
use crate::error::CoreError;
use crate::event::{BootEvent, EventSink};
use crate::ingress::IngressDescriptor;
use crate::launch::{TunnelMode, monitor_args, proxy_core_args, tunnel_target_port};
use crate::lifecycle::{ShutdownHook, schedule_cleanup};
use crate::provision::{Arch, Provisioner, ToolCatalog, ToolSpec};
use crate::proxy::{self, ProxyConfigDocument};
use crate::publish::{PublishReport, Publisher};
use crate::resolver::{DomainResolver, FileLog};
use crate::subscription::{LinkParams, SubscriptionDocument, node_label};
use crate::supervisor::{ProcessSpec, ProcessSupervisor, Readiness, Role, wait_for_port};
use crate::workdir::Workdir;

/// Proxy-core port readiness: 100 ms doubling to 1 s, 15 s overall.
pub const DEFAULT_READINESS: Backoff = Backoff::new(
    Duration::from_millis(100),
    Duration::from_secs(1),
    Duration::from_secs(15),
);

/// What one boot achieved. Fields stay at their defaults for skipped steps.
#[derive(Debug, Default)]
pub struct BootReport {
    pub started: Vec<Role>,
    pub proxy_readiness: Option<Readiness>,
    pub tunnel_mode: Option<&'static str>,
    pub domain: Option<String>,
    pub subscription: Option<SubscriptionDocument>,
    pub publish: Option<PublishReport>,
    pub cleanup: Option<JoinHandle<Option<usize>>>,
    /// Set when the pipeline stopped early.
    pub error: Option<String>,
}

/// Binaries that were successfully provisioned.
#[derive(Debug, Default)]
struct Binaries {
    proxy_core: Option<PathBuf>,
    tunnel_client: Option<PathBuf>,
    monitor_agent: Option<PathBuf>,
}

pub struct Orchestrator {
    config: TunnelConfig,
    workdir: Workdir,
    tools: ToolCatalog,
    downloader: Downloader,
    geo: GeoLocator,
    publisher: Publisher,
    resolver: DomainResolver,
    readiness: Backoff,
    supervisor: Arc<ProcessSupervisor>,
    events: EventSink,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Orchestrator with production HTTP clients and release artifacts.
    pub fn new(config: TunnelConfig) -> Result<Self, CoreError> {
        let workdir = Workdir::new(config.workdir.clone());
        let tools = ToolCatalog::for_versions(&config.versions);
        Ok(Self {
            workdir,
            tools,
            downloader: Downloader::new()?,
            geo: GeoLocator::new()?,
            publisher: Publisher::new(RegistryClient::new()?),
            resolver: DomainResolver::default(),
            readiness: DEFAULT_READINESS,
            supervisor: Arc::new(ProcessSupervisor::new()),
            events: EventSink::default(),
            cancel: CancellationToken::new(),
            config,
        })
    }

    // ── Builder overrides ────────────────────────────────────────────

    pub fn with_tools(mut self, tools: ToolCatalog) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn with_geo(mut self, geo: GeoLocator) -> Self {
        self.geo = geo;
        self
    }

    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_resolver(mut self, resolver: DomainResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_readiness(mut self, readiness: Backoff) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_supervisor(mut self, supervisor: Arc<ProcessSupervisor>) -> Self {
        self.supervisor = supervisor;
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Subscribe to boot events.
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<Arc<BootEvent>> {
        self.events.subscribe()
    }

    pub fn supervisor(&self) -> Arc<ProcessSupervisor> {
        Arc::clone(&self.supervisor)
    }

    /// Hook that stops every child and cancels pending cleanup.
    pub fn shutdown_hook(&self) -> ShutdownHook {
        ShutdownHook::new(Arc::clone(&self.supervisor), self.cancel.clone())
    }

    // ── Pipeline ─────────────────────────────────────────────────────

    /// Run the pipeline once. Never fails.
    pub async fn boot(&self) -> BootReport {
        let mut report = BootReport::default();

        if let Err(e) = self.run(&mut report).await {
            warn!(error = %e, "bootstrap pipeline failed; continuing without it");
            self.events.emit(BootEvent::PipelineFailed {
                error: e.to_string(),
            });
            report.error = Some(e.to_string());
        }

        report.cleanup = Some(schedule_cleanup(
            vec![self.workdir.proxy_config(), self.workdir.tunnel_log()],
            self.config.cleanup_delay,
            self.cancel.child_token(),
            self.events.clone(),
        ));
        report
    }

    async fn run(&self, report: &mut BootReport) -> Result<(), CoreError> {
        let config = &self.config;

        if config.credential_unrecognized {
            warn!("tunnel credential matches no known format; using an ephemeral tunnel");
            self.events.emit(BootEvent::CredentialUnrecognized);
        }

        let purged = self.workdir.prepare().await?;
        self.events.emit(BootEvent::WorkdirPrepared {
            root: self.workdir.root().to_path_buf(),
            purged,
        });

        let document = proxy::generate(config);
        let mode = TunnelMode::select(config, &self.workdir);
        report.tunnel_mode = mode.as_ref().map(TunnelMode::name);

        let binaries = self.provision(document.is_some(), mode.is_some()).await;

        match &document {
            Some(doc) => self.write_proxy_config(doc).await?,
            None => {
                info!("no protocol enabled; proxy core skipped");
                self.events.emit(BootEvent::ProxyCoreSkipped);
            }
        }
        if matches!(mode, Some(TunnelMode::ConfigFile { .. })) {
            self.write_tunnel_files().await?;
        }

        self.start_processes(&binaries, document.as_ref(), mode.as_ref(), report)
            .await;

        let tunnel_running = report.started.contains(&Role::TunnelClient);
        report.domain = self.resolve_domain(mode.as_ref(), tunnel_running).await;

        let protocols = config.ports.reachable();
        if protocols.len() < config.ports.enabled().len() {
            warn!(
                linked = ?protocols,
                "no public port; only the protocol behind the tunnel gets a link"
            );
        }
        match report.domain.clone() {
            Some(domain) if !protocols.is_empty() => {
                let doc = self.build_subscription(&domain, &protocols).await?;
                report.subscription = Some(doc);
            }
            Some(_) => info!("no protocol enabled; skipping subscription"),
            None => {}
        }

        report.publish = Some(
            self.publisher
                .publish(config, report.subscription.as_ref(), &self.events)
                .await,
        );
        Ok(())
    }

    async fn provision(&self, need_proxy: bool, need_tunnel: bool) -> Binaries {
        let mut wanted: Vec<(&ToolSpec, Role)> = Vec::with_capacity(3);
        if self.config.monitor.is_some() {
            wanted.push((&self.tools.monitor_agent, Role::MonitorAgent));
        }
        if need_proxy {
            wanted.push((&self.tools.proxy_core, Role::ProxyCore));
        }
        if need_tunnel {
            wanted.push((&self.tools.tunnel_client, Role::TunnelClient));
        }

        let mut binaries = Binaries::default();
        let arch = match Arch::detect() {
            Ok(arch) => arch,
            Err(e) => {
                for (tool, _) in wanted {
                    warn!(tool = tool.name, error = %e, "tool unavailable");
                    self.events.emit(BootEvent::ToolUnavailable {
                        tool: tool.name,
                        reason: e.to_string(),
                    });
                }
                return binaries;
            }
        };

        let provisioner = Provisioner::new(self.downloader.clone(), self.workdir.clone());
        for (tool, role) in wanted {
            match provisioner.ensure(tool, arch).await {
                Ok(done) => {
                    self.events.emit(BootEvent::ToolReady {
                        tool: tool.name,
                        path: done.path.clone(),
                        cached: done.cached,
                    });
                    let slot = match role {
                        Role::MonitorAgent => &mut binaries.monitor_agent,
                        Role::ProxyCore => &mut binaries.proxy_core,
                        Role::TunnelClient => &mut binaries.tunnel_client,
                    };
                    *slot = Some(done.path);
                }
                Err(e) => {
                    warn!(tool = tool.name, error = %e, "tool unavailable");
                    self.events.emit(BootEvent::ToolUnavailable {
                        tool: tool.name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        binaries
    }

    async fn write_proxy_config(&self, doc: &ProxyConfigDocument) -> Result<(), CoreError> {
        let path = self.workdir.proxy_config();
        tokio::fs::write(&path, doc.to_json()?)
            .await
            .map_err(|e| CoreError::io(&path, e))?;
        info!(path = %path.display(), inbounds = doc.inbounds.len(), "proxy config written");
        self.events.emit(BootEvent::ProxyConfigWritten {
            path,
            inbounds: doc.inbounds.len(),
        });
        Ok(())
    }

    async fn write_tunnel_files(&self) -> Result<(), CoreError> {
        let TunnelCredential::Json { tunnel_id, raw } = &self.config.credential else {
            return Ok(());
        };
        let (Some(domain), Some(port)) = (&self.config.domain, tunnel_target_port(&self.config))
        else {
            return Ok(());
        };

        let credentials = self.workdir.tunnel_credentials();
        tokio::fs::write(&credentials, raw.expose_secret())
            .await
            .map_err(|e| CoreError::io(&credentials, e))?;

        let descriptor = self.workdir.tunnel_descriptor();
        let yaml = IngressDescriptor::new(tunnel_id, &credentials, domain, port).to_yaml()?;
        tokio::fs::write(&descriptor, yaml)
            .await
            .map_err(|e| CoreError::io(&descriptor, e))?;

        info!(path = %descriptor.display(), "tunnel ingress written");
        self.events.emit(BootEvent::TunnelFilesWritten { descriptor });
        Ok(())
    }

    async fn start_processes(
        &self,
        binaries: &Binaries,
        document: Option<&ProxyConfigDocument>,
        mode: Option<&TunnelMode>,
        report: &mut BootReport,
    ) {
        let root = self.workdir.root();
        let output = self.config.child_output;

        if let (Some(bin), Some(monitor)) = (&binaries.monitor_agent, &self.config.monitor) {
            let spec = ProcessSpec::new(bin, monitor_args(monitor), root).output(output);
            self.start_role(Role::MonitorAgent, &spec, report).await;
        }

        if let (Some(bin), Some(_)) = (&binaries.proxy_core, document) {
            let spec = ProcessSpec::new(bin, proxy_core_args(&self.workdir), root).output(output);
            if self.start_role(Role::ProxyCore, &spec, report).await {
                if let Some(port) = self.config.ports.entry_port() {
                    let readiness = wait_for_port(port, self.readiness).await;
                    match readiness {
                        Readiness::Ready => {
                            info!(port, "proxy core accepting connections");
                            self.events.emit(BootEvent::ProxyReady { port });
                        }
                        Readiness::TimedOut => {
                            warn!(port, "proxy core not accepting connections; starting tunnel anyway");
                            self.events.emit(BootEvent::ProxyNotReady { port });
                        }
                    }
                    report.proxy_readiness = Some(readiness);
                }
            }
        }

        if let (Some(bin), Some(mode)) = (&binaries.tunnel_client, mode) {
            let spec = ProcessSpec::new(bin, mode.args(), root).output(output);
            self.start_role(Role::TunnelClient, &spec, report).await;
        }
    }

    async fn start_role(&self, role: Role, spec: &ProcessSpec, report: &mut BootReport) -> bool {
        match self.supervisor.start(role, spec).await {
            Ok(pid) => {
                self.events.emit(BootEvent::ProcessStarted { role, pid });
                report.started.push(role);
                true
            }
            Err(e) => {
                warn!(%role, error = %e, "failed to start");
                self.events.emit(BootEvent::ProcessFailed {
                    role,
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    async fn resolve_domain(&self, mode: Option<&TunnelMode>, tunnel_running: bool) -> Option<String> {
        let ephemeral = mode.is_some_and(TunnelMode::is_ephemeral);
        let domain = if self.config.has_static_domain() || (ephemeral && tunnel_running) {
            let log = FileLog::new(self.workdir.tunnel_log());
            self.resolver.resolve(&self.config, &log).await
        } else {
            None
        };

        match &domain {
            Some(host) => self.events.emit(BootEvent::DomainResolved { host: host.clone() }),
            None => {
                info!("no public hostname; skipping subscription");
                self.events.emit(BootEvent::DomainUnresolved);
            }
        }
        domain
    }

    async fn build_subscription(
        &self,
        domain: &str,
        protocols: &[Protocol],
    ) -> Result<SubscriptionDocument, CoreError> {
        let config = &self.config;
        let geo = self.geo.label().await;
        let params = LinkParams {
            identity: config.identity.expose_secret().to_owned(),
            fronting_host: config
                .fronting_host
                .clone()
                .unwrap_or_else(|| domain.to_owned()),
            fronting_port: config.fronting_port,
            server_name: domain.to_owned(),
            label: node_label(&config.name, &geo),
        };

        let doc = SubscriptionDocument::build(protocols, &params)?;

        let path = self.workdir.subscription();
        doc.persist(&path).await?;
        info!(path = %path.display(), links = doc.links().len(), "subscription written");
        self.events.emit(BootEvent::SubscriptionWritten {
            path,
            links: doc.links().len(),
        });
        Ok(doc)
    }
}
