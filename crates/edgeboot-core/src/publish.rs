// ── Best-effort publication ──
//
// Hands the subscription to an external registry and optionally asks a
// keep-alive service to visit the project URL. Nothing here can fail the
// pipeline: outcomes become events and a small report.

use edgeboot_api::RegistryClient;
use edgeboot_config::TunnelConfig;
use tracing::{info, warn};
use url::Url;

use crate::event::{BootEvent, EventSink};
use crate::subscription::SubscriptionDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Skipped,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub registry: Delivery,
    pub keepalive: Delivery,
}

/// `{project}/{sub_path}` without doubled slashes.
pub fn subscription_url(project: &Url, sub_path: &str) -> String {
    format!(
        "{}/{}",
        project.as_str().trim_end_matches('/'),
        sub_path.trim_start_matches('/')
    )
}

pub struct Publisher {
    client: RegistryClient,
}

impl Publisher {
    pub fn new(client: RegistryClient) -> Self {
        Self { client }
    }

    /// Publish `doc` (when present) and register keep-alive.
    pub async fn publish(
        &self,
        config: &TunnelConfig,
        doc: Option<&SubscriptionDocument>,
        events: &EventSink,
    ) -> PublishReport {
        let registry = match (&config.upload_url, doc) {
            (Some(base), Some(doc)) => self.publish_registry(config, base, doc, events).await,
            _ => Delivery::Skipped,
        };
        let keepalive = self.register_keepalive(config, events).await;
        PublishReport {
            registry,
            keepalive,
        }
    }

    async fn publish_registry(
        &self,
        config: &TunnelConfig,
        base: &Url,
        doc: &SubscriptionDocument,
        events: &EventSink,
    ) -> Delivery {
        let (target, result) = if let Some(project) = &config.project_url {
            let sub = subscription_url(project, &config.sub_path);
            let result = self.client.add_subscription(base, &sub).await;
            ("subscription", result)
        } else {
            if doc.is_empty() {
                return Delivery::Skipped;
            }
            let result = self.client.add_nodes(base, doc.links()).await;
            ("nodes", result)
        };

        match result {
            Ok(()) => {
                info!(target, registry = %base, "published");
                events.emit(BootEvent::Published {
                    target: target.to_owned(),
                });
                Delivery::Delivered
            }
            Err(e) => {
                warn!(target, registry = %base, error = %e, "publication failed");
                events.emit(BootEvent::PublishFailed {
                    target: target.to_owned(),
                    reason: e.to_string(),
                });
                Delivery::Failed
            }
        }
    }

    async fn register_keepalive(&self, config: &TunnelConfig, events: &EventSink) -> Delivery {
        if !config.auto_access {
            return Delivery::Skipped;
        }
        let (Some(project), Some(keepalive)) = (&config.project_url, &config.keepalive_url) else {
            return Delivery::Skipped;
        };

        match self
            .client
            .register_keepalive(keepalive, project.as_str())
            .await
        {
            Ok(()) => {
                info!(project = %project, "keep-alive registered");
                events.emit(BootEvent::KeepaliveRegistered);
                Delivery::Delivered
            }
            Err(e) => {
                warn!(error = %e, "keep-alive registration failed");
                events.emit(BootEvent::KeepaliveFailed {
                    reason: e.to_string(),
                });
                Delivery::Failed
            }
        }
    }
}
