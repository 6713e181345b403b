// Registry and keep-alive notifications.
//
// The registry is an external aggregator that collects either a
// subscription URL or raw node links. Keep-alive services periodically
// visit a project URL so the host stays awake.

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

#[derive(Debug, Serialize)]
struct SubscriptionPayload<'a> {
    subscription: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct NodesPayload<'a> {
    nodes: &'a [String],
}

#[derive(Debug, Serialize)]
struct KeepalivePayload<'a> {
    url: &'a str,
}

/// Client for the registry and keep-alive endpoints.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
}

impl RegistryClient {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            http: TransportConfig::default().build_client()?,
        })
    }

    pub fn from_reqwest(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// `POST {base}/api/add-subscriptions` with `{"subscription": [url]}`.
    pub async fn add_subscription(&self, base: &Url, subscription_url: &str) -> Result<(), Error> {
        let endpoint = join_api(base, "api/add-subscriptions")?;
        self.post(
            &endpoint,
            &SubscriptionPayload {
                subscription: [subscription_url],
            },
        )
        .await
    }

    /// `POST {base}/api/add-nodes` with `{"nodes": [...]}`.
    pub async fn add_nodes(&self, base: &Url, nodes: &[String]) -> Result<(), Error> {
        let endpoint = join_api(base, "api/add-nodes")?;
        self.post(&endpoint, &NodesPayload { nodes }).await
    }

    /// `POST {keepalive}` with `{"url": project_url}`.
    pub async fn register_keepalive(&self, keepalive: &Url, project_url: &str) -> Result<(), Error> {
        self.post(keepalive, &KeepalivePayload { url: project_url })
            .await
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &Url, body: &T) -> Result<(), Error> {
        debug!(url = %url, "POST");
        let resp = self.http.post(url.clone()).json(body).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            })
        }
    }
}

/// Append an API path to a base URL regardless of a trailing slash.
fn join_api(base: &Url, path: &str) -> Result<Url, Error> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path)?)
}
