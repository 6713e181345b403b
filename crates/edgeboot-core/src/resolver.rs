// ── Public hostname resolution ──
//
// Static tunnels know their hostname up front. Ephemeral tunnels are
// assigned one at connect time and the client prints it to its log, so
// we poll the log until the hostname shows up or the deadline passes.

use std::future::Future;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use edgeboot_config::TunnelConfig;

use crate::backoff::Backoff;

static EPHEMERAL_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://([^\s/]*trycloudflare\.com)/?").expect("static regex")
});

/// First ephemeral tunnel hostname in `text`.
pub fn find_ephemeral_host(text: &str) -> Option<&str> {
    EPHEMERAL_HOST
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Something that can be read for tunnel client output.
pub trait LogSource {
    /// Current contents, or `None` when not readable yet.
    fn read(&self) -> impl Future<Output = Option<String>> + Send;
}

/// Log file on disk. A missing file means "not yet".
#[derive(Debug, Clone)]
pub struct FileLog {
    path: PathBuf,
}

impl FileLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LogSource for FileLog {
    async fn read(&self) -> Option<String> {
        tokio::fs::read_to_string(&self.path).await.ok()
    }
}

pub const DEFAULT_BACKOFF: Backoff = Backoff::new(
    Duration::from_millis(500),
    Duration::from_secs(4),
    Duration::from_secs(60),
);

#[derive(Debug, Clone)]
pub struct DomainResolver {
    backoff: Backoff,
}

impl Default for DomainResolver {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF)
    }
}

impl DomainResolver {
    pub fn new(backoff: Backoff) -> Self {
        Self { backoff }
    }

    /// Resolve the public hostname for this run.
    ///
    /// With a configured hostname and a usable credential the log is never
    /// touched. Otherwise `log` is polled; `None` after the deadline.
    pub async fn resolve<L: LogSource>(&self, config: &TunnelConfig, log: &L) -> Option<String> {
        if config.has_static_domain() {
            let host = config.domain.clone()?;
            info!(host = %host, "using configured tunnel hostname");
            return Some(host);
        }

        let found = self
            .backoff
            .poll(move || async move {
                let text = log.read().await?;
                let host = find_ephemeral_host(&text).map(str::to_owned);
                if host.is_none() {
                    debug!("tunnel hostname not in log yet");
                }
                host
            })
            .await;

        match &found {
            Some(host) => info!(host = %host, "resolved ephemeral tunnel hostname"),
            None => warn!(
                deadline = ?self.backoff.deadline,
                "tunnel hostname not found in log before deadline"
            ),
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_host() {
        let log = "2025-01-01 INF Requesting new quick Tunnel on trycloudflare.com...\n\
                   2025-01-01 INF |  https://brave-otter-lake.trycloudflare.com  |\n\
                   2025-01-01 INF |  https://second-one.trycloudflare.com  |";
        assert_eq!(
            find_ephemeral_host(log),
            Some("brave-otter-lake.trycloudflare.com")
        );
    }

    #[test]
    fn ignores_unrelated_urls() {
        assert_eq!(find_ephemeral_host("https://example.com/ and trycloudflare.com"), None);
    }
}
