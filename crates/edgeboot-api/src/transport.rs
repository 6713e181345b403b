// Shared transport configuration for building reqwest::Client instances.
//
// Downloads, geo lookups and registry calls all go through a client built
// here so timeouts, user agent and redirect behavior stay consistent.

use std::time::Duration;

use reqwest::redirect::Policy;

/// How the client treats 3xx responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedirectMode {
    /// Let reqwest follow redirects (bounded).
    #[default]
    Follow,
    /// Return 3xx responses to the caller untouched.
    Manual,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    /// Whole-request deadline.
    pub timeout: Option<Duration>,
    /// Deadline between two reads of the response body.
    pub read_timeout: Option<Duration>,
    pub redirects: RedirectMode,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            timeout: Some(Duration::from_secs(30)),
            read_timeout: None,
            redirects: RedirectMode::Follow,
            user_agent: concat!("edgeboot/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl TransportConfig {
    /// Transport used for artifact downloads: 30 s to connect, 60 s between
    /// reads and no overall deadline. Redirects are handled by the
    /// downloader itself.
    pub fn for_downloads() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            timeout: None,
            read_timeout: Some(Duration::from_secs(60)),
            redirects: RedirectMode::Manual,
            ..Self::default()
        }
    }

    /// Short timeouts for best-effort lookups.
    pub fn for_lookups() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            timeout: Some(Duration::from_secs(10)),
            ..Self::default()
        }
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        let policy = match self.redirects {
            RedirectMode::Follow => Policy::limited(5),
            RedirectMode::Manual => Policy::none(),
        };

        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent)
            .redirect(policy);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(read_timeout) = self.read_timeout {
            builder = builder.read_timeout(read_timeout);
        }

        builder
            .build()
            .map_err(|e| {
                crate::error::Error::ClientBuild(format!("failed to build HTTP client: {e}"))
            })
    }
}
