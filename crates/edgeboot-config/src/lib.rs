//! Configuration for the edgeboot orchestrator.
//!
//! Three layers, lowest priority first: built-in defaults, the process
//! environment, and an optional TOML file. Only the names listed in
//! [`RECOGNIZED_NAMES`] are read from any layer; everything else is ignored.
//! The merged record is validated once into an immutable [`TunnelConfig`].

mod credential;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use url::Url;

pub use credential::{Classified, TunnelCredential};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Recognized names ────────────────────────────────────────────────

/// Every variable name the loader reads. Environment keys are matched
/// verbatim; file keys are the same names in lowercase.
pub const RECOGNIZED_NAMES: &[&str] = &[
    "UUID",
    "FILE_PATH",
    "SUB_PATH",
    "ARGO_PORT",
    "FALLBACK_PORT",
    "VLESS_PORT",
    "VMESS_PORT",
    "TROJAN_PORT",
    "ARGO_AUTH",
    "ARGO_DOMAIN",
    "CFIP",
    "CFPORT",
    "NAME",
    "UPLOAD_URL",
    "PROJECT_URL",
    "AUTO_ACCESS",
    "KEEPALIVE_URL",
    "KOMARI_ENDPOINT",
    "KOMARI_TOKEN",
    "CHILD_OUTPUT",
    "CLEANUP_DELAY",
    "XRAY_VERSION",
    "CLOUDFLARED_VERSION",
    "KOMARI_VERSION",
];

pub const DEFAULT_XRAY_VERSION: &str = "v25.8.3";
pub const DEFAULT_CLOUDFLARED_VERSION: &str = "2025.8.1";
pub const DEFAULT_KOMARI_VERSION: &str = "1.0.72";

// ── Raw layered record ──────────────────────────────────────────────

/// Merged but unvalidated view of all layers.
#[derive(Debug, Deserialize, Serialize)]
pub struct RawConfig {
    #[serde(default, deserialize_with = "lenient_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(deserialize_with = "lenient_required")]
    pub file_path: String,
    #[serde(deserialize_with = "lenient_required")]
    pub sub_path: String,
    pub argo_port: u16,
    pub fallback_port: u16,
    pub vless_port: u16,
    pub vmess_port: u16,
    pub trojan_port: u16,
    #[serde(default, deserialize_with = "lenient_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argo_auth: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argo_domain: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfip: Option<String>,
    pub cfport: u16,
    #[serde(deserialize_with = "lenient_required")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    pub auto_access: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub komari_endpoint: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub komari_token: Option<String>,
    #[serde(deserialize_with = "lenient_required")]
    pub child_output: String,
    #[serde(deserialize_with = "lenient_required")]
    pub cleanup_delay: String,
    #[serde(deserialize_with = "lenient_required")]
    pub xray_version: String,
    #[serde(deserialize_with = "lenient_required")]
    pub cloudflared_version: String,
    #[serde(deserialize_with = "lenient_required")]
    pub komari_version: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            uuid: None,
            file_path: "./world".into(),
            sub_path: "sub".into(),
            argo_port: 8001,
            fallback_port: 3001,
            vless_port: 3002,
            vmess_port: 3003,
            trojan_port: 3004,
            argo_auth: None,
            argo_domain: None,
            cfip: None,
            cfport: 443,
            name: String::new(),
            upload_url: None,
            project_url: None,
            auto_access: false,
            keepalive_url: None,
            komari_endpoint: None,
            komari_token: None,
            child_output: "discard".into(),
            cleanup_delay: "90s".into(),
            xray_version: DEFAULT_XRAY_VERSION.into(),
            cloudflared_version: DEFAULT_CLOUDFLARED_VERSION.into(),
            komari_version: DEFAULT_KOMARI_VERSION.into(),
        }
    }
}

/// Scalars the environment layer may have typed as numbers or booleans.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Self::Str(s) => s,
            Self::Int(n) => n.to_string(),
            Self::Uint(n) => n.to_string(),
            Self::Float(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(d)?.map(Scalar::into_string))
}

fn lenient_required<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Scalar::deserialize(d)?.into_string())
}

// ── Validated record ────────────────────────────────────────────────

/// A proxy protocol the orchestrator can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Vless,
    Vmess,
    Trojan,
}

impl Protocol {
    pub const ALL: [Self; 3] = [Self::Vless, Self::Vmess, Self::Trojan];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vless => "vless",
            Self::Vmess => "vmess",
            Self::Trojan => "trojan",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listen ports. `None` means disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPlan {
    /// Public multiplexed port; `None` disables path-based multiplexing.
    pub public: Option<u16>,
    /// Loopback target of the default (no-path) fallback.
    pub fallback: u16,
    pub vless: Option<u16>,
    pub vmess: Option<u16>,
    pub trojan: Option<u16>,
}

impl PortPlan {
    pub fn port_for(&self, protocol: Protocol) -> Option<u16> {
        match protocol {
            Protocol::Vless => self.vless,
            Protocol::Vmess => self.vmess,
            Protocol::Trojan => self.trojan,
        }
    }

    /// Enabled protocols with their ports, in fixed protocol order.
    pub fn enabled(&self) -> Vec<(Protocol, u16)> {
        Protocol::ALL
            .into_iter()
            .filter_map(|p| self.port_for(p).map(|port| (p, port)))
            .collect()
    }

    /// The local port the tunnel client forwards to.
    pub fn entry_port(&self) -> Option<u16> {
        self.public
            .filter(|_| !self.enabled().is_empty())
            .or_else(|| self.enabled().first().map(|(_, port)| *port))
    }

    /// Protocols a client can reach through the tunnel. Without a public
    /// port the tunnel forwards to a single inbound, so only that
    /// protocol is reachable.
    pub fn reachable(&self) -> Vec<Protocol> {
        let enabled = self.enabled();
        match self.public {
            Some(_) => enabled.into_iter().map(|(protocol, _)| protocol).collect(),
            None => enabled
                .first()
                .map(|&(protocol, _)| protocol)
                .into_iter()
                .collect(),
        }
    }
}

/// Where child process output goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputSink {
    #[default]
    Discard,
    Inherit,
}

/// Monitoring agent credentials. Present only when both halves are set.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub endpoint: String,
    pub token: SecretString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVersions {
    pub xray: String,
    pub cloudflared: String,
    pub komari: String,
}

/// Immutable, validated orchestrator configuration.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// UUID for VLESS / VMess, password for Trojan.
    pub identity: SecretString,
    pub workdir: PathBuf,
    pub sub_path: String,
    pub ports: PortPlan,
    pub credential: TunnelCredential,
    /// True when a credential was supplied but matched no known shape.
    pub credential_unrecognized: bool,
    pub domain: Option<String>,
    pub fronting_host: Option<String>,
    pub fronting_port: u16,
    pub name: String,
    pub upload_url: Option<Url>,
    pub project_url: Option<Url>,
    pub auto_access: bool,
    pub keepalive_url: Option<Url>,
    pub monitor: Option<MonitorConfig>,
    pub child_output: OutputSink,
    pub cleanup_delay: Duration,
    pub versions: ToolVersions,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn non_zero(port: u16) -> Option<u16> {
    (port != 0).then_some(port)
}

fn parse_url(field: &str, value: Option<String>) -> Result<Option<Url>, ConfigError> {
    non_blank(value)
        .map(|v| {
            v.parse::<Url>().map_err(|e| ConfigError::Validation {
                field: field.into(),
                reason: format!("invalid URL '{v}': {e}"),
            })
        })
        .transpose()
}

impl TryFrom<RawConfig> for TunnelConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let identity = non_blank(raw.uuid).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let workdir = PathBuf::from(raw.file_path.trim());
        if workdir.as_os_str().is_empty() {
            return Err(ConfigError::Validation {
                field: "file_path".into(),
                reason: "working directory must not be empty".into(),
            });
        }

        let child_output = match raw.child_output.trim().to_ascii_lowercase().as_str() {
            "" | "discard" | "null" => OutputSink::Discard,
            "inherit" => OutputSink::Inherit,
            other => {
                return Err(ConfigError::Validation {
                    field: "child_output".into(),
                    reason: format!("expected 'discard' or 'inherit', got '{other}'"),
                });
            }
        };

        let cleanup_delay =
            humantime::parse_duration(raw.cleanup_delay.trim()).map_err(|e| {
                ConfigError::Validation {
                    field: "cleanup_delay".into(),
                    reason: e.to_string(),
                }
            })?;

        let classified = TunnelCredential::classify(raw.argo_auth.as_deref());

        let monitor = match (non_blank(raw.komari_endpoint), non_blank(raw.komari_token)) {
            (Some(endpoint), Some(token)) => Some(MonitorConfig {
                endpoint,
                token: SecretString::from(token),
            }),
            _ => None,
        };

        Ok(Self {
            identity: SecretString::from(identity),
            workdir,
            sub_path: raw.sub_path.trim().trim_matches('/').to_owned(),
            ports: PortPlan {
                public: non_zero(raw.argo_port),
                fallback: raw.fallback_port,
                vless: non_zero(raw.vless_port),
                vmess: non_zero(raw.vmess_port),
                trojan: non_zero(raw.trojan_port),
            },
            credential: classified.credential,
            credential_unrecognized: classified.unrecognized,
            domain: non_blank(raw.argo_domain),
            fronting_host: non_blank(raw.cfip),
            fronting_port: raw.cfport,
            name: raw.name.trim().to_owned(),
            upload_url: parse_url("upload_url", raw.upload_url)?,
            project_url: parse_url("project_url", raw.project_url)?,
            auto_access: raw.auto_access,
            keepalive_url: parse_url("keepalive_url", raw.keepalive_url)?,
            monitor,
            child_output,
            cleanup_delay,
            versions: ToolVersions {
                xray: raw.xray_version.trim().to_owned(),
                cloudflared: raw.cloudflared_version.trim().to_owned(),
                komari: raw.komari_version.trim().to_owned(),
            },
        })
    }
}

impl TunnelConfig {
    /// True when both a hostname and a usable credential are configured,
    /// i.e. the public hostname is known without asking the tunnel client.
    pub fn has_static_domain(&self) -> bool {
        self.domain.is_some() && !self.credential.is_absent()
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Platform config location for the optional override file.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("io", "edgeboot", "edgeboot")
        .map(|dirs| dirs.config_dir().join("edgeboot.toml"))
}

// ── Config loading ──────────────────────────────────────────────────

/// Names from [`RECOGNIZED_NAMES`] whose environment value is non-blank.
fn present_env_names() -> Vec<&'static str> {
    RECOGNIZED_NAMES
        .iter()
        .copied()
        .filter(|name| std::env::var(name).is_ok_and(|v| !v.trim().is_empty()))
        .collect()
}

/// Assemble the layered figment without extracting it.
pub fn figment(file: Option<&Path>) -> Figment {
    let present = present_env_names();
    let mut figment = Figment::new()
        .merge(Serialized::defaults(RawConfig::default()))
        .merge(Env::raw().only(&present));

    if let Some(path) = file {
        figment = figment.merge(Toml::file(path));
    }
    figment
}

/// Load and validate the configuration.
///
/// A missing file is not an error; the file layer is simply empty.
pub fn load(file: Option<&Path>) -> Result<TunnelConfig, ConfigError> {
    let raw: RawConfig = figment(file).extract()?;
    TunnelConfig::try_from(raw)
}
