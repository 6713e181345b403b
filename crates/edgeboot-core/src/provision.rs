// ── Binary provisioning ──
//
// Maps the host architecture onto release artifacts and makes sure each
// tool exists in the working directory. An existing file above
// `MIN_BINARY_SIZE` is trusted as-is.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use edgeboot_api::Downloader;
use edgeboot_config::ToolVersions;
use tracing::{debug, info};
use url::Url;

use crate::error::ProvisionError;
use crate::workdir::Workdir;

/// Files at or below this size are treated as incomplete downloads.
pub const MIN_BINARY_SIZE: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    /// Architecture of the running host.
    pub fn detect() -> Result<Self, ProvisionError> {
        std::env::consts::ARCH.parse()
    }
}

impl FromStr for Arch {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Ok(Self::Amd64),
            "aarch64" | "arm64" | "armv8" => Ok(Self::Arm64),
            other => Err(ProvisionError::UnsupportedArch {
                arch: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        })
    }
}

/// Where and how to fetch one tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Logical name used in logs and events.
    pub name: &'static str,
    /// File name inside the working directory.
    pub file_name: &'static str,
    /// Release URL with `{version}` and `{arch}` placeholders.
    pub url_template: String,
    pub version: String,
    pub amd64_suffix: &'static str,
    pub arm64_suffix: &'static str,
    /// Set when the artifact is a zip archive holding the binary.
    pub archive_entry: Option<&'static str>,
}

impl ToolSpec {
    pub fn xray(version: &str) -> Self {
        Self {
            name: "xray",
            file_name: "xray",
            url_template:
                "https://github.com/XTLS/Xray-core/releases/download/{version}/Xray-linux-{arch}.zip"
                    .into(),
            version: version.to_owned(),
            amd64_suffix: "64",
            arm64_suffix: "arm64-v8a",
            archive_entry: Some("xray"),
        }
    }

    pub fn cloudflared(version: &str) -> Self {
        Self {
            name: "cloudflared",
            file_name: "cloudflared",
            url_template:
                "https://github.com/cloudflare/cloudflared/releases/download/{version}/cloudflared-linux-{arch}"
                    .into(),
            version: version.to_owned(),
            amd64_suffix: "amd64",
            arm64_suffix: "arm64",
            archive_entry: None,
        }
    }

    pub fn komari(version: &str) -> Self {
        Self {
            name: "komari-agent",
            file_name: "komari-agent",
            url_template:
                "https://github.com/komari-monitor/komari-agent/releases/download/{version}/komari-agent-linux-{arch}"
                    .into(),
            version: version.to_owned(),
            amd64_suffix: "amd64",
            arm64_suffix: "arm64",
            archive_entry: None,
        }
    }

    /// Concrete download URL for `arch`.
    pub fn url(&self, arch: Arch) -> Result<Url, ProvisionError> {
        let suffix = match arch {
            Arch::Amd64 => self.amd64_suffix,
            Arch::Arm64 => self.arm64_suffix,
        };
        let raw = self
            .url_template
            .replace("{version}", &self.version)
            .replace("{arch}", suffix);
        Url::parse(&raw).map_err(|e| ProvisionError::BadUrl {
            tool: self.name,
            reason: format!("{raw}: {e}"),
        })
    }
}

/// The three managed tools.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    pub proxy_core: ToolSpec,
    pub tunnel_client: ToolSpec,
    pub monitor_agent: ToolSpec,
}

impl ToolCatalog {
    /// Official release artifacts at the configured versions.
    pub fn for_versions(versions: &ToolVersions) -> Self {
        Self {
            proxy_core: ToolSpec::xray(&versions.xray),
            tunnel_client: ToolSpec::cloudflared(&versions.cloudflared),
            monitor_agent: ToolSpec::komari(&versions.komari),
        }
    }
}

/// Outcome of [`Provisioner::ensure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub path: PathBuf,
    pub cached: bool,
}

pub struct Provisioner {
    downloader: Downloader,
    workdir: Workdir,
}

impl Provisioner {
    pub fn new(downloader: Downloader, workdir: Workdir) -> Self {
        Self {
            downloader,
            workdir,
        }
    }

    /// Make sure `tool` is present and executable in the working directory.
    pub async fn ensure(&self, tool: &ToolSpec, arch: Arch) -> Result<Provisioned, ProvisionError> {
        let dest = self.workdir.binary(tool.file_name);

        match tokio::fs::metadata(&dest).await {
            Ok(meta) if meta.is_file() && meta.len() > MIN_BINARY_SIZE => {
                debug!(tool = tool.name, path = %dest.display(), "using cached binary");
                return Ok(Provisioned {
                    path: dest,
                    cached: true,
                });
            }
            Ok(_) => debug!(tool = tool.name, "cached file too small, re-downloading"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(ProvisionError::Io { path: dest, source }),
        }

        let url = tool.url(arch)?;
        info!(tool = tool.name, %arch, url = %url, "downloading");

        let result = match tool.archive_entry {
            Some(entry) => self.downloader.fetch_entry(&url, entry, &dest).await,
            None => self.downloader.fetch_to(&url, &dest).await,
        };
        result.map_err(|source| ProvisionError::Download {
            tool: tool.name,
            source,
        })?;

        Ok(Provisioned {
            path: dest,
            cached: false,
        })
    }
}
