// ── Launch plans ──
//
// Command lines for the three managed tools. The tunnel client's shape
// depends on which credential was supplied.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

use edgeboot_config::{MonitorConfig, TunnelConfig, TunnelCredential};

use crate::workdir::Workdir;

/// How the tunnel client authenticates and routes.
#[derive(Debug, Clone)]
pub enum TunnelMode {
    /// Remotely managed tunnel; ingress lives on the provider side.
    Remote { token: SecretString },
    /// Named tunnel driven by a local ingress descriptor.
    ConfigFile { descriptor: PathBuf },
    /// Ephemeral tunnel; the hostname appears in `log`.
    Quick { port: u16, log: PathBuf },
}

impl TunnelMode {
    /// Pick the mode for `config`. `None` when an ephemeral tunnel would be
    /// needed but nothing local is listening to forward to.
    pub fn select(config: &TunnelConfig, workdir: &Workdir) -> Option<Self> {
        match &config.credential {
            TunnelCredential::Token(token) => Some(Self::Remote {
                token: token.clone(),
            }),
            TunnelCredential::Json { .. } if config.domain.is_some() => Some(Self::ConfigFile {
                descriptor: workdir.tunnel_descriptor(),
            }),
            _ => tunnel_target_port(config).map(|port| Self::Quick {
                port,
                log: workdir.tunnel_log(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Remote { .. } => "remote",
            Self::ConfigFile { .. } => "config-file",
            Self::Quick { .. } => "quick",
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Quick { .. })
    }

    /// Tunnel client arguments (program name excluded).
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "tunnel".to_owned(),
            "--edge-ip-version".to_owned(),
            "auto".to_owned(),
        ];
        match self {
            Self::Remote { token } => {
                args.extend(
                    ["--no-autoupdate", "--protocol", "http2", "run", "--token"]
                        .map(str::to_owned),
                );
                args.push(token.expose_secret().to_owned());
            }
            Self::ConfigFile { descriptor } => {
                args.push("--config".to_owned());
                args.push(descriptor.display().to_string());
                args.push("run".to_owned());
            }
            Self::Quick { port, log } => {
                args.extend(["--no-autoupdate", "--protocol", "http2", "--logfile"].map(str::to_owned));
                args.push(log.display().to_string());
                args.extend(["--loglevel", "info", "--url"].map(str::to_owned));
                args.push(format!("http://localhost:{port}"));
            }
        }
        args
    }
}

/// Local port the tunnel forwards to.
pub fn tunnel_target_port(config: &TunnelConfig) -> Option<u16> {
    config.ports.entry_port().or(config.ports.public)
}

/// `-c <workdir>/config.json`
pub fn proxy_core_args(workdir: &Workdir) -> Vec<String> {
    vec!["-c".to_owned(), workdir.proxy_config().display().to_string()]
}

/// `-e <endpoint> -t <token>`
pub fn monitor_args(monitor: &MonitorConfig) -> Vec<String> {
    vec![
        "-e".to_owned(),
        monitor.endpoint.clone(),
        "-t".to_owned(),
        monitor.token.expose_secret().to_owned(),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use edgeboot_config::RawConfig;
    use pretty_assertions::assert_eq;

    use super::*;

    fn token() -> String {
        "A1b2C3d4E5".repeat(16)
    }

    fn config(raw: RawConfig) -> TunnelConfig {
        TunnelConfig::try_from(raw).unwrap()
    }

    #[test]
    fn token_selects_remote_mode() {
        let wd = Workdir::new("/w");
        let cfg = config(RawConfig {
            argo_auth: Some(token()),
            ..RawConfig::default()
        });
        let mode = TunnelMode::select(&cfg, &wd).unwrap();
        assert_eq!(mode.name(), "remote");

        let mut expected: Vec<String> = [
            "tunnel",
            "--edge-ip-version",
            "auto",
            "--no-autoupdate",
            "--protocol",
            "http2",
            "run",
            "--token",
        ]
        .map(str::to_owned)
        .to_vec();
        expected.push(token());
        assert_eq!(mode.args(), expected);
    }

    #[test]
    fn json_with_domain_selects_config_file_mode() {
        let wd = Workdir::new("/w");
        let cfg = config(RawConfig {
            argo_auth: Some(r#"{"TunnelSecret":"s","TunnelID":"t"}"#.into()),
            argo_domain: Some("edge.example.com".into()),
            ..RawConfig::default()
        });
        let mode = TunnelMode::select(&cfg, &wd).unwrap();
        assert_eq!(
            mode.args(),
            ["tunnel", "--edge-ip-version", "auto", "--config", "/w/tunnel.yml", "run"]
                .map(str::to_owned)
                .to_vec()
        );
    }

    #[test]
    fn json_without_domain_falls_back_to_quick() {
        let wd = Workdir::new("/w");
        let cfg = config(RawConfig {
            argo_auth: Some(r#"{"TunnelSecret":"s","TunnelID":"t"}"#.into()),
            ..RawConfig::default()
        });
        assert!(TunnelMode::select(&cfg, &wd).unwrap().is_ephemeral());
    }

    #[test]
    fn absent_credential_selects_quick_mode() {
        let wd = Workdir::new("/w");
        let cfg = config(RawConfig::default());
        let mode = TunnelMode::select(&cfg, &wd).unwrap();
        assert_eq!(
            mode.args(),
            [
                "tunnel",
                "--edge-ip-version",
                "auto",
                "--no-autoupdate",
                "--protocol",
                "http2",
                "--logfile",
                "/w/boot.log",
                "--loglevel",
                "info",
                "--url",
                "http://localhost:8001",
            ]
            .map(str::to_owned)
            .to_vec()
        );
    }

    #[test]
    fn quick_mode_needs_a_target_port() {
        let wd = Workdir::new("/w");
        let cfg = config(RawConfig {
            argo_port: 0,
            vless_port: 0,
            vmess_port: 0,
            trojan_port: 0,
            ..RawConfig::default()
        });
        assert!(TunnelMode::select(&cfg, &wd).is_none());
    }

    #[test]
    fn monitor_and_core_args() {
        let wd = Workdir::new("/w");
        assert_eq!(proxy_core_args(&wd), vec!["-c", "/w/config.json"]);

        let monitor = MonitorConfig {
            endpoint: "https://m.example.com".into(),
            token: SecretString::from("tok".to_owned()),
        };
        assert_eq!(
            monitor_args(&monitor),
            vec!["-e", "https://m.example.com", "-t", "tok"]
        );
    }
}
