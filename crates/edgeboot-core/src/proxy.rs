//! Proxy-core configuration document.
//!
//! [`generate`] is a pure function of [`TunnelConfig`]. With a public port
//! configured, a single VLESS/TCP inbound listens there and routes by
//! WebSocket path to per-protocol loopback inbounds; without one, every
//! enabled protocol listens publicly on its own port.
//!
//! Field order of the serialized JSON follows struct declaration order, so
//! identical input always produces byte-identical output.

use secrecy::ExposeSecret;
use serde::Serialize;

use edgeboot_config::{Protocol, TunnelConfig};

use crate::error::CoreError;

const LOOPBACK: &str = "127.0.0.1";
const DOH_SERVER: &str = "https+local://8.8.8.8/dns-query";

/// WebSocket path for a protocol: `/vless-argo`, `/vmess-argo`, `/trojan-argo`.
pub fn ws_path(protocol: Protocol) -> String {
    format!("/{protocol}-argo")
}

// ── Document ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyConfigDocument {
    pub log: LogSection,
    pub inbounds: Vec<Inbound>,
    pub dns: DnsSection,
    pub outbounds: Vec<Outbound>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSection {
    pub access: String,
    pub error: String,
    pub loglevel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsSection {
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outbound {
    pub protocol: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbound {
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    pub protocol: String,
    pub settings: InboundSettings,
    pub stream_settings: StreamSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sniffing: Option<Sniffing>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundSettings {
    pub clients: Vec<InboundClient>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decryption: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<Fallback>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundClient {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alter_id: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fallback {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub dest: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSettings {
    pub network: String,
    pub security: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_settings: Option<WsSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WsSettings {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sniffing {
    pub enabled: bool,
    pub dest_override: Vec<String>,
    pub metadata_only: bool,
}

impl Sniffing {
    fn tcp() -> Self {
        Self {
            enabled: true,
            dest_override: vec!["http".into(), "tls".into()],
            metadata_only: false,
        }
    }

    fn ws() -> Self {
        Self {
            enabled: true,
            dest_override: vec!["http".into(), "tls".into(), "quic".into()],
            metadata_only: false,
        }
    }
}

impl ProxyConfigDocument {
    /// Pretty JSON, stable across runs for the same input.
    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Inbounds bound to loopback (the per-protocol and generic targets).
    pub fn loopback_inbounds(&self) -> impl Iterator<Item = &Inbound> {
        self.inbounds
            .iter()
            .filter(|i| i.listen.as_deref() == Some(LOOPBACK))
    }
}

// ── Builders ────────────────────────────────────────────────────────

fn client_for(protocol: Protocol, identity: &str) -> InboundClient {
    match protocol {
        Protocol::Vless => InboundClient {
            id: Some(identity.to_owned()),
            password: None,
            alter_id: None,
        },
        Protocol::Vmess => InboundClient {
            id: Some(identity.to_owned()),
            password: None,
            alter_id: Some(0),
        },
        Protocol::Trojan => InboundClient {
            id: None,
            password: Some(identity.to_owned()),
            alter_id: None,
        },
    }
}

fn ws_inbound(protocol: Protocol, port: u16, identity: &str, listen: Option<&str>) -> Inbound {
    Inbound {
        port,
        listen: listen.map(str::to_owned),
        protocol: protocol.as_str().to_owned(),
        settings: InboundSettings {
            clients: vec![client_for(protocol, identity)],
            decryption: (protocol == Protocol::Vless).then(|| "none".to_owned()),
            fallbacks: Vec::new(),
        },
        stream_settings: StreamSettings {
            network: "ws".into(),
            security: "none".into(),
            ws_settings: Some(WsSettings {
                path: ws_path(protocol),
            }),
        },
        sniffing: Some(Sniffing::ws()),
    }
}

fn tcp_vless_inbound(
    port: u16,
    identity: &str,
    listen: Option<&str>,
    fallbacks: Vec<Fallback>,
) -> Inbound {
    Inbound {
        port,
        listen: listen.map(str::to_owned),
        protocol: Protocol::Vless.as_str().to_owned(),
        settings: InboundSettings {
            clients: vec![client_for(Protocol::Vless, identity)],
            decryption: Some("none".into()),
            fallbacks,
        },
        stream_settings: StreamSettings {
            network: "tcp".into(),
            security: "none".into(),
            ws_settings: None,
        },
        sniffing: listen.is_none().then(Sniffing::tcp),
    }
}

/// Build the proxy-core document, or `None` when no protocol is enabled.
pub fn generate(config: &TunnelConfig) -> Option<ProxyConfigDocument> {
    let enabled = config.ports.enabled();
    if enabled.is_empty() {
        return None;
    }
    let identity = config.identity.expose_secret();

    let mut inbounds = Vec::with_capacity(enabled.len() + 2);
    match config.ports.public {
        Some(public) => {
            let mut fallbacks = Vec::with_capacity(enabled.len() + 1);
            fallbacks.push(Fallback {
                path: None,
                dest: config.ports.fallback,
            });
            fallbacks.extend(enabled.iter().map(|&(protocol, port)| Fallback {
                path: Some(ws_path(protocol)),
                dest: port,
            }));

            inbounds.push(tcp_vless_inbound(public, identity, None, fallbacks));
            inbounds.push(tcp_vless_inbound(
                config.ports.fallback,
                identity,
                Some(LOOPBACK),
                Vec::new(),
            ));
            inbounds.extend(
                enabled
                    .iter()
                    .map(|&(protocol, port)| ws_inbound(protocol, port, identity, Some(LOOPBACK))),
            );
        }
        None => {
            inbounds.extend(
                enabled
                    .iter()
                    .map(|&(protocol, port)| ws_inbound(protocol, port, identity, None)),
            );
        }
    }

    Some(ProxyConfigDocument {
        log: LogSection {
            access: "/dev/null".into(),
            error: "/dev/null".into(),
            loglevel: "none".into(),
        },
        inbounds,
        dns: DnsSection {
            servers: vec![DOH_SERVER.into()],
        },
        outbounds: vec![
            Outbound {
                protocol: "freedom".into(),
                tag: "direct".into(),
            },
            Outbound {
                protocol: "blackhole".into(),
                tag: "block".into(),
            },
        ],
    })
}
