//! Subscription links.
//!
//! One share URI per enabled protocol, all pointing at the fronting
//! address and carrying the tunnel hostname as SNI and WebSocket host.
//! The document is the URIs separated by blank lines; its encoded form is
//! standard base64 of that text.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use edgeboot_config::Protocol;

use crate::error::CoreError;
use crate::proxy::ws_path;

/// Early-data hint appended to every WebSocket path.
const EARLY_DATA: &str = "?ed=2560";
const FINGERPRINT: &str = "firefox";

/// Everything needed to render share links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParams {
    /// UUID for VLESS / VMess, password for Trojan.
    pub identity: String,
    pub fronting_host: String,
    pub fronting_port: u16,
    /// Tunnel hostname, used for SNI and the WebSocket `Host` header.
    pub server_name: String,
    pub label: String,
}

/// Node label: `NAME-<geo>` or just `<geo>` when no name is set.
pub fn node_label(name: &str, geo: &str) -> String {
    if name.is_empty() {
        geo.to_owned()
    } else {
        format!("{name}-{geo}")
    }
}

/// VMess share payload. Field order is the wire order.
#[derive(Debug, Serialize)]
struct VmessShare<'a> {
    v: &'a str,
    ps: &'a str,
    add: &'a str,
    port: String,
    id: &'a str,
    aid: &'a str,
    scy: &'a str,
    net: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    host: &'a str,
    path: String,
    tls: &'a str,
    sni: &'a str,
    alpn: &'a str,
    fp: &'a str,
}

fn encoded_path(protocol: Protocol) -> String {
    urlencoding::encode(&format!("{}{EARLY_DATA}", ws_path(protocol))).into_owned()
}

fn render_vless(p: &LinkParams) -> String {
    format!(
        "vless://{id}@{host}:{port}?encryption=none&security=tls&sni={sn}&fp={FINGERPRINT}&type=ws&host={sn}&path={path}#{label}",
        id = urlencoding::encode(&p.identity),
        host = p.fronting_host,
        port = p.fronting_port,
        sn = p.server_name,
        path = encoded_path(Protocol::Vless),
        label = urlencoding::encode(&p.label),
    )
}

fn render_vmess(p: &LinkParams) -> Result<String, CoreError> {
    let share = VmessShare {
        v: "2",
        ps: &p.label,
        add: &p.fronting_host,
        port: p.fronting_port.to_string(),
        id: &p.identity,
        aid: "0",
        scy: "none",
        net: "ws",
        kind: "none",
        host: &p.server_name,
        path: format!("{}{EARLY_DATA}", ws_path(Protocol::Vmess)),
        tls: "tls",
        sni: &p.server_name,
        alpn: "",
        fp: FINGERPRINT,
    };
    let json = serde_json::to_string(&share)?;
    Ok(format!("vmess://{}", STANDARD.encode(json)))
}

fn render_trojan(p: &LinkParams) -> String {
    format!(
        "trojan://{pw}@{host}:{port}?security=tls&sni={sn}&fp={FINGERPRINT}&type=ws&host={sn}&path={path}#{label}",
        pw = urlencoding::encode(&p.identity),
        host = p.fronting_host,
        port = p.fronting_port,
        sn = p.server_name,
        path = encoded_path(Protocol::Trojan),
        label = urlencoding::encode(&p.label),
    )
}

/// Share URI for one protocol.
pub fn render(protocol: Protocol, params: &LinkParams) -> Result<String, CoreError> {
    match protocol {
        Protocol::Vless => Ok(render_vless(params)),
        Protocol::Vmess => render_vmess(params),
        Protocol::Trojan => Ok(render_trojan(params)),
    }
}

/// Ordered list of share URIs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscriptionDocument {
    links: Vec<String>,
}

impl SubscriptionDocument {
    /// Render a link for each protocol, preserving order.
    pub fn build(protocols: &[Protocol], params: &LinkParams) -> Result<Self, CoreError> {
        let links = protocols
            .iter()
            .map(|&p| render(p, params))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { links })
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// URIs separated by blank lines.
    pub fn plain(&self) -> String {
        if self.links.is_empty() {
            return String::new();
        }
        let mut text = self.links.join("\n\n");
        text.push('\n');
        text
    }

    /// Standard base64 of [`plain`](Self::plain).
    pub fn encoded(&self) -> String {
        STANDARD.encode(self.plain())
    }

    /// Write the encoded form to `path`.
    pub async fn persist(&self, path: &Path) -> Result<(), CoreError> {
        tokio::fs::write(path, self.encoded())
            .await
            .map_err(|e| CoreError::io(path, e))
    }
}
