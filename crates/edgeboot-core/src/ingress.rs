// Ingress descriptor for structured-credential tunnels.
//
// The tunnel client reads this YAML from `--config`. One rule maps the
// configured hostname to the local entry port; a catch-all answers 404.

use std::path::Path;

use serde::Serialize;

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct IngressDescriptor {
    pub tunnel: String,
    pub credentials_file: String,
    pub protocol: String,
    pub ingress: Vec<IngressRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_request: Option<OriginRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginRequest {
    #[serde(rename = "noTLSVerify")]
    pub no_tls_verify: bool,
}

impl IngressDescriptor {
    pub fn new(tunnel_id: &str, credentials_file: &Path, hostname: &str, port: u16) -> Self {
        Self {
            tunnel: tunnel_id.to_owned(),
            credentials_file: credentials_file.display().to_string(),
            protocol: "http2".into(),
            ingress: vec![
                IngressRule {
                    hostname: Some(hostname.to_owned()),
                    service: format!("http://localhost:{port}"),
                    origin_request: Some(OriginRequest {
                        no_tls_verify: true,
                    }),
                },
                IngressRule {
                    hostname: None,
                    service: "http_status:404".into(),
                    origin_request: None,
                },
            ],
        }
    }

    pub fn to_yaml(&self) -> Result<String, CoreError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
