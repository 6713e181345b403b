// ── Tunnel credential discrimination ──
//
// The credential arrives as one opaque string. Its kind is decided by
// shape alone: a long base64-ish token, a JSON secret blob carrying a
// tunnel identifier, or nothing usable.

use std::sync::LazyLock;

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

static TOKEN_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9=]{120,250}$").expect("static regex"));

/// Marker that identifies a structured tunnel secret.
const SECRET_MARKER: &str = "TunnelSecret";

#[derive(Deserialize)]
struct SecretFile {
    #[serde(rename = "TunnelID")]
    tunnel_id: String,
}

/// Tunnel authentication material, classified by shape.
#[derive(Debug, Clone)]
pub enum TunnelCredential {
    /// Opaque token for a remotely managed tunnel.
    Token(SecretString),
    /// Structured secret. `raw` is written verbatim to the credentials file.
    Json {
        tunnel_id: String,
        raw: SecretString,
    },
    /// No credential: the tunnel client runs an ephemeral quick tunnel.
    Absent,
}

/// Outcome of [`TunnelCredential::classify`], keeping track of input that
/// was present but matched no known shape.
#[derive(Debug, Clone)]
pub struct Classified {
    pub credential: TunnelCredential,
    pub unrecognized: bool,
}

impl TunnelCredential {
    /// Classify a raw credential string.
    pub fn classify(raw: Option<&str>) -> Classified {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Classified {
                credential: Self::Absent,
                unrecognized: false,
            };
        };

        if TOKEN_SHAPE.is_match(raw) {
            return Classified {
                credential: Self::Token(SecretString::from(raw.to_owned())),
                unrecognized: false,
            };
        }

        if raw.contains(SECRET_MARKER) {
            if let Ok(file) = serde_json::from_str::<SecretFile>(raw) {
                return Classified {
                    credential: Self::Json {
                        tunnel_id: file.tunnel_id,
                        raw: SecretString::from(raw.to_owned()),
                    },
                    unrecognized: false,
                };
            }
        }

        Classified {
            credential: Self::Absent,
            unrecognized: true,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Short discriminant name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::Json { .. } => "json",
            Self::Absent => "absent",
        }
    }

    /// The token string, if this is a token credential.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Token(t) => Some(t.expose_secret()),
            _ => None,
        }
    }
}
