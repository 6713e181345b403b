// ── Core error types ──
//
// Errors raised inside the bootstrap pipeline. None of these reach the
// host: `Orchestrator::boot()` absorbs them into events and a partial
// report. The `From` impls fold component errors into `CoreError`.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::supervisor::Role;

/// Binary provisioning failure for one tool.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("unsupported architecture '{arch}'")]
    UnsupportedArch { arch: String },

    #[error("download of {tool} failed: {source}")]
    Download {
        tool: &'static str,
        #[source]
        source: edgeboot_api::Error,
    },

    #[error("invalid download URL for {tool}: {reason}")]
    BadUrl { tool: &'static str, reason: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Child process management failure.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn {role} ({program}): {source}")]
    Spawn {
        role: Role,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{role} exited before reporting a pid")]
    NoPid { role: Role },
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Component errors ─────────────────────────────────────────────
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("HTTP error: {0}")]
    Api(#[from] edgeboot_api::Error),

    // ── Document errors ──────────────────────────────────────────────
    #[error("failed to render {what}: {message}")]
    Render { what: &'static str, message: String },

    // ── Filesystem errors ────────────────────────────────────────────
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Render {
            what: "JSON document",
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Render {
            what: "YAML document",
            message: err.to_string(),
        }
    }
}
