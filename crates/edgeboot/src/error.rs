//! Binary error types with miette diagnostics.
//!
//! Pipeline failures are absorbed by the orchestrator and never reach this
//! layer. Configuration errors are logged and the host runs anyway, so only
//! preflight, signal and host spawn failures decide the exit code.

use miette::Diagnostic;
use thiserror::Error;

use edgeboot_config::ConfigError;
use edgeboot_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const HOST_NOT_STARTED: i32 = 127;
    /// Added to the signal number when the host was killed by a signal.
    pub const SIGNAL_BASE: i32 = 128;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Preflight ────────────────────────────────────────────────────

    #[error("Unsupported host platform '{os}'")]
    #[diagnostic(
        code(edgeboot::unsupported_platform),
        help("The provisioned tools and the signal model require a unix host (linux).")
    )]
    UnsupportedPlatform { os: &'static str },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(
        code(edgeboot::validation),
        help("Fix the environment variable or the lowercase key in the config file.")
    )]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(
        code(edgeboot::config),
        help("Check the TOML syntax of the file given by --config / EDGEBOOT_CONFIG.")
    )]
    Config(Box<figment::Error>),

    // ── Runtime ──────────────────────────────────────────────────────

    #[error("Could not initialise the bootstrap pipeline")]
    #[diagnostic(code(edgeboot::init))]
    Init(#[source] CoreError),

    #[error("Could not start host command '{program}'")]
    #[diagnostic(
        code(edgeboot::host_spawn),
        help("Check that the program exists and is executable.")
    )]
    HostSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not install {what} handler")]
    #[diagnostic(code(edgeboot::signal))]
    Signal {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::HostSpawn { .. } => exit_code::HOST_NOT_STARTED,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Lower-layer mapping ──────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Figment(inner) => Self::Config(inner),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        Self::Init(err)
    }
}
