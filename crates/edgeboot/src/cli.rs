//! Clap derive structures for the `edgeboot` binary.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// edgeboot -- tunnel bootstrap, then hand over to the host command
#[derive(Debug, Parser)]
#[command(
    name = "edgeboot",
    version,
    about = "Provision tunnel tooling, publish share links, then run a host command",
    long_about = "Downloads the proxy core, tunnel client and monitor agent, writes their\n\
        configuration, starts them, resolves the public hostname and publishes the\n\
        subscription. Failures are logged and never stop the host command.\n\n\
        Settings come from the environment (UUID, FILE_PATH, ARGO_PORT, ...) and an\n\
        optional TOML file using the same names in lowercase."
)]
pub struct Cli {
    /// TOML file layered over the environment
    #[arg(long, short = 'c', env = "EDGEBOOT_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, env = "EDGEBOOT_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// Host command started after the bootstrap; its exit code becomes ours
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<OsString>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn trailing_command_keeps_its_flags() {
        let cli = Cli::try_parse_from(["edgeboot", "-vv", "--", "node", "--port", "3000"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.command, ["node", "--port", "3000"]);
    }

    #[test]
    fn command_is_optional() {
        let cli = Cli::try_parse_from(["edgeboot", "--config", "/etc/edgeboot.toml"]).unwrap();
        assert!(cli.command.is_empty());
        assert_eq!(cli.config, Some(PathBuf::from("/etc/edgeboot.toml")));
        assert!(matches!(cli.log_format, LogFormat::Text));
    }
}
