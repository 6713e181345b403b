//! Checks that must pass before any pipeline step runs.

use crate::error::CliError;

/// Refuse to run on hosts the provisioned tools cannot serve.
pub fn check() -> Result<(), CliError> {
    if cfg!(unix) {
        Ok(())
    } else {
        Err(CliError::UnsupportedPlatform {
            os: std::env::consts::OS,
        })
    }
}
