//! The host command: spawned after the bootstrap, inherits our stdio, and
//! decides the exit code.

use std::ffi::OsString;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{CliError, exit_code};
use crate::shutdown::ShutdownSignal;

/// How long the host gets to exit after a forwarded SIGTERM.
pub const HOST_GRACE: Duration = Duration::from_secs(10);

/// Run `program args..` until it exits or a shutdown signal arrives.
/// Returns the exit code to finish with.
pub async fn run(
    program: &OsString,
    args: &[OsString],
    signal: &mut ShutdownSignal,
) -> Result<i32, CliError> {
    let mut child = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CliError::HostSpawn {
            program: program.to_string_lossy().into_owned(),
            source,
        })?;
    info!(pid = ?child.id(), program = %program.to_string_lossy(), "host command started");

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            info!(?status, "host command exited");
            Ok(code_of(status))
        }
        name = signal.recv() => {
            info!(signal = name, "shutdown requested, stopping host command");
            Ok(terminate(&mut child).await)
        }
    }
}

/// SIGTERM, then SIGKILL once [`HOST_GRACE`] has passed.
async fn terminate(child: &mut Child) -> i32 {
    let graceful = send_terminate_signal(child);
    debug!(graceful, "sent termination signal to host");

    match tokio::time::timeout(HOST_GRACE, child.wait()).await {
        Ok(Ok(status)) => code_of(status),
        Ok(Err(e)) => {
            warn!(error = %e, "failed to wait for host command");
            exit_code::GENERAL
        }
        Err(_) => {
            warn!("host command ignored SIGTERM, killing");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill host command");
            }
            exit_code::SIGNAL_BASE + 9
        }
    }
}

#[cfg(unix)]
fn send_terminate_signal(child: &Child) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    child
        .id()
        .and_then(|pid| i32::try_from(pid).ok())
        .is_some_and(|pid| kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok())
}

#[cfg(not(unix))]
fn send_terminate_signal(_child: &Child) -> bool {
    false
}

/// Shell convention: the exit code, or 128 + signal number.
fn code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return exit_code::SIGNAL_BASE + signal;
        }
    }
    exit_code::GENERAL
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn signalled_exit_maps_past_128() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(code_of(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(code_of(ExitStatus::from_raw(15)), 143);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn term_is_forwarded_to_host() {
        let mut child = Command::new("/bin/sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        assert_eq!(terminate(&mut child).await, 143);
    }
}
