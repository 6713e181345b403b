//! Child process supervision.
//!
//! The supervisor owns every child it starts, keyed by [`Role`]. There is
//! no restart policy: a child that dies stays dead until the next run.
//! [`ProcessSupervisor::stop_all`] drains the table, sends a termination
//! signal, waits out a grace period and force-kills stragglers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use edgeboot_config::OutputSink;
use strum::{Display, EnumIter};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::error::SupervisorError;

/// Grace period before force-killing children on shutdown.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// What a managed child does. Start order is monitor, proxy, tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Role {
    MonitorAgent,
    ProxyCore,
    TunnelClient,
}

/// How to launch one child.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub output: OutputSink,
}

impl ProcessSpec {
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: working_dir.into(),
            env: Vec::new(),
            output: OutputSink::Discard,
        }
    }

    pub fn output(mut self, output: OutputSink) -> Self {
        self.output = output;
        self
    }

    fn stdio(&self) -> Stdio {
        match self.output {
            OutputSink::Discard => Stdio::null(),
            OutputSink::Inherit => Stdio::inherit(),
        }
    }
}

/// Result of a port readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

pub struct ProcessSupervisor {
    children: Mutex<HashMap<Role, Child>>,
    grace: Duration,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::with_grace(DEFAULT_GRACE)
    }

    pub fn with_grace(grace: Duration) -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
            grace,
        }
    }

    /// Spawn `spec` under `role` and return its pid.
    ///
    /// A child already tracked under the same role is stopped first.
    pub async fn start(&self, role: Role, spec: &ProcessSpec) -> Result<u32, SupervisorError> {
        let previous = self.children.lock().await.remove(&role);
        if let Some(mut old) = previous {
            debug!(%role, "replacing running child");
            stop_child_with_grace(&mut old, role, self.grace).await;
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(spec.stdio())
            .stderr(spec.stdio())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            role,
            program: spec.program.display().to_string(),
            source,
        })?;
        let pid = child.id().ok_or(SupervisorError::NoPid { role })?;

        info!(%role, pid, program = %spec.program.display(), "spawned");
        self.children.lock().await.insert(role, child);
        Ok(pid)
    }

    /// Whether a child under `role` is tracked and has not exited.
    pub async fn is_running(&self, role: Role) -> bool {
        let mut children = self.children.lock().await;
        children
            .get_mut(&role)
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    /// Roles currently tracked, in start order.
    pub async fn roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.children.lock().await.keys().copied().collect();
        roles.sort();
        roles
    }

    /// Stop every tracked child. Safe to call repeatedly and when nothing
    /// was started. Returns how many children were tracked.
    pub async fn stop_all(&self) -> usize {
        let drained: Vec<(Role, Child)> = self.children.lock().await.drain().collect();
        let count = drained.len();

        for (role, mut child) in drained {
            if let Ok(Some(status)) = child.try_wait() {
                debug!(%role, ?status, "already exited");
                continue;
            }
            stop_child_with_grace(&mut child, role, self.grace).await;
        }
        count
    }
}

// ── Termination ─────────────────────────────────────────────────────

#[cfg(unix)]
fn send_terminate_signal(child: &Child) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };
    let Ok(pid) = i32::try_from(pid) else {
        warn!(pid, "pid out of range, cannot send SIGTERM");
        return false;
    };
    kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn send_terminate_signal(_child: &Child) -> bool {
    false
}

async fn stop_child_with_grace(child: &mut Child, role: Role, grace: Duration) {
    let pid = child.id();
    let graceful = send_terminate_signal(child);
    debug!(%role, ?pid, graceful, "sent termination signal");

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => info!(%role, ?status, "stopped"),
        Ok(Err(e)) => warn!(%role, error = %e, "failed to wait for child"),
        Err(_) => {
            debug!(%role, "grace period expired, force killing");
            if let Err(e) = child.kill().await {
                warn!(%role, error = %e, "failed to force kill");
            }
        }
    }
}

// ── Readiness ───────────────────────────────────────────────────────

/// Poll `127.0.0.1:<port>` until it accepts a TCP connection.
pub async fn wait_for_port(port: u16, backoff: Backoff) -> Readiness {
    let ready = backoff
        .poll(|| async move { TcpStream::connect(("127.0.0.1", port)).await.ok().map(drop) })
        .await;
    match ready {
        Some(()) => Readiness::Ready,
        None => Readiness::TimedOut,
    }
}
