// ── Boot events ──
//
// Observable pipeline milestones and soft failures. Fanned out on a
// broadcast channel; missing subscribers are fine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::trace;

use crate::supervisor::Role;

const EVENT_CHANNEL_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootEvent {
    // ── Preparation ──────────────────────────────────────────────────
    WorkdirPrepared { root: PathBuf, purged: usize },
    CredentialUnrecognized,

    // ── Provisioning ─────────────────────────────────────────────────
    ToolReady { tool: &'static str, path: PathBuf, cached: bool },
    ToolUnavailable { tool: &'static str, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    ProxyConfigWritten { path: PathBuf, inbounds: usize },
    ProxyCoreSkipped,
    TunnelFilesWritten { descriptor: PathBuf },

    // ── Processes ────────────────────────────────────────────────────
    ProcessStarted { role: Role, pid: u32 },
    ProcessFailed { role: Role, reason: String },
    ProxyReady { port: u16 },
    ProxyNotReady { port: u16 },

    // ── Resolution & links ───────────────────────────────────────────
    DomainResolved { host: String },
    DomainUnresolved,
    SubscriptionWritten { path: PathBuf, links: usize },

    // ── Publication ──────────────────────────────────────────────────
    Published { target: String },
    PublishFailed { target: String, reason: String },
    KeepaliveRegistered,
    KeepaliveFailed { reason: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    CleanupScheduled { delay: Duration },
    CleanupDone { removed: usize },
    PipelineFailed { error: String },
}

/// Broadcast fan-out for [`BootEvent`]s. Sending with no subscribers is
/// not an error.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<Arc<BootEvent>>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BootEvent>> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: BootEvent) {
        trace!(?event, "boot event");
        let _ = self.tx.send(Arc::new(event));
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_SIZE)
    }
}
