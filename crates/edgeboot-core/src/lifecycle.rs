// ── Deferred cleanup and shutdown ──

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::event::{BootEvent, EventSink};
use crate::supervisor::ProcessSupervisor;

/// After `delay`, delete `paths`. Missing files are ignored. Returns how
/// many files were removed, or `None` if cancelled first.
pub fn schedule_cleanup(
    paths: Vec<PathBuf>,
    delay: Duration,
    cancel: CancellationToken,
    events: EventSink,
) -> JoinHandle<Option<usize>> {
    events.emit(BootEvent::CleanupScheduled { delay });
    tokio::spawn(async move {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("cleanup cancelled");
                return None;
            }
            () = tokio::time::sleep(delay) => {}
        }

        let mut removed = 0;
        for path in &paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => debug!(path = %path.display(), error = %e, "cleanup skipped file"),
            }
        }
        info!(removed, "cleaned up generated files");
        events.emit(BootEvent::CleanupDone { removed });
        Some(removed)
    })
}

/// Stops all supervised children exactly once.
#[derive(Clone)]
pub struct ShutdownHook {
    supervisor: Arc<ProcessSupervisor>,
    cancel: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl ShutdownHook {
    pub fn new(supervisor: Arc<ProcessSupervisor>, cancel: CancellationToken) -> Self {
        Self {
            supervisor,
            cancel,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel background work and stop every child. Returns `false` when
    /// the hook already fired.
    pub async fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        let stopped = self.supervisor.stop_all().await;
        info!(stopped, "shutdown hook fired");
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cleanup_waits_for_delay() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.json");
        let log = dir.path().join("boot.log");
        std::fs::write(&config, "{}").unwrap();

        let handle = schedule_cleanup(
            vec![config.clone(), log],
            Duration::from_secs(90),
            CancellationToken::new(),
            EventSink::default(),
        );

        tokio::time::sleep(Duration::from_secs(89)).await;
        assert!(config.exists());

        assert_eq!(handle.await.unwrap(), Some(1));
        assert!(!config.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_can_be_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.json");
        std::fs::write(&config, "{}").unwrap();

        let cancel = CancellationToken::new();
        let handle = schedule_cleanup(
            vec![config.clone()],
            Duration::from_secs(90),
            cancel.clone(),
            EventSink::default(),
        );
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), None);
        assert!(config.exists());
    }

    #[tokio::test]
    async fn shutdown_hook_fires_once() {
        let cancel = CancellationToken::new();
        let hook = ShutdownHook::new(Arc::new(ProcessSupervisor::new()), cancel.clone());

        assert!(!hook.has_fired());
        assert!(hook.fire().await);
        assert!(cancel.is_cancelled());
        assert!(!hook.clone().fire().await);
        assert!(hook.has_fired());
    }
}
