//! Tunnel bootstrap pipeline for the edgeboot workspace.
//!
//! - **[`Orchestrator`]** runs the whole sequence once at startup and
//!   absorbs every failure into a [`BootReport`] and [`BootEvent`]s.
//! - **[`ProcessSupervisor`]** owns the spawned tools, keyed by [`Role`],
//!   and stops them on shutdown via [`ShutdownHook`].
//! - **Documents**: [`proxy`] (proxy-core JSON), [`ingress`] (tunnel YAML),
//!   [`subscription`] (share links).

pub mod backoff;
pub mod error;
pub mod event;
pub mod ingress;
pub mod launch;
pub mod lifecycle;
pub mod orchestrator;
pub mod provision;
pub mod proxy;
pub mod publish;
pub mod resolver;
pub mod subscription;
pub mod supervisor;
pub mod workdir;

// ── Primary re-exports ──────────────────────────────────────────────
pub use error::{CoreError, ProvisionError, SupervisorError};
pub use event::{BootEvent, EventSink};
pub use lifecycle::ShutdownHook;
pub use orchestrator::{BootReport, Orchestrator};
pub use supervisor::{ProcessSupervisor, Role};
