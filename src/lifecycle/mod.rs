//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind config → Discover components → Defaults → Init
//!
//! Orchestration (orchestrator.rs):
//!     Run (sequential) → Serve (concurrent) → Shutdown (concurrent, bounded)
//!
//! Shutdown (shutdown.rs):
//!     Trigger fired → listeners stop accepting → serve returns
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM/SIGQUIT/SIGHUP → begin the shutdown phase
//! ```
//!
//! # Design Decisions
//! - Ordered startup: init follows registry order, injectors fold in as they go
//! - Unordered shutdown: every component stops concurrently
//! - Shutdown has timeout: each component gets its own deadline

pub mod orchestrator;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use orchestrator::{Lifecycle, Phase, DEFAULT_SHUTDOWN_TIMEOUT};
pub use shutdown::{Reason, ShutdownListener, ShutdownTrigger};
pub use startup::{bootstrap, Booted, Startup};
