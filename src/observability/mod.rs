//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Lifecycle, agents and components produce:
//!     → logging.rs (structured events through an explicit Logger)
//!     → metrics.rs (phase durations, error counters)
//!
//! Consumers:
//!     → stdout (plain or JSON)
//!     → Prometheus scrape via MetricsExporter
//! ```
//!
//! # Design Decisions
//! - The logger is built once at process start and handed to the lifecycle;
//!   nothing below the CLI installs a global subscriber
//! - Metrics go through the `metrics` facade; recording is a no-op until an
//!   exporter installs a recorder

pub mod logging;
pub mod metrics;

pub use logging::{LogConfig, LogFormat, Logger};
pub use metrics::MetricsExporter;
