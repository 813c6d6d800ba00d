//! CLI front-end.
//!
//! # Data Flow
//! ```text
//! argv + environment
//!     → app.rs (clap tokenizing, built from binding metadata)
//!     → Sources → Binder (apply)
//!     → Startup (info.rs prepended) → Lifecycle run-or-serve
//! ```

pub mod app;
pub mod info;

pub use app::App;
pub use info::{AppInfo, Info};
