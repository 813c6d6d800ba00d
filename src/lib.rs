//! Component lifecycle and dependency composition runtime.
//!
//! # Architecture Overview
//!
//! ```text
//!   argv / environment
//!          │
//!          ▼
//!   ┌─────────────┐   describe / apply   ┌──────────────┐
//!   │     cli     │─────────────────────▶│    config    │  Field Binder
//!   └──────┬──────┘                      └──────────────┘
//!          │ root component
//!          ▼
//!   ┌─────────────┐   walk   ┌──────────────┐
//!   │  registry   │◀─────────│  component   │  capabilities + Walker
//!   └──────┬──────┘          └──────────────┘
//!          ▼
//!   ┌─────────────┐  inject  ┌──────────────┐
//!   │  lifecycle  │─────────▶│   context    │  injector chain
//!   └──────┬──────┘          └──────────────┘
//!          │ serve
//!          ▼
//!   agent (worker groups) · components::http · observability::metrics
//! ```

pub mod agent;
pub mod cli;
pub mod component;
pub mod components;
pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod registry;

pub use agent::Agent;
pub use component::{
    Component, CurrentInstance, Defaulter, Disable, Init, PostServeRunner, Runner, Server,
    Shutdown, Walker,
};
pub use context::{Context, ContextInjector};
pub use error::{BoxError, Error, Result};
pub use lifecycle::Lifecycle;
pub use registry::Registry;
