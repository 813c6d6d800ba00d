//! Structured logging.
//!
//! # Responsibilities
//! - Build a `tracing` dispatcher from a [`LogConfig`]
//! - Attach that dispatcher to futures driven by the lifecycle and agents
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, plain format for development
//! - Filter configurable through `{APP}_LOG`, format through `{APP}_LOG_FORMAT`

use std::future::Future;

use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::config::EnvVars;

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `info,servekit=debug`.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Plain,
        }
    }
}

impl LogConfig {
    /// Read `{APP}_LOG` and `{APP}_LOG_FORMAT`.
    pub fn from_env(app: &str, env: &EnvVars) -> Self {
        let prefix = crate::config::naming::env_var_name(app, &[], "log");

        let filter = env
            .get(&prefix)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FILTER)
            .to_string();

        let format = match env.get(&format!("{}_FORMAT", prefix)) {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Plain,
        };

        Self { filter, format }
    }
}

/// Explicit logger handle.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

impl Logger {
    pub fn new(config: &LogConfig) -> Self {
        let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|e| {
            eprintln!("invalid log filter `{}`: {}", config.filter, e);
            EnvFilter::new(DEFAULT_FILTER)
        });

        let registry = tracing_subscriber::registry().with(filter);

        let dispatch = match config.format {
            LogFormat::Plain => Dispatch::new(registry.with(tracing_subscriber::fmt::layer())),
            LogFormat::Json => {
                Dispatch::new(registry.with(tracing_subscriber::fmt::layer().json()))
            }
        };

        Self { dispatch }
    }

    /// Whatever dispatcher is current for the calling thread.
    pub fn current() -> Self {
        Self {
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    /// Discards every event.
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::none(),
        }
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run `future` with this logger as its default dispatcher.
    pub fn instrument<F: Future>(&self, future: F) -> WithDispatch<F> {
        future.with_subscriber(self.dispatch.clone())
    }

    /// Make this logger the process default. Only the first call succeeds.
    pub fn install(&self) -> bool {
        tracing::dispatcher::set_global_default(self.dispatch.clone()).is_ok()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::current()
    }
}
