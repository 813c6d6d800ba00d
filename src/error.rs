//! Error taxonomy for the runtime.
//!
//! # Design Decisions
//! - Binding errors are collected and reported together
//! - Component code returns `BoxError`; the orchestrator wraps it with the
//!   component name and the phase it failed in
//! - Shutdown failures are aggregated, one entry per component

use std::fmt;
use std::time::Duration;

/// Error type returned by component capabilities.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a context is no longer live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// A single configuration field failed to bind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    #[error("invalid value for `{binding}` from {origin}: {message}")]
    InvalidValue {
        binding: String,
        origin: String,
        message: String,
    },

    #[error("missing required value for `{binding}` (flag --{binding} or ${env_var})")]
    MissingRequiredValue { binding: String, env_var: String },

    #[error("missing argument {name}")]
    MissingArgument { name: String },

    #[error("unexpected argument `{value}`")]
    UnexpectedArgument { value: String },
}

/// All binding errors found during one walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingErrors(pub Vec<BindingError>);

impl fmt::Display for BindingErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for BindingErrors {}

/// One component failed to shut down.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("shutdown of `{component}` timed out after {timeout:?}")]
    Timeout { component: String, timeout: Duration },

    #[error("shutdown of `{component}` failed: {source}")]
    Failed {
        component: String,
        #[source]
        source: BoxError,
    },
}

impl ShutdownError {
    pub fn component(&self) -> &str {
        match self {
            ShutdownError::Timeout { component, .. } | ShutdownError::Failed { component, .. } => {
                component
            }
        }
    }
}

/// Shutdown errors from every component that failed, in registry order.
#[derive(Debug)]
pub struct ShutdownErrors(pub Vec<ShutdownError>);

impl fmt::Display for ShutdownErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} component(s) failed to shut down: ", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ShutdownErrors {}

/// Top-level runtime error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration failed: {0}")]
    Binding(#[from] BindingErrors),

    #[error("init `{component}` failed: {source}")]
    Init {
        component: String,
        #[source]
        source: BoxError,
    },

    #[error("run `{component}` failed: {source}")]
    Run {
        component: String,
        #[source]
        source: BoxError,
    },

    #[error("serve `{component}` failed: {source}")]
    Serve {
        component: String,
        #[source]
        source: BoxError,
    },

    #[error("post-serve run `{component}` failed: {source}")]
    PostServe {
        component: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Shutdown(#[from] ShutdownErrors),

    #[error(transparent)]
    Cli(#[from] clap::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
