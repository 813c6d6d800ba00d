//! Immutable request/lifecycle context.
//!
//! # Data Flow
//! ```text
//! Context::background()
//!     → with_value / injector chain (new context each step)
//!     → with_cancel / with_timeout (child cancellation scope)
//!     → passed by value into Init/Run/Serve/Shutdown
//! ```
//!
//! # Design Decisions
//! - Values are keyed by type and stored behind `Arc`, so cloning is cheap
//! - A context is never mutated; every enrichment returns a new one
//! - Cancellation is pull-based: holders await `done()` and exit on their own

pub mod injector;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ContextError;

pub use injector::{
    background, compose, identity, inject_fn, injector_from, with_injector, ContextInjector,
    InjectorChain,
};

type Values = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Context handed to every component capability.
#[derive(Clone)]
pub struct Context {
    values: Arc<Values>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// The empty root context. Never canceled, no deadline.
    pub fn background() -> Self {
        Self {
            values: Arc::new(Values::new()),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Return a new context carrying `value`, replacing any previous value of the same type.
    pub fn with_value<T: Any + Send + Sync>(&self, value: T) -> Self {
        let mut values = (*self.values).clone();
        values.insert(TypeId::of::<T>(), Arc::new(value));
        Self {
            values: Arc::new(values),
            cancel: self.cancel.clone(),
            deadline: self.deadline,
        }
    }

    /// Look up a value by type.
    pub fn value<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|v| v.downcast::<T>().ok())
    }

    /// Derive a child context that is canceled when the returned token is canceled
    /// or when this context is canceled.
    pub fn with_cancel(&self) -> (Self, CancellationToken) {
        let token = self.cancel.child_token();
        let ctx = Self {
            values: self.values.clone(),
            cancel: token.clone(),
            deadline: self.deadline,
        };
        (ctx, token)
    }

    /// Derive a child context with a deadline of at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(current) if current < candidate => current,
            _ => candidate,
        };
        Self {
            values: self.values.clone(),
            cancel: self.cancel.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Same values, fresh cancellation scope, no deadline.
    pub fn detached(&self) -> Self {
        Self {
            values: self.values.clone(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Same values, cancellation bound to `token` instead of this context's scope.
    pub fn with_token(&self, token: CancellationToken) -> Self {
        Self {
            values: self.values.clone(),
            cancel: token,
            deadline: self.deadline,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Why this context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.cancel.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolve once the context is canceled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => ContextError::Canceled,
                    _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
                }
            }
            None => {
                self.cancel.cancelled().await;
                ContextError::Canceled
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("values", &self.values.len())
            .field("canceled", &self.cancel.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Tenant(&'static str);

    #[test]
    fn test_with_value_does_not_mutate_parent() {
        let root = Context::background();
        let child = root.with_value(Tenant("acme"));

        assert!(root.value::<Tenant>().is_none());
        assert_eq!(*child.value::<Tenant>().unwrap(), Tenant("acme"));

        let replaced = child.with_value(Tenant("other"));
        assert_eq!(*child.value::<Tenant>().unwrap(), Tenant("acme"));
        assert_eq!(*replaced.value::<Tenant>().unwrap(), Tenant("other"));
    }

    #[test]
    fn test_cancel_propagates_to_children_only() {
        let root = Context::background();
        let (child, token) = root.with_cancel();
        let (grandchild, _) = child.with_cancel();

        token.cancel();

        assert_eq!(child.err(), Some(ContextError::Canceled));
        assert_eq!(grandchild.err(), Some(ContextError::Canceled));
        assert!(root.err().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_deadline_exceeded() {
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        assert!(!ctx.is_done());

        let reason = ctx.done().await;
        assert_eq!(reason, ContextError::DeadlineExceeded);
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[test]
    fn test_nested_timeout_keeps_earlier_deadline() {
        let outer = Context::background().with_timeout(Duration::from_secs(1));
        let inner = outer.with_timeout(Duration::from_secs(60));
        assert_eq!(inner.deadline(), outer.deadline());
    }

    #[test]
    fn test_detached_is_not_canceled_with_parent() {
        let (ctx, token) = Context::background().with_value(Tenant("a")).with_cancel();
        let detached = ctx.detached();
        token.cancel();

        assert!(ctx.is_done());
        assert!(!detached.is_done());
        assert!(detached.value::<Tenant>().is_some());
    }
}
