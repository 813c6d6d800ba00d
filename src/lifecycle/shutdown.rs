//! Shutdown coordination.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// What started a shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// Process-level signal, e.g. `SIGTERM`.
    Signal(&'static str),
    /// A service's `serve` returned; peers are stopped with it.
    ServeReturned(String),
    /// Explicit request from code.
    Requested,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Signal(name) => write!(f, "signal {}", name),
            Reason::ServeReturned(component) => write!(f, "`{}` stopped serving", component),
            Reason::Requested => write!(f, "requested"),
        }
    }
}

/// Coordinator for graceful shutdown.
///
/// Every long-running loop can subscribe. The first trigger wins; a listener
/// that subscribes after the trigger fired still observes it.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<Option<Reason>>>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Fire the trigger. Returns `false` if it had already fired.
    pub fn trigger(&self, reason: Reason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn reason(&self) -> Option<Reason> {
        self.tx.borrow().clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Number of listeners still alive.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ShutdownListener {
    rx: watch::Receiver<Option<Reason>>,
}

impl ShutdownListener {
    /// Resolve once the trigger fires.
    pub async fn wait(mut self) -> Reason {
        match self.rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or(Reason::Requested),
            // Every trigger handle is gone; nothing can stop us later.
            Err(_) => Reason::Requested,
        }
    }
}
