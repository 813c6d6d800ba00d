//! Worker group: a service built from hosted background workers.
//!
//! # Responsibilities
//! - Collect workers before serving starts (`host`)
//! - Run every worker concurrently under one stop signal (`serve`)
//! - Stop the workers and wait for them, bounded by the caller's deadline (`shutdown`)
//! - Run detached fire-and-forget tasks under the same accounting (`go`)
//!
//! # Design Decisions
//! - Serving is one-shot; `host` after serving started is ignored
//! - Workers get a fresh root context rebuilt from the caller's injector
//!   chain, canceled only by the group's stop signal
//! - An unset kind is taken from the instance name during `init`; owners that
//!   delegate to an agent forward their own `init` to it
//! - `go` is the only place that recovers panics; a panicking hosted worker
//!   takes the group (and the process) down with it

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::instrument::WithSubscriber;
use tracing::Instrument;

use crate::component::{Component, CurrentInstance, Disable, Init, Server, Shutdown};
use crate::context::{background, Context};
use crate::error::BoxError;
use crate::observability::metrics::record_workers_running;

type WorkerFn = dyn Fn(Context) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync;

struct Worker {
    name: String,
    run: Box<WorkerFn>,
}

/// Group of hosted workers served as one component.
pub struct Agent {
    kind: String,
    workers: Mutex<Vec<Arc<Worker>>>,
    serving: AtomicBool,
    closed: AtomicBool,
    stop: CancellationToken,
    tracker: TaskTracker,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("kind", &self.kind)
            .field("workers", &self.len())
            .field("serving", &self.is_serving())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent {
    pub fn new() -> Self {
        Self {
            kind: String::new(),
            workers: Mutex::new(Vec::new()),
            serving: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            stop: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Label attached to every log record of this group.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Register a worker. Ignored once serving has started.
    pub fn host<F, Fut>(&self, name: impl Into<String>, run: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let name = name.into();

        if self.serving.load(Ordering::SeqCst) {
            tracing::debug!(agent.kind = %self.kind, agent.worker = %name, "Already serving, worker ignored");
            return;
        }

        let worker = Worker {
            name,
            run: Box::new(move |ctx| run(ctx).boxed()),
        };

        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(worker));
    }

    /// Number of hosted workers.
    pub fn len(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Token canceled when the group is told to stop.
    pub fn done(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Run every worker until all finish or one fails.
    ///
    /// No-op without workers, and on every call after the first.
    pub async fn serve(&self, ctx: Context) -> Result<(), BoxError> {
        if self.is_empty() {
            return Ok(());
        }
        if self.serving.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let workers: Vec<Arc<Worker>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut running = FuturesUnordered::new();
        for worker in workers {
            let span = tracing::info_span!(
                "worker",
                agent.kind = %self.kind,
                agent.worker = %worker.name
            );
            span.in_scope(|| tracing::info!("Serving"));

            let worker_ctx = background(&ctx).with_token(self.stop.child_token());
            let fut = (worker.run)(worker_ctx);
            running.push(
                self.tracker
                    .spawn(fut.instrument(span).with_current_subscriber()),
            );
        }

        let mut remaining = running.len();
        record_workers_running(&self.kind, remaining);

        while let Some(joined) = running.next().await {
            remaining -= 1;
            record_workers_running(&self.kind, remaining);

            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(agent.kind = %self.kind, error = %e, "Worker failed");
                    return Err(e);
                }
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Fire the stop signal and wait for every task, or for `ctx` to end.
    ///
    /// Only the first call does anything.
    pub async fn shutdown(&self, ctx: Context) -> Result<(), BoxError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.stop.cancel();
        self.tracker.close();

        tokio::select! {
            _ = self.tracker.wait() => {
                tracing::debug!(agent.kind = %self.kind, "Workers stopped");
                Ok(())
            }
            err = ctx.done() => {
                tracing::warn!(
                    agent.kind = %self.kind,
                    tasks = self.tracker.len(),
                    "Workers still running at deadline"
                );
                Err(err.into())
            }
        }
    }

    /// Run `action` detached from `ctx`'s cancellation but under group
    /// accounting. Errors and panics are logged, never propagated.
    pub fn go<F, Fut>(&self, ctx: &Context, action: F)
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let task_ctx = background(ctx).with_token(self.stop.child_token());
        let kind = self.kind.clone();

        let task = async move {
            match AssertUnwindSafe(action(task_ctx)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(agent.kind = %kind, error = %e, "Task failed"),
                Err(panic) => tracing::error!(
                    agent.kind = %kind,
                    panic = %panic_message(panic.as_ref()),
                    "Task panicked"
                ),
            }
        };

        self.tracker.spawn(task.with_current_subscriber());
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait]
impl Init for Agent {
    async fn init(&mut self, ctx: Context) -> Result<(), BoxError> {
        if self.kind.is_empty() {
            if let Some(instance) = ctx.value::<CurrentInstance>() {
                self.kind = instance.0.clone();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Server for Agent {
    async fn serve(&self, ctx: Context) -> Result<(), BoxError> {
        Agent::serve(self, ctx).await
    }
}

#[async_trait]
impl Shutdown for Agent {
    async fn shutdown(&self, ctx: Context) -> Result<(), BoxError> {
        Agent::shutdown(self, ctx).await
    }
}

impl Disable for Agent {
    fn disabled(&self, _ctx: &Context) -> bool {
        self.is_empty()
    }
}

impl Component for Agent {
    fn as_init(&mut self) -> Option<&mut dyn Init> {
        Some(self)
    }

    fn as_server(&self) -> Option<&dyn Server> {
        Some(self)
    }

    fn as_disable(&self) -> Option<&dyn Disable> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn until_stopped(ctx: Context) -> impl Future<Output = Result<(), BoxError>> {
        async move {
            ctx.done().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_empty_group_is_disabled() {
        let agent = Agent::new();
        let ctx = Context::background();

        assert!(agent.disabled(&ctx));
        agent.serve(ctx.clone()).await.unwrap();
        assert!(!agent.is_serving());
    }

    #[tokio::test]
    async fn test_kind_defaults_to_instance_name() {
        let ctx = Context::background().with_value(CurrentInstance("indexer".to_string()));

        let mut unnamed = Agent::new();
        unnamed.init(ctx.clone()).await.unwrap();
        assert_eq!(unnamed.kind(), "indexer");

        let mut named = Agent::new().with_kind("poller");
        named.init(ctx).await.unwrap();
        assert_eq!(named.kind(), "poller");
    }

    #[tokio::test]
    async fn test_host_after_serve_and_double_shutdown() {
        let agent = Arc::new(Agent::new().with_kind("test"));
        agent.host("idle", until_stopped);
        assert_eq!(agent.len(), 1);

        let serving = tokio::spawn({
            let agent = agent.clone();
            async move { agent.serve(Context::background()).await }
        });

        while !agent.is_serving() {
            tokio::task::yield_now().await;
        }

        agent.host("late", until_stopped);
        assert_eq!(agent.len(), 1);

        agent.shutdown(Context::background()).await.unwrap();
        agent.shutdown(Context::background()).await.unwrap();
        assert!(agent.done().is_cancelled());

        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_serve_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = Agent::new();
        agent.host("count", {
            let calls = calls.clone();
            move |_ctx| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), BoxError>(())
                }
            }
        });

        agent.serve(Context::background()).await.unwrap();
        agent.serve(Context::background()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_error_returns() {
        let agent = Agent::new();
        agent.host("idle", until_stopped);
        agent.host("broken", |_ctx| async { Err::<(), BoxError>("boom".into()) });

        let err = agent.serve(Context::background()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");

        agent.shutdown(Context::background()).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_bounded_by_deadline() {
        let agent = Arc::new(Agent::new());
        agent.host("stubborn", |_ctx| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<(), BoxError>(())
        });

        let serving = tokio::spawn({
            let agent = agent.clone();
            async move { agent.serve(Context::background()).await }
        });
        while !agent.is_serving() {
            tokio::task::yield_now().await;
        }

        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        let err = agent.shutdown(ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "context deadline exceeded");

        serving.abort();
    }

    #[tokio::test]
    async fn test_go_recovers_panic() {
        let agent = Agent::new();
        let ctx = Context::background();

        async fn explode(_ctx: Context) -> Result<(), BoxError> {
            panic!("worker exploded")
        }
        agent.go(&ctx, explode);

        let finished = Arc::new(AtomicBool::new(false));
        agent.go(&ctx, {
            let finished = finished.clone();
            move |ctx| async move {
                ctx.done().await;
                finished.store(true, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        });

        agent.shutdown(Context::background()).await.unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_workers_see_injected_values() {
        use crate::context::{compose, inject_fn, with_injector, ContextInjector};

        #[derive(Debug, PartialEq)]
        struct Region(&'static str);

        let chain = compose([Arc::new(inject_fn(
            |ctx: Context, region: &&'static str| ctx.with_value(Region(*region)),
            "eu",
        )) as Arc<dyn ContextInjector>]);
        let ctx = with_injector(&Context::background(), chain);

        let seen = Arc::new(Mutex::new(None));
        let agent = Agent::new();
        agent.host("sampler", {
            let seen = seen.clone();
            move |ctx: Context| {
                let seen = seen.clone();
                async move {
                    *seen.lock().unwrap() = ctx.value::<Region>().map(|r| r.0);
                    Ok::<(), BoxError>(())
                }
            }
        });

        agent.serve(ctx).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), Some("eu"));
    }
}
