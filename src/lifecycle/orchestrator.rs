//! Lifecycle orchestrator.
//!
//! # Responsibilities
//! - Drive registry members through defaults → init → run-or-serve → shutdown
//! - Fold context injectors progressively during init
//! - Stop every service when one of them stops or a termination signal arrives
//! - Bound each component's shutdown with its own timeout
//!
//! # Data Flow
//! ```text
//! set_defaults:  every Defaulter, unordered
//! init:          registry order; ctx grows after each ContextInjector,
//!                each call also sees its own CurrentInstance
//! run_or_serve:  Runners sequentially, then
//!                Servers + PostServeRunners concurrently
//!                    ↓ first serve returns | termination signal
//! shutdown:      every Shutdown concurrently, each under its own timeout
//! ```
//!
//! # Design Decisions
//! - All concurrent work runs as futures inside the caller's task; components
//!   are borrowed, never moved into spawned tasks
//! - A serve error is reported ahead of shutdown errors
//! - Every shutdown failure is collected, not only the first
//! - A service that outlives the shutdown pass by more than the shutdown
//!   timeout is dropped, never awaited forever
//! - Panics in `serve`/`run` are not caught here; only `Agent::go` recovers

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use futures::future::{self, BoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::component::{Component, CurrentInstance};
use crate::context::{injector_from, with_injector, Context, ContextInjector};
use crate::error::{BoxError, Error, Result, ShutdownError, ShutdownErrors};
use crate::lifecycle::shutdown::Reason;
use crate::lifecycle::signals;
use crate::observability::metrics::{record_component_error, record_phase};
use crate::observability::Logger;
use crate::registry::Registry;

/// Per-component shutdown budget unless configured otherwise.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the orchestrator is in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unconfigured,
    Defaulted,
    Initialized,
    Running,
    Serving,
    ShuttingDown,
    Terminated,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Unconfigured => "unconfigured",
            Phase::Defaulted => "defaulted",
            Phase::Initialized => "initialized",
            Phase::Running => "running",
            Phase::Serving => "serving",
            Phase::ShuttingDown => "shutting_down",
            Phase::Terminated => "terminated",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn transition(phase: &mut Phase, next: Phase) {
    tracing::debug!(from = %phase, to = %next, "Lifecycle transition");
    *phase = next;
}

fn label(name: &str) -> &str {
    if name.is_empty() {
        "<embedded>"
    } else {
        name
    }
}

/// Drives one registry through its lifecycle.
pub struct Lifecycle<'a> {
    registry: Registry<'a>,
    shutdown_timeout: Duration,
    termination: Option<BoxFuture<'a, Reason>>,
    logger: Logger,
    phase: Phase,
}

impl fmt::Debug for Lifecycle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("registry", &self.registry)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl<'a> Lifecycle<'a> {
    pub fn new(registry: Registry<'a>) -> Self {
        Self {
            registry,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            termination: None,
            logger: Logger::current(),
            phase: Phase::Unconfigured,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Replace the OS signal trigger with `termination`.
    pub fn with_termination<F>(mut self, termination: F) -> Self
    where
        F: Future<Output = ()> + Send + 'a,
    {
        self.termination = Some(termination.map(|()| Reason::Requested).boxed());
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn registry(&self) -> &Registry<'a> {
        &self.registry
    }

    /// Defaults, init, then run-or-serve.
    pub async fn execute(&mut self, ctx: Context) -> Result<()> {
        self.set_defaults();
        let ctx = self.init(ctx).await?;
        self.run_or_serve(ctx).await
    }

    /// Invoke `set_defaults` on every member that has defaults.
    pub fn set_defaults(&mut self) {
        let _guard = tracing::dispatcher::set_default(self.logger.dispatch());
        let started = Instant::now();

        for singleton in self.registry.iter_mut() {
            if let Some(defaulter) = singleton.component.as_defaulter() {
                defaulter.set_defaults();
            }
        }

        record_phase("defaults", started.elapsed());
        transition(&mut self.phase, Phase::Defaulted);
    }

    /// Initialize members in registry order.
    ///
    /// Each member sees every injector contributed before it. The returned
    /// context carries the full injector chain (see [`injector_from`]).
    pub async fn init(&mut self, ctx: Context) -> Result<Context> {
        let logger = self.logger.clone();
        logger.instrument(self.init_all(ctx)).await
    }

    async fn init_all(&mut self, ctx: Context) -> Result<Context> {
        let started = Instant::now();
        let mut chain = injector_from(&ctx);
        let mut current = chain.inject_context(ctx.clone());

        for singleton in self.registry.iter_mut() {
            let name = label(&singleton.name);

            if let Some(init) = singleton.component.as_init() {
                tracing::debug!(component = %name, "Initializing");
                let scoped = current.with_value(CurrentInstance(name.to_string()));
                if let Err(source) = init.init(scoped).await {
                    record_component_error("init");
                    tracing::error!(component = %name, error = %source, "Init failed");
                    return Err(Error::Init {
                        component: name.to_string(),
                        source,
                    });
                }
            }

            if let Some(injector) = singleton.component.as_injector() {
                current = injector.inject_context(current);
                chain = chain.push(injector);
            }
        }

        record_phase("init", started.elapsed());
        transition(&mut self.phase, Phase::Initialized);
        tracing::debug!(injectors = chain.len(), "Initialized");

        Ok(with_injector(&ctx, chain))
    }

    /// Run every `Runner`, then serve every `Server` until termination.
    ///
    /// Without servers, members that can shut down get a cleanup pass.
    pub async fn run_or_serve(&mut self, ctx: Context) -> Result<()> {
        let logger = self.logger.clone();
        logger.instrument(self.run_or_serve_all(ctx)).await
    }

    async fn run_or_serve_all(&mut self, ctx: Context) -> Result<()> {
        let ctx = injector_from(&ctx).inject_context(ctx);

        self.run_all(&ctx).await?;

        let has_servers = self
            .registry
            .iter()
            .any(|s| s.component.as_server().is_some());

        if !has_servers {
            return self.shutdown_all(ctx).await;
        }

        let termination = self
            .termination
            .take()
            .unwrap_or_else(|| signals::terminate().map(Reason::Signal).boxed());

        transition(&mut self.phase, Phase::Serving);
        let result = serve_all(
            &self.registry,
            ctx,
            termination,
            self.shutdown_timeout,
            &mut self.phase,
        )
        .await;
        transition(&mut self.phase, Phase::Terminated);

        result
    }

    async fn run_all(&mut self, ctx: &Context) -> Result<()> {
        let has_runners = self
            .registry
            .iter_mut()
            .any(|s| s.component.as_runner().is_some());
        if !has_runners {
            return Ok(());
        }

        transition(&mut self.phase, Phase::Running);
        let started = Instant::now();

        for singleton in self.registry.iter_mut() {
            let name = label(&singleton.name);
            let Some(runner) = singleton.component.as_runner() else {
                continue;
            };

            tracing::debug!(component = %name, "Running");
            if let Err(source) = runner.run(ctx.clone()).await {
                record_component_error("run");
                tracing::error!(component = %name, error = %source, "Run failed");
                return Err(Error::Run {
                    component: name.to_string(),
                    source,
                });
            }
            tracing::debug!(component = %name, "Run done");
        }

        record_phase("run", started.elapsed());
        Ok(())
    }

    /// Shut down every member concurrently, each under the shutdown timeout.
    pub async fn shutdown(&mut self, ctx: Context) -> Result<()> {
        let logger = self.logger.clone();
        logger.instrument(self.shutdown_all(ctx)).await
    }

    async fn shutdown_all(&mut self, ctx: Context) -> Result<()> {
        transition(&mut self.phase, Phase::ShuttingDown);
        let result = shutdown_all(&self.registry, &ctx, self.shutdown_timeout).await;
        transition(&mut self.phase, Phase::Terminated);
        result.map_err(Error::from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Serve,
    PostServe,
}

struct Outcome<'r> {
    component: &'r str,
    task: Task,
    result: Result<(), BoxError>,
}

impl Outcome<'_> {
    /// Log and convert a failed outcome.
    fn into_error(self) -> Option<Error> {
        let source = self.result.err()?;
        let component = self.component.to_string();

        match self.task {
            Task::Serve => {
                record_component_error("serve");
                tracing::error!(component = %component, error = %source, "Serve failed");
                Some(Error::Serve { component, source })
            }
            Task::PostServe => {
                record_component_error("post_serve");
                tracing::error!(component = %component, error = %source, "Post-serve run failed");
                Some(Error::PostServe { component, source })
            }
        }
    }
}

async fn serve_all(
    registry: &Registry<'_>,
    ctx: Context,
    mut termination: BoxFuture<'_, Reason>,
    shutdown_timeout: Duration,
    phase: &mut Phase,
) -> Result<()> {
    let started = Instant::now();
    let (group_ctx, group_token) = ctx.with_cancel();
    let mut tasks: FuturesUnordered<BoxFuture<'_, Outcome<'_>>> = FuturesUnordered::new();

    for singleton in registry.iter() {
        let Some(server) = singleton.component.as_server() else {
            continue;
        };
        let component = label(&singleton.name);

        if singleton
            .component
            .as_disable()
            .is_some_and(|d| d.disabled(&ctx))
        {
            tracing::info!(component = %component, "Service disabled");
            continue;
        }

        tracing::info!(component = %component, "Serving");
        let serve_ctx = group_ctx.clone();
        tasks.push(
            async move {
                Outcome {
                    component,
                    task: Task::Serve,
                    result: server.serve(serve_ctx).await,
                }
            }
            .boxed(),
        );

        if let Some(post) = singleton.component.as_post_serve() {
            let post_ctx = group_ctx.clone();
            tasks.push(
                async move {
                    Outcome {
                        component,
                        task: Task::PostServe,
                        result: post.post_serve_run(post_ctx).await,
                    }
                }
                .boxed(),
            );
        }
    }

    let mut first_error = None;

    let reason = if tasks.is_empty() {
        tracing::info!("Every service is disabled");
        Reason::Requested
    } else {
        loop {
            tokio::select! {
                reason = &mut termination => break reason,
                Some(outcome) = tasks.next() => {
                    let component = outcome.component;
                    let task = outcome.task;

                    if let Some(err) = outcome.into_error() {
                        first_error = Some(err);
                        group_token.cancel();
                        break Reason::ServeReturned(component.to_string());
                    }
                    if task == Task::Serve {
                        break Reason::ServeReturned(component.to_string());
                    }
                }
            }
        }
    };

    record_phase("serve", started.elapsed());
    tracing::info!(reason = %reason, "Shutting down");
    transition(phase, Phase::ShuttingDown);

    let shut_down = CancellationToken::new();

    let shutdown = async {
        let result = shutdown_all(registry, &ctx, shutdown_timeout).await;
        group_token.cancel();
        shut_down.cancel();
        result
    };

    // Services get one more shutdown timeout after the shutdown pass to
    // return; past that they are dropped.
    let drain = async {
        let grace = async {
            shut_down.cancelled().await;
            tokio::time::sleep(shutdown_timeout).await;
        };
        tokio::pin!(grace);

        let mut late_error = None;
        loop {
            tokio::select! {
                next = tasks.next() => match next {
                    Some(outcome) => {
                        if let Some(err) = outcome.into_error() {
                            late_error.get_or_insert(err);
                        }
                    }
                    None => break,
                },
                () = &mut grace => {
                    tracing::warn!(
                        services = tasks.len(),
                        timeout = ?shutdown_timeout,
                        "Services ignored shutdown, abandoning them"
                    );
                    break;
                }
            }
        }
        late_error
    };

    let (shutdown_result, late_error) = futures::join!(shutdown, drain);

    match first_error.or(late_error) {
        Some(err) => {
            if let Err(errors) = shutdown_result {
                tracing::warn!(error = %errors, "Shutdown also failed");
            }
            Err(err)
        }
        None => shutdown_result.map_err(Error::from),
    }
}

fn shutdown_future<'c>(
    component: &'c dyn Component,
    ctx: Context,
) -> Option<BoxFuture<'c, Result<(), BoxError>>> {
    if let Some(shutdown) = component.as_shutdown() {
        return Some(shutdown.shutdown(ctx));
    }
    component.as_server().map(|server| server.shutdown(ctx))
}

async fn shutdown_all(
    registry: &Registry<'_>,
    ctx: &Context,
    timeout: Duration,
) -> std::result::Result<(), ShutdownErrors> {
    let started = Instant::now();

    let pending = registry.iter().filter_map(|singleton| {
        let component = label(&singleton.name);
        let shutdown_ctx = ctx.with_timeout(timeout);
        let deadline = shutdown_ctx
            .deadline()
            .unwrap_or_else(|| tokio::time::Instant::now() + timeout);
        let fut = shutdown_future(&*singleton.component, shutdown_ctx)?;

        Some(async move {
            tracing::debug!(component = %component, timeout = ?timeout, "Shutting down");
            match tokio::time::timeout_at(deadline, fut).await {
                Ok(Ok(())) => {
                    tracing::debug!(component = %component, "Shutdown done");
                    None
                }
                Ok(Err(source)) => Some(ShutdownError::Failed {
                    component: component.to_string(),
                    source,
                }),
                Err(_) => Some(ShutdownError::Timeout {
                    component: component.to_string(),
                    timeout,
                }),
            }
        })
    });

    let errors: Vec<ShutdownError> = future::join_all(pending)
        .await
        .into_iter()
        .flatten()
        .collect();

    record_phase("shutdown", started.elapsed());

    if errors.is_empty() {
        return Ok(());
    }

    for err in &errors {
        record_component_error("shutdown");
        tracing::error!(component = %err.component(), error = %err, "Shutdown failed");
    }
    Err(ShutdownErrors(errors))
}
