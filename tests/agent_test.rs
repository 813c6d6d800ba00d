//! Worker groups hosted by a component and driven by the lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use servekit::agent::Agent;
use servekit::component::{Component, Disable, Init, Server, Walker};
use servekit::context::{Context, ContextInjector};
use servekit::error::BoxError;
use servekit::{Lifecycle, Registry};

mod common;

#[derive(Debug, Clone)]
struct Region(&'static str);

impl ContextInjector for Region {
    fn inject_context(&self, ctx: Context) -> Context {
        ctx.with_value(self.clone())
    }
}

impl Component for Region {
    fn as_injector(&self) -> Option<Arc<dyn ContextInjector>> {
        Some(Arc::new(self.clone()))
    }
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicUsize,
    stopped: AtomicUsize,
    in_region: AtomicUsize,
}

struct Pollers {
    workers: usize,
    counters: Arc<Counters>,
    agent: Agent,
}

#[async_trait]
impl Init for Pollers {
    async fn init(&mut self, ctx: Context) -> Result<(), BoxError> {
        self.agent.init(ctx).await?;
        for i in 0..self.workers {
            let counters = self.counters.clone();
            self.agent.host(format!("poller-{i}"), move |ctx: Context| {
                let counters = counters.clone();
                async move {
                    counters.started.fetch_add(1, Ordering::SeqCst);
                    if ctx.value::<Region>().is_some_and(|r| r.0 == "eu-west") {
                        counters.in_region.fetch_add(1, Ordering::SeqCst);
                    }
                    ctx.done().await;
                    counters.stopped.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), BoxError>(())
                }
            });
        }
        Ok(())
    }
}

impl Component for Pollers {
    fn as_init(&mut self) -> Option<&mut dyn Init> {
        Some(self)
    }

    fn as_server(&self) -> Option<&dyn Server> {
        self.agent.as_server()
    }

    fn as_disable(&self) -> Option<&dyn Disable> {
        self.agent.as_disable()
    }
}

struct Service {
    region: Region,
    pollers: Pollers,
}

impl Service {
    fn new(workers: usize, counters: &Arc<Counters>) -> Self {
        Self::with_agent(workers, counters, Agent::new().with_kind("poller"))
    }

    fn with_agent(workers: usize, counters: &Arc<Counters>, agent: Agent) -> Self {
        Self {
            region: Region("eu-west"),
            pollers: Pollers {
                workers,
                counters: counters.clone(),
                agent,
            },
        }
    }
}

impl Component for Service {
    fn walk<'a>(&'a mut self, w: &mut dyn Walker<'a>) {
        w.embed(&mut self.region);
        w.nested("pollers", &mut self.pollers);
    }
}

#[tokio::test]
async fn test_workers_run_until_termination() {
    let counters = Arc::new(Counters::default());
    let mut service = Service::new(3, &counters);
    let (tx, termination) = common::termination();

    let mut lifecycle =
        Lifecycle::new(Registry::discover(&mut service)).with_termination(termination);

    let trigger = async {
        while counters.started.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(()).unwrap();
    };

    let (result, ()) = tokio::join!(lifecycle.execute(Context::background()), trigger);
    result.unwrap();
    drop(lifecycle);

    assert_eq!(counters.stopped.load(Ordering::SeqCst), 3);
    assert_eq!(counters.in_region.load(Ordering::SeqCst), 3);
    assert!(service.pollers.agent.is_closed());
}

#[tokio::test]
async fn test_agent_without_workers_is_skipped() {
    let counters = Arc::new(Counters::default());
    let mut service = Service::new(0, &counters);

    // Nothing serves, so no termination is needed.
    Lifecycle::new(Registry::discover(&mut service))
        .execute(Context::background())
        .await
        .unwrap();

    assert_eq!(counters.started.load(Ordering::SeqCst), 0);
    assert!(service.pollers.agent.is_closed());
}

#[tokio::test]
async fn test_unnamed_agent_takes_instance_name() {
    let counters = Arc::new(Counters::default());
    let mut service = Service::with_agent(0, &counters, Agent::new());

    Lifecycle::new(Registry::discover(&mut service))
        .execute(Context::background())
        .await
        .unwrap();

    assert_eq!(service.pollers.agent.kind(), "pollers");
}
