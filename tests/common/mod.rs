//! Shared helpers for servekit integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use servekit::component::{Component, Disable, Init, Runner, Server, Shutdown, Walker};
use servekit::context::{Context, ContextInjector};
use servekit::error::BoxError;
use servekit::lifecycle::ShutdownTrigger;

/// Ordered log of lifecycle calls, shared by every stub of a test.
#[derive(Debug, Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.0.lock().unwrap().iter().any(|e| e == event)
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == event)
    }
}

/// Names of every stub injected so far, in injection order.
#[derive(Debug, Clone, Default)]
pub struct Marks(pub Vec<&'static str>);

struct Mark(&'static str);

impl ContextInjector for Mark {
    fn inject_context(&self, ctx: Context) -> Context {
        let mut marks = ctx.value::<Marks>().map(|m| m.0.clone()).unwrap_or_default();
        marks.push(self.0);
        ctx.with_value(Marks(marks))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serve {
    /// Block until shut down.
    UntilStopped,
    /// Return `Ok` after a delay.
    ReturnAfter(Duration),
    /// Return an error after a delay.
    FailAfter(Duration),
    /// Ignore both shutdown and cancellation.
    Forever,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stop {
    #[default]
    Ok,
    Fail,
    Hang,
}

/// Configurable component that records every lifecycle call.
#[derive(Debug)]
pub struct Stub {
    pub name: &'static str,
    events: Events,
    serve: Option<Serve>,
    stop: Stop,
    runner: bool,
    cleanup: bool,
    disabled: bool,
    inject: bool,
    requires: Option<&'static str>,
    fail_init: bool,
    stopped: ShutdownTrigger,
}

impl Stub {
    pub fn new(name: &'static str, events: &Events) -> Self {
        Self {
            name,
            events: events.clone(),
            serve: None,
            stop: Stop::Ok,
            runner: false,
            cleanup: false,
            disabled: false,
            inject: false,
            requires: None,
            fail_init: false,
            stopped: ShutdownTrigger::new(),
        }
    }

    pub fn serving(mut self, serve: Serve) -> Self {
        self.serve = Some(serve);
        self
    }

    pub fn stopping(mut self, stop: Stop) -> Self {
        self.stop = stop;
        self
    }

    pub fn running(mut self) -> Self {
        self.runner = true;
        self
    }

    /// Shut down without serving.
    pub fn cleaning_up(mut self) -> Self {
        self.cleanup = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Contribute this stub's name to [`Marks`].
    pub fn injecting(mut self) -> Self {
        self.inject = true;
        self
    }

    /// Fail init unless `mark` was injected earlier.
    pub fn requiring(mut self, mark: &'static str) -> Self {
        self.requires = Some(mark);
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }
}

#[async_trait]
impl Init for Stub {
    async fn init(&mut self, ctx: Context) -> Result<(), BoxError> {
        self.events.record(format!("init:{}", self.name));
        if self.fail_init {
            return Err(format!("{} refused to start", self.name).into());
        }
        if let Some(mark) = self.requires {
            let marks = ctx.value::<Marks>().map(|m| m.0.clone()).unwrap_or_default();
            if !marks.contains(&mark) {
                return Err(format!("{} requires {}", self.name, mark).into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Runner for Stub {
    async fn run(&mut self, _ctx: Context) -> Result<(), BoxError> {
        self.events.record(format!("run:{}", self.name));
        Ok(())
    }
}

#[async_trait]
impl Shutdown for Stub {
    async fn shutdown(&self, _ctx: Context) -> Result<(), BoxError> {
        self.events.record(format!("shutdown:{}", self.name));
        match self.stop {
            Stop::Ok => {
                self.stopped.trigger(servekit::lifecycle::Reason::Requested);
                Ok(())
            }
            Stop::Fail => {
                self.stopped.trigger(servekit::lifecycle::Reason::Requested);
                Err(format!("{} failed to stop", self.name).into())
            }
            Stop::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Server for Stub {
    async fn serve(&self, ctx: Context) -> Result<(), BoxError> {
        self.events.record(format!("serve:{}", self.name));
        match self.serve {
            Some(Serve::ReturnAfter(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Some(Serve::FailAfter(delay)) => {
                tokio::time::sleep(delay).await;
                Err(format!("{} crashed", self.name).into())
            }
            Some(Serve::Forever) => std::future::pending().await,
            _ => {
                tokio::select! {
                    _ = self.stopped.subscribe().wait() => {}
                    _ = ctx.done() => {}
                }
                self.events.record(format!("served:{}", self.name));
                Ok(())
            }
        }
    }
}

impl Disable for Stub {
    fn disabled(&self, _ctx: &Context) -> bool {
        self.disabled
    }
}

impl Component for Stub {
    fn as_init(&mut self) -> Option<&mut dyn Init> {
        Some(self)
    }

    fn as_runner(&mut self) -> Option<&mut dyn Runner> {
        if self.runner {
            Some(self)
        } else {
            None
        }
    }

    fn as_server(&self) -> Option<&dyn Server> {
        self.serve.map(|_| self as &dyn Server)
    }

    fn as_shutdown(&self) -> Option<&dyn Shutdown> {
        if self.cleanup {
            Some(self)
        } else {
            None
        }
    }

    fn as_disable(&self) -> Option<&dyn Disable> {
        Some(self)
    }

    fn as_injector(&self) -> Option<Arc<dyn ContextInjector>> {
        if self.inject {
            Some(Arc::new(Mark(self.name)))
        } else {
            None
        }
    }
}

/// Root declaring each stub as a named child, in order.
#[derive(Debug, Default)]
pub struct Root {
    pub stubs: Vec<Stub>,
}

impl Root {
    pub fn new(stubs: impl IntoIterator<Item = Stub>) -> Self {
        Self {
            stubs: stubs.into_iter().collect(),
        }
    }
}

impl Component for Root {
    fn walk<'a>(&'a mut self, w: &mut dyn Walker<'a>) {
        for stub in self.stubs.iter_mut() {
            let name = stub.name;
            w.nested(name, stub);
        }
    }
}

/// A termination future fired by the returned sender.
pub fn termination() -> (oneshot::Sender<()>, impl std::future::Future<Output = ()> + Send) {
    let (tx, rx) = oneshot::channel::<()>();
    (tx, async move {
        let _ = rx.await;
    })
}

/// Reserve a loopback port that is free right now.
pub fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
