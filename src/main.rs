//! servekit demo binary.
//!
//! Two commands over the same runtime:
//! - `serve`: HTTP server, optional Prometheus exporter, a heartbeat worker
//!   group and a weekly report job, stopped together on SIGINT/SIGTERM
//! - `hello`: one-shot runner that reads an injected greeting

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{extract::Extension, routing::get, Router};

use servekit::agent::Agent;
use servekit::cli::App;
use servekit::component::{Component, Defaulter, Disable, Init, Runner, Server, Walker};
use servekit::components::{HttpServer, Job};
use servekit::config::{EnvVars, FieldOptions};
use servekit::context::{Context, ContextInjector};
use servekit::error::{BoxError, Error};
use servekit::observability::{LogConfig, Logger, MetricsExporter};

const APP: &str = "servekit";

/// Published greeting.
#[derive(Debug, Clone)]
struct Greeting(String);

#[derive(Debug, Default)]
struct Greeter {
    greeting: String,
}

impl Defaulter for Greeter {
    fn set_defaults(&mut self) {
        if self.greeting.is_empty() {
            self.greeting = "hello".to_string();
        }
    }
}

impl ContextInjector for Greeting {
    fn inject_context(&self, ctx: Context) -> Context {
        ctx.with_value(self.clone())
    }
}

impl Component for Greeter {
    fn walk<'a>(&'a mut self, w: &mut dyn Walker<'a>) {
        w.field(
            "greeting",
            &mut self.greeting,
            FieldOptions::new().optional().describe("Greeting word"),
        );
    }

    fn as_defaulter(&mut self) -> Option<&mut dyn Defaulter> {
        Some(self)
    }

    fn as_injector(&self) -> Option<Arc<dyn ContextInjector>> {
        Some(Arc::new(Greeting(self.greeting.clone())))
    }
}

/// Logs a line every `interval` until stopped.
#[derive(Debug, Default)]
struct Heartbeat {
    interval: Duration,
    agent: Agent,
}

impl Defaulter for Heartbeat {
    fn set_defaults(&mut self) {
        if self.interval.is_zero() {
            self.interval = Duration::from_secs(30);
        }
    }
}

#[async_trait]
impl Init for Heartbeat {
    async fn init(&mut self, ctx: Context) -> Result<(), BoxError> {
        self.agent.init(ctx).await?;
        let interval = self.interval;
        self.agent.host("tick", move |ctx: Context| async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let greeting = ctx.value::<Greeting>().map(|g| g.0.clone()).unwrap_or_default();
                        tracing::info!(greeting = %greeting, "Heartbeat");
                    }
                    _ = ctx.done() => return Ok::<(), BoxError>(()),
                }
            }
        });
        Ok(())
    }
}

impl Component for Heartbeat {
    fn walk<'a>(&'a mut self, w: &mut dyn Walker<'a>) {
        w.field("interval", &mut self.interval, FieldOptions::new().optional());
    }

    fn doc(&self) -> Option<&str> {
        Some("Heartbeat")
    }

    fn as_defaulter(&mut self) -> Option<&mut dyn Defaulter> {
        Some(self)
    }

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

async fn hello(Extension(ctx): Extension<Context>) -> String {
    ctx.value::<Greeting>()
        .map(|g| format!("{}, world", g.0))
        .unwrap_or_default()
}

struct Serve {
    greeter: Greeter,
    metrics: MetricsExporter,
    heartbeat: Heartbeat,
    report: Job,
    http: HttpServer,
}

async fn report(ctx: Context) {
    let greeting = ctx.value::<Greeting>().map(|g| g.0.clone()).unwrap_or_default();
    tracing::info!(greeting = %greeting, "Weekly report");
}

impl Default for Serve {
    fn default() -> Self {
        Self {
            greeter: Greeter::default(),
            metrics: MetricsExporter::default(),
            heartbeat: Heartbeat::default(),
            report: Job::new().with_action("report", report),
            http: HttpServer::new().with_routes(Router::new().route("/hello", get(hello))),
        }
    }
}

impl Component for Serve {
    fn walk<'a>(&'a mut self, w: &mut dyn Walker<'a>) {
        w.embed(&mut self.greeter);
        w.nested("metrics", &mut self.metrics);
        w.nested("heartbeat", &mut self.heartbeat);
        w.nested("report", &mut self.report);
        w.nested("http", &mut self.http);
    }
}

#[derive(Debug, Default)]
struct Say {
    name: String,
}

#[async_trait]
impl Runner for Say {
    async fn run(&mut self, ctx: Context) -> Result<(), BoxError> {
        let greeting = ctx
            .value::<Greeting>()
            .ok_or("no greeting in context")?;
        println!("{}, {}", greeting.0, self.name);
        Ok(())
    }
}

impl Component for Say {
    fn walk<'a>(&'a mut self, w: &mut dyn Walker<'a>) {
        w.arg("name", &mut self.name);
    }

    fn as_runner(&mut self) -> Option<&mut dyn Runner> {
        Some(self)
    }
}

#[derive(Debug, Default)]
struct Hello {
    greeter: Greeter,
    say: Say,
}

impl Component for Hello {
    fn walk<'a>(&'a mut self, w: &mut dyn Walker<'a>) {
        w.embed(&mut self.greeter);
        w.embed(&mut self.say);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let env = EnvVars::from_env();

    let logger = Logger::new(&LogConfig::from_env(APP, &env));
    logger.install();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "{} starting", APP);

    let mut serve = Serve::default();
    let mut hello = Hello::default();

    let mut app = App::new(APP, env!("CARGO_PKG_VERSION"))
        .with_logger(logger)
        .command("serve", "Serve HTTP until terminated", &mut serve)
        .command("hello", "Print a greeting", &mut hello);

    match app.execute(std::env::args_os().skip(1), env).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Cli(e)) => e.exit(),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
