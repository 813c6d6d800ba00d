//! HTTP server component.
//!
//! # Responsibilities
//! - Bind the configured address and serve an Axum router
//! - Wire up middleware (tracing, request timeout, injected context)
//! - Stop gracefully when shut down or when the serve context ends
//!
//! # Design Decisions
//! - Handlers reach injected values through `Extension<Context>`
//! - `/healthz` is always present; `/debug/info` only with `enable_debug`
//! - The bound address is published through [`ServerHandle`] so port 0 works

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::{extract::Extension, http::StatusCode, routing::get, Json, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::cli::Info;
use crate::component::{Component, Defaulter, Server, Shutdown, Walker};
use crate::config::FieldOptions;
use crate::context::Context;
use crate::error::BoxError;
use crate::lifecycle::shutdown::{Reason, ShutdownTrigger};

const DEFAULT_PORT: u16 = 80;

/// Remote control for a running [`HttpServer`].
#[derive(Debug, Clone)]
pub struct ServerHandle {
    addr: watch::Receiver<Option<SocketAddr>>,
    stop: ShutdownTrigger,
}

impl ServerHandle {
    /// Address the listener is bound to, once serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.addr.borrow()
    }

    /// Wait until the listener is bound.
    pub async fn bound(&self) -> Option<SocketAddr> {
        let mut addr = self.addr.clone();
        let bound = addr.wait_for(Option::is_some).await.ok()?;
        *bound
    }

    /// Ask the server to stop accepting and drain.
    pub fn stop(&self) {
        self.stop.trigger(Reason::Requested);
    }
}

/// Axum server as a lifecycle component.
pub struct HttpServer {
    pub addr: SocketAddr,
    pub enable_debug: bool,
    pub request_timeout: Duration,
    routes: Router,
    bound: watch::Sender<Option<SocketAddr>>,
    stop: ShutdownTrigger,
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("addr", &self.addr)
            .field("enable_debug", &self.enable_debug)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for HttpServer {
    fn default() -> Self {
        let (bound, _) = watch::channel(None);
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            enable_debug: false,
            request_timeout: Duration::ZERO,
            routes: Router::new(),
            bound,
            stop: ShutdownTrigger::new(),
        }
    }
}

impl HttpServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `routes` next to the built-in ones.
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            addr: self.bound.subscribe(),
            stop: self.stop.clone(),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(&self, ctx: Context) -> Router {
        let mut router = Router::new().route("/healthz", get(healthz));

        if self.enable_debug {
            router = router.route("/debug/info", get(debug_info));
        }

        router
            .merge(self.routes.clone())
            .layer(Extension(ctx))
            .layer(TimeoutLayer::new(self.request_timeout))
            .layer(TraceLayer::new_for_http())
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn debug_info(Extension(ctx): Extension<Context>) -> Result<Json<Info>, StatusCode> {
    Info::from_context(&ctx)
        .map(|info| Json((*info).clone()))
        .ok_or(StatusCode::NOT_FOUND)
}

impl Defaulter for HttpServer {
    fn set_defaults(&mut self) {
        if self.request_timeout.is_zero() {
            self.request_timeout = Duration::from_secs(30);
        }
    }
}

#[async_trait]
impl Server for HttpServer {
    async fn serve(&self, ctx: Context) -> Result<(), BoxError> {
        let listener = TcpListener::bind(self.addr).await?;
        let addr = listener.local_addr()?;
        self.bound.send_replace(Some(addr));

        tracing::info!(
            address = %addr,
            debug = self.enable_debug,
            "HTTP server starting"
        );

        let router = self.build_router(ctx.clone());
        let stop = self.stop.subscribe();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    reason = stop.wait() => tracing::debug!(reason = %reason, "HTTP server stopping"),
                    err = ctx.done() => tracing::debug!(reason = %err, "HTTP server stopping"),
                }
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[async_trait]
impl Shutdown for HttpServer {
    async fn shutdown(&self, _ctx: Context) -> Result<(), BoxError> {
        self.stop.trigger(Reason::Requested);
        Ok(())
    }
}

impl Component for HttpServer {
    fn walk<'a>(&'a mut self, w: &mut dyn Walker<'a>) {
        w.field(
            "addr",
            &mut self.addr,
            FieldOptions::new().optional().expose("http"),
        );
        w.field("enable_debug", &mut self.enable_debug, FieldOptions::new().optional());
        w.field(
            "request_timeout",
            &mut self.request_timeout,
            FieldOptions::new().optional(),
        );
    }

    fn doc(&self) -> Option<&str> {
        Some("HTTP server")
    }

    fn as_defaulter(&mut self) -> Option<&mut dyn Defaulter> {
        Some(self)
    }

    fn as_server(&self) -> Option<&dyn Server> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Binder, EnvVars, Sources};

    #[test]
    fn test_bindings() {
        let mut server = HttpServer::new();
        let sources = Sources::new()
            .with_env(EnvVars::from_pairs([("APP_ADDR", "127.0.0.1:8080")]))
            .with_flag("request-timeout", "5s");
        let bindings = Binder::apply("app", &sources).bind(&mut server).unwrap();

        assert_eq!(server.addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(server.request_timeout, Duration::from_secs(5));
        assert_eq!(bindings.get("addr").unwrap().default_text, "0.0.0.0:80");
        assert_eq!(
            bindings.get("addr").unwrap().exposed_port_name.as_deref(),
            Some("http")
        );
    }

    #[tokio::test]
    async fn test_handle_stops_server() {
        let server = HttpServer::new().with_addr("127.0.0.1:0".parse().unwrap());
        let handle = server.handle();
        assert!(handle.local_addr().is_none());

        let serving = server.serve(Context::background());
        let control = async {
            let addr = handle.bound().await.unwrap();
            assert_ne!(addr.port(), 0);
            handle.stop();
        };

        let (result, ()) = tokio::join!(serving, control);
        result.unwrap();
    }
}
