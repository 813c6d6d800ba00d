//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define lifecycle metrics
//! - Expose a Prometheus-compatible endpoint as a lifecycle component
//!
//! # Metrics
//! - `lifecycle_phase_duration_seconds` (histogram): time spent per phase
//! - `lifecycle_component_errors_total` (counter): component failures per phase
//! - `agent_workers_running` (gauge): hosted workers currently running
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is free until a
//!   recorder is installed
//! - The exporter is a regular `Server` so it starts and stops with the
//!   rest of the tree, and is disabled unless asked for

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;

use crate::component::{Component, Defaulter, Disable, Init, Server, Shutdown, Walker};
use crate::config::FieldOptions;
use crate::context::Context;
use crate::error::BoxError;
use crate::lifecycle::shutdown::{Reason, ShutdownTrigger};

pub const PHASE_DURATION: &str = "lifecycle_phase_duration_seconds";
pub const COMPONENT_ERRORS: &str = "lifecycle_component_errors_total";
pub const WORKERS_RUNNING: &str = "agent_workers_running";

const PHASE_SECONDS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0,
];

/// Record how long a lifecycle phase took.
pub fn record_phase(phase: &'static str, elapsed: Duration) {
    metrics::histogram!(PHASE_DURATION, "phase" => phase).record(elapsed.as_secs_f64());
}

/// Count one component failure in `phase`.
pub fn record_component_error(phase: &'static str) {
    metrics::counter!(COMPONENT_ERRORS, "phase" => phase).increment(1);
}

pub fn record_workers_running(kind: &str, running: usize) {
    metrics::gauge!(WORKERS_RUNNING, "kind" => kind.to_string()).set(running as f64);
}

/// Prometheus scrape endpoint.
pub struct MetricsExporter {
    pub enabled: bool,
    pub addr: SocketAddr,
    handle: Option<PrometheusHandle>,
    stop: ShutdownTrigger,
}

impl Default for MetricsExporter {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            handle: None,
            stop: ShutdownTrigger::new(),
        }
    }
}

impl std::fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsExporter")
            .field("enabled", &self.enabled)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl MetricsExporter {
    /// Text exposition of everything recorded so far.
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }

    fn router(handle: PrometheusHandle) -> Router {
        Router::new().route(
            "/metrics",
            get(move || std::future::ready(handle.render())),
        )
    }
}

impl Defaulter for MetricsExporter {
    fn set_defaults(&mut self) {
        if self.addr.port() == 0 {
            self.addr.set_port(9090);
        }
    }
}

#[async_trait]
impl Init for MetricsExporter {
    async fn init(&mut self, _ctx: Context) -> Result<(), BoxError> {
        if !self.enabled || self.handle.is_some() {
            return Ok(());
        }

        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Full(PHASE_DURATION.to_string()), PHASE_SECONDS)?
            .install_recorder()?;

        metrics::describe_histogram!(
            PHASE_DURATION,
            metrics::Unit::Seconds,
            "Time spent in each lifecycle phase"
        );
        metrics::describe_counter!(COMPONENT_ERRORS, "Component failures per lifecycle phase");

        self.handle = Some(handle);
        Ok(())
    }
}

#[async_trait]
impl Server for MetricsExporter {
    async fn serve(&self, _ctx: Context) -> Result<(), BoxError> {
        let Some(handle) = self.handle.clone() else {
            return Err("metrics recorder is not installed".into());
        };

        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!(address = %listener.local_addr()?, "Metrics endpoint listening");

        let stop = self.stop.subscribe();
        axum::serve(listener, Self::router(handle))
            .with_graceful_shutdown(async move {
                stop.wait().await;
            })
            .await?;

        tracing::info!("Metrics endpoint stopped");
        Ok(())
    }
}

#[async_trait]
impl Shutdown for MetricsExporter {
    async fn shutdown(&self, _ctx: Context) -> Result<(), BoxError> {
        self.stop.trigger(Reason::Requested);
        Ok(())
    }
}

impl Disable for MetricsExporter {
    fn disabled(&self, _ctx: &Context) -> bool {
        !self.enabled
    }
}

impl Component for MetricsExporter {
    fn walk<'a>(&'a mut self, w: &mut dyn Walker<'a>) {
        w.field(
            "enabled",
            &mut self.enabled,
            FieldOptions::new().optional().describe("Serve Prometheus metrics"),
        );
        w.field(
            "addr",
            &mut self.addr,
            FieldOptions::new().optional().expose("metrics"),
        );
    }

    fn doc(&self) -> Option<&str> {
        Some("Metrics exporter")
    }

    fn as_defaulter(&mut self) -> Option<&mut dyn Defaulter> {
        Some(self)
    }

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
