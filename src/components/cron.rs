//! Scheduled job component.
//!
//! # Responsibilities
//! - Parse the bound `cron` spec during init
//! - Fire the action at every scheduled time until shut down
//!
//! # Design Decisions
//! - Specs are standard five-field cron, `@every <duration>` or `@never`
//! - Each run is a detached task on the agent's accounting: it sees the
//!   injected context, is never canceled with `serve`, and a panic only logs
//! - Shutdown stops the timer, then waits for in-flight runs up to the deadline

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::agent::Agent;
use crate::component::{Component, Defaulter, Init, Server, Shutdown, Walker};
use crate::config::FieldOptions;
use crate::context::Context;
use crate::error::BoxError;
use crate::lifecycle::shutdown::{Reason, ShutdownTrigger};

/// Every Monday at midnight UTC. Named, since numeric weekdays start at Sunday = 1.
pub const DEFAULT_CRON: &str = "0 0 * * MON";

type Action = dyn Fn(Context) -> BoxFuture<'static, ()> + Send + Sync;

/// When a job fires.
pub enum Schedule {
    Cron { spec: String, cron: saffron::Cron },
    Every(Duration),
    Never,
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Cron { spec, .. } => f.debug_tuple("Cron").field(spec).finish(),
            Schedule::Every(every) => f.debug_tuple("Every").field(every).finish(),
            Schedule::Never => f.write_str("Never"),
        }
    }
}

impl Schedule {
    pub fn parse(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        if spec == "@never" {
            return Ok(Schedule::Never);
        }
        if let Some(every) = spec.strip_prefix("@every ") {
            let every = humantime::parse_duration(every.trim())
                .map_err(|e| format!("invalid cron spec `{}`: {}", spec, e))?;
            if every.is_zero() {
                return Err(format!("invalid cron spec `{}`: zero interval", spec));
            }
            return Ok(Schedule::Every(every));
        }

        let cron = spec
            .parse::<saffron::Cron>()
            .map_err(|e| format!("invalid cron spec `{}`: {:?}", spec, e))?;
        Ok(Schedule::Cron {
            spec: spec.to_string(),
            cron,
        })
    }

    /// First firing strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Cron { cron, .. } => cron.next_after(now),
            Schedule::Every(every) => chrono::Duration::from_std(*every)
                .ok()
                .and_then(|every| now.checked_add_signed(every)),
            Schedule::Never => None,
        }
    }

    /// Time left until the next firing, `None` when it never fires again.
    pub fn next_delay(&self) -> Option<Duration> {
        if let Schedule::Every(every) = self {
            return Some(*every);
        }
        let now = Utc::now();
        let next = self.next_after(now)?;
        Some((next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// A named action run on a schedule.
pub struct Job {
    pub cron: String,
    schedule: Option<Schedule>,
    name: String,
    action: Option<Arc<Action>>,
    stop: ShutdownTrigger,
    runs: Agent,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("cron", &self.cron)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

impl Default for Job {
    fn default() -> Self {
        Self {
            cron: String::new(),
            schedule: None,
            name: String::new(),
            action: None,
            stop: ShutdownTrigger::new(),
            runs: Agent::new().with_kind("cron"),
        }
    }
}

impl Job {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `schedule` instead of parsing `cron` at init.
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_action<F, Fut>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.name = name.into();
        self.action = Some(Arc::new(move |ctx| action(ctx).boxed()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    fn fire(&self, ctx: &Context) {
        let Some(action) = self.action.clone() else {
            return;
        };
        tracing::debug!(job = %self.name, "Job firing");
        self.runs.go(ctx, move |ctx| async move {
            action(ctx).await;
            Ok::<(), BoxError>(())
        });
    }
}

impl Defaulter for Job {
    fn set_defaults(&mut self) {
        if self.cron.is_empty() {
            self.cron = DEFAULT_CRON.to_string();
        }
    }
}

#[async_trait]
impl Init for Job {
    async fn init(&mut self, _ctx: Context) -> Result<(), BoxError> {
        if self.schedule.is_none() {
            let schedule =
                Schedule::parse(&self.cron).map_err(|e| format!("parse cron failed: {}", e))?;
            self.schedule = Some(schedule);
        }
        Ok(())
    }
}

#[async_trait]
impl Server for Job {
    async fn serve(&self, ctx: Context) -> Result<(), BoxError> {
        let schedule = self
            .schedule
            .as_ref()
            .ok_or("cron job served before init")?;

        tracing::info!(job = %self.name, cron = %self.cron, "Job waiting");

        let stopped = self.stop.subscribe().wait();
        tokio::pin!(stopped);

        loop {
            let Some(delay) = schedule.next_delay() else {
                tokio::select! {
                    _ = &mut stopped => {}
                    _ = ctx.done() => {}
                }
                return Ok(());
            };

            tokio::select! {
                _ = &mut stopped => return Ok(()),
                _ = ctx.done() => return Ok(()),
                _ = tokio::time::sleep(delay) => self.fire(&ctx),
            }
        }
    }
}

#[async_trait]
impl Shutdown for Job {
    async fn shutdown(&self, ctx: Context) -> Result<(), BoxError> {
        self.stop.trigger(Reason::Requested);
        self.runs.shutdown(ctx).await
    }
}

impl Component for Job {
    fn doc(&self) -> Option<&str> {
        Some("Cron job")
    }

    fn walk<'a>(&'a mut self, w: &mut dyn Walker<'a>) {
        w.field(
            "cron",
            &mut self.cron,
            FieldOptions::new()
                .optional()
                .describe("Standard cron spec, @every <duration> or @never"),
        );
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

    fn as_shutdown(&self) -> Option<&dyn Shutdown> {
        Some(self)
    }
}
