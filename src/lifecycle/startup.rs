//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind configuration before any component runs
//! - Discover lifecycle participants
//! - Apply defaults and initialize in registry order
//!
//! # Design Decisions
//! - Fail fast: a binding or init error is returned before anything serves
//! - Components placed ahead of the tree (e.g. app info) initialize first

use crate::component::Component;
use crate::config::{Binder, Bindings};
use crate::context::Context;
use crate::error::Result;
use crate::lifecycle::orchestrator::Lifecycle;
use crate::observability::Logger;
use crate::registry::Registry;

/// A tree that is bound and initialized, ready for `run_or_serve`.
#[derive(Debug)]
pub struct Booted<'a> {
    pub lifecycle: Lifecycle<'a>,
    /// Context returned by init; carries the injector chain.
    pub ctx: Context,
    pub bindings: Bindings,
}

/// Bind → discover → defaults → init.
pub struct Startup<'a, 's> {
    binder: Binder<'s>,
    prelude: Vec<(String, &'a mut dyn Component)>,
    logger: Logger,
    list_configuration: bool,
}

impl<'a, 's> Startup<'a, 's> {
    pub fn new(binder: Binder<'s>) -> Self {
        Self {
            binder,
            prelude: Vec::new(),
            logger: Logger::current(),
            list_configuration: false,
        }
    }

    /// Register `component` ahead of everything discovered in the tree.
    pub fn prepend(mut self, name: impl Into<String>, component: &'a mut dyn Component) -> Self {
        self.prelude.push((name.into(), component));
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Print `ENV_VAR = value` for every binding once bound.
    pub fn list_configuration(mut self, enabled: bool) -> Self {
        self.list_configuration = enabled;
        self
    }

    pub async fn bootstrap(self, root: &'a mut dyn Component, ctx: Context) -> Result<Booted<'a>> {
        let bindings = {
            let _guard = tracing::dispatcher::set_default(self.logger.dispatch());
            self.binder.bind(&mut *root)?
        };

        if self.list_configuration {
            for line in bindings.info_lines() {
                println!("{}", line);
            }
        }

        let mut registry = Registry::discover(root);
        for (name, component) in self.prelude.into_iter().rev() {
            registry = registry.prepend(name, component);
        }

        let mut lifecycle = Lifecycle::new(registry).with_logger(self.logger);
        lifecycle.set_defaults();
        let ctx = lifecycle.init(ctx).await?;

        Ok(Booted {
            lifecycle,
            ctx,
            bindings,
        })
    }
}

/// [`Startup::bootstrap`] without prelude components.
pub async fn bootstrap<'a>(
    root: &'a mut dyn Component,
    binder: Binder<'_>,
    ctx: Context,
) -> Result<Booted<'a>> {
    Startup::new(binder).bootstrap(root, ctx).await
}
