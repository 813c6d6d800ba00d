//! Component capabilities and the self-registration walk.
//!
//! # Responsibilities
//! - Define the capability contracts a component may opt into
//! - Expose each capability through an `as_*` accessor on [`Component`]
//! - Describe the configuration tree through [`Walker`]
//!
//! # Design Decisions
//! - Capabilities are queried, never assumed: every accessor returns `None`
//!   unless the component overrides it
//! - `init`/`run`/`set_defaults` take `&mut self` (sequential phases),
//!   `serve`/`shutdown` take `&self` so both can be in flight at once
//! - The tree is described by the component itself (`walk`), in declaration
//!   order; embedded children merge into the parent's scope, named children
//!   open a new one

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{FieldOptions, FieldValue};
use crate::context::{Context, ContextInjector};
use crate::error::BoxError;

/// Registry name of the component whose `init` is running.
///
/// Only present on the context handed to [`Init::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentInstance(pub String);

/// Fill zero values. Must be idempotent.
pub trait Defaulter {
    fn set_defaults(&mut self);
}

/// One-time setup.
#[async_trait]
pub trait Init: Send {
    async fn init(&mut self, ctx: Context) -> Result<(), BoxError>;
}

/// Run-to-completion task, invoked once, in registry order.
#[async_trait]
pub trait Runner: Send {
    async fn run(&mut self, ctx: Context) -> Result<(), BoxError>;
}

/// Graceful stop.
#[async_trait]
pub trait Shutdown: Sync {
    async fn shutdown(&self, ctx: Context) -> Result<(), BoxError>;
}

/// Long-running service. Paired with [`Shutdown`].
#[async_trait]
pub trait Server: Shutdown {
    async fn serve(&self, ctx: Context) -> Result<(), BoxError>;
}

/// Companion task started alongside a service's `serve`.
#[async_trait]
pub trait PostServeRunner: Sync {
    async fn post_serve_run(&self, ctx: Context) -> Result<(), BoxError>;
}

/// Runtime opt-out without deregistration.
pub trait Disable: Sync {
    fn disabled(&self, ctx: &Context) -> bool;
}

/// A value participating in the configuration tree and/or the lifecycle.
pub trait Component: Send + Sync {
    /// Declare fields, arguments and children in declaration order.
    fn walk<'a>(&'a mut self, walker: &mut dyn Walker<'a>) {
        let _ = walker;
    }

    /// Description prepended to every field declared by this component.
    fn doc(&self) -> Option<&str> {
        None
    }

    fn as_defaulter(&mut self) -> Option<&mut dyn Defaulter> {
        None
    }

    fn as_init(&mut self) -> Option<&mut dyn Init> {
        None
    }

    fn as_runner(&mut self) -> Option<&mut dyn Runner> {
        None
    }

    fn as_server(&self) -> Option<&dyn Server> {
        None
    }

    fn as_shutdown(&self) -> Option<&dyn Shutdown> {
        None
    }

    fn as_post_serve(&self) -> Option<&dyn PostServeRunner> {
        None
    }

    fn as_disable(&self) -> Option<&dyn Disable> {
        None
    }

    /// Context contribution of this component.
    ///
    /// Taken right after the component's own `init`, so the injector may
    /// capture state that `init` produced.
    fn as_injector(&self) -> Option<Arc<dyn ContextInjector>> {
        None
    }
}

/// Capability flags of one component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub defaulter: bool,
    pub init: bool,
    pub runner: bool,
    pub server: bool,
    pub shutdown: bool,
    pub post_serve: bool,
    pub disable: bool,
    pub injector: bool,
}

impl Capabilities {
    pub fn of(component: &mut dyn Component) -> Self {
        Self {
            defaulter: component.as_defaulter().is_some(),
            init: component.as_init().is_some(),
            runner: component.as_runner().is_some(),
            server: component.as_server().is_some(),
            shutdown: component.as_shutdown().is_some() || component.as_server().is_some(),
            post_serve: component.as_post_serve().is_some(),
            disable: component.as_disable().is_some(),
            injector: component.as_injector().is_some(),
        }
    }

    /// Whether the registry records a component with these capabilities.
    pub fn participates(&self) -> bool {
        self.init || self.runner || self.server || self.injector
    }
}

/// Visitor over a component's declared fields and children.
///
/// Implemented by the field binder (resolves values) and by the registry
/// (collects lifecycle participants).
pub trait Walker<'a> {
    /// A leaf configuration field.
    fn field(&mut self, name: &str, value: &'a mut dyn FieldValue, options: FieldOptions);

    /// A positional argument. A list-typed value consumes the remaining arguments.
    fn arg(&mut self, name: &str, value: &'a mut dyn FieldValue);

    /// A named child: opens a new naming scope.
    fn nested(&mut self, name: &str, child: &'a mut dyn Component);

    /// An embedded child: merges into the current naming scope.
    fn embed(&mut self, child: &'a mut dyn Component);
}
