//! Component registry: the ordered set of lifecycle participants.
//!
//! # Responsibilities
//! - Walk a component tree once and record every capable component
//! - Preserve declaration order (the dependency signal for `init` and `run`)
//!
//! # Design Decisions
//! - A component is capable if it implements `Init`, `Runner`, `Server` or
//!   `ContextInjector`
//! - Embedded children are transparent: a capable one is recorded under the
//!   empty name, otherwise its own children are walked in place
//! - Named children stop the walk: recorded if capable, never descended into
//! - The root is not recorded; commands declare their runner as a field

use crate::component::{Capabilities, Component, Walker};
use crate::config::{FieldOptions, FieldValue};

/// One recorded component and the name it was declared under.
pub struct Singleton<'a> {
    pub name: String,
    pub component: &'a mut dyn Component,
}

impl std::fmt::Debug for Singleton<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Singleton").field("name", &self.name).finish()
    }
}

/// Ordered lifecycle participants. Fixed once discovered.
#[derive(Debug, Default)]
pub struct Registry<'a> {
    singletons: Vec<Singleton<'a>>,
}

impl<'a> Registry<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every capable component reachable from `root`.
    pub fn discover(root: &'a mut dyn Component) -> Self {
        let mut walker = Discovery {
            singletons: Vec::new(),
        };
        root.walk(&mut walker);

        let registry = Self {
            singletons: walker.singletons,
        };
        tracing::debug!(components = ?registry.names(), "Components discovered");
        registry
    }

    /// Insert a component ahead of everything discovered.
    pub fn prepend(mut self, name: impl Into<String>, component: &'a mut dyn Component) -> Self {
        self.singletons.insert(
            0,
            Singleton {
                name: name.into(),
                component,
            },
        );
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.singletons.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.singletons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.singletons.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Singleton<'a>> {
        self.singletons.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Singleton<'a>> {
        self.singletons.iter_mut()
    }
}

struct Discovery<'a> {
    singletons: Vec<Singleton<'a>>,
}

impl<'a> Discovery<'a> {
    fn record(&mut self, name: &str, component: &'a mut dyn Component) {
        self.singletons.push(Singleton {
            name: name.to_string(),
            component,
        });
    }
}

impl<'a> Walker<'a> for Discovery<'a> {
    fn field(&mut self, _name: &str, _value: &'a mut dyn FieldValue, _options: FieldOptions) {}

    fn arg(&mut self, _name: &str, _value: &'a mut dyn FieldValue) {}

    fn nested(&mut self, name: &str, child: &'a mut dyn Component) {
        if Capabilities::of(&mut *child).participates() {
            self.record(name, child);
        }
    }

    fn embed(&mut self, child: &'a mut dyn Component) {
        if Capabilities::of(&mut *child).participates() {
            self.record("", child);
        } else {
            child.walk(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Init, Runner};
    use crate::context::Context;
    use crate::error::BoxError;
    use async_trait::async_trait;

    #[derive(Default)]
    struct Db {
        url: String,
    }

    #[async_trait]
    impl Init for Db {
        async fn init(&mut self, _ctx: Context) -> Result<(), BoxError> {
            Ok(())
        }
    }

    impl Component for Db {
        fn walk<'a>(&'a mut self, w: &mut dyn Walker<'a>) {
            w.field("url", &mut self.url, FieldOptions::new().optional());
        }

        fn as_init(&mut self) -> Option<&mut dyn Init> {
            Some(self)
        }
    }

    #[derive(Default)]
    struct Job;

    #[async_trait]
    impl Runner for Job {
        async fn run(&mut self, _ctx: Context) -> Result<(), BoxError> {
            Ok(())
        }
    }

    impl Component for Job {
        fn as_runner(&mut self) -> Option<&mut dyn Runner> {
            Some(self)
        }
    }

    /// Plain container of capable components.
    #[derive(Default)]
    struct Group {
        cache: Db,
        inner: Db,
    }

    impl Component for Group {
        fn walk<'a>(&'a mut self, w: &mut dyn Walker<'a>) {
            w.nested("cache", &mut self.cache);
            w.nested("inner", &mut self.inner);
        }
    }

    #[derive(Default)]
    struct Root {
        shared: Group,
        hidden: Group,
        db: Db,
        mixin: Db,
        job: Job,
        level: String,
    }

    impl Component for Root {
        fn walk<'a>(&'a mut self, w: &mut dyn Walker<'a>) {
            w.embed(&mut self.shared);
            w.nested("hidden", &mut self.hidden);
            w.nested("db", &mut self.db);
            w.embed(&mut self.mixin);
            w.field("level", &mut self.level, FieldOptions::new().optional());
            w.nested("job", &mut self.job);
        }
    }

    #[test]
    fn test_discover_preserves_declaration_order() {
        let mut root = Root::default();
        let registry = Registry::discover(&mut root);

        assert_eq!(registry.names(), vec!["cache", "inner", "db", "", "job"]);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_prepend_goes_first() {
        let mut root = Root::default();
        let mut first = Job;
        let registry = Registry::discover(&mut root).prepend("info", &mut first);

        assert_eq!(registry.names()[0], "info");
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_incapable_tree_is_empty() {
        let mut group = Group::default();
        let mut root = Db::default();
        assert!(Registry::discover(&mut root).is_empty());
        assert_eq!(Registry::discover(&mut group).len(), 2);
    }
}
