//! Context injector composition.
//!
//! Any component may contribute a function that enriches a [`Context`].
//! A chain folds its injectors left-to-right; each one sees the context
//! produced by its predecessor and never anything declared after it.

use std::fmt;
use std::sync::Arc;

use super::Context;

/// Pure context enrichment.
pub trait ContextInjector: Send + Sync {
    fn inject_context(&self, ctx: Context) -> Context;
}

impl<T: ContextInjector + ?Sized> ContextInjector for Arc<T> {
    fn inject_context(&self, ctx: Context) -> Context {
        (**self).inject_context(ctx)
    }
}

/// Ordered, append-only sequence of injectors.
///
/// Empty chains are the identity injector.
#[derive(Clone, Default)]
pub struct InjectorChain {
    injectors: Arc<Vec<Arc<dyn ContextInjector>>>,
}

impl InjectorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new chain with `injector` appended. The receiver is unchanged.
    pub fn push(&self, injector: Arc<dyn ContextInjector>) -> Self {
        let mut injectors = (*self.injectors).clone();
        injectors.push(injector);
        Self {
            injectors: Arc::new(injectors),
        }
    }

    pub fn len(&self) -> usize {
        self.injectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.injectors.is_empty()
    }
}

impl ContextInjector for InjectorChain {
    fn inject_context(&self, ctx: Context) -> Context {
        self.injectors
            .iter()
            .fold(ctx, |ctx, injector| injector.inject_context(ctx))
    }
}

impl fmt::Debug for InjectorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectorChain")
            .field("len", &self.injectors.len())
            .finish()
    }
}

/// Fold `injectors` into one chain, preserving order.
pub fn compose<I>(injectors: I) -> InjectorChain
where
    I: IntoIterator<Item = Arc<dyn ContextInjector>>,
{
    InjectorChain {
        injectors: Arc::new(injectors.into_iter().collect()),
    }
}

/// The no-op injector.
pub fn identity() -> InjectorChain {
    InjectorChain::default()
}

/// Injector built from a function and a captured input.
pub struct InjectFn<T, F> {
    input: T,
    inject: F,
}

impl<T, F> ContextInjector for InjectFn<T, F>
where
    T: Send + Sync,
    F: Fn(Context, &T) -> Context + Send + Sync,
{
    fn inject_context(&self, ctx: Context) -> Context {
        (self.inject)(ctx, &self.input)
    }
}

pub fn inject_fn<T, F>(inject: F, input: T) -> InjectFn<T, F>
where
    T: Send + Sync,
    F: Fn(Context, &T) -> Context + Send + Sync,
{
    InjectFn { input, inject }
}

/// Store `chain` in the context so later code can rebuild the same enrichment.
pub fn with_injector(ctx: &Context, chain: InjectorChain) -> Context {
    ctx.with_value(chain)
}

/// The chain stored in `ctx`, or the identity chain when none was stored.
pub fn injector_from(ctx: &Context) -> InjectorChain {
    ctx.value::<InjectorChain>()
        .map(|chain| (*chain).clone())
        .unwrap_or_default()
}

/// A fresh root context enriched by the chain stored in `ctx`.
///
/// The result is never canceled with `ctx`; detached work uses it.
pub fn background(ctx: &Context) -> Context {
    let chain = injector_from(ctx);
    let base = with_injector(&Context::background(), chain.clone());
    chain.inject_context(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Trail(Vec<&'static str>);

    fn step(label: &'static str) -> Arc<dyn ContextInjector> {
        Arc::new(inject_fn(
            |ctx: Context, label: &&'static str| {
                let mut trail = ctx
                    .value::<Trail>()
                    .map(|t| (*t).clone())
                    .unwrap_or(Trail(Vec::new()));
                trail.0.push(label);
                ctx.with_value(trail)
            },
            label,
        ))
    }

    #[test]
    fn test_compose_folds_left_to_right() {
        let chain = compose([step("a"), step("b"), step("c")]);
        let ctx = chain.inject_context(Context::background());
        assert_eq!(ctx.value::<Trail>().unwrap().0, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_identity_is_safe_default() {
        let ctx = Context::background();
        let chain = injector_from(&ctx);
        assert!(chain.is_empty());

        let out = identity().inject_context(ctx.with_value(7u32));
        assert_eq!(*out.value::<u32>().unwrap(), 7);
    }

    #[test]
    fn test_replay_against_same_base_is_idempotent() {
        let chain = compose([step("a"), step("b")]);
        let base = Context::background();

        let first = chain.inject_context(base.clone());
        let second = chain.inject_context(base.clone());

        assert_eq!(*first.value::<Trail>().unwrap(), *second.value::<Trail>().unwrap());
        assert!(base.value::<Trail>().is_none());
    }

    #[test]
    fn test_push_leaves_original_chain_untouched() {
        let chain = compose([step("a")]);
        let longer = chain.push(step("b"));
        assert_eq!(chain.len(), 1);
        assert_eq!(longer.len(), 2);
    }

    #[test]
    fn test_background_rebuilds_from_stored_chain() {
        let chain = compose([step("x")]);
        let (ctx, token) = with_injector(&Context::background(), chain).with_cancel();
        token.cancel();

        let bg = background(&ctx);
        assert!(!bg.is_done());
        assert_eq!(bg.value::<Trail>().unwrap().0, vec!["x"]);
        assert_eq!(injector_from(&bg).len(), 1);
    }
}
