//! A layer broadcasting to a runtime-built list of layers.
//!
//! The set of outputs comes from the config, so it is only known once the
//! config file and preset are loaded. `FanOut` is what sits behind the reload
//! handle and gets swapped when that happens.

use std::ops::ControlFlow;

use tracing_core::{
    callsite, span,
    subscriber::{Interest, Subscriber},
    Event, Metadata,
};
use tracing_subscriber::layer::{Context, Layer};

type Branch<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Forwards every callback to each branch, in insertion order
pub struct FanOut<S> {
    branches: Vec<Branch<S>>,
}

impl<S> FanOut<S>
where
    S: Subscriber,
{
    pub fn empty() -> Self {
        Self { branches: vec![] }
    }

    pub fn new<T, L>(iter: T) -> Self
    where
        T: IntoIterator<Item = L>,
        L: Layer<S> + Send + Sync + 'static,
    {
        let mut this = Self::empty();
        this.extend(iter);
        this
    }

    pub fn push<L>(&mut self, layer: L) -> &mut Self
    where
        L: Layer<S> + Send + Sync + 'static,
    {
        self.branches.push(Box::new(layer));
        callsite::rebuild_interest_cache();
        self
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

impl<S, L> Extend<L> for FanOut<S>
where
    S: Subscriber,
    L: Layer<S> + Send + Sync + 'static,
{
    fn extend<T>(&mut self, iter: T)
    where
        T: IntoIterator<Item = L>,
    {
        self.branches
            .extend(iter.into_iter().map(|l| -> Branch<S> { Box::new(l) }));
        callsite::rebuild_interest_cache();
    }
}

impl<S> Layer<S> for FanOut<S>
where
    S: Subscriber,
{
    fn register_callsite(&self, metadata: &'static Metadata<'static>) -> Interest {
        // `never` and `sometimes` are final: a later branch can not widen them
        let interest = self.branches.iter().try_fold(Interest::always(), |acc, branch| {
            if acc.is_always() {
                ControlFlow::Continue(branch.register_callsite(metadata))
            } else {
                ControlFlow::Break(acc)
            }
        });
        match interest {
            ControlFlow::Continue(i) | ControlFlow::Break(i) => i,
        }
    }

    fn enabled(&self, metadata: &Metadata<'_>, ctx: Context<'_, S>) -> bool {
        self.branches.iter().all(|b| b.enabled(metadata, ctx.clone()))
    }

    fn new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        self.branches.iter().for_each(|b| b.new_span(attrs, id, ctx.clone()));
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        self.branches.iter().for_each(|b| b.on_record(id, values, ctx.clone()));
    }

    fn on_follows_from(&self, id: &span::Id, follows: &span::Id, ctx: Context<'_, S>) {
        self.branches
            .iter()
            .for_each(|b| b.on_follows_from(id, follows, ctx.clone()));
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        self.branches.iter().for_each(|b| b.on_event(event, ctx.clone()));
    }

    fn on_enter(&self, id: &span::Id, ctx: Context<'_, S>) {
        self.branches.iter().for_each(|b| b.on_enter(id, ctx.clone()));
    }

    fn on_exit(&self, id: &span::Id, ctx: Context<'_, S>) {
        self.branches.iter().for_each(|b| b.on_exit(id, ctx.clone()));
    }

    fn on_close(&self, id: span::Id, ctx: Context<'_, S>) {
        self.branches.iter().for_each(|b| b.on_close(id.clone(), ctx.clone()));
    }

    fn on_id_change(&self, old: &span::Id, new: &span::Id, ctx: Context<'_, S>) {
        self.branches
            .iter()
            .for_each(|b| b.on_id_change(old, new, ctx.clone()));
    }
}
