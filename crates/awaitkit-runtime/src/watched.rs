#![forbid(unsafe_code)]

//! Dependency-watching bindings.
//!
//! [`AwaitWatch`] decides *when* to produce a new promise and lets the await
//! engine handle the rest. Each evaluation receives the current dependency
//! snapshot:
//!
//! - First evaluation: the handler runs with `(deps, None)` unless the
//!   binding jumps first.
//! - Later evaluations while watching: the handler runs with
//!   `(deps, Some(previous))` when an update was forced or the comparison
//!   strategy reports a change. Otherwise the previous output is reused.
//! - While paused nothing is compared and no work starts.
//!
//! The snapshot kept for the next comparison is replaced on every
//! evaluation, whether or not work was triggered.

use std::fmt;
use std::rc::Rc;

use awaitkit_core::compare::Compare;
use awaitkit_core::error::Result;
use awaitkit_core::host::{Host, SiteId};
use awaitkit_core::promise::Promise;

use crate::binding::{AwaitBinding, AwaitBuilder, Source};
use crate::state::ResolveState;
use crate::watch::WatchHandle;

type Handler<D, T, E> = Box<dyn FnMut(&D, Option<&D>) -> Promise<T, E>>;

/// Builder returned by [`AwaitBuilder::watching`].
pub struct WatchBuilder<D, T, E, Out> {
    inner: AwaitBuilder<T, E, Out>,
    compare: Compare<D>,
    handler: Handler<D, T, E>,
}

impl<D, T, E, Out> WatchBuilder<D, T, E, Out>
where
    D: 'static,
    T: Clone + 'static,
    E: Clone + 'static,
    Out: 'static,
{
    pub(crate) fn new(
        inner: AwaitBuilder<T, E, Out>,
        compare: Compare<D>,
        handler: Handler<D, T, E>,
    ) -> Self {
        Self {
            inner,
            compare,
            handler,
        }
    }

    /// Create the binding site on `host`.
    ///
    /// # Errors
    ///
    /// [`AwaitError::MissingRender`](awaitkit_core::AwaitError::MissingRender)
    /// when no render callback was supplied.
    pub fn build(self, host: Rc<dyn Host>) -> Result<AwaitWatch<D, T, E, Out>> {
        let binding = self.inner.build_named("await-watch", host)?;
        let handle = WatchHandle::new(binding.force_update().clone(), binding.settled_once());
        Ok(AwaitWatch {
            binding,
            compare: self.compare,
            handler: self.handler,
            handle,
            last: None,
        })
    }
}

/// An await binding whose promise is produced from a dependency snapshot.
pub struct AwaitWatch<D, T, E, Out> {
    binding: AwaitBinding<T, E, Out>,
    compare: Compare<D>,
    handler: Handler<D, T, E>,
    handle: WatchHandle,
    /// `None` until the first evaluation.
    last: Option<D>,
}

impl<D, T, E, Out> fmt::Debug for AwaitWatch<D, T, E, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwaitWatch")
            .field("binding", &self.binding)
            .field("compare", &self.compare)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<D, T, E, Out> AwaitWatch<D, T, E, Out>
where
    D: 'static,
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Evaluate with the current dependency snapshot.
    ///
    /// The stored snapshot is only replaced once the handler has returned.
    pub fn evaluate(&mut self, deps: D) -> Option<Rc<Out>> {
        let site = self.site();
        let (source, forced) = match self.last.as_ref() {
            None if self.binding.config().jump_first => (Source::Reuse, false),
            None => (Source::Bind((self.handler)(&deps, None)), false),
            Some(previous) => {
                if !self.handle.is_watching() {
                    (Source::Reuse, false)
                } else {
                    let forced = self.handle.take_update();
                    if forced || self.compare.changed(&deps, previous) {
                        tracing::trace!(site = %site, forced, "dependencies trigger new work");
                        (Source::Bind((self.handler)(&deps, Some(previous))), forced)
                    } else {
                        (Source::Reuse, false)
                    }
                }
            }
        };
        self.last = Some(deps);
        self.binding.evaluate_with(source, forced)
    }

    /// The pause/resume/update handle of this binding.
    #[must_use]
    pub fn watch_handle(&self) -> WatchHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn state(&self) -> ResolveState<T, E> {
        self.binding.state()
    }

    /// The engine underneath.
    #[must_use]
    pub fn binding(&self) -> &AwaitBinding<T, E, Out> {
        &self.binding
    }

    #[inline]
    #[must_use]
    pub fn site(&self) -> SiteId {
        self.binding.site()
    }
}
