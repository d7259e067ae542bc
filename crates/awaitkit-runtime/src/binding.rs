#![forbid(unsafe_code)]

//! The await engine: one promise-producing expression bound to one rendered
//! output.
//!
//! # Design
//!
//! [`AwaitBinding`] owns the per-site state record: the [`ResolveState`], the
//! promise currently bound, a cancellation registry keyed by promise
//! identity, and the outstanding display-delay timer. Each evaluation takes a
//! [`Source`]:
//!
//! - `Bind(p)` with the promise already bound is a no-op and yields the cached
//!   output.
//! - `Bind(p)` with a new promise supersedes the old one: its cancellation
//!   flag is raised, its timer is cancelled, the state turns pending, and the
//!   new promise is tracked. Once it settles, a single timer waits out the
//!   display delay before the outcome is applied and the host is asked to
//!   re-evaluate.
//! - `Reuse` keeps everything as is.
//! - `Suppress` renders nothing and leaves the binding untouched.
//!
//! Settlement continuations and timers hold only weak references to the
//! engine, so a binding that is dropped stops reacting immediately.
//!
//! # Invariants
//!
//! 1. Settlement handling for a superseded promise never mutates state or
//!    invokes callbacks (its flag is checked both at settlement and when the
//!    timer fires).
//! 2. At most one display-delay timer is outstanding per binding.
//! 3. The render callback runs only when the state version changed since the
//!    last produced output; otherwise the same `Rc` is returned.
//! 4. No engine borrow is held while user callbacks run.
//!
//! # Failure Modes
//!
//! - **Promise never settles**: the binding stays pending; nothing leaks once
//!   the binding and the promise's producers are dropped.
//! - **Callback panics**: the state update has already been committed; the
//!   host re-evaluation request for that settlement is lost.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use awaitkit_core::compare::Compare;
use awaitkit_core::error::{AwaitError, Result};
use awaitkit_core::host::{ForceUpdate, Host, SiteId, TimerId};
use awaitkit_core::promise::{Outcome, Promise, PromiseId};
use awaitkit_core::track;
use web_time::Duration;

use crate::config::AwaitConfig;
use crate::state::{ResolveState, Status};
use crate::watched::WatchBuilder;

/// What an evaluation feeds the engine.
pub enum Source<T, E> {
    /// No new work: keep the current binding and output.
    Reuse,
    /// Render nothing this pass.
    Suppress,
    /// Bind this promise (a no-op if it is already bound).
    Bind(Promise<T, E>),
}

impl<T, E> Source<T, E> {
    #[inline]
    #[must_use]
    pub fn is_suppress(&self) -> bool {
        matches!(self, Self::Suppress)
    }

    /// The promise carried by `Bind`.
    #[must_use]
    pub fn promise(&self) -> Option<&Promise<T, E>> {
        match self {
            Self::Bind(promise) => Some(promise),
            Self::Reuse | Self::Suppress => None,
        }
    }
}

impl<T, E> Clone for Source<T, E> {
    fn clone(&self) -> Self {
        match self {
            Self::Reuse => Self::Reuse,
            Self::Suppress => Self::Suppress,
            Self::Bind(promise) => Self::Bind(promise.clone()),
        }
    }
}

impl<T, E> fmt::Debug for Source<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reuse => f.write_str("Reuse"),
            Self::Suppress => f.write_str("Suppress"),
            Self::Bind(promise) => f.debug_tuple("Bind").field(promise).finish(),
        }
    }
}

impl<T, E> From<Promise<T, E>> for Source<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Self::Bind(promise)
    }
}

// ─── Callbacks ───────────────────────────────────────────────────────────────

type FirstHook = Rc<dyn Fn(bool)>;
type ErrorHook<E> = Rc<dyn Fn(&E)>;
pub(crate) type RenderFn<T, E, Out> = Box<dyn Fn(&ResolveState<T, E>) -> Out>;

pub(crate) struct Hooks<E> {
    on_start: Option<FirstHook>,
    on_end: Option<FirstHook>,
    on_error: Option<ErrorHook<E>>,
    on_final: Option<FirstHook>,
}

impl<E> Default for Hooks<E> {
    fn default() -> Self {
        Self {
            on_start: None,
            on_end: None,
            on_error: None,
            on_final: None,
        }
    }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Collects the settings of an await binding.
///
/// ```
/// use awaitkit_core::lab::LabHost;
/// use awaitkit_core::promise::Promise;
/// use awaitkit_runtime::binding::{AwaitBuilder, Source};
/// use awaitkit_runtime::state::Status;
/// use web_time::Duration;
///
/// let lab = LabHost::new();
/// let binding = AwaitBuilder::<u32, String, Status>::new()
///     .delay(Duration::ZERO)
///     .render(|state| state.status)
///     .build(lab.handle())
///     .unwrap();
///
/// let out = binding.evaluate(Source::Bind(Promise::resolved(42)));
/// assert_eq!(out.as_deref(), Some(&Status::Pending));
/// lab.tick();
/// assert_eq!(binding.state().value, Some(42));
/// ```
pub struct AwaitBuilder<T, E, Out> {
    init: Option<T>,
    config: AwaitConfig,
    hooks: Hooks<E>,
    render: Option<RenderFn<T, E, Out>>,
}

impl<T, E, Out> Default for AwaitBuilder<T, E, Out> {
    fn default() -> Self {
        Self {
            init: None,
            config: AwaitConfig::default(),
            hooks: Hooks::default(),
            render: None,
        }
    }
}

impl<T, E, Out> AwaitBuilder<T, E, Out>
where
    T: Clone + 'static,
    E: Clone + 'static,
    Out: 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value shown before the first settlement (and the jump-first seed).
    #[must_use]
    pub fn init(mut self, value: T) -> Self {
        self.init = Some(value);
        self
    }

    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    #[must_use]
    pub fn jump_first(mut self, jump_first: bool) -> Self {
        self.config.jump_first = jump_first;
        self
    }

    #[must_use]
    pub fn config(mut self, config: AwaitConfig) -> Self {
        self.config = config;
        self
    }

    /// Called with `first` whenever a new promise is bound.
    #[must_use]
    pub fn on_start(mut self, hook: impl Fn(bool) + 'static) -> Self {
        self.hooks.on_start = Some(Rc::new(hook));
        self
    }

    /// Called with `first` after a fulfillment is applied.
    #[must_use]
    pub fn on_end(mut self, hook: impl Fn(bool) + 'static) -> Self {
        self.hooks.on_end = Some(Rc::new(hook));
        self
    }

    /// Called with the reason after a rejection is applied.
    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&E) + 'static) -> Self {
        self.hooks.on_error = Some(Rc::new(hook));
        self
    }

    /// Called with `first` after either outcome, following `on_end` or
    /// `on_error`.
    #[must_use]
    pub fn on_final(mut self, hook: impl Fn(bool) + 'static) -> Self {
        self.hooks.on_final = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn render(mut self, render: impl Fn(&ResolveState<T, E>) -> Out + 'static) -> Self {
        self.render = Some(Box::new(render));
        self
    }

    /// Turn this into a dependency-watching binding.
    #[must_use]
    pub fn watching<D, H>(self, compare: Compare<D>, handler: H) -> WatchBuilder<D, T, E, Out>
    where
        D: 'static,
        H: FnMut(&D, Option<&D>) -> Promise<T, E> + 'static,
    {
        WatchBuilder::new(self, compare, Box::new(handler))
    }

    /// Create the binding site on `host`.
    ///
    /// # Errors
    ///
    /// [`AwaitError::MissingRender`] when no render callback was supplied.
    pub fn build(self, host: Rc<dyn Host>) -> Result<AwaitBinding<T, E, Out>> {
        self.build_named("await", host)
    }

    pub(crate) fn build_named(
        self,
        binding: &'static str,
        host: Rc<dyn Host>,
    ) -> Result<AwaitBinding<T, E, Out>> {
        let render = self
            .render
            .ok_or(AwaitError::MissingRender { binding })?;
        let site = SiteId::next();
        tracing::debug!(
            %site,
            binding,
            delay = ?self.config.delay,
            jump_first = self.config.jump_first,
            "binding site created"
        );
        let core = Rc::new(Core {
            engine: RefCell::new(Engine {
                state: ResolveState::initial(self.init),
                version: 0,
                evaluated: false,
                bound: None,
                cancel: AHashMap::new(),
                timer: None,
            }),
            hooks: self.hooks,
            config: self.config,
            force: ForceUpdate::new(host, site),
            settled_once: Rc::new(Cell::new(false)),
        });
        Ok(AwaitBinding {
            core,
            render,
            output: RefCell::new(None),
        })
    }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

struct Engine<T, E> {
    state: ResolveState<T, E>,
    /// Bumped on every state change; keys the output cache.
    version: u64,
    evaluated: bool,
    bound: Option<Promise<T, E>>,
    /// Raised flags mean "ignore this promise's settlement".
    cancel: AHashMap<PromiseId, Rc<Cell<bool>>>,
    timer: Option<TimerId>,
}

struct Core<T, E> {
    engine: RefCell<Engine<T, E>>,
    hooks: Hooks<E>,
    config: AwaitConfig,
    force: ForceUpdate,
    /// Shared with the watch handle: true once any settlement (or the
    /// jump-first seed) has been applied.
    settled_once: Rc<Cell<bool>>,
}

impl<T: Clone + 'static, E: Clone + 'static> Core<T, E> {
    fn site(&self) -> SiteId {
        self.force.site()
    }

    fn seed(&self) {
        let mut engine = self.engine.borrow_mut();
        engine.state.status = Status::Resolved;
        engine.state.first = false;
        engine.version += 1;
        self.settled_once.set(true);
        tracing::debug!(site = %self.site(), "jump-first seed applied");
    }

    fn bind(self: &Rc<Self>, promise: Promise<T, E>, force: bool) {
        let (flag, first) = {
            let mut engine = self.engine.borrow_mut();
            let same = engine
                .bound
                .as_ref()
                .is_some_and(|bound| bound.ptr_eq(&promise));
            if same && !force {
                return;
            }
            for (stale, flag) in engine.cancel.drain() {
                flag.set(true);
                tracing::trace!(site = %self.site(), promise = %stale, "superseded");
            }
            if let Some(timer) = engine.timer.take() {
                self.force.host().cancel_timer(timer);
            }
            engine.state.status = Status::Pending;
            engine.version += 1;
            engine.bound = Some(promise.clone());
            let flag = Rc::new(Cell::new(false));
            engine.cancel.insert(promise.id(), Rc::clone(&flag));
            (flag, engine.state.first)
        };

        tracing::debug!(site = %self.site(), promise = %promise.id(), first, "binding promise");
        if let Some(on_start) = &self.hooks.on_start {
            on_start(first);
        }

        let weak = Rc::downgrade(self);
        track::track(&promise).on_settle(move |_| {
            if let Some(core) = weak.upgrade() {
                core.settled(flag);
            }
        });
    }

    /// The bound promise settled: wait out the display delay.
    fn settled(self: &Rc<Self>, flag: Rc<Cell<bool>>) {
        if flag.get() {
            tracing::trace!(site = %self.site(), "stale settlement ignored");
            return;
        }
        let weak: Weak<Self> = Rc::downgrade(self);
        let timer = self.force.host().schedule_after_delay(
            self.config.delay,
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.complete(&flag);
                }
            }),
        );
        self.engine.borrow_mut().timer = Some(timer);
    }

    /// The display delay elapsed: apply the tracked outcome.
    fn complete(&self, flag: &Cell<bool>) {
        if flag.get() {
            tracing::trace!(site = %self.site(), "stale settlement ignored after delay");
            return;
        }
        let (first, outcome) = {
            let mut engine = self.engine.borrow_mut();
            engine.timer = None;
            let Some(bound) = engine.bound.clone() else {
                return;
            };
            let Some(outcome) = track::settled_outcome(&bound) else {
                return;
            };
            engine.cancel.remove(&bound.id());
            let first = engine.state.first;
            match &outcome {
                Outcome::Fulfilled(value) => {
                    engine.state.status = Status::Resolved;
                    engine.state.value = Some(value.clone());
                    engine.state.error = None;
                }
                Outcome::Rejected(error) => {
                    engine.state.status = Status::Rejected;
                    engine.state.error = Some(error.clone());
                }
            }
            engine.state.first = false;
            engine.version += 1;
            (first, outcome)
        };
        self.settled_once.set(true);

        let status = if outcome.is_fulfilled() {
            Status::Resolved
        } else {
            Status::Rejected
        };
        tracing::debug!(site = %self.site(), %status, first, "settlement applied");

        match &outcome {
            Outcome::Fulfilled(_) => {
                if let Some(on_end) = &self.hooks.on_end {
                    on_end(first);
                }
            }
            Outcome::Rejected(error) => {
                if let Some(on_error) = &self.hooks.on_error {
                    on_error(error);
                }
            }
        }
        if let Some(on_final) = &self.hooks.on_final {
            on_final(first);
        }
        self.force.request();
    }
}

impl<T, E> Drop for Core<T, E> {
    fn drop(&mut self) {
        let engine = self.engine.get_mut();
        for flag in engine.cancel.values() {
            flag.set(true);
        }
        if let Some(timer) = engine.timer.take() {
            self.force.host().cancel_timer(timer);
        }
    }
}

// ─── Binding ─────────────────────────────────────────────────────────────────

/// One await binding site.
pub struct AwaitBinding<T, E, Out> {
    core: Rc<Core<T, E>>,
    render: RenderFn<T, E, Out>,
    output: RefCell<Option<(u64, Rc<Out>)>>,
}

impl<T, E, Out> fmt::Debug for AwaitBinding<T, E, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let engine = self.core.engine.try_borrow();
        let mut dbg = f.debug_struct("AwaitBinding");
        dbg.field("site", &self.core.force.site());
        if let Ok(engine) = engine {
            dbg.field("status", &engine.state.status)
                .field("first", &engine.state.first)
                .field("version", &engine.version);
        }
        dbg.finish()
    }
}

impl<T: Clone + 'static, E: Clone + 'static, Out> AwaitBinding<T, E, Out> {
    /// Evaluate the site with `source`.
    ///
    /// Returns `None` when the source is [`Source::Suppress`].
    pub fn evaluate(&self, source: Source<T, E>) -> Option<Rc<Out>> {
        self.evaluate_with(source, false)
    }

    /// Like [`evaluate`](Self::evaluate), but `force` rebinds even when the
    /// promise is the one already bound.
    pub(crate) fn evaluate_with(&self, source: Source<T, E>, force: bool) -> Option<Rc<Out>> {
        let first_evaluation = {
            let mut engine = self.core.engine.borrow_mut();
            !std::mem::replace(&mut engine.evaluated, true)
        };
        if first_evaluation && self.core.config.jump_first {
            self.core.seed();
            // The seeded promise counts as bound without being awaited.
            if let Source::Bind(promise) = &source {
                self.core.engine.borrow_mut().bound = Some(promise.clone());
            }
            return self.output_unless(source.is_suppress());
        }

        match &source {
            Source::Suppress => return None,
            Source::Reuse => {}
            Source::Bind(promise) => self.core.bind(promise.clone(), force),
        }
        Some(self.output())
    }

    fn output_unless(&self, suppress: bool) -> Option<Rc<Out>> {
        (!suppress).then(|| self.output())
    }

    fn output(&self) -> Rc<Out> {
        let (version, state) = {
            let engine = self.core.engine.borrow();
            if let Some((cached, out)) = &*self.output.borrow()
                && *cached == engine.version
            {
                return Rc::clone(out);
            }
            (engine.version, engine.state.clone())
        };
        let out = Rc::new((self.render)(&state));
        *self.output.borrow_mut() = Some((version, Rc::clone(&out)));
        out
    }

    /// Snapshot of the current resolve state.
    #[must_use]
    pub fn state(&self) -> ResolveState<T, E> {
        self.core.engine.borrow().state.clone()
    }

    /// The promise currently bound, if any.
    #[must_use]
    pub fn bound(&self) -> Option<Promise<T, E>> {
        self.core.engine.borrow().bound.clone()
    }
}

impl<T, E, Out> AwaitBinding<T, E, Out> {
    #[inline]
    #[must_use]
    pub fn site(&self) -> SiteId {
        self.core.force.site()
    }

    /// Monotonic counter bumped on every state change.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.core.engine.borrow().version
    }

    #[must_use]
    pub fn config(&self) -> AwaitConfig {
        self.core.config
    }

    /// Whether a display-delay timer is outstanding.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.core.engine.borrow().timer.is_some()
    }

    pub(crate) fn force_update(&self) -> &ForceUpdate {
        &self.core.force
    }

    pub(crate) fn settled_once(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.core.settled_once)
    }
}
