#![forbid(unsafe_code)]

//! Settle-once promises with identity.
//!
//! A [`Promise<T, E>`] is a cheaply cloneable handle to one shared cell that
//! starts pending and settles exactly once, either fulfilled with a `T` or
//! rejected with an `E`. Clones share the cell, so two handles are "the same
//! promise" iff [`Promise::ptr_eq`] holds; every cache in awaitkit keys on
//! that identity (via [`PromiseId`]), never on the settled value.
//!
//! # Observation
//!
//! Interested parties attach reactions with [`Promise::on_settle`]. Reactions
//! run synchronously at settlement, in registration order, each receiving a
//! reference to the outcome. Attaching to an already-settled promise runs the
//! reaction immediately. A promise is also a [`Future`], so it can be
//! `.await`ed on any executor.
//!
//! # Invariants
//!
//! 1. A promise settles at most once; later settle attempts are ignored.
//! 2. Reactions fire exactly once each, in registration order.
//! 3. [`PromiseId`]s are unique for the lifetime of the process.
//! 4. No borrow of the cell is held while user reactions run, so reactions may
//!    freely attach further reactions or settle other promises.
//!
//! # Failure Modes
//!
//! - **Resolver dropped unsettled**: the promise stays pending forever and its
//!   reactions are dropped with it. Nothing panics.
//! - **Reaction panics**: later reactions registered on the same promise do
//!   not run; the promise itself is already settled.

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};

use futures::task::{LocalSpawn, LocalSpawnExt};
use smallvec::SmallVec;

use crate::error::AwaitError;
use crate::track::TrackSlot;

// ─── Identity ────────────────────────────────────────────────────────────────

static NEXT_PROMISE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a promise cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PromiseId(u64);

impl PromiseId {
    fn next() -> Self {
        Self(NEXT_PROMISE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "promise#{}", self.0)
    }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// How a promise settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome<T, E> {
    /// Settled successfully with a value.
    Fulfilled(T),
    /// Settled with a rejection reason.
    Rejected(E),
}

impl<T, E> Outcome<T, E> {
    #[inline]
    #[must_use]
    pub const fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    #[inline]
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The fulfilled value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Fulfilled(value) => Some(value),
            Self::Rejected(_) => None,
        }
    }

    /// The rejection reason, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&E> {
        match self {
            Self::Fulfilled(_) => None,
            Self::Rejected(error) => Some(error),
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Fulfilled(value) => Ok(value),
            Self::Rejected(error) => Err(error),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Fulfilled(value),
            Err(error) => Self::Rejected(error),
        }
    }
}

// ─── Shared cell ─────────────────────────────────────────────────────────────

type Reaction<T, E> = Box<dyn FnOnce(&Outcome<T, E>)>;

enum State<T, E> {
    Pending {
        reactions: SmallVec<[Reaction<T, E>; 2]>,
        wakers: SmallVec<[Waker; 1]>,
    },
    Settled(Outcome<T, E>),
}

impl<T, E> State<T, E> {
    fn pending() -> Self {
        Self::Pending {
            reactions: SmallVec::new(),
            wakers: SmallVec::new(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::Settled(Outcome::Fulfilled(_)) => "fulfilled",
            Self::Settled(Outcome::Rejected(_)) => "rejected",
        }
    }
}

struct PromiseCell<T, E> {
    id: PromiseId,
    state: RefCell<State<T, E>>,
    /// Lifecycle-tracking metadata, private to [`crate::track`].
    track: TrackSlot<T, E>,
}

impl<T, E> PromiseCell<T, E> {
    fn new(state: State<T, E>) -> Rc<Self> {
        Rc::new(Self {
            id: PromiseId::next(),
            state: RefCell::new(state),
            track: TrackSlot::default(),
        })
    }
}

fn settle_cell<T: Clone, E: Clone>(cell: &PromiseCell<T, E>, outcome: Outcome<T, E>) {
    let (reactions, wakers) = {
        let mut state = cell.state.borrow_mut();
        if matches!(*state, State::Settled(_)) {
            return;
        }
        let State::Pending { reactions, wakers } =
            std::mem::replace(&mut *state, State::Settled(outcome.clone()))
        else {
            return;
        };
        (reactions, wakers)
    };
    for waker in wakers {
        waker.wake();
    }
    for reaction in reactions {
        reaction(&outcome);
    }
}

// ─── Promise ─────────────────────────────────────────────────────────────────

/// Handle to a settle-once asynchronous result.
///
/// Cloning creates a new handle to the **same** promise.
pub struct Promise<T, E = Infallible> {
    cell: Rc<PromiseCell<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.cell.state.try_borrow().map_or("busy", |s| s.name());
        f.debug_struct("Promise")
            .field("id", &self.cell.id)
            .field("state", &state)
            .finish()
    }
}

impl<T, E> Promise<T, E> {
    /// Identity of this promise.
    #[inline]
    #[must_use]
    pub fn id(&self) -> PromiseId {
        self.cell.id
    }

    /// Whether both handles refer to the same promise.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(*self.cell.state.borrow(), State::Settled(_))
    }

    pub(crate) fn track_slot(&self) -> &TrackSlot<T, E> {
        &self.cell.track
    }

    pub(crate) fn downgrade(&self) -> WeakPromise<T, E> {
        WeakPromise {
            cell: Rc::downgrade(&self.cell),
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Promise<T, E> {
    /// Create a pending promise and the resolver that settles it.
    #[must_use]
    pub fn pending() -> (Self, Resolver<T, E>) {
        let cell = PromiseCell::new(State::pending());
        let resolver = Resolver {
            cell: Rc::clone(&cell),
        };
        (Self { cell }, resolver)
    }

    /// A promise already fulfilled with `value`.
    #[must_use]
    pub fn resolved(value: T) -> Self {
        Self::settled(Outcome::Fulfilled(value))
    }

    /// A promise already rejected with `error`.
    #[must_use]
    pub fn rejected(error: E) -> Self {
        Self::settled(Outcome::Rejected(error))
    }

    #[must_use]
    pub fn settled(outcome: Outcome<T, E>) -> Self {
        Self {
            cell: PromiseCell::new(State::Settled(outcome)),
        }
    }

    /// Drive `future` on a local executor and settle with its result.
    ///
    /// # Errors
    ///
    /// [`AwaitError::Spawn`] if the executor has shut down.
    pub fn spawn_local<S, F>(spawner: &S, future: F) -> Result<Self, AwaitError>
    where
        S: LocalSpawn + ?Sized,
        F: Future<Output = Result<T, E>> + 'static,
    {
        let (promise, resolver) = Self::pending();
        spawner.spawn_local(async move {
            resolver.settle(future.await.into());
        })?;
        Ok(promise)
    }

    /// Snapshot of the outcome, if settled.
    #[must_use]
    pub fn peek(&self) -> Option<Outcome<T, E>> {
        match &*self.cell.state.borrow() {
            State::Pending { .. } => None,
            State::Settled(outcome) => Some(outcome.clone()),
        }
    }

    /// Run `reaction` when this promise settles (immediately if it already
    /// has).
    pub fn on_settle(&self, reaction: impl FnOnce(&Outcome<T, E>) + 'static) {
        let settled = {
            let mut state = self.cell.state.borrow_mut();
            match &mut *state {
                State::Pending { reactions, .. } => {
                    reactions.push(Box::new(reaction));
                    return;
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };
        reaction(&settled);
    }

    /// A promise that settles with this promise's outcome, but not before
    /// `gate` has settled (either way).
    #[must_use]
    pub fn after<U, F>(&self, gate: &Promise<U, F>) -> Self
    where
        U: Clone + 'static,
        F: Clone + 'static,
    {
        let (derived, resolver) = Self::pending();
        let source = self.clone();
        gate.on_settle(move |_| resolver.adopt(&source));
        derived
    }

    /// A promise that runs `effect` when this one settles, then adopts its
    /// outcome.
    #[must_use]
    pub fn finally(&self, effect: impl FnOnce() + 'static) -> Self {
        let (derived, resolver) = Self::pending();
        self.on_settle(move |outcome| {
            effect();
            resolver.settle(outcome.clone());
        });
        derived
    }

    /// Join that fulfills once every input has settled, ignoring individual
    /// rejections. Outcomes are reported in input order.
    #[must_use]
    pub fn all_settled(promises: &[Self]) -> Promise<Vec<Outcome<T, E>>, Infallible> {
        let (joined, resolver) = Promise::pending();
        if promises.is_empty() {
            resolver.resolve(Vec::new());
            return joined;
        }

        let slots: Rc<RefCell<Vec<Option<Outcome<T, E>>>>> =
            Rc::new(RefCell::new(vec![None; promises.len()]));
        let remaining = Rc::new(Cell::new(promises.len()));
        let resolver = Rc::new(RefCell::new(Some(resolver)));

        for (index, promise) in promises.iter().enumerate() {
            let slots = Rc::clone(&slots);
            let remaining = Rc::clone(&remaining);
            let resolver = Rc::clone(&resolver);
            promise.on_settle(move |outcome| {
                slots.borrow_mut()[index] = Some(outcome.clone());
                remaining.set(remaining.get() - 1);
                if remaining.get() > 0 {
                    return;
                }
                let taken = resolver.borrow_mut().take();
                if let Some(resolver) = taken {
                    let outcomes: Vec<_> = slots.borrow_mut().drain(..).flatten().collect();
                    resolver.resolve(outcomes);
                }
            });
        }
        joined
    }
}

impl<T: Clone, E: Clone> Future for Promise<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.cell.state.borrow_mut();
        match &mut *state {
            State::Settled(outcome) => Poll::Ready(outcome.clone().into_result()),
            State::Pending { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// The settling side of a pending [`Promise`].
///
/// Consumed by settlement, so a resolver settles its promise at most once.
pub struct Resolver<T, E = Infallible> {
    cell: Rc<PromiseCell<T, E>>,
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("id", &self.cell.id).finish()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Resolver<T, E> {
    /// The promise this resolver settles.
    #[must_use]
    pub fn promise(&self) -> Promise<T, E> {
        Promise {
            cell: Rc::clone(&self.cell),
        }
    }

    pub fn resolve(self, value: T) {
        self.settle(Outcome::Fulfilled(value));
    }

    pub fn reject(self, error: E) {
        self.settle(Outcome::Rejected(error));
    }

    pub fn settle(self, outcome: Outcome<T, E>) {
        settle_cell(&self.cell, outcome);
    }

    /// Settle with `source`'s outcome once it settles.
    pub fn adopt(self, source: &Promise<T, E>) {
        source.on_settle(move |outcome| self.settle(outcome.clone()));
    }
}

// ─── Weak handle ─────────────────────────────────────────────────────────────

pub(crate) struct WeakPromise<T, E> {
    cell: Weak<PromiseCell<T, E>>,
}

impl<T, E> WeakPromise<T, E> {
    pub(crate) fn upgrade(&self) -> Option<Promise<T, E>> {
        self.cell.upgrade().map(|cell| Promise { cell })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
