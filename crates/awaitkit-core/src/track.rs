#![forbid(unsafe_code)]

//! Lifecycle tracking for promises.
//!
//! Tracking attaches one authoritative observation to a promise so that any
//! number of independent observers agree on its outcome without each
//! subscribing again. The metadata lives in a private slot of the promise's
//! shared cell: ordinary consumers cannot see it, and it is freed together
//! with the promise.
//!
//! # Invariants
//!
//! 1. [`track`] subscribes at most once per promise; the `observed` marker is
//!    set synchronously, before the promise settles.
//! 2. The settled outcome is stamped exactly once, at settlement, and never
//!    changes afterward.
//! 3. The stamping reaction holds only a weak reference, so tracking never
//!    keeps a promise alive.

use std::cell::{Cell, OnceCell};

use crate::promise::{Outcome, Promise};

/// Per-promise tracking metadata.
pub(crate) struct TrackSlot<T, E> {
    observed: Cell<bool>,
    stamped: OnceCell<Outcome<T, E>>,
}

impl<T, E> Default for TrackSlot<T, E> {
    fn default() -> Self {
        Self {
            observed: Cell::new(false),
            stamped: OnceCell::new(),
        }
    }
}

/// Attach lifecycle tracking to `promise` if it is not tracked yet.
///
/// Returns a handle to the same promise.
pub fn track<T: Clone + 'static, E: Clone + 'static>(promise: &Promise<T, E>) -> Promise<T, E> {
    if promise.track_slot().observed.replace(true) {
        return promise.clone();
    }
    tracing::trace!(promise = %promise.id(), "tracking attached");
    let weak = promise.downgrade();
    promise.on_settle(move |outcome| {
        if let Some(promise) = weak.upgrade() {
            let _ = promise.track_slot().stamped.set(outcome.clone());
        }
    });
    promise.clone()
}

/// A promise that is already tracked and stamped fulfilled.
#[must_use]
pub fn resolved<T: Clone + 'static, E: Clone + 'static>(value: T) -> Promise<T, E> {
    let promise = Promise::resolved(value.clone());
    let slot = promise.track_slot();
    slot.observed.set(true);
    let _ = slot.stamped.set(Outcome::Fulfilled(value));
    promise
}

/// Whether tracking has been attached to `promise`.
#[must_use]
pub fn is_tracked<T, E>(promise: &Promise<T, E>) -> bool {
    promise.track_slot().observed.get()
}

/// The stamped outcome. `None` until the tracked promise settles.
#[must_use]
pub fn settled_outcome<T: Clone, E: Clone>(promise: &Promise<T, E>) -> Option<Outcome<T, E>> {
    promise.track_slot().stamped.get().cloned()
}

#[must_use]
pub fn settled_value<T: Clone, E>(promise: &Promise<T, E>) -> Option<T> {
    promise.track_slot().stamped.get()?.value().cloned()
}

#[must_use]
pub fn settled_error<T, E: Clone>(promise: &Promise<T, E>) -> Option<E> {
    promise.track_slot().stamped.get()?.error().cloned()
}

#[must_use]
pub fn is_settled_fulfilled<T, E>(promise: &Promise<T, E>) -> bool {
    promise
        .track_slot()
        .stamped
        .get()
        .is_some_and(Outcome::is_fulfilled)
}

#[must_use]
pub fn is_settled_rejected<T, E>(promise: &Promise<T, E>) -> bool {
    promise
        .track_slot()
        .stamped
        .get()
        .is_some_and(Outcome::is_rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn track_is_identity_preserving() {
        let (promise, _resolver) = Promise::<i32, String>::pending();
        let tracked = track(&promise);
        assert!(tracked.ptr_eq(&promise));
        assert!(is_tracked(&promise));
    }

    #[test]
    fn observed_marker_is_set_before_settlement() {
        let (promise, resolver) = Promise::<i32, String>::pending();
        assert!(!is_tracked(&promise));
        track(&promise);
        assert!(is_tracked(&promise));
        assert_eq!(settled_outcome(&promise), None);

        resolver.resolve(4);
        assert_eq!(settled_value(&promise), Some(4));
        assert!(is_settled_fulfilled(&promise));
        assert!(!is_settled_rejected(&promise));
    }

    #[test]
    fn double_tracking_subscribes_once() {
        let (promise, resolver) = Promise::<i32, String>::pending();
        track(&promise);
        track(&promise);
        track(&promise);

        let calls = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&calls);
        promise.on_settle(move |_| counter.set(counter.get() + 1));

        resolver.reject("boom".to_string());
        assert_eq!(calls.get(), 1);
        assert_eq!(settled_error(&promise), Some("boom".to_string()));
        assert!(is_settled_rejected(&promise));
    }

    #[test]
    fn tracking_a_settled_promise_stamps_immediately() {
        let promise: Promise<&str, ()> = Promise::resolved("ready");
        track(&promise);
        assert_eq!(settled_value(&promise), Some("ready"));
    }

    #[test]
    fn untracked_promise_has_no_stamp_even_when_settled() {
        let promise: Promise<i32, ()> = Promise::resolved(1);
        assert!(promise.is_settled());
        assert_eq!(settled_outcome(&promise), None);
    }

    #[test]
    fn pre_tracked_resolved() {
        let promise: Promise<i32, ()> = resolved(9);
        assert!(is_tracked(&promise));
        assert_eq!(settled_value(&promise), Some(9));
    }

    #[test]
    fn tracking_does_not_keep_promise_alive() {
        let (promise, resolver) = Promise::<i32, ()>::pending();
        track(&promise);
        let probe = promise.downgrade();
        drop(promise);
        // The resolver still owns the cell; once it goes, nothing does.
        assert!(probe.upgrade().is_some());
        drop(resolver);
        assert!(probe.upgrade().is_none());
    }
}
