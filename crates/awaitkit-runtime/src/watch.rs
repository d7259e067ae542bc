#![forbid(unsafe_code)]

//! Consumer-facing control over a dependency-watching binding.
//!
//! A [`WatchHandle`] is a two-state machine (watching / paused) plus a
//! one-shot "force new work" flag. The binding that created it consumes the
//! flag on its next evaluation while watching.
//!
//! # Invariants
//!
//! 1. `update` is a no-op until the binding has applied its first settlement
//!    (or its jump-first seed).
//! 2. Each call that changes the state or raises the flag issues exactly one
//!    re-evaluation request.
//! 3. The handle has a stable identity for the binding's lifetime: clones
//!    share the same state.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use awaitkit_core::host::ForceUpdate;

struct WatchShared {
    watching: Cell<bool>,
    update_requested: Cell<bool>,
    settled_once: Rc<Cell<bool>>,
    force: ForceUpdate,
}

/// Pause, resume, or force a dependency-watching binding.
#[derive(Clone)]
pub struct WatchHandle {
    shared: Rc<WatchShared>,
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("site", &self.shared.force.site())
            .field("watching", &self.shared.watching.get())
            .field("update_requested", &self.shared.update_requested.get())
            .finish()
    }
}

impl WatchHandle {
    pub(crate) fn new(force: ForceUpdate, settled_once: Rc<Cell<bool>>) -> Self {
        Self {
            shared: Rc::new(WatchShared {
                watching: Cell::new(true),
                update_requested: Cell::new(false),
                settled_once,
                force,
            }),
        }
    }

    /// Force new work on the next evaluation.
    ///
    /// Ignored before the first settlement so the initial fetch is never
    /// raced. While paused the request is remembered and honored after
    /// [`re_watch`](Self::re_watch).
    pub fn update(&self) {
        let shared = &self.shared;
        if !shared.settled_once.get() {
            tracing::trace!(site = %shared.force.site(), "update ignored before first settlement");
            return;
        }
        shared.update_requested.set(true);
        tracing::debug!(site = %shared.force.site(), "update requested");
        shared.force.request();
    }

    /// Stop comparing dependencies automatically.
    pub fn un_watch(&self) {
        let shared = &self.shared;
        if !shared.watching.replace(false) {
            return;
        }
        tracing::debug!(site = %shared.force.site(), "watch paused");
        shared.force.request();
    }

    /// Resume watching and force one re-check on the next evaluation.
    pub fn re_watch(&self) {
        let shared = &self.shared;
        if shared.watching.replace(true) {
            return;
        }
        shared.update_requested.set(true);
        tracing::debug!(site = %shared.force.site(), "watch resumed");
        shared.force.request();
    }

    #[inline]
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.shared.watching.get()
    }

    /// Whether the two handles control the same binding.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Consume the pending force flag.
    pub(crate) fn take_update(&self) -> bool {
        self.shared.update_requested.replace(false)
    }
}
