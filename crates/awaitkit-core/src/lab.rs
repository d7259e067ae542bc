#![forbid(unsafe_code)]

//! Deterministic [`Host`] with a manually advanced clock.
//!
//! `LabHost` plays the role of the UI host in tests: it keeps a virtual
//! clock, a timer queue, and a per-site tally of re-evaluation requests.
//! Nothing happens until the test advances time, so every interleaving of
//! settlement, display delay, and re-render is reproducible.
//!
//! # Example
//!
//! ```
//! use awaitkit_core::host::sleep;
//! use awaitkit_core::lab::LabHost;
//! use web_time::Duration;
//!
//! let lab = LabHost::new();
//! let nap = sleep(&lab.handle(), Duration::from_millis(300));
//! lab.advance(Duration::from_millis(299));
//! assert!(!nap.is_settled());
//! lab.advance(Duration::from_millis(1));
//! assert!(nap.is_settled());
//! ```
//!
//! # Invariants
//!
//! 1. Timers fire in deadline order; ties fire in scheduling order.
//! 2. A timer scheduled by a firing callback fires in the same `advance` call
//!    if its deadline falls inside the advanced window.
//! 3. The clock never moves backwards.
//! 4. No internal borrow is held while a timer callback runs.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use web_time::Duration;

use crate::host::{Host, SiteId, TimerCallback, TimerId};

/// Upper bound on timers fired by one [`LabHost::run_until_idle`] call.
const IDLE_FIRE_LIMIT: usize = 100_000;

#[derive(Default)]
struct LabInner {
    now: Duration,
    next_seq: u64,
    timers: BTreeMap<(Duration, u64), (TimerId, TimerCallback)>,
    deadlines: AHashMap<TimerId, (Duration, u64)>,
    requests: AHashMap<SiteId, usize>,
    total_requests: usize,
}

/// A deterministic, single-threaded host.
#[derive(Default)]
pub struct LabHost {
    inner: RefCell<LabInner>,
}

impl fmt::Debug for LabHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("LabHost")
            .field("now", &inner.now)
            .field("pending_timers", &inner.timers.len())
            .field("total_requests", &inner.total_requests)
            .finish()
    }
}

impl LabHost {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// This host as a trait object for binding constructors.
    #[must_use]
    pub fn handle(self: &Rc<Self>) -> Rc<dyn Host> {
        Rc::clone(self) as Rc<dyn Host>
    }

    /// Virtual time elapsed since creation.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    /// Deadline of the earliest scheduled timer.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.inner
            .borrow()
            .timers
            .first_key_value()
            .map(|(&(at, _), _)| at)
    }

    /// Move the clock forward by `delta`, firing every timer that comes due.
    ///
    /// Returns the number of timers fired.
    pub fn advance(&self, delta: Duration) -> usize {
        let target = self.now() + delta;
        let mut fired = 0;
        while let Some(callback) = self.pop_due(target) {
            callback();
            fired += 1;
        }
        let mut inner = self.inner.borrow_mut();
        inner.now = inner.now.max(target);
        fired
    }

    /// Fire timers that are due right now (a zero-length advance).
    pub fn tick(&self) -> usize {
        self.advance(Duration::ZERO)
    }

    /// Advance to each next deadline until no timers remain.
    ///
    /// Stops early after an internal fire limit to guard against timers that
    /// reschedule themselves forever.
    pub fn run_until_idle(&self) -> usize {
        let mut fired = 0;
        while fired < IDLE_FIRE_LIMIT {
            let Some(deadline) = self.next_deadline() else {
                break;
            };
            let delta = deadline.saturating_sub(self.now());
            fired += self.advance(delta);
        }
        fired
    }

    /// Re-evaluation requests recorded for `site` and not yet taken.
    #[must_use]
    pub fn requests(&self, site: SiteId) -> usize {
        self.inner
            .borrow()
            .requests
            .get(&site)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_dirty(&self, site: SiteId) -> bool {
        self.requests(site) > 0
    }

    /// Return and clear the pending request count for `site`.
    pub fn take_requests(&self, site: SiteId) -> usize {
        self.inner
            .borrow_mut()
            .requests
            .remove(&site)
            .unwrap_or(0)
    }

    /// Requests recorded across all sites since creation.
    #[must_use]
    pub fn total_requests(&self) -> usize {
        self.inner.borrow().total_requests
    }

    fn pop_due(&self, target: Duration) -> Option<TimerCallback> {
        let mut inner = self.inner.borrow_mut();
        let due = inner
            .timers
            .first_key_value()
            .is_some_and(|(&(at, _), _)| at <= target);
        if !due {
            return None;
        }
        let ((at, _), (id, callback)) = inner.timers.pop_first()?;
        inner.deadlines.remove(&id);
        inner.now = inner.now.max(at);
        Some(callback)
    }
}

impl Host for LabHost {
    fn request_re_evaluation(&self, site: SiteId) {
        let mut inner = self.inner.borrow_mut();
        *inner.requests.entry(site).or_insert(0) += 1;
        inner.total_requests += 1;
    }

    fn schedule_after_delay(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let mut inner = self.inner.borrow_mut();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let id = TimerId(seq);
        let key = (inner.now + delay, seq);
        inner.timers.insert(key, (id, callback));
        inner.deadlines.insert(id, key);
        id
    }

    fn cancel_timer(&self, timer: TimerId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(key) = inner.deadlines.remove(&timer) {
            inner.timers.remove(&key);
        }
    }
}
