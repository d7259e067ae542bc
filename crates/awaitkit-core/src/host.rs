#![forbid(unsafe_code)]

//! The contract awaitkit needs from a UI host.
//!
//! The host owns re-rendering and time. awaitkit never re-renders anything
//! itself: it asks the host to re-evaluate a binding site, and it asks the
//! host to run a callback after a delay. Both requests are fire-and-forget;
//! the host may batch or coalesce re-evaluations as it sees fit.
//!
//! [`LabHost`](crate::lab::LabHost) is a deterministic implementation for
//! tests.

use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use web_time::Duration;

use crate::promise::Promise;

static NEXT_SITE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one binding site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SiteId(u64);

impl SiteId {
    /// Allocate a fresh site id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SITE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "site#{}", self.0)
    }
}

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

/// Deferred work run by the host's timer.
pub type TimerCallback = Box<dyn FnOnce()>;

/// Services a UI host provides to binding sites.
pub trait Host {
    /// Schedule `site` to be evaluated again.
    fn request_re_evaluation(&self, site: SiteId);

    /// Run `callback` once, no sooner than `delay` from now.
    fn schedule_after_delay(&self, delay: Duration, callback: TimerCallback) -> TimerId;

    /// Drop a scheduled callback. Unknown or already-fired timers are ignored.
    fn cancel_timer(&self, timer: TimerId);
}

/// The force-update capability of one binding site.
#[derive(Clone)]
pub struct ForceUpdate {
    host: Rc<dyn Host>,
    site: SiteId,
}

impl ForceUpdate {
    pub fn new(host: Rc<dyn Host>, site: SiteId) -> Self {
        Self { host, site }
    }

    #[inline]
    #[must_use]
    pub fn site(&self) -> SiteId {
        self.site
    }

    #[inline]
    #[must_use]
    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    /// Ask the host to re-evaluate this site.
    pub fn request(&self) {
        self.host.request_re_evaluation(self.site);
    }
}

impl fmt::Debug for ForceUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForceUpdate")
            .field("site", &self.site)
            .finish()
    }
}

/// A promise fulfilled by the host's timer after `delay`.
#[must_use]
pub fn sleep(host: &Rc<dyn Host>, delay: Duration) -> Promise<(), Infallible> {
    let (promise, resolver) = Promise::pending();
    host.schedule_after_delay(delay, Box::new(move || resolver.resolve(())));
    promise
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::LabHost;

    #[test]
    fn site_ids_are_unique() {
        assert_ne!(SiteId::next(), SiteId::next());
    }

    #[test]
    fn force_update_targets_its_site() {
        let lab = LabHost::new();
        let site = SiteId::next();
        let force = ForceUpdate::new(lab.handle(), site);
        force.request();
        force.request();
        assert_eq!(lab.requests(site), 2);
        assert_eq!(lab.requests(SiteId::next()), 0);
    }

    #[test]
    fn sleep_settles_on_the_host_clock() {
        let lab = LabHost::new();
        let nap = sleep(&lab.handle(), Duration::from_millis(50));
        lab.advance(Duration::from_millis(49));
        assert!(!nap.is_settled());
        lab.advance(Duration::from_millis(1));
        assert!(nap.is_settled());
    }
}
