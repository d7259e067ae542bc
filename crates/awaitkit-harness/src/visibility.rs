#![forbid(unsafe_code)]

//! Deterministic visibility collaborator.
//!
//! [`LabVisibility`] records every observation an [`AwaitView`] opens and
//! lets a test push intersection events to a node by hand. Dropping the
//! view's subscription removes its observation.
//!
//! [`AwaitView`]: awaitkit_runtime::view::AwaitView

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use awaitkit_runtime::view::{
    IntersectionCallback, IntersectionEntry, NodeId, ObserverSubscription, ViewOptions,
    VisibilityObserver,
};

struct Observation {
    target: NodeId,
    options: ViewOptions,
    /// `None` while the callback is out being invoked.
    callback: Option<IntersectionCallback>,
}

#[derive(Default)]
struct Registry {
    next: u64,
    observations: BTreeMap<u64, Observation>,
}

#[derive(Default)]
pub struct LabVisibility {
    registry: Rc<RefCell<Registry>>,
}

impl LabVisibility {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    #[must_use]
    pub fn handle(self: &Rc<Self>) -> Rc<dyn VisibilityObserver> {
        Rc::clone(self) as Rc<dyn VisibilityObserver>
    }

    #[must_use]
    pub fn active_observers(&self) -> usize {
        self.registry.borrow().observations.len()
    }

    /// Targets currently observed, in subscription order.
    #[must_use]
    pub fn observed_targets(&self) -> Vec<NodeId> {
        self.registry
            .borrow()
            .observations
            .values()
            .map(|o| o.target)
            .collect()
    }

    /// Options the most recent observation of `target` was opened with.
    #[must_use]
    pub fn options_for(&self, target: NodeId) -> Option<ViewOptions> {
        self.registry
            .borrow()
            .observations
            .values()
            .rev()
            .find(|o| o.target == target)
            .map(|o| o.options.clone())
    }

    /// Deliver `entry` to every observer of `target`.
    ///
    /// Returns the number of callbacks invoked.
    pub fn intersect(&self, target: NodeId, entry: IntersectionEntry) -> usize {
        let taken: Vec<(u64, IntersectionCallback)> = {
            let mut registry = self.registry.borrow_mut();
            registry
                .observations
                .iter_mut()
                .filter(|(_, o)| o.target == target)
                .filter_map(|(&key, o)| o.callback.take().map(|cb| (key, cb)))
                .collect()
        };
        let delivered = taken.len();
        for (key, mut callback) in taken {
            callback(&entry);
            // Still subscribed: hand the callback back.
            if let Some(observation) = self.registry.borrow_mut().observations.get_mut(&key) {
                observation.callback = Some(callback);
            }
        }
        tracing::trace!(?target, delivered, "intersection delivered");
        delivered
    }
}

impl VisibilityObserver for LabVisibility {
    fn observe(
        &self,
        target: NodeId,
        options: &ViewOptions,
        on_event: IntersectionCallback,
    ) -> ObserverSubscription {
        let key = {
            let mut registry = self.registry.borrow_mut();
            let key = registry.next;
            registry.next += 1;
            registry.observations.insert(
                key,
                Observation {
                    target,
                    options: options.clone(),
                    callback: Some(on_event),
                },
            );
            key
        };
        let registry: Weak<RefCell<Registry>> = Rc::downgrade(&self.registry);
        ObserverSubscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.borrow_mut().observations.remove(&key);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn events_reach_only_their_target() {
        let lab = LabVisibility::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _sub = lab.observe(
            NodeId(1),
            &ViewOptions::default(),
            Box::new(move |_| counter.set(counter.get() + 1)),
        );

        assert_eq!(lab.intersect(NodeId(2), IntersectionEntry::new(true, 1.0)), 0);
        assert_eq!(lab.intersect(NodeId(1), IntersectionEntry::new(true, 1.0)), 1);
        assert_eq!(lab.intersect(NodeId(1), IntersectionEntry::new(false, 0.0)), 1);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn dropping_the_subscription_unregisters() {
        let lab = LabVisibility::new();
        let sub = lab.observe(NodeId(3), &ViewOptions::default(), Box::new(|_| {}));
        assert_eq!(lab.observed_targets(), vec![NodeId(3)]);
        drop(sub);
        assert_eq!(lab.active_observers(), 0);
    }

    #[test]
    fn callback_may_drop_its_own_subscription() {
        let lab = LabVisibility::new();
        let slot: Rc<RefCell<Option<ObserverSubscription>>> = Rc::new(RefCell::new(None));
        let inner = Rc::clone(&slot);
        let sub = lab.observe(
            NodeId(4),
            &ViewOptions::default(),
            Box::new(move |_| {
                inner.borrow_mut().take();
            }),
        );
        *slot.borrow_mut() = Some(sub);

        assert_eq!(lab.intersect(NodeId(4), IntersectionEntry::new(true, 1.0)), 1);
        assert_eq!(lab.active_observers(), 0);
        assert_eq!(lab.intersect(NodeId(4), IntersectionEntry::new(true, 1.0)), 0);
    }
}
