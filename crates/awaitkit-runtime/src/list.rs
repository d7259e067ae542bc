#![forbid(unsafe_code)]

//! Sequenced reveal of several await bindings.
//!
//! [`AwaitList`] sits between a list of children and their await engines. It
//! never delays the underlying work; it hands each child a *gated* promise
//! that settles with the original outcome only when the reveal policy allows
//! it.
//!
//! | Order | Tail | Policy |
//! |-------|------|--------|
//! | `None` | any | pass-through |
//! | `Together` | any | every fresh entry waits for an all-settled join of the fresh group |
//! | `Forwards` / `Backwards` | `Expanded` | entry *i+1* waits for entry *i* plus the gap |
//! | `Forwards` / `Backwards` | `Collapsed` | only the next fresh entry advances; the rest render nothing |
//!
//! An entry is *fresh* when its promise was never tracked. Entries whose
//! promise is already tracked are left untouched. The list remembers the
//! gated promise it produced for each original, so re-evaluations keep
//! feeding the child the same identity instead of restarting it.
//!
//! # Invariants
//!
//! 1. Gating only ever delays observation; gated promises adopt the original
//!    outcome, rejections included, and a rejection never blocks the chain.
//! 2. With `Collapsed`, at most one entry is being revealed at a time; the
//!    next becomes eligible after the gap that follows the previous
//!    settlement, or as soon as the revealing entry leaves the list.
//! 3. The gate cache holds only entries present in the latest pass.

use std::cell::Cell;
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use awaitkit_core::host::{ForceUpdate, Host, SiteId, sleep};
use awaitkit_core::promise::{Promise, PromiseId};
use awaitkit_core::track;
use web_time::Duration;

use crate::binding::Source;
use crate::config::{ListConfig, RevealOrder, Tail};

/// One child handed to the list.
pub enum ListChild<T, E> {
    /// Not an await binding; passed through unchanged.
    Inert,
    /// An await binding fed by this promise.
    Await(Promise<T, E>),
}

impl<T, E> From<Promise<T, E>> for ListChild<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Self::Await(promise)
    }
}

/// What the list decided for one child.
pub enum ListSlot<T, E> {
    Inert,
    Await(Source<T, E>),
}

impl<T, E> ListSlot<T, E> {
    /// The source to feed the child engine, if the child is an await binding.
    #[must_use]
    pub fn source(&self) -> Option<&Source<T, E>> {
        match self {
            Self::Inert => None,
            Self::Await(source) => Some(source),
        }
    }

    #[must_use]
    pub fn into_source(self) -> Option<Source<T, E>> {
        match self {
            Self::Inert => None,
            Self::Await(source) => Some(source),
        }
    }
}

impl<T, E> fmt::Debug for ListSlot<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inert => f.write_str("Inert"),
            Self::Await(source) => f.debug_tuple("Await").field(source).finish(),
        }
    }
}

/// A reveal coordinator for one list site.
pub struct AwaitList<T, E> {
    config: ListConfig,
    force: ForceUpdate,
    /// Original promise identity to the gated promise handed out for it.
    gated: AHashMap<PromiseId, Promise<T, E>>,
    /// Collapsed tail: the original being revealed, until its gap has passed.
    revealing: Rc<Cell<Option<PromiseId>>>,
}

impl<T, E> fmt::Debug for AwaitList<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwaitList")
            .field("site", &self.force.site())
            .field("config", &self.config)
            .field("gated", &self.gated.len())
            .field("revealing", &self.revealing.get())
            .finish()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> AwaitList<T, E> {
    #[must_use]
    pub fn new(config: ListConfig, host: Rc<dyn Host>) -> Self {
        Self {
            config,
            force: ForceUpdate::new(host, SiteId::next()),
            gated: AHashMap::new(),
            revealing: Rc::new(Cell::new(None)),
        }
    }

    #[inline]
    #[must_use]
    pub fn site(&self) -> SiteId {
        self.force.site()
    }

    #[must_use]
    pub fn config(&self) -> &ListConfig {
        &self.config
    }

    /// Decide the source of every child for this pass.
    pub fn arrange(&mut self, children: Vec<ListChild<T, E>>) -> Vec<ListSlot<T, E>> {
        let Some(order) = self.config.order else {
            return children.into_iter().map(pass_through).collect();
        };

        self.release_departed(&children);
        let mut cache = std::mem::take(&mut self.gated);
        let mut slots = Vec::with_capacity(children.len());
        let mut fresh = Vec::new();
        for (index, child) in children.into_iter().enumerate() {
            let ListChild::Await(promise) = child else {
                slots.push(ListSlot::Inert);
                continue;
            };
            if let Some(gated) = cache.remove(&promise.id()) {
                self.gated.insert(promise.id(), gated.clone());
                slots.push(ListSlot::Await(Source::Bind(gated)));
            } else if track::is_tracked(&promise) {
                slots.push(ListSlot::Await(Source::Bind(promise)));
            } else {
                slots.push(ListSlot::Await(Source::Reuse));
                fresh.push((index, promise));
            }
        }

        tracing::trace!(
            site = %self.site(),
            %order,
            tail = %self.config.tail,
            sequenced = fresh.len(),
            "list pass"
        );
        if order == RevealOrder::Backwards {
            fresh.reverse();
        }
        match (order, self.config.tail) {
            (RevealOrder::Together, _) => self.together(fresh, &mut slots),
            (_, Tail::Collapsed) => self.collapsed(fresh, &mut slots),
            (_, Tail::Expanded) => self.chained(fresh, &mut slots),
        }
        slots
    }

    fn release_departed(&self, children: &[ListChild<T, E>]) {
        let Some(id) = self.revealing.get() else {
            return;
        };
        let present = children
            .iter()
            .any(|child| matches!(child, ListChild::Await(p) if p.id() == id));
        if !present {
            tracing::trace!(site = %self.site(), "revealing entry left the list");
            self.revealing.set(None);
        }
    }

    fn together(&mut self, fresh: Vec<(usize, Promise<T, E>)>, slots: &mut [ListSlot<T, E>]) {
        if fresh.is_empty() {
            return;
        }
        let tracked: Vec<_> = fresh.iter().map(|(_, p)| track::track(p)).collect();
        let all = Promise::all_settled(&tracked);
        for ((index, original), tracked) in fresh.into_iter().zip(tracked) {
            self.hand_out(index, &original, tracked.after(&all), slots);
        }
    }

    fn collapsed(&mut self, fresh: Vec<(usize, Promise<T, E>)>, slots: &mut [ListSlot<T, E>]) {
        let mut fresh = fresh.into_iter();
        if self.revealing.get().is_none()
            && let Some((index, original)) = fresh.next()
        {
            let id = original.id();
            self.revealing.set(Some(id));
            let host = Rc::clone(self.force.host());
            let force = self.force.clone();
            let revealing = Rc::clone(&self.revealing);
            let gap = self.config.gap;
            let gated = track::track(&original).finally(move || {
                host.schedule_after_delay(
                    gap,
                    Box::new(move || {
                        // A departed entry may already have handed the latch on.
                        if revealing.get() == Some(id) {
                            revealing.set(None);
                            force.request();
                        }
                    }),
                );
            });
            self.hand_out(index, &original, gated, slots);
        }
        for (index, _) in fresh {
            slots[index] = ListSlot::Await(Source::Suppress);
        }
    }

    fn chained(&mut self, fresh: Vec<(usize, Promise<T, E>)>, slots: &mut [ListSlot<T, E>]) {
        let mut previous: Option<Promise<T, E>> = None;
        for (index, original) in fresh {
            let gate = match &previous {
                None => sleep(self.force.host(), self.config.gap),
                Some(prev) => gap_after(self.force.host(), prev, self.config.gap),
            };
            let gated = track::track(&original).after(&gate);
            previous = Some(gated.clone());
            self.hand_out(index, &original, gated, slots);
        }
    }

    fn hand_out(
        &mut self,
        index: usize,
        original: &Promise<T, E>,
        gated: Promise<T, E>,
        slots: &mut [ListSlot<T, E>],
    ) {
        self.gated.insert(original.id(), gated.clone());
        slots[index] = ListSlot::Await(Source::Bind(gated));
    }
}

fn pass_through<T, E>(child: ListChild<T, E>) -> ListSlot<T, E> {
    match child {
        ListChild::Inert => ListSlot::Inert,
        ListChild::Await(promise) => ListSlot::Await(Source::Bind(promise)),
    }
}

/// Fulfills `gap` after `previous` settles, either way.
fn gap_after<T: Clone + 'static, E: Clone + 'static>(
    host: &Rc<dyn Host>,
    previous: &Promise<T, E>,
    gap: Duration,
) -> Promise<(), Infallible> {
    let (gate, resolver) = Promise::pending();
    let host = Rc::clone(host);
    previous.on_settle(move |_| resolver.adopt(&sleep(&host, gap)));
    gate
}

#[cfg(test)]
mod tests {
    use super::*;
    use awaitkit_core::lab::LabHost;
    use awaitkit_core::promise::Resolver;

    type P = Promise<i32, String>;

    fn gated_of(slot: &ListSlot<i32, String>) -> P {
        match slot.source() {
            Some(Source::Bind(p)) => p.clone(),
            other => panic!("expected a bound slot, got {other:?}"),
        }
    }

    fn list(lab: &Rc<LabHost>, config: ListConfig) -> AwaitList<i32, String> {
        AwaitList::new(config.with_gap(Duration::from_millis(100)), lab.handle())
    }

    fn pending() -> (P, Resolver<i32, String>) {
        Promise::pending()
    }

    #[test]
    fn no_order_passes_through() {
        let lab = LabHost::new();
        let mut list = list(&lab, ListConfig::default());
        let (a, _ra) = pending();
        let slots = list.arrange(vec![ListChild::Inert, a.clone().into()]);
        assert!(matches!(slots[0], ListSlot::Inert));
        assert!(gated_of(&slots[1]).ptr_eq(&a));
        assert!(!track::is_tracked(&a));
    }

    #[test]
    fn together_waits_for_the_whole_group() {
        let lab = LabHost::new();
        let mut list = list(&lab, ListConfig::new(RevealOrder::Together));
        let (a, ra) = pending();
        let (b, rb) = pending();
        let slots = list.arrange(vec![a.into(), ListChild::Inert, b.into()]);
        let (ga, gb) = (gated_of(&slots[0]), gated_of(&slots[2]));

        ra.resolve(1);
        assert!(!ga.is_settled());
        rb.reject("late".into());
        assert_eq!(ga.peek().and_then(|o| o.value().copied()), Some(1));
        assert!(gb.peek().is_some_and(|o| o.is_rejected()));
    }

    #[test]
    fn re_arranging_keeps_gated_identity() {
        let lab = LabHost::new();
        let mut list = list(&lab, ListConfig::new(RevealOrder::Together));
        let (a, _ra) = pending();
        let first = gated_of(&list.arrange(vec![a.clone().into()])[0]);
        let second = gated_of(&list.arrange(vec![a.clone().into()])[0]);
        assert!(first.ptr_eq(&second));
        assert!(!first.ptr_eq(&a));

        // Dropped from the list: the cache forgets it, and the now-tracked
        // original is passed as itself.
        list.arrange(vec![]);
        let third = gated_of(&list.arrange(vec![a.clone().into()])[0]);
        assert!(third.ptr_eq(&a));
    }

    #[test]
    fn tracked_entries_are_untouched() {
        let lab = LabHost::new();
        let mut list = list(&lab, ListConfig::new(RevealOrder::Forwards));
        let seen: P = track::resolved(5);
        let slots = list.arrange(vec![seen.clone().into()]);
        assert!(gated_of(&slots[0]).ptr_eq(&seen));
    }

    #[test]
    fn forwards_chain_spaces_reveals_by_gap() {
        let lab = LabHost::new();
        let mut list = list(&lab, ListConfig::new(RevealOrder::Forwards));
        let slots = list.arrange(vec![
            P::resolved(1).into(),
            P::rejected("bad".into()).into(),
            P::resolved(3).into(),
        ]);
        let gated: Vec<P> = slots.iter().map(gated_of).collect();

        lab.advance(Duration::from_millis(99));
        assert!(gated.iter().all(|g| !g.is_settled()));
        lab.advance(Duration::from_millis(1));
        assert!(gated[0].is_settled());
        assert!(!gated[1].is_settled());
        lab.advance(Duration::from_millis(100));
        assert!(gated[1].peek().is_some_and(|o| o.is_rejected()));
        assert!(!gated[2].is_settled());
        lab.advance(Duration::from_millis(100));
        assert!(gated[2].is_settled());
    }

    #[test]
    fn backwards_chain_starts_from_the_end() {
        let lab = LabHost::new();
        let mut list = list(&lab, ListConfig::new(RevealOrder::Backwards));
        let slots = list.arrange(vec![P::resolved(1).into(), P::resolved(2).into()]);
        let gated: Vec<P> = slots.iter().map(gated_of).collect();
        lab.advance(Duration::from_millis(100));
        assert!(gated[1].is_settled());
        assert!(!gated[0].is_settled());
        lab.advance(Duration::from_millis(100));
        assert!(gated[0].is_settled());
    }

    #[test]
    fn slow_entry_holds_back_the_chain() {
        let lab = LabHost::new();
        let mut list = list(&lab, ListConfig::new(RevealOrder::Forwards));
        let (slow, resolve_slow) = pending();
        let slots = list.arrange(vec![slow.into(), P::resolved(2).into()]);
        let gated: Vec<P> = slots.iter().map(gated_of).collect();

        lab.advance(Duration::from_millis(500));
        assert!(!gated[1].is_settled());
        resolve_slow.resolve(1);
        assert!(gated[0].is_settled());
        lab.advance(Duration::from_millis(100));
        assert!(gated[1].is_settled());
    }

    #[test]
    fn collapsed_reveals_one_entry_per_pass() {
        let lab = LabHost::new();
        let mut list = list(
            &lab,
            ListConfig::new(RevealOrder::Forwards).with_tail(Tail::Collapsed),
        );
        let (a, b, c) = (P::resolved(1), P::resolved(2), P::resolved(3));
        let entries = || vec![a.clone().into(), b.clone().into(), c.clone().into()];

        let slots = list.arrange(entries());
        assert!(gated_of(&slots[0]).is_settled());
        assert!(slots[1].source().is_some_and(Source::is_suppress));
        assert!(slots[2].source().is_some_and(Source::is_suppress));

        // Before the gap passes nothing else advances.
        let slots = list.arrange(entries());
        assert!(slots[1].source().is_some_and(Source::is_suppress));

        lab.advance(Duration::from_millis(100));
        assert_eq!(lab.take_requests(list.site()), 1);
        let slots = list.arrange(entries());
        assert!(matches!(slots[1].source(), Some(Source::Bind(_))));
        assert!(slots[2].source().is_some_and(Source::is_suppress));
    }

    #[test]
    fn removing_the_revealing_entry_releases_the_tail() {
        let lab = LabHost::new();
        let mut list = list(
            &lab,
            ListConfig::new(RevealOrder::Forwards).with_tail(Tail::Collapsed),
        );
        let (stuck, _never) = pending();
        let next = P::resolved(2);

        let slots = list.arrange(vec![stuck.clone().into(), next.clone().into()]);
        assert!(matches!(slots[0].source(), Some(Source::Bind(_))));
        assert!(slots[1].source().is_some_and(Source::is_suppress));

        lab.advance(Duration::from_secs(10));
        let slots = list.arrange(vec![next.clone().into()]);
        let revealed = gated_of(&slots[0]);
        assert!(revealed.is_settled());

        lab.advance(Duration::from_millis(100));
        assert_eq!(lab.take_requests(list.site()), 1);
        assert!(list.revealing.get().is_none());
    }

    #[test]
    fn late_settlement_of_a_departed_entry_keeps_the_new_latch() {
        let lab = LabHost::new();
        let mut list = list(
            &lab,
            ListConfig::new(RevealOrder::Forwards).with_tail(Tail::Collapsed),
        );
        let (slow, resolve_slow) = pending();
        let (next, _held) = pending();
        let third = P::resolved(3);

        list.arrange(vec![slow.into()]);
        list.arrange(vec![next.clone().into(), third.clone().into()]);
        assert_eq!(list.revealing.get(), Some(next.id()));

        resolve_slow.resolve(1);
        lab.advance(Duration::from_millis(100));
        assert_eq!(list.revealing.get(), Some(next.id()));
        assert_eq!(lab.take_requests(list.site()), 0);
        let slots = list.arrange(vec![next.into(), third.into()]);
        assert!(slots[1].source().is_some_and(Source::is_suppress));
    }

    proptest::proptest! {
        #[test]
        fn gate_cache_tracks_the_latest_pass(
            keep in proptest::collection::vec(proptest::bool::ANY, 1..12),
        ) {
            let lab = LabHost::new();
            let mut list = list(&lab, ListConfig::new(RevealOrder::Together));
            let promises: Vec<P> = keep.iter().map(|_| Promise::pending().0).collect();
            list.arrange(promises.iter().cloned().map(ListChild::from).collect());
            proptest::prop_assert_eq!(list.gated.len(), promises.len());

            let survivors: Vec<P> = promises
                .iter()
                .zip(&keep)
                .filter(|(_, kept)| **kept)
                .map(|(p, _)| p.clone())
                .collect();
            let slots = list.arrange(survivors.iter().cloned().map(ListChild::from).collect());
            proptest::prop_assert_eq!(list.gated.len(), survivors.len());
            for (slot, original) in slots.iter().zip(&survivors) {
                proptest::prop_assert!(!gated_of(slot).ptr_eq(original));
            }
        }
    }
}
