#![forbid(unsafe_code)]

//! Property-based invariant tests for the await engine and list gating.
//!
//! 1. Output identity is stable while nothing changes.
//! 2. Each settlement is applied at most once, and only for the latest
//!    bound promise.
//! 3. No settlement is visible before the display delay has elapsed.
//! 4. A paused watch never starts work, whatever the dependencies do.
//! 5. Gated list promises settle with the original outcome.
//! 6. Expanded chains reveal in order.

use std::cell::RefCell;
use std::rc::Rc;

use awaitkit_core::Compare;
use awaitkit_core::lab::LabHost;
use awaitkit_core::promise::{Promise, Resolver};
use awaitkit_harness::{Hook, Recorder};
use awaitkit_runtime::{
    AwaitBuilder, AwaitList, ListChild, ListConfig, ResolveState, RevealOrder, Source, Status,
};
use proptest::prelude::*;
use web_time::Duration;

// ── Helpers ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Step {
    /// Bind a fresh pending promise.
    Bind,
    /// Settle the pending promise at this index (mod len) with ok/err.
    Settle(usize, bool),
    /// Advance the clock by this many ms.
    Advance(u64),
    /// Evaluate with `Reuse`.
    Reuse,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Bind),
        (any::<usize>(), any::<bool>()).prop_map(|(i, ok)| Step::Settle(i, ok)),
        (0u64..400).prop_map(Step::Advance),
        Just(Step::Reuse),
    ]
}

fn arb_order() -> impl Strategy<Value = RevealOrder> {
    prop_oneof![
        Just(RevealOrder::Forwards),
        Just(RevealOrder::Backwards),
        Just(RevealOrder::Together),
    ]
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Output identity stability
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn output_identity_is_stable_between_changes(reuses in 1usize..20, value in any::<i32>()) {
        let lab = LabHost::new();
        let binding = AwaitBuilder::new()
            .delay(Duration::ZERO)
            .render(|s: &ResolveState<i32, ()>| s.value)
            .build(lab.handle())
            .expect("render supplied");
        let promise = Promise::resolved(value);
        binding.evaluate(promise.clone().into());
        lab.tick();

        let first = binding.evaluate(promise.clone().into()).expect("rendered");
        for _ in 0..reuses {
            let again = binding.evaluate(Source::Reuse).expect("rendered");
            prop_assert!(Rc::ptr_eq(&first, &again));
            let rebound = binding.evaluate(promise.clone().into()).expect("rendered");
            prop_assert!(Rc::ptr_eq(&first, &rebound));
        }
        prop_assert_eq!(*first, Some(value));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2 + 3. At-most-once settlement and the delay floor
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn settlements_apply_once_and_never_early(
        delay in 0u64..300,
        steps in proptest::collection::vec(arb_step(), 1..40),
    ) {
        let lab = LabHost::new();
        let recorder = Recorder::new();
        let binding = recorder
            .attach(
                AwaitBuilder::new()
                    .delay(Duration::from_millis(delay))
                    .render(|s: &ResolveState<usize, String>| s.status),
            )
            .build(lab.handle())
            .expect("render supplied");

        let mut resolvers: Vec<Option<Resolver<usize, String>>> = Vec::new();
        // Index of the latest bound promise and when it settled.
        let mut latest: Option<usize> = None;
        let mut latest_settled_at: Option<Duration> = None;
        let mut applied = 0usize;

        for step in steps {
            match step {
                Step::Bind => {
                    let (promise, resolver) = Promise::pending();
                    resolvers.push(Some(resolver));
                    latest = Some(resolvers.len() - 1);
                    latest_settled_at = None;
                    binding.evaluate(promise.into());
                }
                Step::Settle(index, ok) => {
                    if resolvers.is_empty() {
                        continue;
                    }
                    let index = index % resolvers.len();
                    if let Some(resolver) = resolvers[index].take() {
                        if ok {
                            resolver.resolve(index);
                        } else {
                            resolver.reject(format!("e{index}"));
                        }
                        if latest == Some(index) {
                            latest_settled_at = Some(lab.now());
                        }
                    }
                }
                Step::Advance(ms) => {
                    lab.advance(Duration::from_millis(ms));
                }
                Step::Reuse => {
                    binding.evaluate(Source::Reuse);
                }
            }

            let finals = recorder.count(|h| matches!(h, Hook::Final(_)));
            prop_assert!(finals <= applied + 1);
            if finals > applied {
                applied = finals;
                let settled_at = latest_settled_at.expect("only the latest promise lands");
                prop_assert!(lab.now() >= settled_at + Duration::from_millis(delay));
                let state = binding.state();
                prop_assert_ne!(state.status, Status::Pending);
                if let (Some(value), Status::Resolved) = (state.value, state.status) {
                    prop_assert_eq!(Some(value), latest);
                }
                // A settled promise cannot land twice.
                latest_settled_at = None;
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Paused watch never starts work
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn paused_watch_never_starts_work(deps in proptest::collection::vec(any::<u8>(), 1..30)) {
        let lab = LabHost::new();
        let calls = Rc::new(RefCell::new(0usize));
        let sink = Rc::clone(&calls);
        let mut watch = AwaitBuilder::new()
            .delay(Duration::ZERO)
            .render(|s: &ResolveState<u8, ()>| s.status)
            .watching(Compare::identity(), move |dep: &u8, _| {
                *sink.borrow_mut() += 1;
                Promise::resolved(*dep)
            })
            .build(lab.handle())
            .expect("render supplied");
        let handle = watch.watch_handle();
        watch.evaluate(0);
        lab.tick();
        handle.un_watch();

        for dep in deps {
            watch.evaluate(dep);
            handle.update();
            lab.tick();
        }
        prop_assert_eq!(*calls.borrow(), 1);
        prop_assert!(!handle.is_watching());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Gating never changes outcomes
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn gated_promises_adopt_original_outcomes(
        order in arb_order(),
        outcomes in proptest::collection::vec(any::<Option<u8>>(), 1..8),
    ) {
        let lab = LabHost::new();
        let config = ListConfig::new(order).with_gap(Duration::from_millis(10));
        let mut list = AwaitList::new(config, lab.handle());
        let children: Vec<ListChild<u8, ()>> = outcomes
            .iter()
            .map(|o| match o {
                Some(v) => Promise::resolved(*v).into(),
                None => Promise::rejected(()).into(),
            })
            .collect();
        let gated: Vec<Promise<u8, ()>> = list
            .arrange(children)
            .into_iter()
            .filter_map(|slot| slot.into_source()?.promise().cloned())
            .collect();
        prop_assert_eq!(gated.len(), outcomes.len());

        lab.run_until_idle();
        for (promise, expected) in gated.iter().zip(&outcomes) {
            let outcome = promise.peek().expect("settled after idle");
            prop_assert_eq!(outcome.value().copied(), *expected);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Expanded chains reveal in order
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn expanded_chain_reveals_in_order(len in 1usize..8, backwards in any::<bool>()) {
        let lab = LabHost::new();
        let order = if backwards { RevealOrder::Backwards } else { RevealOrder::Forwards };
        let config = ListConfig::new(order).with_gap(Duration::from_millis(25));
        let mut list = AwaitList::new(config, lab.handle());
        let children: Vec<ListChild<usize, ()>> =
            (0..len).map(|i| Promise::resolved(i).into()).collect();
        let mut gated: Vec<Promise<usize, ()>> = list
            .arrange(children)
            .into_iter()
            .filter_map(|slot| slot.into_source()?.promise().cloned())
            .collect();
        if backwards {
            gated.reverse();
        }

        for revealed in 1..=len {
            lab.advance(Duration::from_millis(25));
            let settled = gated.iter().filter(|g| g.is_settled()).count();
            prop_assert_eq!(settled, revealed);
            prop_assert!(gated[..revealed].iter().all(Promise::is_settled));
        }
    }
}
