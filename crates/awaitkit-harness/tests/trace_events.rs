#![forbid(unsafe_code)]

//! Diagnostic events emitted by the runtime.
//!
//! Runs scenarios under the in-memory capture layer and checks that the
//! lifecycle and fallback paths leave the expected `tracing` events.

use awaitkit_core::lab::LabHost;
use awaitkit_core::promise::Promise;
use awaitkit_harness::{LabVisibility, capture_events, saw};
use awaitkit_runtime::{AwaitBuilder, AwaitView, ListConfig, ResolveState, ViewOptions};
use tracing::Level;
use web_time::Duration;

#[test]
fn binding_lifecycle_is_logged() {
    let ((), events) = capture_events(|| {
        let lab = LabHost::new();
        let binding = AwaitBuilder::new()
            .delay(Duration::ZERO)
            .render(|s: &ResolveState<u8, String>| s.status)
            .build(lab.handle())
            .expect("render supplied");
        binding.evaluate(Promise::resolved(1).into());
        lab.tick();
    });
    assert!(saw(&events, Level::DEBUG, "binding promise"));
    assert!(saw(&events, Level::DEBUG, "settlement applied"));
}

#[test]
fn stale_settlement_is_traced() {
    let ((), events) = capture_events(|| {
        let lab = LabHost::new();
        let binding = AwaitBuilder::new()
            .render(|s: &ResolveState<u8, String>| s.status)
            .build(lab.handle())
            .expect("render supplied");
        let (old, resolve_old) = Promise::pending();
        binding.evaluate(old.into());
        binding.evaluate(Promise::pending().0.into());
        resolve_old.resolve(1);
    });
    assert!(saw(&events, Level::TRACE, "superseded"));
    assert!(saw(&events, Level::TRACE, "stale settlement ignored"));
}

#[test]
fn unknown_order_warns_and_passes_through() {
    let (config, events) = capture_events(|| ListConfig::from_names(Some("sideways"), None));
    assert!(config.is_pass_through());
    assert!(saw(&events, Level::WARN, "list falls back to pass-through"));
}

#[test]
fn update_before_first_settlement_is_traced() {
    let ((), events) = capture_events(|| {
        let lab = LabHost::new();
        let mut watch = AwaitBuilder::new()
            .render(|s: &ResolveState<u8, String>| s.status)
            .watching(awaitkit_core::Compare::Disabled, |_: &(), _| {
                Promise::pending().0
            })
            .build(lab.handle())
            .expect("render supplied");
        watch.evaluate(());
        watch.watch_handle().update();
    });
    assert!(saw(&events, Level::TRACE, "update ignored before first settlement"));
}

#[test]
fn view_reveal_is_logged() {
    let ((), events) = capture_events(|| {
        let view: AwaitView<u8, ()> =
            AwaitView::new(ViewOptions::default(), LabVisibility::new().handle());
        view.arrange(Promise::resolved(1).into());
        view.mount();
    });
    assert!(saw(&events, Level::DEBUG, "view revealed"));
}
