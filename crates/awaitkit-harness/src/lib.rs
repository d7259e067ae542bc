#![forbid(unsafe_code)]

//! Deterministic test harness for awaitkit.
//!
//! Pairs the core [`LabHost`](awaitkit_core::lab::LabHost) with a manual
//! visibility observer, a lifecycle recorder, and in-memory `tracing`
//! capture. The integration tests under `tests/` drive whole scenarios
//! through these pieces on a virtual clock.

pub mod scenario;
pub mod trace_capture;
pub mod visibility;

pub use scenario::{Hook, Recorder, advance_ms};
pub use trace_capture::{CapturedEvent, capture_events, init_test_logging, saw};
pub use visibility::LabVisibility;
