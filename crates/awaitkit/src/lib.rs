#![forbid(unsafe_code)]

//! awaitkit public facade crate.
//!
//! Bind promises to rendered output, watch dependencies, sequence reveals
//! across lists, and defer work until a placeholder becomes visible.
//!
//! ```
//! use awaitkit::prelude::*;
//! use awaitkit::core::lab::LabHost;
//! use web_time::Duration;
//!
//! let lab = LabHost::new();
//! let binding = AwaitBuilder::new()
//!     .delay(Duration::from_millis(300))
//!     .render(|state: &ResolveState<u32, String>| state.status)
//!     .build(lab.handle())
//!     .unwrap();
//!
//! binding.evaluate(Promise::resolved(7).into());
//! lab.advance(Duration::from_millis(300));
//! assert_eq!(binding.state().value, Some(7));
//! ```

pub use awaitkit_core as core;
pub use awaitkit_runtime as runtime;

pub mod prelude {
    pub use awaitkit_core::{
        AwaitError, ByRef, Compare, ForceUpdate, Host, Outcome, Promise, Resolver, SiteId,
    };
    pub use awaitkit_core::track;
    pub use awaitkit_runtime::{
        AwaitBinding, AwaitBuilder, AwaitConfig, AwaitList, AwaitView, AwaitWatch, ListChild,
        ListConfig, ListSlot, ResolveState, RevealOrder, Source, Status, Tail, ViewOptions,
        WatchHandle,
    };
}
