#![forbid(unsafe_code)]

//! Runtime: the await engine and the bindings layered on it.
//!
//! - [`binding`]: one promise bound to one rendered output.
//! - [`watched`] and [`watch`]: dependency-driven bindings and their
//!   pause/resume/update handle.
//! - [`list`]: sequenced reveal across several bindings.
//! - [`view`]: bindings deferred until their placeholder is visible.

pub mod binding;
pub mod config;
pub mod list;
pub mod state;
pub mod view;
pub mod watch;
pub mod watched;

pub use binding::{AwaitBinding, AwaitBuilder, Source};
pub use config::{AwaitConfig, DEFAULT_DELAY, DEFAULT_GAP, ListConfig, RevealOrder, Tail};
pub use list::{AwaitList, ListChild, ListSlot};
pub use state::{ResolveState, Status, is_pending, is_rejected, is_resolved};
pub use view::{
    AwaitView, IntersectionEntry, NodeId, ObserverSubscription, Placeholder, ViewOptions, ViewRoot,
    VisibilityObserver,
};
pub use watch::WatchHandle;
pub use watched::{AwaitWatch, WatchBuilder};
