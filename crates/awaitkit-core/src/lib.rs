#![forbid(unsafe_code)]

//! Core: settle-once promises with identity, lifecycle tracking, dependency
//! comparison, and the host contract.

pub mod compare;
pub mod error;
pub mod host;
pub mod lab;
pub mod promise;
pub mod track;

pub use compare::{ByRef, Compare};
pub use error::{AwaitError, Result};
pub use host::{ForceUpdate, Host, SiteId, TimerId};
pub use promise::{Outcome, Promise, PromiseId, Resolver};
