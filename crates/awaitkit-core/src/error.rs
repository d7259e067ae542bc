#![forbid(unsafe_code)]

use futures::task::SpawnError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AwaitError>;

/// Faults raised by awaitkit itself.
///
/// Promise rejections are not errors here: they are data, reported through
/// the resolve state of the binding that observed them.
#[derive(Debug, Error)]
pub enum AwaitError {
    #[error("binding {binding} was built without a render callback")]
    MissingRender { binding: &'static str },

    #[error("unknown reveal order: {value:?} (expected forwards, backwards, or together)")]
    UnknownOrder { value: String },

    #[error("unknown tail mode: {value:?} (expected collapsed or expanded)")]
    UnknownTail { value: String },

    #[error("failed to spawn promise driver: {0}")]
    Spawn(#[from] SpawnError),
}

impl AwaitError {
    #[must_use]
    pub fn unknown_order(value: impl Into<String>) -> Self {
        Self::UnknownOrder {
            value: value.into(),
        }
    }

    #[must_use]
    pub fn unknown_tail(value: impl Into<String>) -> Self {
        Self::UnknownTail {
            value: value.into(),
        }
    }
}
