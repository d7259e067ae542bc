#![forbid(unsafe_code)]

//! The lifecycle snapshot a binding hands to its render callback.

use std::fmt;

/// Where a binding is in its promise lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// Waiting for the bound promise (or for its display delay).
    #[default]
    Pending,
    /// The bound promise fulfilled.
    Resolved,
    /// The bound promise rejected.
    Rejected,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[inline]
#[must_use]
pub const fn is_pending(status: Status) -> bool {
    matches!(status, Status::Pending)
}

#[inline]
#[must_use]
pub const fn is_resolved(status: Status) -> bool {
    matches!(status, Status::Resolved)
}

#[inline]
#[must_use]
pub const fn is_rejected(status: Status) -> bool {
    matches!(status, Status::Rejected)
}

/// Authoritative lifecycle snapshot of one binding site.
///
/// `value` is sticky: while a newer promise is pending it still holds the
/// last fulfilled value, so the render callback can keep showing stale
/// content. `error` holds the most recent rejection and is cleared by the
/// next fulfillment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveState<T, E> {
    /// True until the first settlement has been observed and displayed.
    pub first: bool,
    pub status: Status,
    pub value: Option<T>,
    pub error: Option<E>,
}

impl<T, E> ResolveState<T, E> {
    /// The state of a fresh binding, optionally seeded with an initial value.
    #[must_use]
    pub fn initial(init: Option<T>) -> Self {
        Self {
            first: true,
            status: Status::Pending,
            value: init,
            error: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        is_pending(self.status)
    }

    #[inline]
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        is_resolved(self.status)
    }

    #[inline]
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        is_rejected(self.status)
    }
}

impl<T, E> Default for ResolveState<T, E> {
    fn default() -> Self {
        Self::initial(None)
    }
}
