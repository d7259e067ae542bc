#![forbid(unsafe_code)]

//! Binding and list configuration.
//!
//! All durations are host time units expressed as [`Duration`]. With the
//! `serde` feature these structs round-trip through any serde format, so a
//! host can keep binding defaults next to its own settings.

use std::fmt;
use std::str::FromStr;

use awaitkit_core::AwaitError;
use web_time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Minimum time a binding stays pending after its promise settles.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(300);

/// Pause between consecutive reveals of a sequenced list.
pub const DEFAULT_GAP: Duration = Duration::from_millis(300);

// ─── Await ───────────────────────────────────────────────────────────────────

/// Engine settings shared by every await binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AwaitConfig {
    /// Display delay applied after each settlement.
    pub delay: Duration,
    /// Seed the first evaluation as resolved with the initial value instead of
    /// awaiting anything.
    pub jump_first: bool,
}

impl Default for AwaitConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            jump_first: false,
        }
    }
}

impl AwaitConfig {
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_jump_first(mut self, jump_first: bool) -> Self {
        self.jump_first = jump_first;
        self
    }
}

// ─── List ────────────────────────────────────────────────────────────────────

/// Order in which a list grants visibility to its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RevealOrder {
    Forwards,
    Backwards,
    /// Every entry becomes visible in the same pass, once all have settled.
    Together,
}

impl RevealOrder {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forwards => "forwards",
            Self::Backwards => "backwards",
            Self::Together => "together",
        }
    }
}

impl fmt::Display for RevealOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevealOrder {
    type Err = AwaitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forwards" => Ok(Self::Forwards),
            "backwards" => Ok(Self::Backwards),
            "together" => Ok(Self::Together),
            other => Err(AwaitError::unknown_order(other)),
        }
    }
}

/// How the not-yet-revealed tail of a sequenced list behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Tail {
    /// Every entry is chained and stays visible (pending) while it waits.
    #[default]
    Expanded,
    /// Only the next entry advances per pass; the rest render nothing.
    Collapsed,
}

impl Tail {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expanded => "expanded",
            Self::Collapsed => "collapsed",
        }
    }
}

impl fmt::Display for Tail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tail {
    type Err = AwaitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expanded" => Ok(Self::Expanded),
            "collapsed" => Ok(Self::Collapsed),
            other => Err(AwaitError::unknown_tail(other)),
        }
    }
}

/// Settings for [`AwaitList`](crate::list::AwaitList).
///
/// `order: None` turns the list into a pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ListConfig {
    pub order: Option<RevealOrder>,
    pub tail: Tail,
    pub gap: Duration,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            order: None,
            tail: Tail::default(),
            gap: DEFAULT_GAP,
        }
    }
}

impl ListConfig {
    #[must_use]
    pub fn new(order: RevealOrder) -> Self {
        Self {
            order: Some(order),
            ..Self::default()
        }
    }

    /// Build from loosely typed names.
    ///
    /// An unrecognized order yields a pass-through list; an unrecognized tail
    /// falls back to [`Tail::Expanded`]. Neither is an error at this layer.
    #[must_use]
    pub fn from_names(order: Option<&str>, tail: Option<&str>) -> Self {
        let order = order.and_then(|name| match name.parse::<RevealOrder>() {
            Ok(order) => Some(order),
            Err(err) => {
                tracing::warn!(%err, "list falls back to pass-through");
                None
            }
        });
        let tail = tail
            .and_then(|name| name.parse::<Tail>().ok())
            .unwrap_or_default();
        Self {
            order,
            tail,
            gap: DEFAULT_GAP,
        }
    }

    #[must_use]
    pub fn with_tail(mut self, tail: Tail) -> Self {
        self.tail = tail;
        self
    }

    #[must_use]
    pub fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_pass_through(&self) -> bool {
        self.order.is_none()
    }
}
