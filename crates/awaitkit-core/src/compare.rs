#![forbid(unsafe_code)]

//! Dependency comparison strategies.
//!
//! A [`Compare<D>`] decides whether a dependency snapshot changed enough to
//! warrant new async work. Three stock strategies mirror the usual shapes of
//! dependency values:
//!
//! - [`identity_changed`]: the whole value differs.
//! - [`shallow_object_changed`]: some field present in the **new** snapshot
//!   differs from the same field in the old one (one level deep).
//! - [`shallow_array_changed`]: some index present in the **new** snapshot
//!   differs; growth counts as a change because the missing old index never
//!   compares equal.
//!
//! Field and element equality is `PartialEq`. Wrap shared values in
//! [`ByRef`] to compare them by pointer identity instead.
//!
//! [`Compare::Disabled`] never reports a change, leaving explicit update
//! requests as the only trigger.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;

/// A pluggable "did the dependency change?" predicate.
pub enum Compare<D: ?Sized> {
    /// Never compare automatically.
    Disabled,
    /// `changed(new, old)`.
    Changed(Rc<dyn Fn(&D, &D) -> bool>),
}

impl<D: ?Sized> Clone for Compare<D> {
    fn clone(&self) -> Self {
        match self {
            Self::Disabled => Self::Disabled,
            Self::Changed(f) => Self::Changed(Rc::clone(f)),
        }
    }
}

impl<D: ?Sized> fmt::Debug for Compare<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Compare::Disabled"),
            Self::Changed(_) => f.write_str("Compare::Changed(..)"),
        }
    }
}

impl<D: ?Sized + 'static> Compare<D> {
    pub fn custom(changed: impl Fn(&D, &D) -> bool + 'static) -> Self {
        Self::Changed(Rc::new(changed))
    }

    /// Whole-value inequality.
    #[must_use]
    pub fn identity() -> Self
    where
        D: PartialEq,
    {
        Self::custom(identity_changed::<D>)
    }

    /// One-level field comparison over an [`ObjectLike`] snapshot.
    #[must_use]
    pub fn shallow_object() -> Self
    where
        D: ObjectLike,
        D::Value: PartialEq,
    {
        Self::custom(shallow_object_changed::<D>)
    }

    /// One-level element comparison over an [`ArrayLike`] snapshot.
    #[must_use]
    pub fn shallow_array() -> Self
    where
        D: ArrayLike,
        D::Item: PartialEq,
    {
        Self::custom(|new: &D, old: &D| shallow_array_changed(new.items(), old.items()))
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Changed(_))
    }

    /// Evaluate the strategy. Always `false` when disabled.
    #[must_use]
    pub fn changed(&self, new: &D, old: &D) -> bool {
        match self {
            Self::Disabled => false,
            Self::Changed(f) => f(new, old),
        }
    }
}

// ─── Stock strategies ────────────────────────────────────────────────────────

#[must_use]
pub fn identity_changed<D: PartialEq + ?Sized>(new: &D, old: &D) -> bool {
    new != old
}

#[must_use]
pub fn shallow_object_changed<D>(new: &D, old: &D) -> bool
where
    D: ObjectLike + ?Sized,
    D::Value: PartialEq,
{
    new.fields().any(|(key, value)| old.field(key) != Some(value))
}

#[must_use]
pub fn shallow_array_changed<V: PartialEq>(new: &[V], old: &[V]) -> bool {
    new.iter()
        .enumerate()
        .any(|(index, value)| old.get(index) != Some(value))
}

/// Keyed snapshot usable with [`shallow_object_changed`].
pub trait ObjectLike {
    type Key;
    type Value;

    /// Every (key, value) pair of the snapshot.
    fn fields(&self) -> impl Iterator<Item = (&Self::Key, &Self::Value)>;

    fn field(&self, key: &Self::Key) -> Option<&Self::Value>;
}

impl<K: Eq + Hash, V, S: BuildHasher> ObjectLike for HashMap<K, V, S> {
    type Key = K;
    type Value = V;

    fn fields(&self) -> impl Iterator<Item = (&K, &V)> {
        self.iter()
    }

    fn field(&self, key: &K) -> Option<&V> {
        self.get(key)
    }
}

impl<K: Ord, V> ObjectLike for BTreeMap<K, V> {
    type Key = K;
    type Value = V;

    fn fields(&self) -> impl Iterator<Item = (&K, &V)> {
        self.iter()
    }

    fn field(&self, key: &K) -> Option<&V> {
        self.get(key)
    }
}

/// Indexed snapshot usable with [`shallow_array_changed`].
pub trait ArrayLike {
    type Item;

    fn items(&self) -> &[Self::Item];
}

impl<V> ArrayLike for [V] {
    type Item = V;

    fn items(&self) -> &[V] {
        self
    }
}

impl<V> ArrayLike for Vec<V> {
    type Item = V;

    fn items(&self) -> &[V] {
        self
    }
}

impl<V, const N: usize> ArrayLike for [V; N] {
    type Item = V;

    fn items(&self) -> &[V] {
        self
    }
}

// ─── ByRef ───────────────────────────────────────────────────────────────────

/// Shared value compared by pointer identity rather than by contents.
pub struct ByRef<T: ?Sized>(pub Rc<T>);

impl<T> ByRef<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(value))
    }
}

impl<T: ?Sized> Clone for ByRef<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: ?Sized> PartialEq for ByRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: ?Sized> Eq for ByRef<T> {}

impl<T: ?Sized> Hash for ByRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.0), state);
    }
}

impl<T: ?Sized> PartialOrd for ByRef<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized> Ord for ByRef<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        Rc::as_ptr(&self.0)
            .cast::<()>()
            .cmp(&Rc::as_ptr(&other.0).cast::<()>())
    }
}

impl<T: ?Sized> Deref for ByRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized> From<Rc<T>> for ByRef<T> {
    fn from(rc: Rc<T>) -> Self {
        Self(rc)
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ByRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ByRef").field(&&*self.0).finish()
    }
}
