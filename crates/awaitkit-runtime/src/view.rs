#![forbid(unsafe_code)]

//! Visibility-deferred await bindings.
//!
//! [`AwaitView`] holds back a child binding's promise until the child's
//! placeholder becomes visible. Until then the child is fed a stable
//! *deferred* promise and can expose [`AwaitView::placeholder`] to the host
//! so the host attaches a real node to it. On the first intersection event
//! accepted by the predicate the deferred promise adopts the (tracked)
//! original, the observer is disconnected, and the placeholder is released.
//!
//! The host calls [`AwaitView::mount`] once the first pass has been
//! committed. If no node is attached by then, the reveal happens right away.
//!
//! # Invariants
//!
//! 1. The reveal happens at most once.
//! 2. The child sees one deferred identity for as long as it keeps supplying
//!    the same original promise, before and after the reveal.
//! 3. The observer subscription never outlives the view.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use awaitkit_core::promise::{Promise, Resolver};
use awaitkit_core::track;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::binding::Source;

// ─── Geometry contract ───────────────────────────────────────────────────────

/// Host node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(pub u64);

/// Element the intersection is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ViewRoot {
    #[default]
    Viewport,
    /// The placeholder's parent node.
    Parent,
    Node(NodeId),
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ViewOptions {
    pub root: ViewRoot,
    /// Margin around the root, in the host's own syntax.
    pub root_margin: Option<String>,
    /// Visible fraction at which events fire.
    pub threshold: f64,
}

impl ViewOptions {
    #[must_use]
    pub fn with_root(mut self, root: ViewRoot) -> Self {
        self.root = root;
        self
    }

    #[must_use]
    pub fn with_root_margin(mut self, margin: impl Into<String>) -> Self {
        self.root_margin = Some(margin.into());
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

/// One geometry change reported by the visibility collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub is_intersecting: bool,
    pub intersection_ratio: f64,
}

impl IntersectionEntry {
    #[must_use]
    pub const fn new(is_intersecting: bool, intersection_ratio: f64) -> Self {
        Self {
            is_intersecting,
            intersection_ratio,
        }
    }
}

/// The default reveal predicate.
#[must_use]
pub fn is_intersecting(entry: &IntersectionEntry) -> bool {
    entry.is_intersecting
}

pub type IntersectionCallback = Box<dyn FnMut(&IntersectionEntry)>;

/// The visibility collaborator.
pub trait VisibilityObserver {
    /// Report geometry changes of `target` to `on_event` until the returned
    /// subscription is dropped.
    fn observe(
        &self,
        target: NodeId,
        options: &ViewOptions,
        on_event: IntersectionCallback,
    ) -> ObserverSubscription;
}

/// RAII guard that disconnects an observation when dropped.
pub struct ObserverSubscription {
    disconnect: Option<Box<dyn FnOnce()>>,
}

impl ObserverSubscription {
    pub fn new(disconnect: impl FnOnce() + 'static) -> Self {
        Self {
            disconnect: Some(Box::new(disconnect)),
        }
    }

    /// A subscription with nothing to disconnect.
    #[must_use]
    pub fn inert() -> Self {
        Self { disconnect: None }
    }
}

impl Drop for ObserverSubscription {
    fn drop(&mut self) {
        if let Some(disconnect) = self.disconnect.take() {
            disconnect();
        }
    }
}

impl fmt::Debug for ObserverSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSubscription")
            .field("active", &self.disconnect.is_some())
            .finish()
    }
}

/// Slot the host fills with the node standing in for a hidden child.
#[derive(Clone, Default)]
pub struct Placeholder {
    node: Rc<Cell<Option<NodeId>>>,
}

impl Placeholder {
    pub fn attach(&self, node: NodeId) {
        self.node.set(Some(node));
    }

    pub fn detach(&self) {
        self.node.set(None);
    }

    #[must_use]
    pub fn node(&self) -> Option<NodeId> {
        self.node.get()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.node.get().is_some()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl fmt::Debug for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Placeholder").field(&self.node.get()).finish()
    }
}

// ─── View ────────────────────────────────────────────────────────────────────

type Predicate = Rc<dyn Fn(&IntersectionEntry) -> bool>;

struct ViewInner<T, E> {
    options: ViewOptions,
    predicate: RefCell<Predicate>,
    observer: Rc<dyn VisibilityObserver>,
    placeholder: Placeholder,
    deferred: Promise<T, E>,
    resolver: RefCell<Option<Resolver<T, E>>>,
    /// Latest promise supplied by the child.
    original: RefCell<Option<Promise<T, E>>>,
    mounted: Cell<bool>,
    revealed: Cell<bool>,
    subscription: RefCell<Option<ObserverSubscription>>,
}

impl<T: Clone + 'static, E: Clone + 'static> ViewInner<T, E> {
    fn reveal(&self) {
        if self.revealed.replace(true) {
            return;
        }
        let subscription = self.subscription.borrow_mut().take();
        drop(subscription);
        self.placeholder.detach();

        let original = self.original.borrow().clone();
        let resolver = self.resolver.borrow_mut().take();
        tracing::debug!(
            deferred = %self.deferred.id(),
            original = ?original.as_ref().map(Promise::id),
            "view revealed"
        );
        if let (Some(resolver), Some(original)) = (resolver, original) {
            resolver.adopt(&track::track(&original));
        }
    }
}

/// Defers a child await binding until its placeholder is visible.
pub struct AwaitView<T, E> {
    inner: Rc<ViewInner<T, E>>,
}

impl<T, E> fmt::Debug for AwaitView<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwaitView")
            .field("options", &self.inner.options)
            .field("placeholder", &self.inner.placeholder)
            .field("mounted", &self.inner.mounted.get())
            .field("revealed", &self.inner.revealed.get())
            .finish()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> AwaitView<T, E> {
    #[must_use]
    pub fn new(options: ViewOptions, observer: Rc<dyn VisibilityObserver>) -> Self {
        let (deferred, resolver) = Promise::pending();
        let predicate: Predicate = Rc::new(is_intersecting);
        Self {
            inner: Rc::new(ViewInner {
                options,
                predicate: RefCell::new(predicate),
                observer,
                placeholder: Placeholder::default(),
                deferred,
                resolver: RefCell::new(Some(resolver)),
                original: RefCell::new(None),
                mounted: Cell::new(false),
                revealed: Cell::new(false),
                subscription: RefCell::new(None),
            }),
        }
    }

    /// Replace the predicate deciding which events count as "visible".
    #[must_use]
    pub fn on_intersection(self, predicate: impl Fn(&IntersectionEntry) -> bool + 'static) -> Self {
        *self.inner.predicate.borrow_mut() = Rc::new(predicate);
        self
    }

    /// Route the child's source through the view.
    pub fn arrange(&self, source: Source<T, E>) -> Source<T, E> {
        let inner = &self.inner;
        let Source::Bind(promise) = source else {
            return source;
        };
        if !inner.revealed.get() {
            *inner.original.borrow_mut() = Some(promise);
            return Source::Bind(inner.deferred.clone());
        }
        let same = inner
            .original
            .borrow()
            .as_ref()
            .is_some_and(|original| original.ptr_eq(&promise));
        if same {
            Source::Bind(inner.deferred.clone())
        } else {
            Source::Bind(promise)
        }
    }

    /// Start observing once the first pass is committed. Idempotent.
    pub fn mount(&self) {
        let inner = &self.inner;
        if inner.mounted.replace(true) || inner.revealed.get() {
            return;
        }
        let Some(node) = inner.placeholder.node() else {
            inner.reveal();
            return;
        };

        tracing::trace!(?node, root = ?inner.options.root, "observing placeholder");
        let weak: Weak<ViewInner<T, E>> = Rc::downgrade(inner);
        let subscription = inner.observer.observe(
            node,
            &inner.options,
            Box::new(move |entry| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let predicate = Rc::clone(&*inner.predicate.borrow());
                if predicate(entry) {
                    inner.reveal();
                }
            }),
        );
        if inner.revealed.get() {
            drop(subscription);
        } else {
            *inner.subscription.borrow_mut() = Some(subscription);
        }
    }

    /// The slot the host attaches the stand-in node to.
    #[must_use]
    pub fn placeholder(&self) -> Placeholder {
        self.inner.placeholder.clone()
    }

    /// The promise the child sees while hidden.
    #[must_use]
    pub fn deferred(&self) -> Promise<T, E> {
        self.inner.deferred.clone()
    }

    #[must_use]
    pub fn is_revealed(&self) -> bool {
        self.inner.revealed.get()
    }

    #[must_use]
    pub fn options(&self) -> &ViewOptions {
        &self.inner.options
    }
}
