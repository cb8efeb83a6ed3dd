// ============================================================================
// spark-watch - Watch
// The terminal observer: turns graph notifications into (new, old) callbacks
// ============================================================================
//
// A Watch binds to exactly one source for its whole life. It caches the
// source's value, registers itself, and on every notification decides
// whether to call its handler:
//
// - forced (source_changed = true): a direct cell write, always fire
// - advisory (source_changed = false): relayed through computeds, fire only
//   if the source says `was_dirty` for this watch
//
// The advisory check is what makes a watch fire exactly once per logical
// change under diamond fan-in, and not at all when a computed re-evaluates
// to the same value.
// ============================================================================

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use crate::core::constants::WATCH;
use crate::core::types::{AnySource, NodeId, Observer, ReactiveValue};
use crate::primitives::computed::{computed, Computed};
use crate::primitives::signal::Signal;
use crate::reactivity::batching::untrack;

/// Handler signature: `(new, old)`.
pub type WatchHandler<T> = Box<dyn FnMut(&T, &T)>;

// =============================================================================
// WATCH INNER
// =============================================================================

/// The registered part of a watch. Sources hold it weakly.
pub struct WatchInner<T: 'static> {
    id: NodeId,
    handler: RefCell<WatchHandler<T>>,
    cached: RefCell<T>,
    source: Rc<dyn ReactiveValue<T>>,
}

impl<T: Clone + 'static> Observer for WatchInner<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn flags(&self) -> u32 {
        WATCH
    }

    fn on_notify(&self, source_changed: bool) {
        // A notification arriving while our own handler runs can only come
        // from a foreign source delivering synchronously.
        let Ok(mut handler) = self.handler.try_borrow_mut() else {
            tracing::warn!(watch = %self.id, "re-entrant notification ignored");
            return;
        };

        if !source_changed && !self.source.was_dirty(self.id) {
            tracing::trace!(watch = %self.id, source = %self.source.id(), "source clean, not firing");
            return;
        }

        let new_value = untrack(|| self.source.value());
        {
            let old_value = self.cached.borrow();
            tracing::trace!(watch = %self.id, forced = source_changed, "firing handler");
            untrack(|| (*handler)(&new_value, &*old_value));
        }
        // Only reached when the handler returned normally
        *self.cached.borrow_mut() = new_value;
    }

    /// A watch observes only the source it was built with; incidental
    /// reads never add edges.
    fn add_source(&self, _source: Rc<dyn AnySource>) {}
}

impl<T: 'static> Drop for WatchInner<T> {
    fn drop(&mut self) {
        self.source.remove_observer(self.id);
        tracing::trace!(watch = %self.id, source = %self.source.id(), "watch deregistered");
    }
}

// =============================================================================
// WATCH<T> - The public handle
// =============================================================================

/// Calls a handler with `(new, old)` whenever its single source changes.
///
/// The handler never runs at construction. Dropping the watch deregisters it
/// from the source; there is no other way to cancel. Two watches are never
/// equal: equality and hashing use the per-instance [`NodeId`].
///
/// # Example
///
/// ```
/// use spark_watch::{signal, Watch};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let count = signal(0);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let log = seen.clone();
/// let watch = Watch::from_signal(&count, move |new, old| {
///     log.borrow_mut().push((*old, *new));
/// });
///
/// count.set(5);
/// count.set(5); // equal write, no notification
/// count.set(7);
/// assert_eq!(*seen.borrow(), vec![(0, 5), (5, 7)]);
///
/// drop(watch);
/// count.set(9);
/// assert_eq!(seen.borrow().len(), 2);
/// ```
pub struct Watch<T: 'static> {
    inner: Rc<WatchInner<T>>,
}

impl<T: Clone + 'static> Watch<T> {
    /// Watch a mutable cell.
    pub fn from_signal(signal: &Signal<T>, handler: impl FnMut(&T, &T) + 'static) -> Self {
        Self::with_source(signal.as_reactive(), Box::new(handler))
    }

    /// Watch an existing computed value.
    pub fn from_computed(computed: &Computed<T>, handler: impl FnMut(&T, &T) + 'static) -> Self {
        Self::with_source(computed.as_reactive(), Box::new(handler))
    }

    /// Watch an inline expression over other reactive values.
    ///
    /// The expression is wrapped in a new computed owned by the watch, so the
    /// handler only fires when the expression's result changes.
    ///
    /// # Example
    ///
    /// ```
    /// use spark_watch::{signal, Watch};
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let a = signal(1);
    /// let b = signal(2);
    /// let fired = Rc::new(Cell::new(0));
    ///
    /// let (a2, b2, f) = (a.clone(), b.clone(), fired.clone());
    /// let _watch = Watch::from_fn(move || a2.get() + b2.get(), move |_, _| f.set(f.get() + 1));
    ///
    /// a.set(2); // 3 -> 4
    /// b.set(1); // 4 -> 3
    /// a.set(2); // equal write, nothing to do
    /// assert_eq!(fired.get(), 2);
    /// ```
    pub fn from_fn<F>(expr: F, handler: impl FnMut(&T, &T) + 'static) -> Self
    where
        T: PartialEq,
        F: Fn() -> T + 'static,
    {
        Self::with_source(computed(expr).as_reactive(), Box::new(handler))
    }

    /// Watch any source implementing the capability.
    pub fn from_reactive(
        source: Rc<dyn ReactiveValue<T>>,
        handler: impl FnMut(&T, &T) + 'static,
    ) -> Self {
        Self::with_source(source, Box::new(handler))
    }

    /// The one construction path: cache, then register. Never fires.
    fn with_source(source: Rc<dyn ReactiveValue<T>>, handler: WatchHandler<T>) -> Self {
        let initial = untrack(|| source.value());
        let inner = Rc::new(WatchInner {
            id: NodeId::next(),
            handler: RefCell::new(handler),
            cached: RefCell::new(initial),
            source,
        });

        let observer: Weak<WatchInner<T>> = Rc::downgrade(&inner);
        inner.source.add_observer(observer);

        tracing::trace!(
            watch = %inner.id,
            source = %inner.source.id(),
            label = inner.source.label().unwrap_or(""),
            "watch registered"
        );

        Self { inner }
    }

    /// Identity of this watch
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The value the handler last saw as "new" (or the initial source value)
    pub fn last_value(&self) -> T {
        self.inner.cached.borrow().clone()
    }

    /// Identity of the watched source
    pub fn source_id(&self) -> NodeId {
        self.inner.source.id()
    }

    /// Whether the source currently lists this watch as an observer
    pub fn is_registered(&self) -> bool {
        self.inner.source.has_observer(self.inner.id)
    }

    /// This watch as an observer, e.g. to drive it from a custom source.
    pub fn as_observer(&self) -> Rc<dyn Observer> {
        self.inner.clone()
    }
}

impl<T: 'static> PartialEq for Watch<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<T: 'static> Eq for Watch<T> {}

impl<T: 'static> Hash for Watch<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Watch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source.id())
            .field("last_value", &*self.inner.cached.borrow())
            .finish()
    }
}

// =============================================================================
// WATCH CREATION FUNCTIONS
// =============================================================================

/// Watch a signal. Same as [`Watch::from_signal`].
pub fn watch<T, H>(signal: &Signal<T>, handler: H) -> Watch<T>
where
    T: Clone + 'static,
    H: FnMut(&T, &T) + 'static,
{
    Watch::from_signal(signal, handler)
}

/// Watch a computed value. Same as [`Watch::from_computed`].
pub fn watch_computed<T, H>(computed: &Computed<T>, handler: H) -> Watch<T>
where
    T: Clone + 'static,
    H: FnMut(&T, &T) + 'static,
{
    Watch::from_computed(computed, handler)
}

/// Watch an inline expression. Same as [`Watch::from_fn`].
pub fn watch_fn<T, F, H>(expr: F, handler: H) -> Watch<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
    H: FnMut(&T, &T) + 'static,
{
    Watch::from_fn(expr, handler)
}

// =============================================================================
// TESTS
// =============================================================================
