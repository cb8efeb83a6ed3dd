// ============================================================================
// spark-watch - Signal Primitive
// The mutable cell: the root of every change
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::{COMPUTED, SOURCE};
use crate::core::context::with_context;
use crate::core::error::ReactiveError;
use crate::core::types::{
    default_equals, AnySource, EqualsFn, NodeId, Observer, ObserverSet, ReactiveValue,
};
use crate::reactivity::equality::{never_equals, safe_equals_f64};
use crate::reactivity::tracking::{check_write_allowed, notify_write, track_read};

// =============================================================================
// SIGNAL INNER
// =============================================================================

/// The data behind a `Signal<T>`.
///
/// Separate from the handle so it can be shared as `Rc<dyn ReactiveValue<T>>`
/// with watches and as `Rc<dyn AnySource>` with computeds.
pub struct SignalInner<T> {
    id: NodeId,
    value: RefCell<T>,
    version: Cell<u64>,
    equals: EqualsFn<T>,
    observers: ObserverSet,
    /// Per watch: the value it had before the first write it has not been
    /// told about yet
    baselines: RefCell<Vec<(NodeId, T)>>,
    label: Option<String>,
}

impl<T> SignalInner<T> {
    fn new(value: T, equals: EqualsFn<T>, label: Option<String>) -> Self {
        Self {
            id: NodeId::next(),
            value: RefCell::new(value),
            version: Cell::new(0),
            equals,
            observers: ObserverSet::new(),
            baselines: RefCell::new(Vec::new()),
            label,
        }
    }

    /// Store `value` if it differs from the current one. Returns whether it did.
    fn replace(&self, value: T) -> bool
    where
        T: Clone,
    {
        if (self.equals)(&self.value.borrow(), &value) {
            return false;
        }
        let old = self.value.replace(value);
        self.record_baselines(old);
        self.bump_version();
        true
    }

    /// Remember `old` for every watch without a delivery already queued.
    ///
    /// Watches with one queued keep their earlier baseline, so several
    /// writes before delivery are judged by their net effect.
    fn record_baselines(&self, old: T)
    where
        T: Clone,
    {
        let watches: Vec<NodeId> = self
            .observers
            .snapshot()
            .iter()
            .filter(|o| o.flags() & COMPUTED == 0)
            .map(|o| o.id())
            .collect();
        let fresh: Vec<NodeId> =
            with_context(|ctx| watches.into_iter().filter(|id| !ctx.is_pending(*id)).collect());

        let mut baselines = self.baselines.borrow_mut();
        for id in fresh {
            match baselines.iter_mut().find(|(seen, _)| *seen == id) {
                Some(entry) => entry.1 = old.clone(),
                None => baselines.push((id, old.clone())),
            }
        }
    }

    fn take_baseline(&self, observer: NodeId) -> Option<T> {
        let mut baselines = self.baselines.borrow_mut();
        let index = baselines.iter().position(|(seen, _)| *seen == observer)?;
        Some(baselines.swap_remove(index).1)
    }

    fn bump_version(&self) {
        self.version.set(self.version.get() + 1);
    }
}

impl<T: 'static> AnySource for SignalInner<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn flags(&self) -> u32 {
        SOURCE
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn add_observer(&self, observer: Weak<dyn Observer>) {
        self.observers.add(observer, self.version.get());
    }

    fn remove_observer(&self, observer: NodeId) {
        self.observers.remove(observer);
        self.take_baseline(observer);
    }

    /// With a recorded baseline, whether the value differs from it; an
    /// A -> B -> A sequence of writes is not dirty. Otherwise whether the
    /// version moved since `observer` last asked.
    fn was_dirty(&self, observer: NodeId) -> bool {
        let version_moved = self.observers.was_dirty(observer, self.version.get());
        match self.take_baseline(observer) {
            Some(before) => !(self.equals)(&before, &self.value.borrow()),
            None => version_moved,
        }
    }

    fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn has_observer(&self, observer: NodeId) -> bool {
        self.observers.contains(observer)
    }

    fn observers(&self) -> Vec<Rc<dyn Observer>> {
        self.observers.snapshot()
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: Clone + 'static> ReactiveValue<T> for SignalInner<T> {
    fn value(&self) -> T {
        self.value.borrow().clone()
    }
}

// =============================================================================
// SIGNAL<T> - The public handle
// =============================================================================

/// A mutable reactive cell.
///
/// Writes compare against the current value with the signal's equality
/// function. An equal write is a no-op: no version bump, no notification. A
/// changed write notifies every direct observer with `source_changed = true`.
///
/// When a watch receives several writes before delivery (inside a batch, or
/// while a delivery round is running), they reach it as one advisory
/// notification, and `was_dirty` compares the current value with the one the
/// watch had before the first of them.
///
/// # Example
///
/// ```
/// use spark_watch::signal;
///
/// let count = signal(0);
/// assert!(count.set(5));
/// assert!(!count.set(5));
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Signal<T> {
    /// Create a new signal compared with PartialEq.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::new_with_equals(value, default_equals)
    }

    /// Create a new signal with a custom equality function.
    pub fn new_with_equals(value: T, equals: EqualsFn<T>) -> Self {
        Self {
            inner: Rc::new(SignalInner::new(value, equals, None)),
        }
    }

    /// Read the value. Inside a computed evaluation this records a dependency.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        track_read(self.inner.clone());
        self.inner.value.borrow().clone()
    }

    /// Read the value without recording a dependency.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Access the value with a closure (tracked, no clone).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        track_read(self.inner.clone());
        f(&self.inner.value.borrow())
    }

    /// Write the value, returning whether it changed.
    ///
    /// # Panics
    ///
    /// When called while a computed is evaluating
    /// ([`ReactiveError::WriteInsideComputed`]), or when a watch handler it
    /// triggers panics.
    pub fn set(&self, value: T) -> bool
    where
        T: Clone,
    {
        match self.try_set(value) {
            Ok(changed) => changed,
            Err(err) => panic!("{err}"),
        }
    }

    /// Write the value, returning whether it changed, or why writing is not
    /// allowed right now.
    pub fn try_set(&self, value: T) -> Result<bool, ReactiveError>
    where
        T: Clone,
    {
        check_write_allowed()?;

        let changed = self.inner.replace(value);
        if changed {
            tracing::trace!(
                signal = %self.inner.id,
                label = self.inner.label.as_deref().unwrap_or(""),
                version = self.inner.version.get(),
                "signal changed"
            );
            notify_write(self.inner.clone(), true);
        }
        Ok(changed)
    }

    /// Mutate the value in place. Always counts as a change.
    ///
    /// # Panics
    ///
    /// Same conditions as [`Signal::set`].
    pub fn update(&self, f: impl FnOnce(&mut T))
    where
        T: Clone,
    {
        if let Err(err) = check_write_allowed() {
            panic!("{err}");
        }

        let old = self.inner.value.borrow().clone();
        f(&mut self.inner.value.borrow_mut());
        self.inner.record_baselines(old);
        self.inner.bump_version();
        notify_write(self.inner.clone(), true);
    }

    /// Identity of this signal
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Number of observers currently registered
    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Whether the observer with `id` is registered
    pub fn has_observer(&self, id: NodeId) -> bool {
        self.inner.observers.contains(id)
    }

    /// Get a reference to the inner cell (for advanced use).
    pub fn inner(&self) -> &Rc<SignalInner<T>> {
        &self.inner
    }

    /// This signal as a typed capability object.
    pub fn as_reactive(&self) -> Rc<dyn ReactiveValue<T>>
    where
        T: Clone,
    {
        self.inner.clone()
    }

    /// This signal as a type-erased source.
    pub fn as_any_source(&self) -> Rc<dyn AnySource> {
        self.inner.clone()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// =============================================================================
// OPTIONS
// =============================================================================

/// Options for creating a signal.
pub struct SignalOptions<T> {
    /// Equality deciding whether a write is a change (PartialEq if None)
    pub equals: Option<EqualsFn<T>>,
    /// Label carried in log fields
    pub label: Option<String>,
}

impl<T> Default for SignalOptions<T> {
    fn default() -> Self {
        Self {
            equals: None,
            label: None,
        }
    }
}

// =============================================================================
// SIGNAL CREATION FUNCTIONS
// =============================================================================

/// Create a new signal.
///
/// # Example
///
/// ```
/// use spark_watch::signal;
///
/// let name = signal(String::from("hello"));
/// name.set(String::from("world"));
/// assert_eq!(name.get(), "world");
/// ```
pub fn signal<T>(value: T) -> Signal<T>
where
    T: PartialEq + 'static,
{
    Signal::new(value)
}

/// Create a signal with a custom equality function.
pub fn signal_with_equals<T>(value: T, equals: EqualsFn<T>) -> Signal<T>
where
    T: 'static,
{
    Signal::new_with_equals(value, equals)
}

/// Create a signal from options.
pub fn signal_with_options<T>(value: T, options: SignalOptions<T>) -> Signal<T>
where
    T: PartialEq + 'static,
{
    let equals = options.equals.unwrap_or(default_equals);
    Signal {
        inner: Rc::new(SignalInner::new(value, equals, options.label)),
    }
}

/// Create a signal where every write counts as a change.
///
/// Watches on it fire on every `set`, even with an equal value.
///
/// # Example
///
/// ```
/// use spark_watch::mutable_source;
///
/// let data = mutable_source(vec![1, 2, 3]);
/// assert!(data.set(vec![1, 2, 3]));
/// ```
pub fn mutable_source<T>(value: T) -> Signal<T>
where
    T: 'static,
{
    Signal::new_with_equals(value, never_equals)
}

/// Create an f64 signal where NaN equals NaN.
pub fn signal_f64(value: f64) -> Signal<f64> {
    Signal::new_with_equals(value, safe_equals_f64)
}

// =============================================================================
// TESTS
// =============================================================================
