// ============================================================================
// spark-watch - Computed Values
// Lazy memoized values derived from other reactive values
// ============================================================================
//
// A Computed is BOTH a source (readable, has observers, answers was_dirty)
// AND an observer (has upstream edges, discovered through tracked reads).
//
// It never recomputes eagerly. Writes upstream only mark it DIRTY or
// MAYBE_DIRTY; the next read (usually a watch asking `was_dirty`) pulls it
// up to date. Its version only moves when the recomputed value differs, which
// is what keeps watches quiet when an input changes but the output doesn't.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::error::ReactiveError;
use crate::core::types::{
    default_equals, AnySource, EqualsFn, NodeId, Observer, ObserverSet, ReactiveValue,
};
use crate::reactivity::tracking::{notify_write, stale_status, track_read, with_status};

// =============================================================================
// DEPENDENCY
// =============================================================================

/// An upstream edge and the upstream version seen when it was read.
#[derive(Clone)]
struct Dependency {
    source: Rc<dyn AnySource>,
    version: u64,
}

// =============================================================================
// COMPUTED INNER
// =============================================================================

/// The data behind a `Computed<T>`.
pub struct ComputedInner<T> {
    id: NodeId,
    flags: Cell<u32>,
    func: Box<dyn Fn() -> T>,
    /// None until the first evaluation
    value: RefCell<Option<T>>,
    version: Cell<u64>,
    equals: EqualsFn<T>,
    /// Upstream edges from the last evaluation
    deps: RefCell<Vec<Dependency>>,
    /// Edges collected by the evaluation in progress
    new_deps: RefCell<Vec<Dependency>>,
    observers: ObserverSet,
    label: Option<String>,
    self_weak: Weak<ComputedInner<T>>,
}

impl<T: Clone + 'static> ComputedInner<T> {
    fn new<F>(func: F, equals: EqualsFn<T>, label: Option<String>) -> Rc<Self>
    where
        F: Fn() -> T + 'static,
    {
        Rc::new_cyclic(|self_weak| Self {
            id: NodeId::next(),
            flags: Cell::new(COMPUTED | DIRTY),
            func: Box::new(func),
            value: RefCell::new(None),
            version: Cell::new(0),
            equals,
            deps: RefCell::new(Vec::new()),
            new_deps: RefCell::new(Vec::new()),
            observers: ObserverSet::new(),
            label,
            self_weak: self_weak.clone(),
        })
    }

    fn is_computing(&self) -> bool {
        self.flags.get() & COMPUTING != 0
    }

    fn set_status(&self, status: u32) {
        self.flags.set(with_status(self.flags.get(), status));
    }

    /// Bring the cached value up to date.
    ///
    /// DIRTY re-evaluates. MAYBE_DIRTY refreshes each upstream edge first and
    /// re-evaluates only if one of them reports a version other than the one
    /// recorded at the last evaluation.
    fn try_refresh(&self) -> Result<(), ReactiveError> {
        let flags = self.flags.get();
        if flags & COMPUTING != 0 {
            return Err(ReactiveError::CyclicRead);
        }
        if flags & CLEAN != 0 {
            return Ok(());
        }

        if flags & DIRTY == 0 {
            // Snapshot so upstream refreshes don't run under our borrow
            let deps = self.deps.borrow().clone();
            let mut changed = false;
            for dep in &deps {
                dep.source.refresh()?;
                if dep.source.version() != dep.version {
                    changed = true;
                    break;
                }
            }

            if !changed {
                self.set_status(CLEAN);
                return Ok(());
            }
        }

        self.evaluate();
        Ok(())
    }

    /// Run the function with this computed as the active observer, then
    /// install the edges it read and store the value.
    fn evaluate(&self) {
        struct EvalGuard<'a> {
            flags: &'a Cell<u32>,
            prev: Option<Weak<dyn Observer>>,
            was_untracking: bool,
        }

        impl Drop for EvalGuard<'_> {
            fn drop(&mut self) {
                self.flags.set(self.flags.get() & !COMPUTING);
                let prev = self.prev.take();
                with_context(|ctx| {
                    ctx.set_active_observer(prev);
                    ctx.set_untracking(self.was_untracking);
                });
            }
        }

        self.new_deps.borrow_mut().clear();
        self.flags.set(self.flags.get() | COMPUTING);

        // Our own reads are tracked even when whoever pulled us is untracked
        let me: Weak<dyn Observer> = self.self_weak.clone();
        let guard = with_context(|ctx| EvalGuard {
            flags: &self.flags,
            prev: ctx.set_active_observer(Some(me)),
            was_untracking: ctx.set_untracking(false),
        });

        // Tracked reads reach us through `add_source`
        let new_value = (self.func)();
        drop(guard);

        self.install_dependencies();

        let changed = match self.value.borrow().as_ref() {
            Some(current) => !(self.equals)(current, &new_value),
            None => true,
        };
        if changed {
            *self.value.borrow_mut() = Some(new_value);
            self.version.set(self.version.get() + 1);
        }
        self.set_status(CLEAN);

        tracing::trace!(
            computed = %self.id,
            label = self.label.as_deref().unwrap_or(""),
            changed,
            version = self.version.get(),
            "computed evaluated"
        );
    }

    /// Swap in the freshly collected edges, unsubscribing from upstream
    /// sources no longer read and subscribing to new ones.
    fn install_dependencies(&self) {
        let new_deps = self.new_deps.take();
        let old_deps = self.deps.replace(new_deps.clone());

        for old in &old_deps {
            if !new_deps.iter().any(|d| d.source.id() == old.source.id()) {
                old.source.remove_observer(self.id);
            }
        }

        let me: Weak<dyn Observer> = self.self_weak.clone();
        for new in &new_deps {
            if !old_deps.iter().any(|d| d.source.id() == new.source.id()) {
                new.source.add_observer(me.clone());
            }
        }
    }

    fn cached(&self) -> T {
        self.value
            .borrow()
            .clone()
            .expect("computed value read before its first evaluation")
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        for dep in self.deps.get_mut().iter() {
            dep.source.remove_observer(self.id);
        }
    }
}

// =============================================================================
// AnySource implementation
// =============================================================================

impl<T: Clone + 'static> AnySource for ComputedInner<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn refresh(&self) -> Result<(), ReactiveError> {
        self.try_refresh()
    }

    fn mark_stale(&self, status: u32) {
        self.flags.set(stale_status(self.flags.get(), status));
    }

    fn add_observer(&self, observer: Weak<dyn Observer>) {
        self.observers.add(observer, self.version.get());
    }

    fn remove_observer(&self, observer: NodeId) {
        self.observers.remove(observer);
    }

    /// Refresh, then compare the version with what `observer` last saw.
    ///
    /// # Panics
    ///
    /// On a cyclic read, like [`Computed::get`].
    fn was_dirty(&self, observer: NodeId) -> bool {
        if let Err(err) = self.try_refresh() {
            panic!("{err}");
        }
        self.observers.was_dirty(observer, self.version.get())
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

impl<T: Clone + 'static> ReactiveValue<T> for ComputedInner<T> {
    fn value(&self) -> T {
        if let Err(err) = self.try_refresh() {
            panic!("{err}");
        }
        self.cached()
    }
}

// =============================================================================
// Observer implementation
// =============================================================================

impl<T: Clone + 'static> Observer for ComputedInner<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn flags(&self) -> u32 {
        self.flags.get()
    }

    /// Direct notification (from a source outside this crate's propagation):
    /// mark stale and relay advisory notifications downstream.
    fn on_notify(&self, source_changed: bool) {
        self.mark_stale(if source_changed { DIRTY } else { MAYBE_DIRTY });
        if let Some(me) = self.self_weak.upgrade() {
            notify_write(me, false);
        }
    }

    /// Record an upstream edge.
    ///
    /// During an evaluation this collects the edges for the next install;
    /// outside one the edge is installed right away and kept until the next
    /// evaluation replaces the edge list.
    fn add_source(&self, source: Rc<dyn AnySource>) {
        if source.id() == self.id {
            return;
        }
        let dep = Dependency {
            version: source.version(),
            source,
        };

        if self.is_computing() {
            let mut new_deps = self.new_deps.borrow_mut();
            if !new_deps.iter().any(|d| d.source.id() == dep.source.id()) {
                new_deps.push(dep);
            }
            return;
        }

        let already = self.deps.borrow().iter().any(|d| d.source.id() == dep.source.id());
        if !already {
            let me: Weak<dyn Observer> = self.self_weak.clone();
            dep.source.add_observer(me);
            self.deps.borrow_mut().push(dep);
        }
    }

    fn as_computed_source(&self) -> Option<Rc<dyn AnySource>> {
        self.self_weak
            .upgrade()
            .map(|rc| rc as Rc<dyn AnySource>)
    }
}

// =============================================================================
// COMPUTED<T> - The public handle
// =============================================================================

/// A lazily evaluated, memoized value derived from other reactive values.
///
/// # Example
///
/// ```
/// use spark_watch::{computed, signal};
///
/// let count = signal(2);
/// let c = count.clone();
/// let doubled = computed(move || c.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Computed<T> {
    fn from_inner(inner: Rc<ComputedInner<T>>) -> Self {
        Self { inner }
    }

    /// Read the value, re-evaluating first if stale. Inside another computed
    /// this records a dependency.
    ///
    /// # Panics
    ///
    /// On a cyclic read ([`ReactiveError::CyclicRead`]).
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Read the value, or report a cyclic read.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        self.inner.try_refresh()?;
        track_read(self.inner.clone());
        Ok(self.inner.cached())
    }

    /// Identity of this computed
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Version of the cached value (moves only when the value changes)
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Whether the cached value is known to be current
    pub fn is_clean(&self) -> bool {
        self.inner.flags.get() & CLEAN != 0
    }

    /// Number of upstream edges
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    /// Number of observers currently registered
    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Whether the observer with `id` is registered
    pub fn has_observer(&self, id: NodeId) -> bool {
        self.inner.observers.contains(id)
    }

    /// Get access to the inner for graph operations
    pub fn inner(&self) -> &Rc<ComputedInner<T>> {
        &self.inner
    }

    /// This computed as a typed capability object.
    pub fn as_reactive(&self) -> Rc<dyn ReactiveValue<T>> {
        self.inner.clone()
    }

    /// This computed as a type-erased source.
    pub fn as_any_source(&self) -> Rc<dyn AnySource> {
        self.inner.clone()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// =============================================================================
// OPTIONS & PUBLIC API
// =============================================================================

/// Options for creating a computed value.
pub struct ComputedOptions<T> {
    /// Equality deciding whether a re-evaluation is a change (PartialEq if None)
    pub equals: Option<EqualsFn<T>>,
    /// Label carried in log fields
    pub label: Option<String>,
}

impl<T> Default for ComputedOptions<T> {
    fn default() -> Self {
        Self {
            equals: None,
            label: None,
        }
    }
}

/// Create a computed value.
pub fn computed<T, F>(func: F) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    Computed::from_inner(ComputedInner::new(func, default_equals, None))
}

/// Create a computed value with a custom equality function.
pub fn computed_with_equals<T, F>(func: F, equals: EqualsFn<T>) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Computed::from_inner(ComputedInner::new(func, equals, None))
}

/// Create a computed value from options.
pub fn computed_with_options<T, F>(func: F, options: ComputedOptions<T>) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    let equals = options.equals.unwrap_or(default_equals);
    Computed::from_inner(ComputedInner::new(func, equals, options.label))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::signal::signal;
    use crate::reactivity::batching::untrack;

    #[test]
    fn computed_is_lazy_and_cached() {
        let runs = Rc::new(Cell::new(0));
        let c = computed({
            let runs = runs.clone();
            move || {
                runs.set(runs.get() + 1);
                42
            }
        });

        assert_eq!(runs.get(), 0);
        assert_eq!(c.get(), 42);
        assert_eq!(c.get(), 42);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn computed_tracks_signal() {
        let a = signal(1);
        let doubled = computed({
            let a = a.clone();
            move || a.get() * 2
        });

        assert_eq!(doubled.get(), 2);
        assert_eq!(doubled.dependency_count(), 1);
        assert_eq!(a.observer_count(), 1);

        a.set(5);
        assert!(!doubled.is_clean());
        assert_eq!(doubled.get(), 10);
        assert!(doubled.is_clean());
    }

    #[test]
    fn version_stays_when_output_unchanged() {
        let a = signal(1);
        let parity = computed({
            let a = a.clone();
            move || a.get() % 2
        });

        assert_eq!(parity.get(), 1);
        let v = parity.version();

        a.set(3);
        assert_eq!(parity.get(), 1);
        assert_eq!(parity.version(), v);

        a.set(4);
        assert_eq!(parity.get(), 0);
        assert_eq!(parity.version(), v + 1);
    }

    #[test]
    fn maybe_dirty_skips_recompute_when_upstream_output_same() {
        let runs = Rc::new(Cell::new(0));
        let a = signal(0);
        let bucket = computed({
            let a = a.clone();
            move || a.get() / 10
        });
        let label = computed({
            let bucket = bucket.clone();
            let runs = runs.clone();
            move || {
                runs.set(runs.get() + 1);
                format!("bucket {}", bucket.get())
            }
        });

        assert_eq!(label.get(), "bucket 0");
        assert_eq!(runs.get(), 1);

        a.set(5);
        assert_eq!(label.get(), "bucket 0");
        assert_eq!(runs.get(), 1);

        a.set(15);
        assert_eq!(label.get(), "bucket 1");
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn diamond_evaluates_once_per_change() {
        let runs = Rc::new(Cell::new(0));
        let a = signal(1);
        let b = computed({
            let a = a.clone();
            move || a.get() + 10
        });
        let c = computed({
            let a = a.clone();
            move || a.get() * 10
        });
        let d = computed({
            let (b, c, runs) = (b.clone(), c.clone(), runs.clone());
            move || {
                runs.set(runs.get() + 1);
                b.get() + c.get()
            }
        });

        assert_eq!(d.get(), 21);
        a.set(2);
        assert_eq!(d.get(), 32);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn dynamic_dependencies_are_reinstalled() {
        let use_a = signal(true);
        let a = signal(1);
        let b = signal(2);
        let pick = computed({
            let (use_a, a, b) = (use_a.clone(), a.clone(), b.clone());
            move || if use_a.get() { a.get() } else { b.get() }
        });

        assert_eq!(pick.get(), 1);
        assert_eq!(a.observer_count(), 1);
        assert_eq!(b.observer_count(), 0);

        use_a.set(false);
        assert_eq!(pick.get(), 2);
        assert_eq!(a.observer_count(), 0);
        assert_eq!(b.observer_count(), 1);
    }

    #[test]
    fn untracked_reads_are_not_dependencies() {
        let a = signal(1);
        let b = signal(2);
        let sum = computed({
            let (a, b) = (a.clone(), b.clone());
            move || a.get() + untrack(|| b.get())
        });

        assert_eq!(sum.get(), 3);
        assert_eq!(sum.dependency_count(), 1);
        assert_eq!(b.observer_count(), 0);
    }

    #[test]
    fn drop_unsubscribes_upstream() {
        let a = signal(1);
        {
            let c = computed({
                let a = a.clone();
                move || a.get()
            });
            c.get();
            assert_eq!(a.observer_count(), 1);
        }
        assert_eq!(a.observer_count(), 0);
    }

    #[test]
    fn write_inside_computed_is_rejected() {
        let a = signal(0);
        let b = signal(0);
        let c = computed({
            let (a, b) = (a.clone(), b.clone());
            move || b.try_set(a.get())
        });

        assert_eq!(c.get(), Err(ReactiveError::WriteInsideComputed));
        assert_eq!(b.get(), 0);
    }

    #[test]
    fn cyclic_read_is_reported() {
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
        let c = computed({
            let slot = slot.clone();
            move || {
                let me = slot.borrow().clone();
                match me {
                    Some(me) => me.try_get().unwrap_or(-1),
                    None => 0,
                }
            }
        });
        *slot.borrow_mut() = Some(c.clone());

        assert_eq!(c.get(), -1);
        slot.borrow_mut().take();
    }

    #[test]
    fn add_source_outside_evaluation_installs_edge() {
        let a = signal(1);
        let c = computed(|| 0);
        c.get();

        c.inner().add_source(a.as_any_source());
        assert_eq!(c.dependency_count(), 1);
        assert_eq!(a.observer_count(), 1);

        a.set(2);
        assert!(!c.is_clean());
    }

    #[test]
    fn labels_and_custom_equality() {
        let c = computed_with_options(
            || 1,
            ComputedOptions {
                equals: None,
                label: Some("one".into()),
            },
        );
        assert_eq!(c.inner().label(), Some("one"));
        assert_eq!(c.get(), 1);

        let always = computed_with_equals(|| vec![1], crate::reactivity::equality::never_equals);
        assert_eq!(always.get(), vec![1]);
    }
}
