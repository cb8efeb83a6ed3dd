// ============================================================================
// spark-watch - Type Definitions
// Node identity and the capability traits the watcher consumes
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::ReactiveError;

// =============================================================================
// NODE IDENTITY
// =============================================================================

/// Identity of a node in the reactive graph.
///
/// Allocated from a process-wide monotonic counter, so two nodes never share
/// an id. Observer sets are keyed by it, which lets them hold observers whose
/// value types or handlers have no notion of equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NodeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// CAPABILITY TRAITS
// =============================================================================
//
// Graph operations (notify, register, dirty checks) don't need the value
// type, so they live on the type-erased `AnySource` and `Observer`. Only
// reading the value needs T, which is what `ReactiveValue<T>` adds.
//
// - Vec<Weak<dyn Observer>> inside every source for notification
// - Rc<dyn AnySource> inside every computed for its upstream edges
// - Rc<dyn ReactiveValue<T>> inside a watch for its single source
// =============================================================================

/// Type-erased source side of the graph.
///
/// Implemented by `SignalInner<T>` and `ComputedInner<T>`.
pub trait AnySource: Any {
    /// Identity of this source
    fn id(&self) -> NodeId;

    /// Kind and status flags
    fn flags(&self) -> u32;

    /// Incremented every time the value changes
    fn version(&self) -> u64;

    /// Bring a memoized value up to date. Cells are always current.
    fn refresh(&self) -> Result<(), ReactiveError> {
        Ok(())
    }

    /// Mark as stale during write propagation. No-op for cells.
    fn mark_stale(&self, _status: u32) {}

    /// Register an observer for future notifications.
    ///
    /// Adding an already registered observer replaces its back-reference and
    /// keeps its last-seen version.
    fn add_observer(&self, observer: Weak<dyn Observer>);

    /// Deregister an observer. Safe to call for an unknown id.
    fn remove_observer(&self, observer: NodeId);

    /// Whether the value changed since `observer` last asked.
    ///
    /// Per-observer and pull-based: the query records the current version as
    /// seen by that observer.
    fn was_dirty(&self, observer: NodeId) -> bool;

    /// Number of registered observers (live or not yet pruned)
    fn observer_count(&self) -> usize;

    /// Whether `observer` is currently registered
    fn has_observer(&self, observer: NodeId) -> bool;

    /// Snapshot of the live observers, pruning dead entries.
    fn observers(&self) -> Vec<Rc<dyn Observer>>;

    /// Optional human-readable label used in log fields
    fn label(&self) -> Option<&str> {
        None
    }

    /// Upcast to Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// A source whose current value can be read.
pub trait ReactiveValue<T>: AnySource {
    /// Synchronous, untracked read of the current value.
    fn value(&self) -> T;
}

/// Something a source can notify.
///
/// Implemented by `WatchInner<T>` (terminal) and `ComputedInner<T>` (relay).
pub trait Observer: Any {
    /// Identity of this observer
    fn id(&self) -> NodeId;

    /// Kind and status flags (`WATCH` or `COMPUTED`)
    fn flags(&self) -> u32;

    /// The source believes it may have changed.
    ///
    /// `source_changed == true` is an authoritative claim (direct cell write);
    /// `false` is advisory and must be confirmed with `was_dirty`.
    fn on_notify(&self, source_changed: bool);

    /// Generic dependency registration hook, called for tracked reads.
    fn add_source(&self, source: Rc<dyn AnySource>);

    /// If this observer is also a source (a computed), return that side.
    ///
    /// Write propagation relays through these instead of notifying them.
    fn as_computed_source(&self) -> Option<Rc<dyn AnySource>> {
        None
    }
}

// =============================================================================
// EQUALITY
// =============================================================================

/// Equality function type for comparing values
pub type EqualsFn<T> = fn(&T, &T) -> bool;

/// Default equality using PartialEq
pub fn default_equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

// =============================================================================
// OBSERVER SET
// =============================================================================

struct ObserverEntry {
    id: NodeId,
    observer: Weak<dyn Observer>,
    seen_version: Cell<u64>,
}

/// Observer bookkeeping shared by every source.
///
/// Holds weak back-references keyed by `NodeId` together with the version
/// each observer last saw, which is what `was_dirty` compares against.
pub struct ObserverSet {
    entries: RefCell<Vec<ObserverEntry>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Register `observer`, recording `version` as already seen.
    pub fn add(&self, observer: Weak<dyn Observer>, version: u64) {
        let Some(id) = observer.upgrade().map(|o| o.id()) else {
            return;
        };

        let mut entries = self.entries.borrow_mut();
        match entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => entry.observer = observer,
            None => entries.push(ObserverEntry {
                id,
                observer,
                seen_version: Cell::new(version),
            }),
        }
    }

    /// Deregister by id, returning whether it was present.
    pub fn remove(&self, id: NodeId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Compare `version` with what `id` last saw, then record it.
    ///
    /// Unknown observers have never seen a version, so they are dirty.
    pub fn was_dirty(&self, id: NodeId, version: u64) -> bool {
        let entries = self.entries.borrow();
        match entries.iter().find(|e| e.id == id) {
            Some(entry) => entry.seen_version.replace(version) != version,
            None => true,
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.borrow().iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Live observers in registration order.
    ///
    /// Returns an owned snapshot so callers can notify without holding a
    /// borrow on the set (observers may add or remove themselves meanwhile).
    pub fn snapshot(&self) -> Vec<Rc<dyn Observer>> {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|e| e.observer.strong_count() > 0);
        entries.iter().filter_map(|e| e.observer.upgrade()).collect()
    }
}

impl Default for ObserverSet {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
