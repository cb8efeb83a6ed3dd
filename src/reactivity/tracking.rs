// ============================================================================
// spark-watch - Dependency Tracking & Write Propagation
// Tracking reads into the evaluating observer, marking and delivering writes
// ============================================================================
//
// A write is handled in two phases:
//
// 1. MARK: walk the graph from the written source. Computeds are marked
//    stale (never downgraded from DIRTY) and relay the walk to their own
//    observers. Terminal observers (watches) are only queued.
// 2. DELIVER: once nothing is left to mark and no batch is open, queued
//    notifications are delivered in order.
//
// Delivering only after marking means a watch that pulls its source during
// delivery always sees every stale computed already flagged, whatever the
// shape of the graph.
// ============================================================================

use std::collections::HashSet;
use std::rc::Rc;

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::error::ReactiveError;
use crate::core::types::{AnySource, NodeId};

// =============================================================================
// TRACK READ - Register dependency when reading a source
// =============================================================================

/// Report a read of `source` to the observer currently evaluating, if any.
///
/// The observer decides what to do with it through its `add_source` hook:
/// computeds record an edge, watches ignore it.
pub fn track_read(source: Rc<dyn AnySource>) {
    let observer = with_context(|ctx| {
        if ctx.is_untracking() {
            None
        } else {
            ctx.active_observer()
        }
    });

    if let Some(observer) = observer {
        observer.add_source(source);
    }
}

/// Fail if a write happens while a computed is evaluating.
pub fn check_write_allowed() -> Result<(), ReactiveError> {
    let inside_computed = with_context(|ctx| {
        ctx.active_observer()
            .is_some_and(|o| o.flags() & COMPUTED != 0)
    });

    if inside_computed {
        Err(ReactiveError::WriteInsideComputed)
    } else {
        Ok(())
    }
}

// =============================================================================
// NOTIFY WRITE
// =============================================================================

/// Propagate a change of `source` and deliver notifications unless batching.
///
/// `source_changed` is the claim passed to the source's direct terminal
/// observers: `true` for a cell write, `false` when relaying for a computed.
pub fn notify_write(source: Rc<dyn AnySource>, source_changed: bool) {
    mark_observers(source, source_changed);
    flush_pending_notifications();
}

// =============================================================================
// MARK OBSERVERS - Phase 1
// =============================================================================

/// Mark everything downstream of `source` and queue terminal observers.
///
/// Direct computed observers of a forced write become DIRTY; anything
/// reached through a computed becomes MAYBE_DIRTY. Each computed is relayed
/// at most once per walk, so diamonds do not multiply the work.
///
/// Uses an explicit stack and owned observer snapshots so no borrow is held
/// while flags are being changed.
pub fn mark_observers(source: Rc<dyn AnySource>, source_changed: bool) {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<(Rc<dyn AnySource>, bool)> = vec![(source, source_changed)];

    while let Some((current, forced)) = stack.pop() {
        for observer in current.observers() {
            match observer.as_computed_source() {
                Some(computed) => {
                    computed.mark_stale(if forced { DIRTY } else { MAYBE_DIRTY });
                    if visited.insert(computed.id()) {
                        stack.push((computed, false));
                    }
                }
                None => {
                    let id = observer.id();
                    with_context(|ctx| {
                        ctx.enqueue_notification(id, Rc::downgrade(&observer), forced)
                    });
                }
            }
        }
    }
}

// =============================================================================
// FLUSH - Phase 2
// =============================================================================

/// Restores the flushing flag on every exit path. A panic unwinding out of
/// a delivery discards whatever is still queued.
struct FlushGuard {
    was_flushing: bool,
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        with_context(|ctx| {
            ctx.set_flushing(self.was_flushing);
            if std::thread::panicking() {
                let dropped = ctx.take_pending().len();
                if dropped > 0 {
                    tracing::warn!(dropped, "delivery panicked; discarding queued notifications");
                }
            }
        });
    }
}

/// Deliver queued notifications unless a batch is open or a flush is
/// already running further up the stack (that flush picks them up).
///
/// Each round delivers what the previous round queued; handlers that write
/// signals feed the next round.
///
/// # Panics
///
/// After `MAX_FLUSH_ITERATIONS` rounds, with
/// [`ReactiveError::UpdateDepthExceeded`].
pub fn flush_pending_notifications() {
    let busy = with_context(|ctx| ctx.is_batching() || ctx.is_flushing());
    if busy {
        return;
    }

    let _guard = FlushGuard {
        was_flushing: with_context(|ctx| ctx.set_flushing(true)),
    };

    let mut rounds = 0;
    loop {
        let pending = with_context(|ctx| ctx.take_pending());
        if pending.is_empty() {
            break;
        }

        rounds += 1;
        if rounds > MAX_FLUSH_ITERATIONS {
            panic!(
                "{}",
                ReactiveError::UpdateDepthExceeded {
                    limit: MAX_FLUSH_ITERATIONS
                }
            );
        }

        tracing::trace!(round = rounds, count = pending.len(), "delivering notifications");

        for notification in pending {
            if let Some(observer) = notification.observer.upgrade() {
                observer.on_notify(notification.source_changed);
            }
        }
    }
}

// =============================================================================
// STATUS HELPERS
// =============================================================================

/// Replace the status bits of a flags word.
pub fn with_status(flags: u32, status: u32) -> u32 {
    (flags & STATUS_MASK) | status
}

/// Status a stale mark should leave behind: never downgrade DIRTY.
pub fn stale_status(flags: u32, status: u32) -> u32 {
    if flags & DIRTY != 0 {
        flags
    } else {
        with_status(flags, status)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Observer, ObserverSet};
    use std::any::Any;
    use std::cell::{Cell, RefCell};
    use std::rc::Weak;

    // =========================================================================
    // Mocks
    // =========================================================================

    /// A source with no value, only observer bookkeeping.
    struct MockSource {
        id: NodeId,
        observers: ObserverSet,
    }

    impl MockSource {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                id: NodeId::next(),
                observers: ObserverSet::new(),
            })
        }
    }

    impl AnySource for MockSource {
        fn id(&self) -> NodeId {
            self.id
        }

        fn flags(&self) -> u32 {
            SOURCE
        }

        fn version(&self) -> u64 {
            0
        }

        fn add_observer(&self, observer: Weak<dyn Observer>) {
            self.observers.add(observer, 0);
        }

        fn remove_observer(&self, observer: NodeId) {
            self.observers.remove(observer);
        }

        fn was_dirty(&self, observer: NodeId) -> bool {
            self.observers.was_dirty(observer, 0)
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

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// A terminal observer recording what it was told.
    struct Recorder {
        id: NodeId,
        calls: RefCell<Vec<bool>>,
        sources: Cell<usize>,
    }

    impl Recorder {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                id: NodeId::next(),
                calls: RefCell::new(Vec::new()),
                sources: Cell::new(0),
            })
        }
    }

    impl Observer for Recorder {
        fn id(&self) -> NodeId {
            self.id
        }

        fn flags(&self) -> u32 {
            WATCH
        }

        fn on_notify(&self, source_changed: bool) {
            self.calls.borrow_mut().push(source_changed);
        }

        fn add_source(&self, _source: Rc<dyn AnySource>) {
            self.sources.set(self.sources.get() + 1);
        }
    }

    fn as_observer(r: &Rc<Recorder>) -> Weak<dyn Observer> {
        Rc::downgrade(&(r.clone() as Rc<dyn Observer>))
    }

    // =========================================================================
    // Tests
    // =========================================================================

    #[test]
    fn notify_write_delivers_to_terminal_observers() {
        let source = MockSource::new();
        let a = Recorder::new();
        let b = Recorder::new();
        source.add_observer(as_observer(&a));
        source.add_observer(as_observer(&b));

        notify_write(source.clone(), true);

        assert_eq!(*a.calls.borrow(), vec![true]);
        assert_eq!(*b.calls.borrow(), vec![true]);
    }

    #[test]
    fn advisory_claim_is_passed_through() {
        let source = MockSource::new();
        let a = Recorder::new();
        source.add_observer(as_observer(&a));

        notify_write(source.clone(), false);

        assert_eq!(*a.calls.borrow(), vec![false]);
    }

    #[test]
    fn dropped_observer_is_skipped() {
        let source = MockSource::new();
        {
            let gone = Recorder::new();
            source.add_observer(as_observer(&gone));
        }

        notify_write(source.clone(), true);
        assert_eq!(source.observer_count(), 0);
    }

    #[test]
    fn track_read_without_active_observer_is_noop() {
        let source = MockSource::new();
        track_read(source.clone());
        assert_eq!(source.observer_count(), 0);
    }

    #[test]
    fn track_read_reaches_active_observer() {
        let source = MockSource::new();
        let r = Recorder::new();

        let prev = with_context(|ctx| ctx.set_active_observer(Some(as_observer(&r))));
        track_read(source.clone());
        with_context(|ctx| {
            ctx.set_untracking(true);
        });
        track_read(source.clone());
        with_context(|ctx| {
            ctx.set_untracking(false);
            ctx.set_active_observer(prev);
        });

        assert_eq!(r.sources.get(), 1);
    }

    #[test]
    fn writes_allowed_outside_computed() {
        assert_eq!(check_write_allowed(), Ok(()));
    }

    #[test]
    fn stale_status_never_downgrades_dirty() {
        let dirty = COMPUTED | DIRTY;
        assert_eq!(stale_status(dirty, MAYBE_DIRTY), dirty);

        let clean = COMPUTED | CLEAN;
        assert_eq!(stale_status(clean, MAYBE_DIRTY), COMPUTED | MAYBE_DIRTY);
        assert_eq!(stale_status(clean, DIRTY), COMPUTED | DIRTY);
    }
}
