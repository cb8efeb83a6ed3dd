// ============================================================================
// spark-watch - Reactive Context
// Thread-local state: the evaluating observer, batching, pending deliveries
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::types::{NodeId, Observer};

// =============================================================================
// PENDING NOTIFICATION
// =============================================================================

/// A notification queued for a terminal observer, delivered after marking.
pub struct PendingNotification {
    pub id: NodeId,
    pub observer: Weak<dyn Observer>,
    pub source_changed: bool,
}

// =============================================================================
// REACTIVE CONTEXT
// =============================================================================

/// Thread-local reactive context holding all global state for reactivity.
///
/// Everything here is single-threaded; graphs are not shared across threads.
pub struct ReactiveContext {
    /// Observer whose evaluation is currently collecting dependencies
    active_observer: RefCell<Option<Weak<dyn Observer>>>,

    /// Whether reads should skip dependency tracking
    untracking: Cell<bool>,

    /// Current batch depth (for nested batches)
    batch_depth: Cell<u32>,

    /// Whether queued notifications are being delivered
    flushing: Cell<bool>,

    /// Notifications waiting for delivery, one entry per observer
    pending: RefCell<Vec<PendingNotification>>,
}

impl ReactiveContext {
    pub fn new() -> Self {
        Self {
            active_observer: RefCell::new(None),
            untracking: Cell::new(false),
            batch_depth: Cell::new(0),
            flushing: Cell::new(false),
            pending: RefCell::new(Vec::new()),
        }
    }

    // =========================================================================
    // DEPENDENCY TRACKING
    // =========================================================================

    /// Set the active observer, returning the previous one
    pub fn set_active_observer(
        &self,
        observer: Option<Weak<dyn Observer>>,
    ) -> Option<Weak<dyn Observer>> {
        self.active_observer.replace(observer)
    }

    /// Get the active observer, if it is still alive
    pub fn active_observer(&self) -> Option<Rc<dyn Observer>> {
        self.active_observer.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Whether a live observer is collecting dependencies
    pub fn has_active_observer(&self) -> bool {
        self.active_observer().is_some()
    }

    /// Set untracking mode, returning previous value
    pub fn set_untracking(&self, value: bool) -> bool {
        self.untracking.replace(value)
    }

    pub fn is_untracking(&self) -> bool {
        self.untracking.get()
    }

    // =========================================================================
    // BATCHING
    // =========================================================================

    /// Increment batch depth, returns new depth
    pub fn enter_batch(&self) -> u32 {
        let depth = self.batch_depth.get() + 1;
        self.batch_depth.set(depth);
        depth
    }

    /// Decrement batch depth, returns new depth
    pub fn exit_batch(&self) -> u32 {
        let depth = self.batch_depth.get().saturating_sub(1);
        self.batch_depth.set(depth);
        depth
    }

    pub fn batch_depth(&self) -> u32 {
        self.batch_depth.get()
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth.get() > 0
    }

    // =========================================================================
    // DELIVERY QUEUE
    // =========================================================================

    /// Set flushing mode, returning previous value
    pub fn set_flushing(&self, value: bool) -> bool {
        self.flushing.replace(value)
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    /// Queue a notification, coalescing with one already queued for the same
    /// observer.
    ///
    /// A second notification means the source moved more than once before
    /// delivery, so the merged one is advisory: the observer asks the source
    /// whether the net result is a change.
    pub fn enqueue_notification(&self, id: NodeId, observer: Weak<dyn Observer>, source_changed: bool) {
        let mut pending = self.pending.borrow_mut();
        match pending.iter_mut().find(|p| p.id == id) {
            Some(existing) => existing.source_changed = false,
            None => pending.push(PendingNotification {
                id,
                observer,
                source_changed,
            }),
        }
    }

    /// Take all queued notifications
    pub fn take_pending(&self) -> Vec<PendingNotification> {
        self.pending.replace(Vec::new())
    }

    /// Whether a notification for `id` is waiting for delivery
    pub fn is_pending(&self, id: NodeId) -> bool {
        self.pending.borrow().iter().any(|p| p.id == id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl Default for ReactiveContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    /// The thread-local reactive context
    static CONTEXT: ReactiveContext = ReactiveContext::new();
}

/// Access the thread-local reactive context.
pub fn with_context<R>(f: impl FnOnce(&ReactiveContext) -> R) -> R {
    CONTEXT.with(f)
}

/// Check if reads are currently tracked (inside an evaluation, not untracking)
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.has_active_observer() && !ctx.is_untracking())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::WATCH;
    use crate::core::types::AnySource;

    struct Probe(NodeId);

    impl Observer for Probe {
        fn id(&self) -> NodeId {
            self.0
        }

        fn flags(&self) -> u32 {
            WATCH
        }

        fn on_notify(&self, _source_changed: bool) {}

        fn add_source(&self, _source: Rc<dyn AnySource>) {}
    }

    #[test]
    fn context_starts_idle() {
        with_context(|ctx| {
            assert!(!ctx.has_active_observer());
            assert!(!ctx.is_untracking());
            assert!(!ctx.is_batching());
            assert!(!ctx.is_flushing());
            assert_eq!(ctx.pending_count(), 0);
        });
        assert!(!is_tracking());
    }

    #[test]
    fn dead_active_observer_is_not_tracking() {
        let gone: Weak<dyn Observer> = {
            let probe: Rc<dyn Observer> = Rc::new(Probe(NodeId::next()));
            Rc::downgrade(&probe)
        };

        let prev = with_context(|ctx| ctx.set_active_observer(Some(gone)));
        assert!(!is_tracking());
        assert!(with_context(|ctx| ctx.active_observer().is_none()));
        with_context(|ctx| ctx.set_active_observer(prev));
    }

    #[test]
    fn batch_depth_nests() {
        with_context(|ctx| {
            assert_eq!(ctx.enter_batch(), 1);
            assert_eq!(ctx.enter_batch(), 2);
            assert!(ctx.is_batching());
            assert_eq!(ctx.exit_batch(), 1);
            assert_eq!(ctx.exit_batch(), 0);
            assert!(!ctx.is_batching());
            // Never underflows
            assert_eq!(ctx.exit_batch(), 0);
        });
    }

    #[test]
    fn pending_notifications_coalesce_per_observer() {
        let a: Rc<dyn Observer> = Rc::new(Probe(NodeId::next()));
        let b: Rc<dyn Observer> = Rc::new(Probe(NodeId::next()));

        with_context(|ctx| {
            ctx.enqueue_notification(a.id(), Rc::downgrade(&a), false);
            ctx.enqueue_notification(b.id(), Rc::downgrade(&b), false);
            ctx.enqueue_notification(a.id(), Rc::downgrade(&a), true);
            ctx.enqueue_notification(a.id(), Rc::downgrade(&a), false);

            assert!(ctx.is_pending(a.id()));
            let pending = ctx.take_pending();
            assert_eq!(pending.len(), 2);
            assert_eq!(pending[0].id, a.id());
            // Merged notifications are advisory
            assert!(!pending[0].source_changed);
            assert_eq!(pending[1].id, b.id());
            assert!(!pending[1].source_changed);
            assert_eq!(ctx.pending_count(), 0);
        });
    }
}
