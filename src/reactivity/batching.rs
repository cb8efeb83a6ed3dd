// ============================================================================
// spark-watch - Batching
// Group writes into one delivery round, and read without tracking
// ============================================================================

use crate::core::context::with_context;
use crate::reactivity::tracking::flush_pending_notifications;

// =============================================================================
// BATCH
// =============================================================================

/// Run `f` with delivery deferred until the outermost batch closes.
///
/// Marking still happens on every write; only delivery waits. Notifications
/// queued for the same watch are coalesced, so a watch fires at most once per
/// batch and diffs against the value from before the batch.
///
/// # Example
///
/// ```
/// use spark_watch::{batch, signal, Watch};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let count = signal(0);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let log = seen.clone();
/// let _watch = Watch::from_signal(&count, move |new, old| {
///     log.borrow_mut().push((*old, *new));
/// });
///
/// batch(|| {
///     count.set(1);
///     count.set(2);
/// });
///
/// assert_eq!(*seen.borrow(), vec![(0, 2)]);
/// ```
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    with_context(|ctx| ctx.enter_batch());

    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let depth = with_context(|ctx| ctx.exit_batch());

            // Deliver when the outermost batch completes, unless unwinding
            if depth == 0 {
                if std::thread::panicking() {
                    with_context(|ctx| ctx.take_pending());
                } else {
                    flush_pending_notifications();
                }
            }
        }
    }

    let _guard = BatchGuard;
    f()
}

/// Check if currently inside a batch.
pub fn is_batching() -> bool {
    with_context(|ctx| ctx.is_batching())
}

/// Deliver everything queued right now (no-op inside a batch).
pub fn flush() {
    flush_pending_notifications();
}

// =============================================================================
// UNTRACK
// =============================================================================

/// Read sources without creating dependencies.
///
/// # Example
///
/// ```
/// use spark_watch::{computed, signal, untrack};
///
/// let a = signal(1);
/// let b = signal(10);
///
/// let (a2, b2) = (a.clone(), b.clone());
/// let sum = computed(move || a2.get() + untrack(|| b2.get()));
/// assert_eq!(sum.get(), 11);
///
/// b.set(20); // not a dependency
/// assert_eq!(sum.get(), 11);
///
/// a.set(2);
/// assert_eq!(sum.get(), 22);
/// ```
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let prev = with_context(|ctx| ctx.set_untracking(true));

    struct UntrackGuard {
        prev: bool,
    }

    impl Drop for UntrackGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.set_untracking(self.prev));
        }
    }

    let _guard = UntrackGuard { prev };
    f()
}

/// Alias for `untrack()`.
pub fn peek<T>(f: impl FnOnce() -> T) -> T {
    untrack(f)
}

/// Check if currently in untrack mode.
pub fn is_untracking() -> bool {
    with_context(|ctx| ctx.is_untracking())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_returns_value() {
        assert_eq!(batch(|| 42), 42);
    }

    #[test]
    fn batch_nests() {
        assert!(!is_batching());
        batch(|| {
            assert!(is_batching());
            batch(|| assert!(is_batching()));
            assert!(is_batching());
        });
        assert!(!is_batching());
    }

    #[test]
    fn batch_depth_restored_after_panic() {
        let result = std::panic::catch_unwind(|| {
            batch(|| panic!("boom"));
        });
        assert!(result.is_err());
        assert!(!is_batching());
    }

    #[test]
    fn untrack_restores_previous_mode() {
        assert!(!is_untracking());
        untrack(|| {
            assert!(is_untracking());
            peek(|| assert!(is_untracking()));
            assert!(is_untracking());
        });
        assert!(!is_untracking());
    }
}
