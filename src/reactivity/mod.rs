// ============================================================================
// spark-watch - Reactivity Module
// Read tracking, write propagation, delivery, batching, equality
// ============================================================================

pub mod batching;
pub mod equality;
pub mod tracking;

// Re-export main tracking functions
pub use tracking::{flush_pending_notifications, mark_observers, notify_write, track_read};

// Re-export batching functions
pub use batching::{batch, flush, is_batching, is_untracking, peek, untrack};
