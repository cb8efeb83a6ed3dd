// ============================================================================
// spark-watch - Constants
// Node kind and status flags shared by the reactive graph
// ============================================================================

// =============================================================================
// NODE KIND FLAGS
// =============================================================================

/// Mutable cell (`Signal<T>`)
pub const SOURCE: u32 = 1 << 0;

/// Memoized derived value (`Computed<T>`) - both a source and an observer
pub const COMPUTED: u32 = 1 << 1;

/// Terminal observer (`Watch<T>`) - never relays notifications
pub const WATCH: u32 = 1 << 2;

// =============================================================================
// STATUS FLAGS
// =============================================================================

/// Up to date
pub const CLEAN: u32 = 1 << 10;

/// A direct dependency changed, must re-evaluate
pub const DIRTY: u32 = 1 << 11;

/// Something upstream changed, re-evaluate only if a dependency's version moved
pub const MAYBE_DIRTY: u32 = 1 << 12;

/// Currently evaluating (used to detect cyclic reads)
pub const COMPUTING: u32 = 1 << 13;

/// Mask to clear all status bits (CLEAN, DIRTY, MAYBE_DIRTY)
pub const STATUS_MASK: u32 = !(DIRTY | MAYBE_DIRTY | CLEAN);

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum number of delivery rounds in a single flush.
///
/// Each round delivers the notifications queued by the previous one. A
/// handler that keeps writing its own source hits this limit.
pub const MAX_FLUSH_ITERATIONS: u32 = 1000;

// =============================================================================
// TESTS
// =============================================================================
