// ============================================================================
// spark-watch - Errors
// Misuse of the reactive graph that cannot be expressed in the type system
// ============================================================================

use thiserror::Error;

/// Errors raised by the reactive graph.
///
/// Watches themselves never fail. These cover graph misuse: writes during a
/// computed evaluation, cyclic reads, and runaway update loops. The panicking
/// APIs (`Signal::set`, `Computed::get`) use the `Display` text of these
/// variants; the `try_*` variants return them.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactiveError {
    /// A signal was written while a computed value was evaluating
    #[error("cannot write to a signal inside a computed; computed values must be pure")]
    WriteInsideComputed,

    /// A computed value read itself (directly or through other computeds)
    #[error("cyclic read: computed value depends on itself")]
    CyclicRead,

    /// Delivery kept producing new notifications
    #[error("maximum update depth exceeded ({limit} rounds); a watch handler keeps re-triggering itself")]
    UpdateDepthExceeded { limit: u32 },
}
