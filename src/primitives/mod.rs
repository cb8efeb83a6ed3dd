// ============================================================================
// spark-watch - Primitives Module
// Signal (mutable cell), Computed (derived value), Watch (terminal observer)
// ============================================================================

pub mod computed;
pub mod signal;
pub mod watch;

// Re-export for convenience
pub use computed::{
    computed, computed_with_equals, computed_with_options, Computed, ComputedInner,
    ComputedOptions,
};
pub use signal::{
    mutable_source, signal, signal_f64, signal_with_equals, signal_with_options, Signal,
    SignalInner, SignalOptions,
};
pub use watch::{watch, watch_computed, watch_fn, Watch, WatchHandler, WatchInner};
