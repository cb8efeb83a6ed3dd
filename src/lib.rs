// ============================================================================
// spark-watch - Fine-grained Reactive Watchers for Rust
// ============================================================================
//
// A Watch observes one reactive value (a Signal or a Computed) and calls a
// handler with (new, old) exactly once per logical change. It is the leaf of
// the reactive graph: signals are the roots, computeds relay, watches fire.
// ============================================================================

#[macro_use]
mod macros;

pub mod core;
pub mod primitives;
pub mod reactivity;

// Re-export core items at crate root for ergonomic access
pub use crate::core::constants;
pub use crate::core::context::{is_tracking, with_context, ReactiveContext};
pub use crate::core::error::ReactiveError;
pub use crate::core::types::{
    default_equals, AnySource, EqualsFn, NodeId, Observer, ObserverSet, ReactiveValue,
};

// Re-export primitives at crate root
pub use primitives::computed::{
    computed, computed_with_equals, computed_with_options, Computed, ComputedOptions,
};
pub use primitives::signal::{
    mutable_source, signal, signal_f64, signal_with_equals, signal_with_options, Signal,
    SignalOptions,
};
pub use primitives::watch::{watch, watch_computed, watch_fn, Watch, WatchHandler};

// Re-export reactivity functions
pub use reactivity::batching::{batch, flush, is_batching, is_untracking, peek, untrack};
pub use reactivity::equality::{always_equals, equals, never_equals};

// =============================================================================
// TESTS
// =============================================================================
