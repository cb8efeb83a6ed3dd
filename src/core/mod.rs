// ============================================================================
// spark-watch - Core Module
// Identity, capability traits, context, and errors for the reactive graph
// ============================================================================

pub mod constants;
pub mod context;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use context::{is_tracking, with_context, ReactiveContext};
pub use error::ReactiveError;
pub use types::{
    default_equals, AnySource, EqualsFn, NodeId, Observer, ObserverSet, ReactiveValue,
};
