// ============================================================================
// ember-stores - Core Module
// Context, ids, type-erased traits, and the store cell
// ============================================================================

pub mod context;
pub mod types;

// Re-export commonly used items
pub use context::{is_tracking, set_default_clone, with_context, ReactiveContext};
pub use types::{
    default_clone, default_equals, AnyComputation, AnySource, CloneFn, ComputationId, EqualsFn,
    SourceId, StoreInner, SubscriberId, UpstreamLink,
};
