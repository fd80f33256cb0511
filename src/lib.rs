// ============================================================================
// ember-stores - Eagerly Propagating Reactive Stores
// ============================================================================
//
// A store is a mutable cell that notifies its subscribers synchronously on
// every effective write. A computed is a store whose value is derived from
// other stores; it discovers its dependencies at run time by recording the
// reads its closure performs, and rejects circular graphs. Every value
// crossing a cell boundary is produced by the cell's clone function, so
// callers can keep what they receive without aliasing store state.
// ============================================================================

pub mod core;
mod macros;
pub mod primitives;
pub mod reactivity;
pub mod value;

// Re-export core items at crate root for ergonomic access
pub use core::context::{is_tracking, set_default_clone, with_context, ReactiveContext};
pub use core::types::{
    default_clone, default_equals, AnyComputation, AnySource, CloneFn, ComputationId, EqualsFn,
    SourceId, StoreInner, SubscriberId, UpstreamLink,
};

// Re-export primitives at crate root
pub use primitives::computed::{computed, computed_with_equals, Computed, ComputedInner};
pub use primitives::store::{
    store, store_f64, store_with_clone, store_with_equals, Store, Subscription,
};

// Re-export reactivity functions
pub use reactivity::equality::{always_equals, equals, never_equals, safe_equals_f64};
pub use reactivity::tracking::CycleError;

// Re-export structural values
pub use value::{structural, Value};

// =============================================================================
// TESTS
// =============================================================================
