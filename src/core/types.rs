// ============================================================================
// ember-stores - Type Definitions
// Type-erased traits, the observer registry, and the store cell
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::core::context::with_context;

// =============================================================================
// IDS
// =============================================================================
//
// All identities in the graph are context-allocated integers. Sources are
// deduplicated per tracking frame by SourceId; observer registrations are
// removed by SubscriberId; ComputationId is the token that sits on the
// tracker stack while a computed re-runs.
// =============================================================================

/// Identity of a store cell (plain or computed) in the reactive graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub(crate) u64);

/// Identity of one observer registration on one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

/// Identity of a computation on the tracker's frame stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputationId(pub(crate) u64);

// =============================================================================
// CLONE / EQUALITY FUNCTIONS
// =============================================================================

/// Equality function used by the write no-op check.
pub type EqualsFn<T> = fn(&T, &T) -> bool;

/// Clone function applied to every value crossing the read/write boundary.
pub type CloneFn<T> = fn(&T) -> T;

/// Default equality using PartialEq.
pub fn default_equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

/// Default clone using the value type's own `Clone`.
pub fn default_clone<T: Clone>(v: &T) -> T {
    v.clone()
}

// =============================================================================
// TYPE-ERASED TRAITS
// =============================================================================
//
// Graph maintenance (attaching a computation to a cell, releasing a link,
// re-running a computed) does not need to know the value type T, so the
// tracker works over trait objects:
// - a computed's upstream links are Vec<UpstreamLink> over Rc<dyn AnySource>
// - a cell holds its computed observers as Weak<dyn AnyComputation>
// Only reading and writing values needs the concrete cell type.
// =============================================================================

/// Type-erased store cell, as seen by the dependency tracker.
pub trait AnySource {
    /// Identity of this cell, for per-frame read deduplication.
    fn source_id(&self) -> SourceId;

    /// Attach a computation as an observer under `id`. Returns false when
    /// the cell has ended and accepts no further registrations.
    fn attach_computation(&self, id: SubscriberId, computation: Weak<dyn AnyComputation>) -> bool;

    /// Remove the registration with the given id. Unknown ids are a no-op.
    fn detach(&self, id: SubscriberId);

    /// Number of live observer registrations (callbacks and computations).
    fn observer_count(&self) -> usize;
}

/// Type-erased computation, as seen by the cells it depends on.
pub trait AnyComputation {
    /// The token identifying this computation on the tracker stack.
    fn token(&self) -> ComputationId;

    /// Re-run the derive closure and publish the result.
    fn recompute(&self);

    /// Install the upstream links collected by the tracking frame.
    fn install_links(&self, links: Vec<UpstreamLink>);
}

/// One established upstream subscription of a computed.
pub struct UpstreamLink {
    pub source: Rc<dyn AnySource>,
    pub subscriber: SubscriberId,
}

impl UpstreamLink {
    /// Detach the subscription this link represents.
    pub fn release(&self) {
        self.source.detach(self.subscriber);
    }
}

// =============================================================================
// OBSERVER REGISTRY
// =============================================================================

/// What a cell notifies: a user callback, or a computed's re-run.
pub(crate) enum Observer<T> {
    Callback(Rc<dyn Fn(&T)>),
    Computation(Weak<dyn AnyComputation>),
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        match self {
            Observer::Callback(cb) => Observer::Callback(Rc::clone(cb)),
            Observer::Computation(weak) => Observer::Computation(Weak::clone(weak)),
        }
    }
}

pub(crate) struct Entry<T> {
    pub id: SubscriberId,
    pub observer: Observer<T>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            observer: self.observer.clone(),
        }
    }
}

/// Ordered observer list of one cell.
///
/// Insertion order is notification order. Removal is by id and idempotent.
/// Computation entries are weak; dead ones are pruned at the start of each
/// notification pass.
pub(crate) struct ObserverList<T> {
    entries: RefCell<Vec<Entry<T>>>,
}

impl<T> ObserverList<T> {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    pub fn push(&self, id: SubscriberId, observer: Observer<T>) {
        let mut entries = self.entries.borrow_mut();
        debug_assert!(
            entries.iter().all(|entry| entry.id != id),
            "observer id registered twice"
        );
        entries.push(Entry { id, observer });
    }

    pub fn remove(&self, id: SubscriberId) {
        self.entries.borrow_mut().retain(|entry| entry.id != id);
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn prune_dead(&self) {
        self.entries.borrow_mut().retain(|entry| match &entry.observer {
            Observer::Callback(_) => true,
            Observer::Computation(weak) => weak.strong_count() > 0,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Run one notification pass over the observers registered right now.
    ///
    /// The list is snapshotted before iterating, so observers added or
    /// removed by a callback do not change the set invoked in this pass.
    /// Snapshotting also keeps the interior borrow from crossing into user
    /// code (collect-then-mutate).
    pub fn notify_pass(&self, current: &T) {
        self.prune_dead();
        let pass: Vec<Entry<T>> = self.entries.borrow().clone();
        trace!(observers = pass.len(), "notification pass");
        for entry in pass {
            match entry.observer {
                Observer::Callback(cb) => cb(current),
                Observer::Computation(weak) => {
                    if let Some(computation) = weak.upgrade() {
                        computation.recompute();
                    }
                }
            }
        }
    }
}

// =============================================================================
// STORE INNER (the cell behind Store<T>)
// =============================================================================

/// The internal cell of a plain store.
///
/// Separate from the `Store<T>` handle so the tracker can hold it as
/// `Rc<dyn AnySource>`.
pub struct StoreInner<T> {
    id: SourceId,

    /// The current value, owned exclusively by the cell.
    value: RefCell<T>,

    /// Applied to every value handed out (reads and notifications).
    clone: CloneFn<T>,

    /// Write no-op predicate.
    equals: EqualsFn<T>,

    observers: ObserverList<T>,

    /// Set by `end()`: no further registrations, no further notifications.
    ended: Cell<bool>,
}

impl<T: 'static> StoreInner<T> {
    /// Create a cell. The initial value is stored as-is, not cloned.
    pub fn new(value: T, clone: CloneFn<T>, equals: EqualsFn<T>) -> Self {
        Self {
            id: with_context(|cx| cx.next_source_id()),
            value: RefCell::new(value),
            clone,
            equals,
            observers: ObserverList::new(),
            ended: Cell::new(false),
        }
    }

    /// A clone of the current value, via the cell's clone function.
    pub fn snapshot(&self) -> T {
        let value = self.value.borrow();
        (self.clone)(&value)
    }

    /// Write a value. No-ops (no mutation, no notification) when the
    /// candidate compares equal to the current value; callers rely on this
    /// to avoid redundant downstream recomputation.
    pub fn set(&self, next: T) -> bool {
        let changed = {
            let current = self.value.borrow();
            !(self.equals)(&current, &next)
        };
        trace!(source = ?self.id, changed, "store write");
        if !changed {
            return false;
        }
        *self.value.borrow_mut() = next;
        self.notify();
        true
    }

    /// Notify all current observers with one fresh clone of the value.
    fn notify(&self) {
        if self.ended.get() || self.observers.is_empty() {
            return;
        }
        let current = self.snapshot();
        self.observers.notify_pass(&current);
    }

    pub(crate) fn add_callback(&self, id: SubscriberId, cb: Rc<dyn Fn(&T)>) -> bool {
        if self.ended.get() {
            return false;
        }
        self.observers.push(id, Observer::Callback(cb));
        true
    }

    pub(crate) fn remove_observer(&self, id: SubscriberId) {
        self.observers.remove(id);
    }

    /// Sever reactivity: drop all observers and refuse new ones. The cell
    /// itself stays readable and writable.
    pub fn end(&self) {
        self.ended.set(true);
        self.observers.clear();
    }

    pub fn has_ended(&self) -> bool {
        self.ended.get()
    }

    pub fn equals_fn(&self) -> EqualsFn<T> {
        self.equals
    }

    pub fn clone_fn(&self) -> CloneFn<T> {
        self.clone
    }
}

impl<T: 'static> AnySource for StoreInner<T> {
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn attach_computation(&self, id: SubscriberId, computation: Weak<dyn AnyComputation>) -> bool {
        if self.ended.get() {
            return false;
        }
        self.observers.push(id, Observer::Computation(computation));
        true
    }

    fn detach(&self, id: SubscriberId) {
        self.observers.remove(id);
    }

    fn observer_count(&self) -> usize {
        self.observers.prune_dead();
        self.observers.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
