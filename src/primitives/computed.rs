// ============================================================================
// ember-stores - Computed Stores
// Derived cells that re-run when any store they read changes
// ============================================================================
//
// A computed is BOTH a cell (it can be read, subscribed to, ended) AND a
// computation (it has upstream links and a recompute method). Propagation
// is eager: an upstream write re-runs the derive closure and publishes the
// result synchronously, still inside the original write call.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::core::context::with_context;
use crate::core::types::{
    default_equals, AnyComputation, AnySource, CloneFn, ComputationId, EqualsFn, Observer,
    ObserverList, SourceId, SubscriberId, UpstreamLink,
};
use crate::primitives::store::Subscription;
use crate::reactivity::tracking::{begin_frame, ensure_not_in_flight, track_read};

// =============================================================================
// COMPUTED INNER
// =============================================================================

/// The internal cell of a computed store.
pub struct ComputedInner<T> {
    /// Token on the tracker stack while this computed's derive runs.
    token: ComputationId,

    /// Identity as a readable cell.
    id: SourceId,

    /// The derivation closure. Pure: reads zero or more stores.
    derive: Box<dyn Fn() -> T>,

    /// Published value (None only before the creation-time first run).
    value: RefCell<Option<T>>,

    clone: CloneFn<T>,
    equals: EqualsFn<T>,

    observers: ObserverList<T>,

    /// Upstream subscriptions from the most recent run. Torn down and
    /// rebuilt on every recomputation, so conditional reads in the derive
    /// closure drop the subscriptions of the branch not taken.
    links: RefCell<Vec<UpstreamLink>>,

    ended: Cell<bool>,

    /// Weak self-handle, handed to tracking frames.
    self_ref: RefCell<Option<Weak<ComputedInner<T>>>>,
}

impl<T: 'static> ComputedInner<T> {
    pub fn new<F>(derive: F, clone: CloneFn<T>, equals: EqualsFn<T>) -> Rc<Self>
    where
        F: Fn() -> T + 'static,
    {
        let inner = Rc::new(Self {
            token: with_context(|cx| cx.next_computation_id()),
            id: with_context(|cx| cx.next_source_id()),
            derive: Box::new(derive),
            value: RefCell::new(None),
            clone,
            equals,
            observers: ObserverList::new(),
            links: RefCell::new(Vec::new()),
            ended: Cell::new(false),
            self_ref: RefCell::new(None),
        });
        *inner.self_ref.borrow_mut() = Some(Rc::downgrade(&inner));
        inner
    }

    /// A clone of the published value.
    pub fn snapshot(&self) -> T {
        let value = self.value.borrow();
        (self.clone)(value.as_ref().expect("computed not initialized"))
    }

    /// Re-run the derive closure under a fresh tracking frame and publish
    /// the result through the normal write path.
    ///
    /// # Panics
    ///
    /// Panics with a [`crate::CycleError`] message when this computation's
    /// token is already on the tracker stack - i.e. the re-run was
    /// triggered, directly or transitively, from its own derive closure.
    /// The closure is not executed in that case and the previously
    /// published value stays intact.
    pub fn recompute(&self) {
        if self.ended.get() {
            // A snapshot-semantics notification can still arrive after end.
            return;
        }
        ensure_not_in_flight(self.token);
        debug!(token = ?self.token, "recompute");

        self.release_links();
        let weak: Weak<dyn AnyComputation> = self
            .self_ref
            .borrow()
            .clone()
            .expect("computed self reference unset");
        let value = {
            let _frame = begin_frame(self.token, weak);
            (self.derive)()
            // Frame guard drops here: pops the frame and installs the
            // collected links, on unwind as well.
        };
        self.publish(value);
    }

    /// Write a value into the cell: equal-value no-op, then an ordered
    /// notification pass with one fresh clone.
    pub fn publish(&self, next: T) -> bool {
        let changed = {
            let current = self.value.borrow();
            match current.as_ref() {
                Some(v) => !(self.equals)(v, &next),
                None => true,
            }
        };
        trace!(source = ?self.id, changed, "computed publish");
        if !changed {
            return false;
        }
        *self.value.borrow_mut() = Some(next);
        if self.ended.get() || self.observers.is_empty() {
            return true;
        }
        let current = self.snapshot();
        self.observers.notify_pass(&current);
        true
    }

    /// Detach every upstream subscription from the previous run.
    fn release_links(&self) {
        let links: Vec<UpstreamLink> = self.links.borrow_mut().drain(..).collect();
        for link in &links {
            link.release();
        }
    }

    pub(crate) fn add_callback(&self, id: SubscriberId, cb: Rc<dyn Fn(&T)>) -> bool {
        if self.ended.get() {
            return false;
        }
        self.observers.push(id, Observer::Callback(cb));
        true
    }

    /// Sever reactivity in both directions: drop downstream observers and
    /// release every upstream link.
    pub fn end(&self) {
        self.ended.set(true);
        self.observers.clear();
        self.release_links();
    }

    pub fn has_ended(&self) -> bool {
        self.ended.get()
    }

    /// Number of upstream stores this computed is currently subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.links.borrow().len()
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        // Dropping the last handle detaches the computed from its upstream
        // stores; their weak observer entries die with this allocation.
        let links: Vec<UpstreamLink> = self.links.borrow_mut().drain(..).collect();
        for link in &links {
            link.release();
        }
    }
}

impl<T: 'static> AnySource for ComputedInner<T> {
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

impl<T: 'static> AnyComputation for ComputedInner<T> {
    fn token(&self) -> ComputationId {
        self.token
    }

    fn recompute(&self) {
        ComputedInner::recompute(self);
    }

    fn install_links(&self, links: Vec<UpstreamLink>) {
        *self.links.borrow_mut() = links;
    }
}

// =============================================================================
// COMPUTED<T> - The public computed handle
// =============================================================================

/// A store whose value is derived from other stores.
///
/// The derive closure's dependencies are discovered at run time: every
/// store it reads while running is captured, and any change to one of them
/// re-runs the closure and publishes the result synchronously. The
/// dependency set is rediscovered on every run, so closures with
/// conditional reads stay correctly wired.
///
/// # Example
///
/// ```
/// use ember_stores::{cloned, computed, store};
///
/// let s = store(10);
/// let t = store(20);
/// let sum = computed(cloned!(s, t => move || s.get() + t.get()));
///
/// assert_eq!(sum.get(), 30);
/// s.set(40);
/// assert_eq!(sum.get(), 60);
/// ```
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Computed<T> {
    fn create<F>(derive: F, clone: CloneFn<T>, equals: EqualsFn<T>) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let inner = ComputedInner::new(derive, clone, equals);
        // First run: establishes the initial value and the initial links.
        inner.recompute();
        Self { inner }
    }

    /// Get a clone of the current derived value.
    ///
    /// Participates in tracking like any store read, so computeds layer on
    /// top of computeds.
    pub fn get(&self) -> T {
        track_read(&self.as_any_source());
        self.inner.snapshot()
    }

    /// Overwrite the derived value directly.
    ///
    /// Goes through the same write path as a recomputation (equal-value
    /// no-op, ordered notification). The next upstream change recomputes
    /// over it.
    pub fn set(&self, value: T) -> bool {
        self.inner.publish(value)
    }

    /// Transform the current derived value; see [`Computed::set`].
    pub fn update(&self, f: impl FnOnce(T) -> T) -> bool {
        let next = f(self.inner.snapshot());
        self.inner.publish(next)
    }

    /// Register `callback` and invoke it once, synchronously, with the
    /// current value before this call returns.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        callback(&self.inner.snapshot());
        self.listen(callback)
    }

    /// Register `callback` for future changes only.
    pub fn listen(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let id = with_context(|cx| cx.next_subscriber_id());
        self.inner.add_callback(id, Rc::new(callback));
        Subscription::new(Rc::downgrade(&self.as_any_source()), id)
    }

    /// Sever reactivity in both directions: stop notifying downstream
    /// observers and stop reacting to upstream stores.
    ///
    /// `get` and `set` stay usable afterwards.
    pub fn end(&self) {
        self.inner.end();
    }

    pub fn has_ended(&self) -> bool {
        self.inner.has_ended()
    }

    /// Number of upstream stores currently subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependency_count()
    }

    /// Number of live downstream observers.
    pub fn observer_count(&self) -> usize {
        AnySource::observer_count(&*self.inner)
    }

    /// Identity of this cell in the reactive graph.
    pub fn source_id(&self) -> SourceId {
        AnySource::source_id(&*self.inner)
    }

    /// The cell as a type-erased source, for graph-level operations.
    pub fn as_any_source(&self) -> Rc<dyn AnySource> {
        Rc::clone(&self.inner) as Rc<dyn AnySource>
    }
}

impl<T: std::fmt::Debug + 'static> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("value", &self.inner.snapshot())
            .finish()
    }
}

// =============================================================================
// COMPUTED CREATION FUNCTIONS
// =============================================================================

/// Create a computed store over a derive closure.
///
/// The closure runs once, synchronously, before this call returns: its
/// result is the initial value and every store it read is subscribed to.
/// Each later change of a dependency re-runs it and publishes the result,
/// rediscovering the dependency set from scratch.
///
/// # Panics
///
/// Panics with a [`crate::CycleError`] message if the closure depends,
/// directly or transitively, on the computed's own in-progress result.
///
/// # Example
///
/// ```
/// use ember_stores::{cloned, computed, store};
///
/// let celsius = store(0.0_f64);
/// let fahrenheit = computed(cloned!(celsius => move || celsius.get() * 9.0 / 5.0 + 32.0));
///
/// assert_eq!(fahrenheit.get(), 32.0);
/// celsius.set(100.0);
/// assert_eq!(fahrenheit.get(), 212.0);
/// ```
pub fn computed<T, F>(derive: F) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    let clone = with_context(|cx| cx.resolve_clone::<T>());
    Computed::create(derive, clone, default_equals::<T>)
}

/// Create a computed with a custom equality function for the publish
/// no-op check.
pub fn computed_with_equals<T, F>(derive: F, equals: EqualsFn<T>) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    let clone = with_context(|cx| cx.resolve_clone::<T>());
    Computed::create(derive, clone, equals)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::store::store;

    #[test]
    fn initial_value_is_computed_at_creation() {
        let s = store(21);
        let doubled = computed({
            let s = s.clone();
            move || s.get() * 2
        });
        assert_eq!(doubled.get(), 42);
        assert_eq!(doubled.dependency_count(), 1);
    }

    #[test]
    fn upstream_writes_propagate_eagerly() {
        let s = store(1);
        let doubled = computed({
            let s = s.clone();
            move || s.get() * 2
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let h = Rc::clone(&seen);
        let _sub = doubled.listen(move |v| h.borrow_mut().push(*v));

        s.set(5);
        // The notification happened inside the set call.
        assert_eq!(*seen.borrow(), vec![10]);
        assert_eq!(doubled.get(), 10);
    }

    #[test]
    fn unchanged_derivation_does_not_notify_downstream() {
        let s = store(3);
        let clamped = computed({
            let s = s.clone();
            move || s.get().clamp(0, 10)
        });
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = clamped.listen(move |_| h.set(h.get() + 1));

        s.set(20); // clamps to 10
        s.set(30); // still 10: recomputes, publishes nothing
        assert_eq!(hits.get(), 1);
        assert_eq!(clamped.get(), 10);
    }

    #[test]
    fn duplicate_reads_subscribe_once() {
        let s = store(2);
        let squared = computed({
            let s = s.clone();
            move || s.get() * s.get()
        });
        assert_eq!(squared.get(), 4);
        assert_eq!(squared.dependency_count(), 1);
        assert_eq!(s.observer_count(), 1);
    }

    #[test]
    fn direct_set_is_overwritten_by_next_recompute() {
        let s = store(1);
        let doubled = computed({
            let s = s.clone();
            move || s.get() * 2
        });
        doubled.set(99);
        assert_eq!(doubled.get(), 99);

        s.set(4);
        assert_eq!(doubled.get(), 8);
    }
}
