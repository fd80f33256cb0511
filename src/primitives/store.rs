// ============================================================================
// ember-stores - Store Primitive
// The core writable reactive cell
// ============================================================================

use std::rc::{Rc, Weak};

use crate::core::context::with_context;
use crate::core::types::{
    default_equals, AnySource, CloneFn, EqualsFn, SourceId, StoreInner, SubscriberId,
};
use crate::reactivity::equality::safe_equals_f64;
use crate::reactivity::tracking::track_read;

// =============================================================================
// STORE<T> - The public store handle
// =============================================================================

/// A mutable reactive cell holding a value of type T.
///
/// Writing a new value notifies every subscriber synchronously, in
/// registration order. Every value crossing the cell boundary - reads and
/// notifications alike - is produced by the store's clone function, so
/// callers can keep or mutate what they receive without touching the
/// store's own state (unless the configured clone function shares, e.g.
/// `Rc::clone`, which is the caller's own choice).
///
/// # Example
///
/// ```
/// use ember_stores::store;
///
/// let count = store(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Store<T> {
    inner: Rc<StoreInner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Store<T> {
    /// Create a store with an explicit clone and equality function.
    pub fn new(value: T, clone: CloneFn<T>, equals: EqualsFn<T>) -> Self {
        Self {
            inner: Rc::new(StoreInner::new(value, clone, equals)),
        }
    }

    /// Get a clone of the current value.
    ///
    /// Inside a computed's derive closure this also registers the store as
    /// a dependency of that computed; anywhere else it is side-effect-free.
    pub fn get(&self) -> T {
        track_read(&self.as_any_source());
        self.inner.snapshot()
    }

    /// Set the store's value.
    ///
    /// Returns true if the value changed. A candidate that compares equal
    /// to the current value is a guaranteed no-op: no mutation, no
    /// notification, no downstream recomputation.
    pub fn set(&self, value: T) -> bool {
        self.inner.set(value)
    }

    /// Transform the current value.
    ///
    /// The closure receives a clone of the current value; its return value
    /// goes through the normal `set` path (including the equal-value
    /// no-op).
    ///
    /// # Example
    ///
    /// ```
    /// use ember_stores::store;
    ///
    /// let count = store(1);
    /// count.update(|n| n + 1);
    /// assert_eq!(count.get(), 2);
    /// ```
    pub fn update(&self, f: impl FnOnce(T) -> T) -> bool {
        let next = f(self.inner.snapshot());
        self.inner.set(next)
    }

    /// Register `callback` and invoke it once, synchronously, with the
    /// current value before this call returns.
    ///
    /// On an ended store the immediate invocation still happens (it is just
    /// a read) but nothing is registered.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        callback(&self.inner.snapshot());
        self.listen(callback)
    }

    /// Register `callback` without an immediate invocation; only future
    /// changes are delivered.
    pub fn listen(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let id = with_context(|cx| cx.next_subscriber_id());
        self.inner.add_callback(id, Rc::new(callback));
        Subscription::new(Rc::downgrade(&self.as_any_source()), id)
    }

    /// Sever reactivity: drop all subscribers and refuse new ones.
    ///
    /// `get` and `set` stay usable afterwards; they just no longer
    /// propagate to anything.
    pub fn end(&self) {
        self.inner.end();
    }

    pub fn has_ended(&self) -> bool {
        self.inner.has_ended()
    }

    /// Number of live observers (callbacks and computeds).
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

impl<T: std::fmt::Debug + 'static> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("value", &self.inner.snapshot())
            .finish()
    }
}

// =============================================================================
// SUBSCRIPTION - Handle returned by subscribe/listen
// =============================================================================

/// Handle for one observer registration.
///
/// Holds the cell weakly: dropping the subscription does not unsubscribe,
/// and unsubscribing after the cell itself is gone is a no-op.
pub struct Subscription {
    source: Weak<dyn AnySource>,
    id: SubscriberId,
}

impl Subscription {
    pub(crate) fn new(source: Weak<dyn AnySource>, id: SubscriberId) -> Self {
        Self { source, id }
    }

    /// Remove the registration. Idempotent: calling this twice, or after
    /// the callback was already removed, is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(source) = self.source.upgrade() {
            source.detach(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// =============================================================================
// STORE CREATION FUNCTIONS
// =============================================================================

/// Create a reactive store.
///
/// The clone function is the current context's default for `T` (the type's
/// own `Clone` unless overridden via `set_default_clone`); equality is
/// `PartialEq`. The initial value is stored as-is, not cloned.
///
/// # Example
///
/// ```
/// use ember_stores::store;
///
/// let name = store(String::from("ember"));
/// name.update(|n| n + "-stores");
/// assert_eq!(name.get(), "ember-stores");
/// ```
pub fn store<T>(initial: T) -> Store<T>
where
    T: Clone + PartialEq + 'static,
{
    let clone = with_context(|cx| cx.resolve_clone::<T>());
    Store::new(initial, clone, default_equals::<T>)
}

/// Create a store with an explicit clone function, taking precedence over
/// the context default for this store only.
///
/// # Example
///
/// ```
/// use ember_stores::store_with_clone;
/// use std::rc::Rc;
///
/// // Deep-copy behind the Rc instead of sharing it.
/// let s = store_with_clone(Rc::new(vec![1, 2]), |v| Rc::new(v.as_ref().clone()));
/// assert!(!Rc::ptr_eq(&s.get(), &s.get()));
/// ```
pub fn store_with_clone<T>(initial: T, clone: CloneFn<T>) -> Store<T>
where
    T: PartialEq + 'static,
{
    Store::new(initial, clone, default_equals::<T>)
}

/// Create a store with a custom equality function for the write no-op
/// check.
///
/// # Example
///
/// ```
/// use ember_stores::{never_equals, store_with_equals};
///
/// // Every write notifies, even with an unchanged value.
/// let s = store_with_equals(0, never_equals);
/// assert!(s.set(0));
/// ```
pub fn store_with_equals<T>(initial: T, equals: EqualsFn<T>) -> Store<T>
where
    T: Clone + 'static,
{
    let clone = with_context(|cx| cx.resolve_clone::<T>());
    Store::new(initial, clone, equals)
}

/// Create an f64 store with NaN-stable equality, so writing NaN over NaN
/// stays a no-op.
pub fn store_f64(initial: f64) -> Store<f64> {
    store_with_equals(initial, safe_equals_f64)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn get_after_set_returns_the_value() {
        let s = store(vec![1, 2, 3]);
        s.set(vec![4, 5]);
        assert_eq!(s.get(), vec![4, 5]);
    }

    #[test]
    fn update_receives_a_clone_of_the_previous_value() {
        let s = store(vec![1]);
        s.update(|mut v| {
            v.push(2);
            v
        });
        assert_eq!(s.get(), vec![1, 2]);
    }

    #[test]
    fn equal_write_does_not_notify() {
        let s = store(10);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = s.listen(move |_| h.set(h.get() + 1));

        assert!(!s.set(10));
        assert_eq!(hits.get(), 0);

        assert!(s.set(11));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn subscribe_fires_immediately_listen_does_not() {
        let s = store(4);
        let seen = Rc::new(Cell::new(0));

        let h = Rc::clone(&seen);
        let _sub = s.subscribe(move |v| h.set(*v));
        assert_eq!(seen.get(), 4);

        let silent = Rc::new(Cell::new(-1));
        let h = Rc::clone(&silent);
        let _sub = s.listen(move |v| h.set(*v));
        assert_eq!(silent.get(), -1);

        s.set(10);
        assert_eq!((seen.get(), silent.get()), (10, 10));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let s = store(0);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = s.listen(move |_| h.set(h.get() + 1));

        s.set(1);
        sub.unsubscribe();
        sub.unsubscribe();
        s.set(2);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn handles_share_one_cell() {
        let a = store(1);
        let b = a.clone();
        b.set(2);
        assert_eq!(a.get(), 2);
        assert_eq!(a.source_id(), b.source_id());
    }
}
