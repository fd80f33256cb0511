// ============================================================================
// ember-stores - Reactive Context
// Per-thread state: the computation frame stack, id allocation, and the
// default clone registry
// ============================================================================

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::types::{
    default_clone, AnyComputation, CloneFn, ComputationId, SourceId, SubscriberId, UpstreamLink,
};

// =============================================================================
// COMPUTATION FRAMES
// =============================================================================

/// Bookkeeping for one in-flight recomputation.
///
/// A frame lives on the context's stack for exactly the synchronous window
/// of a computed's derive closure. Every store read inside that window is
/// recorded here: the store attaches `computation` as an observer and the
/// resulting link is collected in `links` so the computed can release it on
/// its next run.
pub(crate) struct Frame {
    /// Identity of the computation this frame belongs to. A token appears
    /// on the stack at most once; re-entry is a circular dependency.
    pub token: ComputationId,

    /// The computation to attach to stores read inside this frame.
    pub computation: Weak<dyn AnyComputation>,

    /// Upstream links established so far in this run.
    pub links: Vec<UpstreamLink>,

    /// Source ids already recorded this run, so a store read twice inside
    /// one derive closure is attached only once.
    pub seen: Vec<SourceId>,
}

// =============================================================================
// REACTIVE CONTEXT
// =============================================================================

/// Per-thread reactive context.
///
/// Holds the only shared mutable state of the reactivity system: the stack
/// of in-flight computation frames, the id allocator, and the registry of
/// default clone functions. A thread-local default context backs the free
/// functions (`store`, `computed`, ...); [`ReactiveContext::new`] plus
/// [`ReactiveContext::enter`] give an isolated reactive graph, which is
/// mostly useful in tests.
///
/// A reactive graph must live entirely within one context: stores created
/// under one context are not meant to be wired to computeds running under
/// another.
pub struct ReactiveContext {
    /// In-flight computation frames, innermost last.
    pub(crate) frames: RefCell<Vec<Frame>>,

    /// Allocator behind source, subscriber and computation ids.
    next_id: Cell<u64>,

    /// Default clone functions keyed by the store value type, consulted at
    /// store creation only.
    clone_overrides: RefCell<HashMap<TypeId, Box<dyn Any>>>,
}

impl ReactiveContext {
    /// Create a fresh, empty context.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::fresh())
    }

    fn fresh() -> Self {
        Self {
            frames: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            clone_overrides: RefCell::new(HashMap::new()),
        }
    }

    /// Run `f` with this context installed as the current one.
    ///
    /// Nested `enter` calls stack; the previous context is restored when `f`
    /// returns (or unwinds).
    ///
    /// # Example
    ///
    /// ```
    /// use ember_stores::{store, ReactiveContext};
    ///
    /// let cx = ReactiveContext::new();
    /// let value = cx.enter(|| {
    ///     let s = store(41);
    ///     s.set(42);
    ///     s.get()
    /// });
    /// assert_eq!(value, 42);
    /// ```
    pub fn enter<R>(self: &Rc<Self>, f: impl FnOnce() -> R) -> R {
        CURRENT.with(|stack| stack.borrow_mut().push(Rc::clone(self)));
        let _guard = EnterGuard;
        f()
    }

    // =========================================================================
    // ID ALLOCATION
    // =========================================================================

    fn bump(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    pub(crate) fn next_source_id(&self) -> SourceId {
        SourceId(self.bump())
    }

    pub(crate) fn next_subscriber_id(&self) -> SubscriberId {
        SubscriberId(self.bump())
    }

    pub(crate) fn next_computation_id(&self) -> ComputationId {
        ComputationId(self.bump())
    }

    // =========================================================================
    // FRAME STACK
    // =========================================================================

    /// Number of in-flight computation frames.
    pub fn tracking_depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Whether `token` is currently on the frame stack.
    pub(crate) fn in_flight(&self, token: ComputationId) -> bool {
        self.frames.borrow().iter().any(|frame| frame.token == token)
    }

    // =========================================================================
    // DEFAULT CLONE REGISTRY
    // =========================================================================

    /// Replace the default clone function for stores of `T` created after
    /// this call. `None` restores the built-in default (`T::clone`).
    ///
    /// Stores that already exist keep the clone function they captured at
    /// construction.
    pub fn set_default_clone<T: 'static>(&self, clone: Option<CloneFn<T>>) {
        match clone {
            Some(f) => {
                self.clone_overrides
                    .borrow_mut()
                    .insert(TypeId::of::<T>(), Box::new(f));
            }
            None => {
                self.clone_overrides.borrow_mut().remove(&TypeId::of::<T>());
            }
        }
    }

    /// The clone function a store of `T` created right now would capture.
    pub(crate) fn resolve_clone<T: Clone + 'static>(&self) -> CloneFn<T> {
        self.clone_overrides
            .borrow()
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<CloneFn<T>>())
            .copied()
            .unwrap_or(default_clone::<T>)
    }
}

/// Restores the previously current context, including on unwind.
struct EnterGuard;

impl Drop for EnterGuard {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    /// The default context backing the free-function API.
    static DEFAULT: Rc<ReactiveContext> = Rc::new(ReactiveContext::fresh());

    /// Contexts installed via `enter`, innermost last.
    static CURRENT: RefCell<Vec<Rc<ReactiveContext>>> = const { RefCell::new(Vec::new()) };
}

/// Access the current reactive context (the innermost entered one, or the
/// thread-local default).
pub fn with_context<R>(f: impl FnOnce(&ReactiveContext) -> R) -> R {
    let entered = CURRENT.with(|stack| stack.borrow().last().cloned());
    match entered {
        Some(cx) => f(&cx),
        None => DEFAULT.with(|cx| f(cx)),
    }
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// Whether a computation frame is active, i.e. store reads are currently
/// being recorded as dependencies.
pub fn is_tracking() -> bool {
    with_context(|cx| cx.tracking_depth() > 0)
}

/// Replace the current context's default clone function for stores of `T`
/// created after this call; `None` restores the built-in default.
///
/// # Example
///
/// ```
/// use ember_stores::{set_default_clone, store};
/// use std::rc::Rc;
///
/// // Share vectors instead of deep-copying them.
/// set_default_clone::<Rc<Vec<i32>>>(Some(|v| Rc::clone(v)));
/// let s = store(Rc::new(vec![1, 2, 3]));
/// assert!(Rc::ptr_eq(&s.get(), &s.get()));
/// set_default_clone::<Rc<Vec<i32>>>(None);
/// ```
pub fn set_default_clone<T: 'static>(clone: Option<CloneFn<T>>) {
    with_context(|cx| cx.set_default_clone(clone));
}

// =============================================================================
// TESTS
// =============================================================================
