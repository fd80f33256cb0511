// ============================================================================
// ember-stores - Ergonomic Macros
// ============================================================================

/// Helper macro to clone variables into a move closure.
///
/// Store handles are cheap `Rc` wrappers, but a derive closure wants to own
/// the handles it reads; this removes the clone-before-move boilerplate.
///
/// # Usage
///
/// ```rust
/// use ember_stores::{cloned, computed, store};
///
/// let a = store(1);
/// let b = store(2);
///
/// let sum = computed(cloned!(a, b => move || a.get() + b.get()));
/// assert_eq!(sum.get(), 3);
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}
