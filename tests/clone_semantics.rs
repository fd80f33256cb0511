use ember_stores::{
    set_default_clone, store, store_with_clone, structural, ReactiveContext, Value,
};

use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

// =============================================================================
// Boundary cloning through stores
// =============================================================================

#[test]
fn callers_cannot_mutate_store_state_through_reads() {
    let s = store(Value::record([
        ("a", Value::from(2)),
        ("items", Value::list([Value::from(1)])),
    ]));

    let mut got = s.get();
    if let Value::Record(fields) = &mut got {
        fields.insert("a".to_owned(), Value::from(99));
        fields.remove("items");
    }

    let again = s.get();
    assert_eq!(again.get("a"), Some(&Value::from(2)));
    assert!(again.get("items").is_some());
}

#[test]
fn notifications_also_hand_out_clones() {
    let s = store(Value::list([Value::from(1)]));
    let captured = Rc::new(RefCell::new(Vec::new()));

    let h = Rc::clone(&captured);
    let _sub = s.listen(move |v| h.borrow_mut().push(v.clone()));

    s.set(Value::list([Value::from(2)]));
    assert_eq!(captured.borrow().len(), 1);

    // What the subscriber captured is independent of the store.
    if let Value::List(items) = &mut captured.borrow_mut()[0] {
        items.push(Value::from(3));
    }
    assert_eq!(s.get(), Value::list([Value::from(2)]));
}

#[test]
fn sharing_clone_waives_isolation() {
    // Rc values share by default: the handle coming out of the store is
    // the same allocation the store holds.
    let s = store(Rc::new(RefCell::new(vec![1])));
    let got = s.get();
    got.borrow_mut().push(2);
    assert_eq!(*s.get().borrow(), vec![1, 2]);
    assert!(Rc::ptr_eq(&got, &s.get()));
}

#[test]
fn per_store_clone_override_restores_isolation() {
    let s = store_with_clone(Rc::new(RefCell::new(vec![1])), |v| {
        Rc::new(RefCell::new(v.borrow().clone()))
    });
    let got = s.get();
    got.borrow_mut().push(2);

    assert!(!Rc::ptr_eq(&got, &s.get()));
    assert_eq!(*s.get().borrow(), vec![1]);
}

// =============================================================================
// Context-wide defaults
// =============================================================================

fn tagging_clone(v: &Vec<i32>) -> Vec<i32> {
    let mut copy = v.clone();
    copy.push(-1);
    copy
}

#[test]
fn default_clone_applies_to_stores_created_afterward() {
    let cx = ReactiveContext::new();
    cx.enter(|| {
        let before = store(vec![1]);

        set_default_clone::<Vec<i32>>(Some(tagging_clone));
        let after = store(vec![1]);

        // Only the store created after the override sees it.
        assert_eq!(before.get(), vec![1]);
        assert_eq!(after.get(), vec![1, -1]);

        set_default_clone::<Vec<i32>>(None);
        let restored = store(vec![1]);
        assert_eq!(restored.get(), vec![1]);
    });
}

#[test]
fn overrides_stay_inside_their_context() {
    let cx = ReactiveContext::new();
    cx.enter(|| set_default_clone::<Vec<i32>>(Some(tagging_clone)));

    // The surrounding context never saw the override.
    let s = store(vec![7]);
    assert_eq!(s.get(), vec![7]);
}

// =============================================================================
// Reserved record keys
// =============================================================================

#[test]
fn proto_key_round_trips_without_polluting_anything() {
    let tainted = Value::record([(
        "__proto__",
        Value::record([("a0", Value::from(true))]),
    )]);

    let s = store(tainted.clone());
    let got = s.get();

    // The key survives as ordinary data...
    assert_eq!(got, tainted);
    assert_eq!(
        got.get("__proto__").and_then(|v| v.get("a0")),
        Some(&Value::from(true))
    );

    // ...and no freshly created record exposes anything from it.
    let fresh = Value::record([("x", Value::from(0))]);
    assert!(fresh.get("a0").is_none());
    assert!(fresh.get("__proto__").is_none());
}

// =============================================================================
// Structural clone properties
// =============================================================================

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1e9f64..1e9f64).prop_map(Value::Number),
        "[a-z]{0,8}".prop_map(Value::Text),
    ];
    leaf.prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
            prop::collection::btree_map("[a-z_]{1,6}", inner, 0..6).prop_map(Value::Record),
        ]
    })
}

proptest! {
    #[test]
    fn structural_clone_is_structurally_equal(v in value_strategy()) {
        prop_assert_eq!(&structural(&v), &v);
    }

    #[test]
    fn structural_clone_is_idempotent(v in value_strategy()) {
        let once = structural(&v);
        let twice = structural(&once);
        prop_assert_eq!(&twice, &once);
    }

    #[test]
    fn mutated_clones_never_leak_back(v in value_strategy()) {
        // Wrap so there is always a container to mutate.
        let original = Value::list([v]);
        let mut copy = structural(&original);
        if let Value::List(items) = &mut copy {
            items.push(Value::Text("sentinel".to_owned()));
        }
        let Value::List(items) = &original else { unreachable!() };
        prop_assert_eq!(items.len(), 1);
        prop_assert_ne!(&copy, &original);
    }
}
