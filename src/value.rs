// ============================================================================
// ember-stores - Structural Values
// A dynamic value tree and the shape-directed clone over it
// ============================================================================
//
// Cloning is a three-way switch over the value's shape:
// - lists and records are copied recursively (independent allocations)
// - scalar leaves are copied by value
// - opaque payloads are shared, never copied
//
// Record keys are plain strings in a plain map and carry no meta-semantics:
// a key spelled "__proto__" is stored, compared, and cloned as ordinary
// data, and can never alter the shape or behavior of any other record.
// ============================================================================

use std::any::Any;
use std::collections::BTreeMap;
use std::rc::Rc;

// =============================================================================
// VALUE
// =============================================================================

/// A dynamic structural value: scalar leaves, lists, string-keyed records,
/// and opaque payloads that the clone engine will not look inside.
///
/// `Clone` for this type is [`structural`], so a `Store<Value>` hands out
/// deep copies of lists and records by default while opaque payloads stay
/// shared.
///
/// # Example
///
/// ```
/// use ember_stores::Value;
///
/// let settings = Value::record([
///     ("volume", Value::Number(0.8)),
///     ("tags", Value::list([Value::Text("loud".into())])),
/// ]);
/// assert_eq!(settings.get("volume"), Some(&Value::Number(0.8)));
/// ```
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
    /// A payload the engine treats as a black box: cloned by sharing,
    /// compared by identity.
    Opaque(Rc<dyn Any>),
}

impl Value {
    /// Build a record from key/value pairs.
    pub fn record<K, I>(entries: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Record(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    /// Build a list from values.
    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::List(items.into_iter().collect())
    }

    /// Wrap an arbitrary payload as an opaque, shared value.
    pub fn opaque<P: 'static>(payload: P) -> Value {
        Value::Opaque(Rc::new(payload))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Record(fields) => Some(fields),
            _ => None,
        }
    }

    /// Field access on records; None for any other shape or missing key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_record().and_then(|fields| fields.get(key))
    }
}

// =============================================================================
// STRUCTURAL CLONE
// =============================================================================

/// Shape-directed deep clone.
///
/// Every list and record reachable inside `value` is reallocated, so
/// mutating the result can never be observed through the original (or vice
/// versa). Leaves are copied by value; opaque payloads are shared.
pub fn structural(value: &Value) -> Value {
    match value {
        Value::List(items) => Value::List(items.iter().map(structural).collect()),
        Value::Record(fields) => Value::Record(
            fields
                .iter()
                .map(|(key, field)| (key.clone(), structural(field)))
                .collect(),
        ),
        leaf => shallow(leaf),
    }
}

/// Copy a non-container value: scalars by value, opaque payloads by
/// sharing.
fn shallow(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(b) => Value::Bool(*b),
        Value::Number(n) => Value::Number(*n),
        Value::Text(s) => Value::Text(s.clone()),
        Value::Opaque(payload) => Value::Opaque(Rc::clone(payload)),
        // Containers are handled by `structural` before we get here.
        Value::List(items) => Value::List(items.clone()),
        Value::Record(fields) => Value::Record(fields.clone()),
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        structural(self)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            // Opaque payloads compare by identity, not contents.
            (Value::Opaque(a), Value::Opaque(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Record(fields) => f.debug_tuple("Record").field(fields).finish(),
            Value::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Record(v)
    }
}

// =============================================================================
// TESTS
// =============================================================================
