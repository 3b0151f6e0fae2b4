//! Dynamic values stored in scopes and produced by watch functions.
//!
//! Scalars are compared by value. Arrays and objects are shared handles: cloning
//! a [`Value`] clones the handle, so a mutation made through one clone is
//! visible through every other, and reference equality ([`Value::same`])
//! compares handles rather than contents. This mirrors the data a template
//! layer binds against, where mutating a list in place must not look like a
//! change to a reference watch but must look like one to a structural or
//! collection watch.
//!
//! Cyclic arrays/objects are unsupported: [`Value::deep_eq`],
//! [`Value::deep_clone`] and `Debug` recurse without cycle detection.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::hash::OrderedMap;

/// A value held in a scope or returned from a watch function.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value; what a lookup of an unset key yields.
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Numeric scalar. NaN is a legal value and equals itself under both
    /// equality policies.
    Number(f64),
    /// String scalar, compared by content.
    String(Rc<str>),
    /// Shared, mutable sequence.
    Array(Array),
    /// Shared, mutable, insertion-ordered keyed collection.
    Object(Object),
}

/// Shared handle to a mutable sequence of values.
#[derive(Clone, Default)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

/// Shared handle to a mutable, insertion-ordered map of values.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<OrderedMap<Value>>>);

impl Value {
    /// Build an array value from anything convertible into values.
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Value::Array(Array::from_iter(items))
    }

    /// Build an object value from key/value pairs, preserving their order.
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Object(Object::from_iter(entries))
    }

    /// Reference equality: scalars by value, arrays/objects by handle.
    ///
    /// NaN is considered equal to NaN so that a watch returning NaN settles.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => numbers_equal(*a, *b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Structural equality, recursing into arrays and objects.
    ///
    /// Object comparison ignores key order.
    pub fn deep_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                if a.ptr_eq(b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.deep_eq(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                if a.ptr_eq(b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, x)| b.get(key).is_some_and(|y| x.deep_eq(y)))
            }
            _ => self.same(other),
        }
    }

    /// Copy with fresh handles at every level.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Array(array) => Value::array(array.borrow().iter().map(Value::deep_clone)),
            Value::Object(object) => Value::Object(Object::from_map(
                object
                    .borrow()
                    .iter()
                    .map(|(key, value)| (key.clone(), value.deep_clone()))
                    .collect(),
            )),
            scalar => scalar.clone(),
        }
    }

    /// Copy with a fresh top-level handle; elements are shared.
    pub fn shallow_clone(&self) -> Value {
        match self {
            Value::Array(array) => Value::Array(Array::new(array.to_vec())),
            Value::Object(object) => Value::Object(Object::from_map(object.borrow().clone())),
            scalar => scalar.clone(),
        }
    }

    /// `true` for arrays and objects.
    pub fn is_collection(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    /// Length of the value when it is array-like.
    ///
    /// Arrays always are. An object is array-like when its `length` entry is a
    /// non-negative integer `n` and either `n == 0` or the key `n - 1` exists,
    /// so `{ length: 42, other: 1 }` is treated as a keyed collection.
    pub fn array_like_len(&self) -> Option<usize> {
        match self {
            Value::Array(array) => Some(array.len()),
            Value::Object(object) => {
                let object = object.borrow();
                let Some(Value::Number(length)) = object.get("length") else {
                    return None;
                };
                let length = *length;
                if !length.is_finite() || length < 0.0 || length.fract() != 0.0 {
                    return None;
                }
                let length = length as usize;
                if length == 0 || object.contains_key(&(length - 1).to_string()) {
                    Some(length)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Whether [`array_like_len`](Self::array_like_len) classifies this value.
    pub fn is_array_like(&self) -> bool {
        self.array_like_len().is_some()
    }

    /// Element `index` of an array-like value, `Undefined` otherwise.
    pub fn array_like_get(&self, index: usize) -> Value {
        match self {
            Value::Array(array) => array.get(index),
            Value::Object(object) => object.get(&index.to_string()),
            _ => Value::Undefined,
        }
    }

    /// `true` for [`Value::Undefined`].
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// `true` for a NaN number.
    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    /// The number, if this is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The array handle, if this is an array.
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    /// The object handle, if this is an object.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }
}

#[inline]
fn numbers_equal(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Structural equality; see [`Value::deep_eq`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.deep_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(array) => f.debug_list().entries(array.borrow().iter()).finish(),
            Value::Object(object) => f.debug_map().entries(object.borrow().iter()).finish(),
        }
    }
}

impl Array {
    /// Wrap a vector in a new handle.
    pub fn new(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    /// Whether both handles point at the same storage.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// `true` if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Element at `index`, or `Undefined` when out of bounds.
    pub fn get(&self, index: usize) -> Value {
        self.0.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Store `value` at `index`, padding with `Undefined` when past the end.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.0.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value.into();
    }

    /// Append an element.
    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        self.0.borrow_mut().pop()
    }

    /// Remove and return the element at `index`, if present.
    pub fn remove(&self, index: usize) -> Option<Value> {
        let mut items = self.0.borrow_mut();
        (index < items.len()).then(|| items.remove(index))
    }

    /// Insert an element, shifting later ones right. Panics if `index > len`.
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        self.0.borrow_mut().insert(index, value.into());
    }

    /// Reverse the elements in place.
    pub fn reverse(&self) {
        self.0.borrow_mut().reverse();
    }

    /// Copy of the current elements (handles are shared).
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    /// Borrow the elements.
    pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.0.borrow()
    }

    /// Mutably borrow the elements.
    pub fn borrow_mut(&self) -> RefMut<'_, Vec<Value>> {
        self.0.borrow_mut()
    }
}

impl<V: Into<Value>> FromIterator<V> for Array {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

impl Object {
    /// Empty object.
    pub fn new() -> Self {
        Self::default()
    }

    fn from_map(map: OrderedMap<Value>) -> Self {
        Self(Rc::new(RefCell::new(map)))
    }

    /// Whether both handles point at the same storage.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Value at `key`, or `Undefined`.
    pub fn get(&self, key: &str) -> Value {
        self.0.borrow().get(key).cloned().unwrap_or_default()
    }

    /// Whether `key` is present (even when bound to `Undefined`).
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    /// Insert or replace an entry, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.borrow_mut().insert(key.into(), value.into())
    }

    /// Remove an entry, keeping the order of the rest.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().shift_remove(key)
    }

    /// Current keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Borrow the entries.
    pub fn borrow(&self) -> Ref<'_, OrderedMap<Value>> {
        self.0.borrow()
    }

    /// Mutably borrow the entries.
    pub fn borrow_mut(&self) -> RefMut<'_, OrderedMap<Value>> {
        self.0.borrow_mut()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Number(value as f64)
                }
            }
        )*
    };
}

impl_from_int!(i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(Array::new(value))
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Value::Array(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Undefined, Into::into)
    }
}
