//! file: core/src/vm/array.rs
//! description: ordered, copy-on-write hash map backing guest arrays.
//!
//! `PhpArray` is a cheap handle: cloning it shares the entries until either
//! side mutates, at which point `Arc::make_mut` detaches a private copy.
//! Removal keeps insertion order (`shift_remove`).

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::string::PhpString;
use super::value::Value;

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ArrayKey {
    Int(i64),
    Str(PhpString),
}

impl ArrayKey {
    /// Normalize a string key: canonical decimal integers become `Int`.
    pub fn from_bytes(bytes: &[u8]) -> ArrayKey {
        match canonical_int(bytes) {
            Some(i) => ArrayKey::Int(i),
            None => ArrayKey::Str(PhpString::from_bytes(bytes.to_vec())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ArrayKey::Int(i) => Value::Int(*i),
            ArrayKey::Str(s) => Value::String(s.clone()),
        }
    }
}

impl From<i64> for ArrayKey {
    fn from(i: i64) -> Self {
        ArrayKey::Int(i)
    }
}

impl From<&str> for ArrayKey {
    fn from(s: &str) -> Self {
        ArrayKey::from_bytes(s.as_bytes())
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKey::Int(i) => write!(f, "{}", i),
            ArrayKey::Str(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Debug for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKey::Int(i) => write!(f, "{}", i),
            ArrayKey::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// `"123"` and `"-7"` are integer keys; `"0123"`, `"-0"` and `"1.5"` are not.
fn canonical_int(bytes: &[u8]) -> Option<i64> {
    let digits = match bytes.first()? {
        b'-' => &bytes[1..],
        _ => bytes,
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if digits.len() > 1 && digits[0] == b'0' {
        return None;
    }
    if bytes[0] == b'-' && digits == b"0" {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse::<i64>().ok()
}

#[derive(Clone, Default)]
struct ArrayData {
    entries: IndexMap<ArrayKey, Value>,
    next_index: i64,
}

#[derive(Clone, Default)]
pub struct PhpArray(Arc<ArrayData>);

impl PhpArray {
    pub fn new() -> Self {
        PhpArray::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        PhpArray(Arc::new(ArrayData { entries: IndexMap::with_capacity(n), next_index: 0 }))
    }

    pub fn from_list(values: impl IntoIterator<Item = Value>) -> Self {
        let mut arr = PhpArray::new();
        for v in values {
            arr.push(v);
        }
        arr
    }

    fn data_mut(&mut self) -> &mut ArrayData {
        Arc::make_mut(&mut self.0)
    }

    pub fn len(&self) -> usize {
        self.0.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.entries.is_empty()
    }

    pub fn get(&self, key: &ArrayKey) -> Option<&Value> {
        self.0.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &ArrayKey) -> Option<&mut Value> {
        self.data_mut().entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &ArrayKey) -> bool {
        self.0.entries.contains_key(key)
    }

    pub fn get_index(&self, i: usize) -> Option<(&ArrayKey, &Value)> {
        self.0.entries.get_index(i)
    }

    pub fn insert(&mut self, key: ArrayKey, value: Value) {
        let data = self.data_mut();
        if let ArrayKey::Int(i) = key {
            if i >= data.next_index {
                data.next_index = i.saturating_add(1);
            }
        }
        data.entries.insert(key, value);
    }

    /// Append with the next integer key. Returns `false` when the key space
    /// is exhausted.
    pub fn push(&mut self, value: Value) -> bool {
        let data = self.data_mut();
        let idx = data.next_index;
        if data.entries.contains_key(&ArrayKey::Int(idx)) {
            return false;
        }
        data.entries.insert(ArrayKey::Int(idx), value);
        data.next_index = idx.saturating_add(1);
        true
    }

    pub fn next_index(&self) -> i64 {
        self.0.next_index
    }

    pub fn remove(&mut self, key: &ArrayKey) -> Option<Value> {
        if !self.0.entries.contains_key(key) {
            return None;
        }
        self.data_mut().entries.shift_remove(key)
    }

    /// Take a value out for modification, leaving null in its place.
    pub fn take(&mut self, key: &ArrayKey) -> Option<Value> {
        self.get_mut(key).map(std::mem::take)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArrayKey, &Value)> {
        self.0.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ArrayKey> {
        self.0.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.entries.values()
    }

    pub fn ptr_eq(&self, other: &PhpArray) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_list(&self) -> bool {
        self.keys().enumerate().all(|(i, k)| *k == ArrayKey::Int(i as i64))
    }
}

impl fmt::Debug for PhpArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl FromIterator<(ArrayKey, Value)> for PhpArray {
    fn from_iter<T: IntoIterator<Item = (ArrayKey, Value)>>(iter: T) -> Self {
        let mut arr = PhpArray::new();
        for (k, v) in iter {
            arr.insert(k, v);
        }
        arr
    }
}
