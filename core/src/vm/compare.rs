//! file: core/src/vm/compare.rs
//! description: loose and strict comparison.

use std::cmp::Ordering;

use super::array::PhpArray;
use super::convert::{parse_numeric, scalar_to_string, to_bool, Number, Numeric};
use super::string::PhpString;
use super::value::Value;

/// `===`
pub fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.ptr_eq(y)
                || (x.len() == y.len()
                    && x.iter().zip(y.iter()).all(|((ka, va), (kb, vb))| ka == kb && identical(va, vb)))
        }
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        (Value::Resource(x), Value::Resource(y)) => x.ptr_eq(y),
        (Value::Callable(x), Value::Callable(y)) => x.id == y.id,
        (Value::Task(x), Value::Task(y)) => x.id() == y.id(),
        (Value::WaitGroup(x), Value::WaitGroup(y)) => x.id() == y.id(),
        _ => false,
    }
}

fn numeric_of(v: &Value) -> Option<Number> {
    match v {
        Value::Int(i) => Some(Number::Int(*i)),
        Value::Float(f) => Some(Number::Float(*f)),
        _ => None,
    }
}

fn cmp_numbers(a: Number, b: Number) -> Option<Ordering> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => Some(x.cmp(&y)),
        _ => a.to_f64().partial_cmp(&b.to_f64()),
    }
}

fn full_number(s: &PhpString) -> Option<Number> {
    match parse_numeric(s.as_bytes()) {
        Numeric::Full(n) => Some(n),
        _ => None,
    }
}

fn cmp_strings(a: &PhpString, b: &PhpString) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (full_number(a), full_number(b)) {
        return cmp_numbers(x, y);
    }
    Some(a.as_bytes().cmp(b.as_bytes()))
}

fn ordering_to_int(o: Option<Ordering>) -> i64 {
    match o {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
        // NAN and uncomparable arrays
        None => 1,
    }
}

/// Loose comparison. `None` means the operands are uncomparable, which
/// makes every relational operator false.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => cmp_strings(x, y),
        (Value::Bool(_), _) | (_, Value::Bool(_)) | (Value::Null, Value::Array(_)) | (Value::Array(_), Value::Null) => {
            Some(to_bool(a).cmp(&to_bool(b)))
        }
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, Value::String(s)) => Some(b"".as_slice().cmp(s.as_bytes())),
        (Value::String(s), Value::Null) => Some(s.as_bytes().cmp(b"".as_slice())),
        (Value::Null, Value::Object(_)) => Some(Ordering::Less),
        (Value::Object(_), Value::Null) => Some(Ordering::Greater),
        (Value::Null, _) => Some(to_bool(a).cmp(&to_bool(b))),
        (_, Value::Null) => Some(to_bool(a).cmp(&to_bool(b))),
        (Value::String(s), other) | (other, Value::String(s)) if numeric_of(other).is_some() => {
            let n = numeric_of(other)?;
            let flipped = matches!(a, Value::String(_));
            let ord = match full_number(s) {
                Some(sn) => cmp_numbers(n, sn),
                // non-numeric strings compare against the number's string form
                None => {
                    let ns = scalar_to_string(other).unwrap_or_else(PhpString::empty);
                    Some(ns.as_bytes().cmp(s.as_bytes()))
                }
            };
            if flipped { ord.map(Ordering::reverse) } else { ord }
        }
        (Value::Array(x), Value::Array(y)) => compare_arrays(x, y),
        (Value::Array(_), _) => Some(Ordering::Greater),
        (_, Value::Array(_)) => Some(Ordering::Less),
        (Value::Object(x), Value::Object(y)) => {
            if x.ptr_eq(y) {
                return Some(Ordering::Equal);
            }
            if x.class().name != y.class().name {
                return None;
            }
            let (px, py) = (x.props(), y.props());
            if px.len() != py.len() {
                return Some(px.len().cmp(&py.len()));
            }
            for (name, vx) in &px {
                let vy = py.iter().find(|(n, _)| n == name).map(|(_, v)| v)?;
                match (vx, vy) {
                    (Some(vx), Some(vy)) => match compare(vx, vy)? {
                        Ordering::Equal => continue,
                        other => return Some(other),
                    },
                    (None, None) => continue,
                    _ => return None,
                }
            }
            Some(Ordering::Equal)
        }
        (Value::Object(_), _) => Some(Ordering::Greater),
        (_, Value::Object(_)) => Some(Ordering::Less),
        _ => match (numeric_of(a), numeric_of(b)) {
            (Some(x), Some(y)) => cmp_numbers(x, y),
            _ => {
                if identical(a, b) {
                    Some(Ordering::Equal)
                } else {
                    None
                }
            }
        },
    }
}

fn compare_arrays(x: &PhpArray, y: &PhpArray) -> Option<Ordering> {
    if x.len() != y.len() {
        return Some(x.len().cmp(&y.len()));
    }
    for (k, vx) in x.iter() {
        let vy = y.get(k)?;
        match compare(vx, vy)? {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(Ordering::Equal)
}

/// `==`
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().all(|(k, vx)| y.get(k).is_some_and(|vy| loose_eq(vx, vy)))
        }
        (Value::Object(x), Value::Object(y)) if x.ptr_eq(y) => true,
        (Value::Callable(_), _) | (_, Value::Callable(_)) | (Value::Task(_), _) | (_, Value::Task(_)) => identical(a, b),
        (Value::WaitGroup(_), _) | (_, Value::WaitGroup(_)) => identical(a, b),
        _ => compare(a, b) == Some(Ordering::Equal),
    }
}

pub fn is_smaller(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Less)
}

pub fn is_smaller_or_equal(a: &Value, b: &Value) -> bool {
    matches!(compare(a, b), Some(Ordering::Less | Ordering::Equal))
}

/// `<=>`
pub fn spaceship(a: &Value, b: &Value) -> i64 {
    ordering_to_int(compare(a, b))
}
