//! file: core/src/vm/arith.rs
//! description: arithmetic, bitwise and increment semantics.
//!
//! Integer operations are checked; overflow promotes to float. Strings take
//! part through the numeric-string rules: a leading-numeric string warns, a
//! non-numeric one is a `TypeError`.

use crate::ir::op::Opcode;

use super::array::PhpArray;
use super::convert::{float_to_int, parse_numeric, Number, Numeric};
use super::error::VmError;
use super::string::{increment_alnum, PhpString};
use super::value::Value;

/// Sink for guest-visible warnings raised while computing a value.
pub trait Diagnostics {
    fn warn(&mut self, message: &str);
}

pub(crate) fn symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::Add => "+",
        Opcode::Sub => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        Opcode::Mod => "%",
        Opcode::Pow => "**",
        Opcode::BitAnd => "&",
        Opcode::BitOr => "|",
        Opcode::BitXor => "^",
        Opcode::Shl => "<<",
        Opcode::Shr => ">>",
        Opcode::Concat => ".",
        _ => "?",
    }
}

fn unsupported(op: Opcode, a: &Value, b: &Value) -> VmError {
    VmError::raise(
        "TypeError",
        format!("Unsupported operand types: {} {} {}", a.type_name(), symbol(op), b.type_name()),
    )
}

fn to_number(v: &Value, op: Opcode, a: &Value, b: &Value, d: &mut dyn Diagnostics) -> Result<Number, VmError> {
    match v {
        Value::Null => Ok(Number::Int(0)),
        Value::Bool(x) => Ok(Number::Int(*x as i64)),
        Value::Int(i) => Ok(Number::Int(*i)),
        Value::Float(f) => Ok(Number::Float(*f)),
        Value::String(s) => match parse_numeric(s.as_bytes()) {
            Numeric::Full(n) => Ok(n),
            Numeric::Leading(n) => {
                d.warn("A non-numeric value encountered");
                Ok(n)
            }
            Numeric::None => Err(unsupported(op, a, b)),
        },
        Value::Resource(r) => Ok(Number::Int(r.id as i64)),
        _ => Err(unsupported(op, a, b)),
    }
}

fn to_int_operand(v: &Value, op: Opcode, a: &Value, b: &Value, d: &mut dyn Diagnostics) -> Result<i64, VmError> {
    Ok(match to_number(v, op, a, b, d)? {
        Number::Int(i) => i,
        Number::Float(f) => float_to_int(f),
    })
}

/// Every binary operator except `.`, which needs string conversion of
/// objects and is handled by the engine.
pub fn binary_op(op: Opcode, a: &Value, b: &Value, d: &mut dyn Diagnostics) -> Result<Value, VmError> {
    match op {
        Opcode::Add => {
            if let (Value::Array(x), Value::Array(y)) = (a, b) {
                return Ok(Value::Array(array_union(x, y)));
            }
            let (x, y) = (to_number(a, op, a, b, d)?, to_number(b, op, a, b, d)?);
            Ok(match (x, y) {
                (Number::Int(x), Number::Int(y)) => x.checked_add(y).map(Value::Int).unwrap_or(Value::Float(x as f64 + y as f64)),
                _ => Value::Float(x.to_f64() + y.to_f64()),
            })
        }
        Opcode::Sub => {
            let (x, y) = (to_number(a, op, a, b, d)?, to_number(b, op, a, b, d)?);
            Ok(match (x, y) {
                (Number::Int(x), Number::Int(y)) => x.checked_sub(y).map(Value::Int).unwrap_or(Value::Float(x as f64 - y as f64)),
                _ => Value::Float(x.to_f64() - y.to_f64()),
            })
        }
        Opcode::Mul => {
            let (x, y) = (to_number(a, op, a, b, d)?, to_number(b, op, a, b, d)?);
            Ok(match (x, y) {
                (Number::Int(x), Number::Int(y)) => x.checked_mul(y).map(Value::Int).unwrap_or(Value::Float(x as f64 * y as f64)),
                _ => Value::Float(x.to_f64() * y.to_f64()),
            })
        }
        Opcode::Div => {
            let (x, y) = (to_number(a, op, a, b, d)?, to_number(b, op, a, b, d)?);
            if y.to_f64() == 0.0 {
                return Err(VmError::raise("DivisionByZeroError", "Division by zero"));
            }
            Ok(match (x, y) {
                (Number::Int(x), Number::Int(y)) if x.checked_rem(y) == Some(0) => {
                    x.checked_div(y).map(Value::Int).unwrap_or(Value::Float(x as f64 / y as f64))
                }
                _ => Value::Float(x.to_f64() / y.to_f64()),
            })
        }
        Opcode::Mod => {
            let (x, y) = (to_int_operand(a, op, a, b, d)?, to_int_operand(b, op, a, b, d)?);
            if y == 0 {
                return Err(VmError::raise("DivisionByZeroError", "Modulo by zero"));
            }
            Ok(Value::Int(x.wrapping_rem(y)))
        }
        Opcode::Pow => {
            let (x, y) = (to_number(a, op, a, b, d)?, to_number(b, op, a, b, d)?);
            Ok(match (x, y) {
                (Number::Int(base), Number::Int(exp)) if exp >= 0 => {
                    let checked = u32::try_from(exp).ok().and_then(|e| base.checked_pow(e));
                    checked.map(Value::Int).unwrap_or(Value::Float((base as f64).powf(exp as f64)))
                }
                _ => Value::Float(x.to_f64().powf(y.to_f64())),
            })
        }
        Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor => {
            if let (Value::String(x), Value::String(y)) = (a, b) {
                return Ok(Value::String(bytewise(op, x, y)));
            }
            let (x, y) = (to_int_operand(a, op, a, b, d)?, to_int_operand(b, op, a, b, d)?);
            Ok(Value::Int(match op {
                Opcode::BitAnd => x & y,
                Opcode::BitOr => x | y,
                _ => x ^ y,
            }))
        }
        Opcode::Shl | Opcode::Shr => {
            let (x, y) = (to_int_operand(a, op, a, b, d)?, to_int_operand(b, op, a, b, d)?);
            if y < 0 {
                return Err(VmError::raise("ArithmeticError", "Bit shift by negative number"));
            }
            Ok(Value::Int(match (op, y >= 64) {
                (Opcode::Shl, true) => 0,
                (Opcode::Shl, false) => x.wrapping_shl(y as u32),
                (_, true) => {
                    if x < 0 {
                        -1
                    } else {
                        0
                    }
                }
                (_, false) => x >> y,
            }))
        }
        other => Err(VmError::raise("Error", format!("{} is not an arithmetic operator", other))),
    }
}

fn bytewise(op: Opcode, x: &PhpString, y: &PhpString) -> PhpString {
    let (xs, ys) = (x.as_bytes(), y.as_bytes());
    let out: Vec<u8> = match op {
        // `|` pads to the longer operand, `&` and `^` truncate
        Opcode::BitOr => {
            let n = xs.len().max(ys.len());
            (0..n).map(|i| xs.get(i).copied().unwrap_or(0) | ys.get(i).copied().unwrap_or(0)).collect()
        }
        Opcode::BitAnd => xs.iter().zip(ys).map(|(a, b)| a & b).collect(),
        _ => xs.iter().zip(ys).map(|(a, b)| a ^ b).collect(),
    };
    PhpString::from_bytes(out)
}

fn array_union(x: &PhpArray, y: &PhpArray) -> PhpArray {
    let mut out = x.clone();
    for (k, v) in y.iter() {
        if !out.contains_key(k) {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}

pub fn negate(v: &Value, d: &mut dyn Diagnostics) -> Result<Value, VmError> {
    binary_op(Opcode::Mul, v, &Value::Int(-1), d)
}

pub fn unary_plus(v: &Value, d: &mut dyn Diagnostics) -> Result<Value, VmError> {
    binary_op(Opcode::Mul, v, &Value::Int(1), d)
}

pub fn bit_not(v: &Value) -> Result<Value, VmError> {
    match v {
        Value::Int(i) => Ok(Value::Int(!i)),
        Value::Float(f) => Ok(Value::Int(!float_to_int(*f))),
        Value::String(s) => Ok(Value::String(PhpString::from_bytes(s.as_bytes().iter().map(|b| !b).collect::<Vec<u8>>()))),
        other => Err(VmError::raise("TypeError", format!("Cannot perform bitwise not on {}", other.type_name()))),
    }
}

pub fn increment(v: &Value) -> Result<Value, VmError> {
    match v {
        Value::Null => Ok(Value::Int(1)),
        Value::Int(i) => Ok(i.checked_add(1).map(Value::Int).unwrap_or(Value::Float(*i as f64 + 1.0))),
        Value::Float(f) => Ok(Value::Float(f + 1.0)),
        Value::Bool(_) => Ok(v.clone()),
        Value::String(s) if s.is_empty() => Ok(Value::str("1")),
        Value::String(s) => match parse_numeric(s.as_bytes()) {
            Numeric::Full(Number::Int(i)) => Ok(i.checked_add(1).map(Value::Int).unwrap_or(Value::Float(i as f64 + 1.0))),
            Numeric::Full(Number::Float(f)) => Ok(Value::Float(f + 1.0)),
            _ => Ok(Value::String(PhpString::from_bytes(increment_alnum(s.as_bytes())))),
        },
        other => Err(VmError::raise("TypeError", format!("Cannot increment {}", other.type_name()))),
    }
}

pub fn decrement(v: &Value) -> Result<Value, VmError> {
    match v {
        Value::Null | Value::Bool(_) => Ok(v.clone()),
        Value::Int(i) => Ok(i.checked_sub(1).map(Value::Int).unwrap_or(Value::Float(*i as f64 - 1.0))),
        Value::Float(f) => Ok(Value::Float(f - 1.0)),
        Value::String(s) if s.is_empty() => Ok(Value::Int(-1)),
        Value::String(s) => match parse_numeric(s.as_bytes()) {
            Numeric::Full(Number::Int(i)) => Ok(i.checked_sub(1).map(Value::Int).unwrap_or(Value::Float(i as f64 - 1.0))),
            Numeric::Full(Number::Float(f)) => Ok(Value::Float(f - 1.0)),
            _ => Ok(v.clone()),
        },
        other => Err(VmError::raise("TypeError", format!("Cannot decrement {}", other.type_name()))),
    }
}
