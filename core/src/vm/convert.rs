//! file: core/src/vm/convert.rs
//! description: scalar conversions and numeric-string rules.
//!
//! Context-free conversions live here. Anything that may call back into
//! guest code (`__toString`) goes through `ExecutionContext` instead.

use super::array::ArrayKey;
use super::string::PhpString;
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn to_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::Int(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

/// How much of a string parsed as a number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    /// The whole string (surrounding whitespace allowed).
    Full(Number),
    /// A numeric prefix followed by garbage: `"5 apples"`.
    Leading(Number),
    None,
}

fn is_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

pub fn parse_numeric(s: &[u8]) -> Numeric {
    let mut i = 0;
    while i < s.len() && is_ws(s[i]) {
        i += 1;
    }
    let start = i;
    if i < s.len() && (s[i] == b'+' || s[i] == b'-') {
        i += 1;
    }
    let int_start = i;
    while i < s.len() && s[i].is_ascii_digit() {
        i += 1;
    }
    let mut int_digits = i - int_start;
    let mut is_float = false;
    if i < s.len() && s[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < s.len() && s[j].is_ascii_digit() {
            j += 1;
        }
        if int_digits > 0 || j > frac_start {
            is_float = true;
            int_digits += j - frac_start;
            i = j;
        }
    }
    if int_digits == 0 {
        return Numeric::None;
    }
    if i < s.len() && (s[i] == b'e' || s[i] == b'E') {
        let mut j = i + 1;
        if j < s.len() && (s[j] == b'+' || s[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < s.len() && s[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            is_float = true;
            i = j;
        }
    }
    let text = match std::str::from_utf8(&s[start..i]) {
        Ok(t) => t,
        Err(_) => return Numeric::None,
    };
    let number = if is_float {
        Number::Float(text.parse::<f64>().unwrap_or(0.0))
    } else {
        match text.parse::<i64>() {
            Ok(n) => Number::Int(n),
            Err(_) => Number::Float(text.parse::<f64>().unwrap_or(0.0)),
        }
    };
    let mut rest = i;
    while rest < s.len() && is_ws(s[rest]) {
        rest += 1;
    }
    if rest == s.len() {
        Numeric::Full(number)
    } else {
        Numeric::Leading(number)
    }
}

pub fn is_numeric_str(s: &[u8]) -> bool {
    matches!(parse_numeric(s), Numeric::Full(_))
}

pub fn to_bool(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::String(s) => !(s.is_empty() || s.as_bytes() == b"0"),
        Value::Array(a) => !a.is_empty(),
        _ => true,
    }
}

pub fn float_to_int(f: f64) -> i64 {
    if !f.is_finite() {
        return 0;
    }
    f as i64
}

/// `(int)` cast: never warns.
pub fn to_int(v: &Value) -> i64 {
    match v {
        Value::Null => 0,
        Value::Bool(b) => *b as i64,
        Value::Int(i) => *i,
        Value::Float(f) => float_to_int(*f),
        Value::String(s) => match parse_numeric(s.as_bytes()) {
            Numeric::Full(n) | Numeric::Leading(n) => match n {
                Number::Int(i) => i,
                Number::Float(f) => float_to_int(f),
            },
            Numeric::None => 0,
        },
        Value::Array(a) => !a.is_empty() as i64,
        Value::Resource(r) => r.id as i64,
        _ => 1,
    }
}

pub fn to_float(v: &Value) -> f64 {
    match v {
        Value::Float(f) => *f,
        Value::String(s) => match parse_numeric(s.as_bytes()) {
            Numeric::Full(n) | Numeric::Leading(n) => n.to_f64(),
            Numeric::None => 0.0,
        },
        other => to_int(other) as f64,
    }
}

/// Render a float the way guest code sees it. `precision` is the number of
/// significant digits (`None` for the shortest round-trip form).
pub fn format_float(f: f64, precision: Option<usize>) -> String {
    if f.is_nan() {
        return "NAN".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "INF".into() } else { "-INF".into() };
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0".into() } else { "0".into() };
    }
    let sci = match precision {
        Some(p) => format!("{:.*e}", p.saturating_sub(1), f),
        None => format!("{:e}", f),
    };
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    let negative = mantissa.starts_with('-');
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = digits.trim_end_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };
    let threshold = match precision {
        Some(p) => p as i32,
        None => 15,
    };

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if exp < -4 || exp >= threshold {
        out.push_str(&digits[..1]);
        out.push('.');
        if digits.len() > 1 {
            out.push_str(&digits[1..]);
        } else {
            out.push('0');
        }
        out.push('E');
        out.push(if exp < 0 { '-' } else { '+' });
        out.push_str(&exp.abs().to_string());
    } else if exp < 0 {
        out.push_str("0.");
        for _ in 0..(-exp - 1) {
            out.push('0');
        }
        out.push_str(digits);
    } else {
        let int_len = exp as usize + 1;
        if digits.len() <= int_len {
            out.push_str(digits);
            for _ in digits.len()..int_len {
                out.push('0');
            }
        } else {
            out.push_str(&digits[..int_len]);
            out.push('.');
            out.push_str(&digits[int_len..]);
        }
    }
    out
}

/// String form of a non-object value. Arrays render as `"Array"`; the
/// caller is responsible for the conversion warning.
pub fn scalar_to_string(v: &Value) -> Option<PhpString> {
    Some(match v {
        Value::Null => PhpString::empty(),
        Value::Bool(true) => PhpString::from("1"),
        Value::Bool(false) => PhpString::empty(),
        Value::Int(i) => PhpString::from(i.to_string()),
        Value::Float(f) => PhpString::from(format_float(*f, Some(14))),
        Value::String(s) => s.clone(),
        Value::Array(_) => PhpString::from("Array"),
        Value::Resource(r) => PhpString::from(format!("Resource id #{}", r.id)),
        _ => return None,
    })
}

/// Convert a value used as an array offset. `Err` carries the offending
/// type name.
pub fn to_array_key(v: &Value) -> Result<ArrayKey, String> {
    match v {
        Value::Int(i) => Ok(ArrayKey::Int(*i)),
        Value::String(s) => Ok(ArrayKey::from_bytes(s.as_bytes())),
        Value::Bool(b) => Ok(ArrayKey::Int(*b as i64)),
        Value::Float(f) => Ok(ArrayKey::Int(float_to_int(*f))),
        Value::Null => Ok(ArrayKey::Str(PhpString::empty())),
        Value::Resource(r) => Ok(ArrayKey::Int(r.id as i64)),
        other => Err(other.type_name()),
    }
}

/// `gettype()` names.
pub fn gettype(v: &Value) -> &'static str {
    match v {
        Value::Null => "NULL",
        Value::Bool(_) => "boolean",
        Value::Int(_) => "integer",
        Value::Float(_) => "double",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Resource(_) => "resource",
        _ => "object",
    }
}
