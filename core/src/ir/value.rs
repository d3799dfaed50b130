use serde::Serialize;

/// A compile-time constant held in a function's constant pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// A literal array; `None` keys append.
    Array(Vec<(Option<Constant>, Constant)>),
}

impl Constant {
    /// Equality used for pool deduplication: floats compare by bit pattern so
    /// `0.0` and `-0.0` stay distinct.
    pub fn pool_eq(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Array(a), Constant::Array(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| {
                        let keys = match (ka, kb) {
                            (Some(x), Some(y)) => x.pool_eq(y),
                            (None, None) => true,
                            _ => false,
                        };
                        keys && va.pool_eq(vb)
                    })
            }
            _ => self == other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Null => write!(f, "null"),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Int(i) => write!(f, "{}", i),
            Constant::Float(x) => write!(f, "{:?}", x),
            Constant::String(s) => write!(f, "{:?}", s),
            Constant::Array(items) => {
                write!(f, "[")?;
                for (i, (k, v)) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(k) = k {
                        write!(f, "{} => ", k)?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}
