//! file: core/src/vm/string.rs
//! description: immutable byte strings shared between values.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Guest strings are byte sequences; cloning shares the buffer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhpString(Arc<[u8]>);

impl PhpString {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        PhpString(Arc::from(bytes.into().into_boxed_slice()))
    }

    pub fn empty() -> Self {
        PhpString::from_bytes(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn concat(&self, other: &PhpString) -> PhpString {
        let mut out = Vec::with_capacity(self.len() + other.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(&other.0);
        PhpString::from_bytes(out)
    }
}

impl From<&str> for PhpString {
    fn from(s: &str) -> Self {
        PhpString::from_bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for PhpString {
    fn from(s: String) -> Self {
        PhpString::from_bytes(s.into_bytes())
    }
}

impl From<Vec<u8>> for PhpString {
    fn from(b: Vec<u8>) -> Self {
        PhpString::from_bytes(b)
    }
}

impl fmt::Display for PhpString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_lossy())
    }
}

impl fmt::Debug for PhpString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

/// Perl-style increment of an alphanumeric string: `"a"` -> `"b"`,
/// `"Az"` -> `"Ba"`, `"zz"` -> `"aaa"`, `"a9"` -> `"b0"`.
pub(crate) fn increment_alnum(s: &[u8]) -> Vec<u8> {
    let mut out = s.to_vec();
    let mut i = out.len();
    while i > 0 {
        i -= 1;
        let c = out[i];
        match c {
            b'z' => out[i] = b'a',
            b'Z' => out[i] = b'A',
            b'9' => out[i] = b'0',
            b'a'..=b'y' | b'A'..=b'Y' | b'0'..=b'8' => {
                out[i] = c + 1;
                return out;
            }
            _ => return out,
        }
    }
    // every position wrapped: prepend the carry
    let first = match s.first() {
        Some(b'0'..=b'9') => b'1',
        Some(b'A'..=b'Z') => b'A',
        _ => b'a',
    };
    out.insert(0, first);
    out
}
