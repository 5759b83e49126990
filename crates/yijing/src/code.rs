//! Binary trigram and hexagram codes.
//!
//! Codes are strings over `{0,1}` built by mapping each line to its bit in
//! reading order. They are only ever used as lookup keys, so they stay as
//! strings rather than integers; that keeps the table files human-editable.

use crate::{CodeError, Line};
use core::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};

/// A three-bit trigram code such as `"101"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrigramCode([u8; 3]);

/// A six-bit hexagram code such as `"111000"`.
///
/// Characters `0..3` come from reading positions 0–2 (the *upper* code) and
/// characters `3..6` from positions 3–5 (the *lower* code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexagramCode([u8; 6]);

fn parse_bits<const N: usize>(s: &str) -> Result<[u8; N], CodeError> {
    let bytes = s.as_bytes();
    if bytes.len() != N {
        return Err(CodeError::Length {
            code: s.to_string(),
            expected: N,
        });
    }
    if !bytes.iter().all(|b| matches!(b, b'0' | b'1')) {
        return Err(CodeError::Alphabet {
            code: s.to_string(),
        });
    }
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

fn line_bits<const N: usize>(lines: &[Line; N]) -> [u8; N] {
    // `bit()` is always ASCII '0' or '1'
    core::array::from_fn(|i| lines[i].bit() as u8)
}

impl TrigramCode {
    pub fn from_lines(lines: &[Line; 3]) -> Self {
        Self(line_bits(lines))
    }

    pub fn as_str(&self) -> &str {
        // Only ever constructed from ASCII '0'/'1'.
        core::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl HexagramCode {
    pub fn from_lines(lines: &[Line; 6]) -> Self {
        Self(line_bits(lines))
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// Characters `0..3`: reading positions 0–2.
    pub fn upper(&self) -> TrigramCode {
        TrigramCode([self.0[0], self.0[1], self.0[2]])
    }

    /// Characters `3..6`: reading positions 3–5.
    pub fn lower(&self) -> TrigramCode {
        TrigramCode([self.0[3], self.0[4], self.0[5]])
    }

    /// Joins an upper and lower trigram code, upper first.
    pub fn from_trigrams(upper: TrigramCode, lower: TrigramCode) -> Self {
        let [a, b, c] = upper.0;
        let [d, e, f] = lower.0;
        Self([a, b, c, d, e, f])
    }
}

macro_rules! impl_code_traits {
    ($ty:ident, $len:literal) => {
        impl FromStr for $ty {
            type Err = CodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_bits::<$len>(s).map(Self)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = CodeError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$ty> for String {
            fn from(code: $ty) -> Self {
                code.as_str().to_string()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_code_traits!(TrigramCode, 3);
impl_code_traits!(HexagramCode, 6);
