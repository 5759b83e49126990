//! Lines, readings and three-coin casting.

use crate::{CoinSource, HexagramCode, ParseLineError, ReadingLengthError};
use core::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};

/// Number of lines in a reading.
pub const READING_LEN: usize = 6;

/// One divinatory position, cast from three coins.
///
/// On the wire a line is one of four tokens: `"yang"`, `"yin"`, `"old-yang"`
/// and `"old-yin"`. The two `Old*` variants are changing lines; they carry
/// through as data and are not transformed further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Line {
    #[serde(rename = "yang")]
    YoungYang,
    #[serde(rename = "yin")]
    YoungYin,
    #[serde(rename = "old-yang")]
    OldYang,
    #[serde(rename = "old-yin")]
    OldYin,
}

impl Line {
    /// All four variants, in wire-token order.
    pub const ALL: [Self; 4] = [Self::YoungYang, Self::YoungYin, Self::OldYang, Self::OldYin];

    /// Maps three coin faces to a line by counting yang faces.
    ///
    /// | yang faces | line        |
    /// |-----------:|-------------|
    /// | 3          | `OldYang`   |
    /// | 2          | `YoungYang` |
    /// | 1          | `YoungYin`  |
    /// | 0          | `OldYin`    |
    pub const fn from_coins(coins: [bool; 3]) -> Self {
        let yang_count = coins[0] as u8 + coins[1] as u8 + coins[2] as u8;
        match yang_count {
            3 => Self::OldYang,
            2 => Self::YoungYang,
            1 => Self::YoungYin,
            _ => Self::OldYin,
        }
    }

    pub const fn is_yang(self) -> bool {
        matches!(self, Self::YoungYang | Self::OldYang)
    }

    pub const fn is_changing(self) -> bool {
        matches!(self, Self::OldYang | Self::OldYin)
    }

    /// The code bit for this line: `'1'` for yang, `'0'` for yin.
    pub const fn bit(self) -> char {
        if self.is_yang() { '1' } else { '0' }
    }

    /// The wire token.
    pub const fn token(self) -> &'static str {
        match self {
            Self::YoungYang => "yang",
            Self::YoungYin => "yin",
            Self::OldYang => "old-yang",
            Self::OldYin => "old-yin",
        }
    }

    /// The traditional name, with changing lines marked.
    pub const fn traditional_name(self) -> &'static str {
        match self {
            Self::YoungYang => "少阳",
            Self::YoungYin => "少阴",
            Self::OldYang => "老阳（变爻）",
            Self::OldYin => "老阴（变爻）",
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Line {
    type Err = ParseLineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|line| line.token() == s)
            .ok_or_else(|| ParseLineError {
                token: s.to_string(),
            })
    }
}

/// Six lines, index 0 at the bottom and index 5 at the top.
///
/// The length is part of the type; a `Reading` cannot hold any other number of
/// lines. Build one from a slice or `Vec` with `TryFrom`, or cast one with
/// [`generate_reading`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Line>", into = "Vec<Line>")]
pub struct Reading([Line; READING_LEN]);

impl Reading {
    pub const fn new(lines: [Line; READING_LEN]) -> Self {
        Self(lines)
    }

    pub const fn lines(&self) -> &[Line; READING_LEN] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = Line> + '_ {
        self.0.iter().copied()
    }

    /// Encodes every line left to right into a six-bit code.
    pub fn code(&self) -> HexagramCode {
        HexagramCode::from_lines(&self.0)
    }

    /// Wire tokens in reading order.
    pub fn tokens(&self) -> Vec<&'static str> {
        self.iter().map(Line::token).collect()
    }
}

impl From<[Line; READING_LEN]> for Reading {
    fn from(lines: [Line; READING_LEN]) -> Self {
        Self(lines)
    }
}

impl TryFrom<&[Line]> for Reading {
    type Error = ReadingLengthError;

    fn try_from(lines: &[Line]) -> Result<Self, Self::Error> {
        <[Line; READING_LEN]>::try_from(lines)
            .map(Self)
            .map_err(|_| ReadingLengthError {
                actual: lines.len(),
            })
    }
}

impl TryFrom<Vec<Line>> for Reading {
    type Error = ReadingLengthError;

    fn try_from(lines: Vec<Line>) -> Result<Self, Self::Error> {
        Self::try_from(lines.as_slice())
    }
}

impl From<Reading> for Vec<Line> {
    fn from(reading: Reading) -> Self {
        reading.0.to_vec()
    }
}

/// Casts one line from three tosses of `coins`.
pub fn generate_line(coins: &(impl CoinSource + ?Sized)) -> Line {
    Line::from_coins([coins.toss(), coins.toss(), coins.toss()])
}

/// Casts a full reading, bottom line first.
pub fn generate_reading(coins: &(impl CoinSource + ?Sized)) -> Reading {
    Reading(core::array::from_fn(|_| generate_line(coins)))
}
