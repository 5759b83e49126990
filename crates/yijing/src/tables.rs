//! Trigram and hexagram lookup tables.
//!
//! Two read-only mappings drive name resolution:
//!
//! - `TrigramCode -> (id, display name)`, exactly 8 entries when complete.
//! - `HexagramCode -> (display name, id)`, up to 64 entries.
//!
//! A complete set is compiled in ([`Tables::builtin`]). Deployments can swap in
//! their own from a directory holding `trigrams.json` and `hexagrams.json`:
//!
//! ```json
//! { "111": ["qian", "乾"], "000": ["kun", "坤"] }
//! { "111111": ["乾为天", "1"] }
//! ```
//!
//! Tables may be incomplete. The resolver degrades on missing entries instead
//! of failing, so a partial file is a valid deployment.

use crate::{HexagramCode, Result, TableError, TrigramCode};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// File name of the trigram table inside a table directory.
pub const TRIGRAMS_FILE: &str = "trigrams.json";
/// File name of the hexagram table inside a table directory.
pub const HEXAGRAMS_FILE: &str = "hexagrams.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrigramEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexagramEntry {
    pub name: String,
    pub id: String,
}

/// Immutable lookup tables, loaded once and shared for the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    trigrams: HashMap<TrigramCode, TrigramEntry>,
    hexagrams: HashMap<HexagramCode, HexagramEntry>,
}

// Trigram bits, bottom line first.
const QIAN: &str = "111";
const KUN: &str = "000";
const ZHEN: &str = "100";
const KAN: &str = "010";
const GEN: &str = "001";
const XUN: &str = "011";
const DUI: &str = "110";
const LI: &str = "101";

const TRIGRAMS: [(&str, &str, &str); 8] = [
    (QIAN, "qian", "乾"),
    (KUN, "kun", "坤"),
    (ZHEN, "zhen", "震"),
    (KAN, "kan", "坎"),
    (GEN, "gen", "艮"),
    (XUN, "xun", "巽"),
    (DUI, "dui", "兑"),
    (LI, "li", "离"),
];

// King Wen sequence as (name, outer trigram, inner trigram). The inner trigram
// holds lines 0-2 and therefore supplies the first three code characters.
const HEXAGRAMS: [(&str, &str, &str); 64] = [
    ("乾为天", QIAN, QIAN),
    ("坤为地", KUN, KUN),
    ("水雷屯", KAN, ZHEN),
    ("山水蒙", GEN, KAN),
    ("水天需", KAN, QIAN),
    ("天水讼", QIAN, KAN),
    ("地水师", KUN, KAN),
    ("水地比", KAN, KUN),
    ("风天小畜", XUN, QIAN),
    ("天泽履", QIAN, DUI),
    ("地天泰", KUN, QIAN),
    ("天地否", QIAN, KUN),
    ("天火同人", QIAN, LI),
    ("火天大有", LI, QIAN),
    ("地山谦", KUN, GEN),
    ("雷地豫", ZHEN, KUN),
    ("泽雷随", DUI, ZHEN),
    ("山风蛊", GEN, XUN),
    ("地泽临", KUN, DUI),
    ("风地观", XUN, KUN),
    ("火雷噬嗑", LI, ZHEN),
    ("山火贲", GEN, LI),
    ("山地剥", GEN, KUN),
    ("地雷复", KUN, ZHEN),
    ("天雷无妄", QIAN, ZHEN),
    ("山天大畜", GEN, QIAN),
    ("山雷颐", GEN, ZHEN),
    ("泽风大过", DUI, XUN),
    ("坎为水", KAN, KAN),
    ("离为火", LI, LI),
    ("泽山咸", DUI, GEN),
    ("雷风恒", ZHEN, XUN),
    ("天山遁", QIAN, GEN),
    ("雷天大壮", ZHEN, QIAN),
    ("火地晋", LI, KUN),
    ("地火明夷", KUN, LI),
    ("风火家人", XUN, LI),
    ("火泽睽", LI, DUI),
    ("水山蹇", KAN, GEN),
    ("雷水解", ZHEN, KAN),
    ("山泽损", GEN, DUI),
    ("风雷益", XUN, ZHEN),
    ("泽天夬", DUI, QIAN),
    ("天风姤", QIAN, XUN),
    ("泽地萃", DUI, KUN),
    ("地风升", KUN, XUN),
    ("泽水困", DUI, KAN),
    ("水风井", KAN, XUN),
    ("泽火革", DUI, LI),
    ("火风鼎", LI, XUN),
    ("震为雷", ZHEN, ZHEN),
    ("艮为山", GEN, GEN),
    ("风山渐", XUN, GEN),
    ("雷泽归妹", ZHEN, DUI),
    ("雷火丰", ZHEN, LI),
    ("火山旅", LI, GEN),
    ("巽为风", XUN, XUN),
    ("兑为泽", DUI, DUI),
    ("风水涣", XUN, KAN),
    ("水泽节", KAN, DUI),
    ("风泽中孚", XUN, DUI),
    ("雷山小过", ZHEN, GEN),
    ("水火既济", KAN, LI),
    ("火水未济", LI, KAN),
];

impl Tables {
    /// Tables with no entries. Every resolution degrades to the fallback name.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The complete compiled-in tables: 8 trigrams and all 64 hexagrams of the
    /// King Wen sequence, numbered 1 to 64.
    pub fn builtin() -> Self {
        Self {
            trigrams: builtin_trigrams(),
            hexagrams: builtin_hexagrams(),
        }
    }

    /// Builds tables from explicit entries.
    pub fn from_entries(
        trigrams: impl IntoIterator<Item = (TrigramCode, TrigramEntry)>,
        hexagrams: impl IntoIterator<Item = (HexagramCode, HexagramEntry)>,
    ) -> Self {
        Self {
            trigrams: trigrams.into_iter().collect(),
            hexagrams: hexagrams.into_iter().collect(),
        }
    }

    /// Loads `trigrams.json` and `hexagrams.json` from `dir`.
    ///
    /// A file that does not exist falls back to the compiled-in table for that
    /// half, so a directory may override just one of them. A file that exists
    /// but cannot be read or parsed is an error.
    ///
    /// # Errors
    ///
    /// Returns [`TableError`] if a present file is unreadable, is not a JSON
    /// object of two-element string arrays, or has a key that is not a valid
    /// code.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(dir = %dir.display())))]
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let trigrams = match read_table(&dir.join(TRIGRAMS_FILE))? {
            Some(raw) => parse_keys(&dir.join(TRIGRAMS_FILE), raw, |(id, name)| {
                TrigramEntry { id, name }
            })?,
            None => builtin_trigrams(),
        };
        let hexagrams = match read_table(&dir.join(HEXAGRAMS_FILE))? {
            Some(raw) => parse_keys(&dir.join(HEXAGRAMS_FILE), raw, |(name, id)| {
                HexagramEntry { name, id }
            })?,
            None => builtin_hexagrams(),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            trigrams = trigrams.len(),
            hexagrams = hexagrams.len(),
            "Loaded lookup tables"
        );

        Ok(Self {
            trigrams,
            hexagrams,
        })
    }

    pub fn trigram(&self, code: &TrigramCode) -> Option<&TrigramEntry> {
        self.trigrams.get(code)
    }

    pub fn hexagram(&self, code: &HexagramCode) -> Option<&HexagramEntry> {
        self.hexagrams.get(code)
    }

    pub fn trigram_count(&self) -> usize {
        self.trigrams.len()
    }

    pub fn hexagram_count(&self) -> usize {
        self.hexagrams.len()
    }
}

fn builtin_trigrams() -> HashMap<TrigramCode, TrigramEntry> {
    TRIGRAMS
        .iter()
        .map(|(bits, id, name)| {
            (
                code(bits),
                TrigramEntry {
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                },
            )
        })
        .collect()
}

fn builtin_hexagrams() -> HashMap<HexagramCode, HexagramEntry> {
    HEXAGRAMS
        .iter()
        .enumerate()
        .map(|(i, (name, outer, inner))| {
            (
                HexagramCode::from_trigrams(code(inner), code(outer)),
                HexagramEntry {
                    name: (*name).to_string(),
                    id: (i + 1).to_string(),
                },
            )
        })
        .collect()
}

fn code(bits: &str) -> TrigramCode {
    // Compiled-in constants are always three '0'/'1' characters.
    bits.parse().unwrap_or_else(|_| unreachable!("bad builtin code {bits}"))
}

type RawTable = HashMap<String, (String, String)>;

fn read_table(path: &Path) -> Result<Option<RawTable>, TableError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            #[cfg(feature = "tracing")]
            tracing::warn!(path = %path.display(), "Table file missing, using builtin table");
            return Ok(None);
        }
        Err(source) => {
            return Err(TableError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| TableError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_keys<K, V>(
    path: &Path,
    raw: RawTable,
    entry: impl Fn((String, String)) -> V,
) -> Result<HashMap<K, V>, TableError>
where
    K: core::str::FromStr<Err = crate::CodeError> + Eq + core::hash::Hash,
{
    raw.into_iter()
        .map(|(key, value)| {
            let code = key.parse::<K>().map_err(|source| TableError::Key {
                path: PathBuf::from(path),
                source,
            })?;
            Ok((code, entry(value)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn builtin_is_complete() {
        let tables = Tables::builtin();
        assert_eq!(tables.trigram_count(), 8);
        assert_eq!(tables.hexagram_count(), 64);

        let ids: HashSet<_> = tables.hexagrams.values().map(|h| h.id.clone()).collect();
        assert_eq!(ids.len(), 64, "every King Wen number appears once");
    }

    #[test]
    fn builtin_spot_checks() {
        let tables = Tables::builtin();
        let name = |bits: &str| tables.hexagram(&bits.parse().unwrap()).unwrap().name.clone();

        assert_eq!(name("111111"), "乾为天");
        assert_eq!(name("000000"), "坤为地");
        // 屯: thunder below (lines 0-2 = 100), water above (lines 3-5 = 010)
        assert_eq!(name("100010"), "水雷屯");
        // 泰: heaven below, earth above
        assert_eq!(name("111000"), "地天泰");
        assert_eq!(name("101010"), "水火既济");

        assert_eq!(tables.trigram(&"011".parse().unwrap()).unwrap().name, "巽");
    }

    #[test]
    fn load_dir_reads_json_tables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(TRIGRAMS_FILE),
            r#"{"111": ["qian", "Heaven"], "000": ["kun", "Earth"]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(HEXAGRAMS_FILE),
            r#"{"111111": ["The Creative", "1"]}"#,
        )
        .unwrap();

        let tables = Tables::load_dir(dir.path()).unwrap();
        assert_eq!(tables.trigram_count(), 2);
        assert_eq!(tables.hexagram_count(), 1);
        assert_eq!(
            tables.hexagram(&"111111".parse().unwrap()),
            Some(&HexagramEntry {
                name: "The Creative".into(),
                id: "1".into()
            })
        );
        assert_eq!(
            tables.trigram(&"000".parse().unwrap()).map(|t| t.name.as_str()),
            Some("Earth")
        );
    }

    #[test]
    fn load_dir_missing_files_use_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let tables = Tables::load_dir(dir.path()).unwrap();
        assert_eq!(tables.trigram_count(), 8);
        assert_eq!(tables.hexagram_count(), 64);
    }

    #[test]
    fn load_dir_rejects_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TRIGRAMS_FILE), "not json").unwrap();
        assert!(matches!(
            Tables::load_dir(dir.path()),
            Err(crate::Error::Table(TableError::Parse { .. }))
        ));

        std::fs::write(dir.path().join(TRIGRAMS_FILE), r#"{"12": ["x", "y"]}"#).unwrap();
        assert!(matches!(
            Tables::load_dir(dir.path()),
            Err(crate::Error::Table(TableError::Key { .. }))
        ));
    }

    #[test]
    fn table_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(HEXAGRAMS_FILE), "[").unwrap();
        match Tables::load_dir(dir.path()) {
            Err(crate::Error::Table(err)) => {
                let message = err.to_string();
                assert!(message.starts_with("failed to parse table"), "{message}");
                assert!(message.contains(HEXAGRAMS_FILE), "{message}");
            }
            other => panic!("expected a table error, got {other:?}"),
        }
    }
}
